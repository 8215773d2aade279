use std::collections::VecDeque;
use std::sync::Mutex;

use quantalex_llm::{
    BoxFuture, Completion, CompletionProvider, CompletionRequest, DEFAULT_OPENROUTER_MODEL,
    ProviderError, ProviderResult,
};

/// Deterministic in-process completion collaborator.
///
/// Serves queued outcomes in order and records every request it receives, so
/// tests and the QA runner can assert on the projected history without a
/// network in the loop.
#[derive(Default)]
pub struct ScriptedCompletionProvider {
    script: Mutex<VecDeque<ProviderResult<Completion>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&self, completion: Completion) {
        self.script.lock().unwrap().push_back(Ok(completion));
    }

    pub fn push_failure(&self, error: ProviderError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionProvider for ScriptedCompletionProvider {
    fn default_model(&self) -> &str {
        DEFAULT_OPENROUTER_MODEL
    }

    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> BoxFuture<'a, ProviderResult<Completion>> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();

        Box::pin(async move {
            next.unwrap_or_else(|| {
                Err(ProviderError::CompletionPayloadParse {
                    stage: "scripted-exhausted",
                    details: "scripted provider ran out of queued outcomes".to_string(),
                })
            })
        })
    }
}
