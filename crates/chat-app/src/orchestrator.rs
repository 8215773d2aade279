use std::sync::Arc;

use quantalex_llm::{ChatTurn, CompletionProvider, CompletionRequest, ProviderError, TurnRole};
use quantalex_storage::{
    ConversationId, ConversationRecord, MessageRole, NewMessage, StorageResult,
};

use crate::store::ConversationStore;

/// Why a send call was absorbed without touching the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    BlankUtterance,
    RequestInFlight,
    Unauthenticated,
}

/// Completion failure taxonomy. Every kind ends up as transcript text; none
/// of them abort the user's turn.
#[derive(Debug, Clone, PartialEq)]
pub enum SendFailure {
    UpstreamUnavailable { detail: String },
    UpstreamRejected { status: u16, detail: String },
    Unauthorized,
    MalformedResponse { detail: String },
}

impl SendFailure {
    fn from_provider_error(error: ProviderError) -> Self {
        match error {
            ProviderError::CompletionStatus { status: 401, .. } => Self::Unauthorized,
            ProviderError::CompletionStatus { status, body, .. } => Self::UpstreamRejected {
                status,
                detail: body,
            },
            ProviderError::HttpTransport { ref source, .. } => Self::UpstreamUnavailable {
                detail: source.to_string(),
            },
            ProviderError::CompletionPayloadParse { details, .. } => Self::MalformedResponse {
                detail: details,
            },
            other => Self::UpstreamUnavailable {
                detail: other.to_string(),
            },
        }
    }

    /// The human-readable reason embedded in the synthesized transcript message.
    pub fn reason(&self) -> String {
        match self {
            Self::Unauthorized => {
                "Authentication failed. Please check your OpenRouter API key.".to_string()
            }
            Self::UpstreamRejected { status, detail } => {
                format!("OpenRouter API error: {status} - {detail}")
            }
            Self::UpstreamUnavailable { detail } => detail.clone(),
            Self::MalformedResponse { .. } => "Invalid response from AI service".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendReport {
    Ignored(IgnoreReason),
    Completed {
        conversation_id: ConversationId,
        failure: Option<SendFailure>,
    },
}

/// Assembles outbound requests and reconciles completions back into the store.
///
/// At most one request is in flight at a time; a second send while the flag is
/// set is a silent no-op. There is no cancellation and no timeout beyond what
/// the transport enforces.
pub struct ChatOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    in_flight: bool,
}

impl ChatOrchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            model,
            in_flight: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Sends one user utterance to the active conversation, creating one when
    /// none is selected.
    ///
    /// The user's message stays in the transcript no matter how the assistant
    /// turn ends; completion failures are rewritten into a synthetic assistant
    /// message. Only storage I/O errors propagate.
    pub async fn send(
        &mut self,
        store: &mut ConversationStore,
        utterance: &str,
    ) -> StorageResult<SendReport> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Ok(SendReport::Ignored(IgnoreReason::BlankUtterance));
        }
        if self.in_flight {
            tracing::debug!("send ignored while a request is in flight");
            return Ok(SendReport::Ignored(IgnoreReason::RequestInFlight));
        }

        self.in_flight = true;
        let outcome = self.dispatch(store, utterance).await;
        // The flag is released on every path out of dispatch, including storage errors.
        self.in_flight = false;
        outcome
    }

    async fn dispatch(
        &mut self,
        store: &mut ConversationStore,
        utterance: &str,
    ) -> StorageResult<SendReport> {
        let conversation_id = match store.active_id() {
            Some(id) => id,
            None => store.create_conversation()?,
        };

        store.append_message(conversation_id, NewMessage::user(utterance))?;

        // Full conversation context is replayed on every turn; the provider
        // keeps no session state.
        let turns = store
            .conversation(conversation_id)
            .map(project_history)
            .unwrap_or_default();
        let request = CompletionRequest::new(self.model.clone(), turns);

        let failure = match self.provider.complete(request).await {
            Ok(completion) => {
                if let Some(usage) = completion.usage {
                    tracing::debug!(
                        total_tokens = usage.total_tokens,
                        "completion usage reported"
                    );
                }
                store.append_message(
                    conversation_id,
                    NewMessage::assistant(completion.content, completion.reasoning),
                )?;
                None
            }
            Err(error) => {
                tracing::warn!(%error, "completion failed; absorbing into transcript");
                let failure = SendFailure::from_provider_error(error);
                store.append_message(
                    conversation_id,
                    NewMessage::assistant(synthesize_error_text(&failure.reason()), None),
                )?;
                Some(failure)
            }
        };

        Ok(SendReport::Completed {
            conversation_id,
            failure,
        })
    }
}

/// Projects a conversation to the `{role, content}` pairs the wire expects,
/// discarding ids, timestamps and reasoning traces.
pub fn project_history(conversation: &ConversationRecord) -> Vec<ChatTurn> {
    conversation
        .messages
        .iter()
        .map(|message| {
            let role = match message.role {
                MessageRole::User => TurnRole::User,
                MessageRole::Assistant => TurnRole::Assistant,
            };
            ChatTurn::new(role, message.content.clone())
        })
        .collect()
}

fn synthesize_error_text(reason: &str) -> String {
    format!(
        "Sorry, I encountered an error: {reason}. Please check that your OpenRouter API key is properly configured."
    )
}
