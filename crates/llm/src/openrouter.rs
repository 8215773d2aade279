use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use super::provider::{
    BoxFuture, ChatTurn, Completion, CompletionPayloadParseSnafu, CompletionProvider,
    CompletionRequest, CompletionStatusSnafu, EmptyMessageSetSnafu, HttpTransportSnafu, KeyInfo,
    MissingApiKeySnafu, Model, ProviderConfig, ProviderError, ProviderResult, UsageSummary,
};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_MODEL: &str = "deepseek/deepseek-r1-distill-llama-70b";

pub fn default_openrouter_models() -> Vec<Model> {
    vec![
        Model::from_id(DEFAULT_OPENROUTER_MODEL)
            .with_description("Distilled reasoning default, free tier friendly"),
        Model::from_id("deepseek/deepseek-chat").with_description("General chat model"),
        Model::from_id("meta-llama/llama-3.1-70b-instruct")
            .with_description("Large instruct model"),
    ]
}

#[derive(Debug, Serialize)]
struct CompletionRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f64,
    max_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponseBody {
    #[serde(default)]
    choices: Vec<ChoiceBody>,
    #[serde(default)]
    usage: Option<UsageSummary>,
}

#[derive(Debug, Deserialize)]
struct ChoiceBody {
    message: ChoiceMessageBody,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessageBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyResponseBody {
    #[serde(default)]
    data: KeyInfo,
}

/// Completion collaborator speaking the OpenRouter chat-completions wire format.
pub struct OpenRouterProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "openrouter-new",
            }
        );

        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn complete_request(&self, request: CompletionRequest) -> ProviderResult<Completion> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "openrouter-complete",
            }
        );

        let body = CompletionRequestBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            model = %request.model,
            turns = request.messages.len(),
            "dispatching completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.app_title)
            .json(&body)
            .send()
            .await
            .context(HttpTransportSnafu {
                stage: "send-completion-request",
            })?;

        let status = response.status();
        let payload = response.text().await.context(HttpTransportSnafu {
            stage: "read-completion-response",
        })?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "completion endpoint rejected request");
            return CompletionStatusSnafu {
                stage: "completion-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        parse_completion(&payload)
    }

    /// Checks the configured key against the provider's key-introspection endpoint.
    pub async fn verify_key(&self) -> ProviderResult<KeyInfo> {
        let response = self
            .client
            .get(format!("{}/auth/key", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .context(HttpTransportSnafu {
                stage: "send-key-request",
            })?;

        let status = response.status();
        let payload = response.text().await.context(HttpTransportSnafu {
            stage: "read-key-response",
        })?;

        if !status.is_success() {
            return CompletionStatusSnafu {
                stage: "key-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        let parsed: KeyResponseBody =
            serde_json::from_str(&payload).map_err(|source| ProviderError::CompletionPayloadParse {
                stage: "parse-key-response",
                details: source.to_string(),
            })?;
        Ok(parsed.data)
    }
}

impl CompletionProvider for OpenRouterProvider {
    fn default_model(&self) -> &str {
        self.config
            .default_model
            .as_deref()
            .unwrap_or(DEFAULT_OPENROUTER_MODEL)
    }

    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> BoxFuture<'a, ProviderResult<Completion>> {
        Box::pin(self.complete_request(request))
    }
}

fn parse_completion(payload: &str) -> ProviderResult<Completion> {
    let parsed: CompletionResponseBody =
        serde_json::from_str(payload).map_err(|source| ProviderError::CompletionPayloadParse {
            stage: "parse-completion-response",
            details: source.to_string(),
        })?;

    let first_choice = parsed.choices.into_iter().next();
    let Some(choice) = first_choice else {
        return CompletionPayloadParseSnafu {
            stage: "parse-completion-choices",
            details: "response contained no choices".to_string(),
        }
        .fail();
    };

    let Some(content) = choice.message.content.filter(|content| !content.is_empty()) else {
        return CompletionPayloadParseSnafu {
            stage: "parse-completion-content",
            details: "first choice carried no message content".to_string(),
        }
        .fail();
    };

    Ok(Completion {
        content,
        reasoning: choice.message.reasoning,
        usage: parsed.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TurnRole;

    #[test]
    fn parse_completion_extracts_content_reasoning_and_usage() {
        let payload = r#"{
            "choices": [{"message": {"content": "Hello!", "reasoning": "greeting detected"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;

        let completion = parse_completion(payload).unwrap();
        assert_eq!(completion.content, "Hello!");
        assert_eq!(completion.reasoning.as_deref(), Some("greeting detected"));
        assert_eq!(
            completion.usage.unwrap().total_tokens,
            Some(15)
        );
    }

    #[test]
    fn parse_completion_tolerates_absent_reasoning_and_usage() {
        let payload = r#"{"choices": [{"message": {"content": "plain answer"}}]}"#;

        let completion = parse_completion(payload).unwrap();
        assert_eq!(completion.content, "plain answer");
        assert!(completion.reasoning.is_none());
        assert!(completion.usage.is_none());
    }

    #[test]
    fn parse_completion_rejects_missing_choices() {
        let error = parse_completion(r#"{"usage": {}}"#).unwrap_err();
        assert!(matches!(error, ProviderError::CompletionPayloadParse { .. }));
        assert!(error.to_string().contains("no choices"));
    }

    #[test]
    fn parse_completion_rejects_empty_content() {
        let error = parse_completion(r#"{"choices": [{"message": {"content": ""}}]}"#).unwrap_err();
        assert!(error.to_string().contains("no message content"));
    }

    #[test]
    fn request_body_serializes_the_documented_wire_fields() {
        let turns = vec![
            ChatTurn::new(TurnRole::User, "Hi"),
            ChatTurn::new(TurnRole::Assistant, "Hello!"),
        ];
        let body = CompletionRequestBody {
            model: DEFAULT_OPENROUTER_MODEL,
            messages: &turns,
            temperature: 0.7,
            max_tokens: 1000,
        };

        let serialized = serde_json::to_value(&body).unwrap();
        assert_eq!(serialized["model"], DEFAULT_OPENROUTER_MODEL);
        assert_eq!(serialized["temperature"], 0.7);
        assert_eq!(serialized["max_tokens"], 1000);
        assert_eq!(serialized["messages"][0]["role"], "user");
        assert_eq!(serialized["messages"][1]["role"], "assistant");
        assert!(serialized["messages"][0].get("id").is_none());
    }

    #[test]
    fn default_catalog_leads_with_the_default_model() {
        let models = default_openrouter_models();
        assert_eq!(models[0].id, DEFAULT_OPENROUTER_MODEL);
        assert!(models.iter().all(|model| !model.id.is_empty()));
    }

    #[test]
    fn unauthorized_status_is_distinguishable() {
        let error = ProviderError::CompletionStatus {
            stage: "completion-http-status",
            status: 401,
            body: "bad key".to_string(),
        };
        assert!(error.is_unauthorized());

        let error = ProviderError::CompletionStatus {
            stage: "completion-http-status",
            status: 503,
            body: "down".to_string(),
        };
        assert!(!error.is_unauthorized());
    }
}
