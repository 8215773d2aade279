use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Connection settings for a completion provider, including the attribution
/// headers OpenRouter expects alongside the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub referer: String,
    pub app_title: String,
    pub default_model: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        referer: impl Into<String>,
        app_title: impl Into<String>,
        default_model: Option<String>,
    ) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            referer: referer.into().trim().to_string(),
            app_title: app_title.into().trim().to_string(),
            default_model,
        }
    }
}

/// Wire-level message role, intentionally decoupled from storage-layer role enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One projected `{role, content}` pair of the outbound history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct UsageSummary {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// The assistant turn extracted from the provider's first returned choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub reasoning: Option<String>,
    pub usage: Option<UsageSummary>,
}

/// Key metadata returned by the provider's key-introspection endpoint.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct KeyInfo {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub usage: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub is_free_tier: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for completion provider"))]
    MissingApiKey { stage: &'static str },
    #[snafu(display("completion request has no messages"))]
    EmptyMessageSet { stage: &'static str },
    #[snafu(display("http transport failed on `{stage}`, {source}"))]
    HttpTransport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("completion endpoint returned status {status}: {body}"))]
    CompletionStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to parse completion payload: {details}"))]
    CompletionPayloadParse {
        stage: &'static str,
        details: String,
    },
}

impl ProviderError {
    /// True when the provider rejected the request for bad credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::CompletionStatus { status: 401, .. })
    }

    /// True for transport-level failures where the provider was never reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpTransport { .. })
    }
}

pub trait CompletionProvider: Send + Sync {
    fn default_model(&self) -> &str;
    /// Issues one full (non-streaming) completion and resolves with the first choice.
    fn complete<'a>(&'a self, request: CompletionRequest) -> BoxFuture<'a, ProviderResult<Completion>>;
}
