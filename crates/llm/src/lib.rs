pub mod openrouter;
pub mod provider;

pub use openrouter::{
    DEFAULT_OPENROUTER_MODEL, OPENROUTER_BASE_URL, OpenRouterProvider, default_openrouter_models,
};
pub use provider::{
    BoxFuture, ChatTurn, Completion, CompletionProvider, CompletionRequest, KeyInfo, Model,
    ProviderConfig, ProviderError, ProviderResult, TurnRole, UsageSummary,
};
