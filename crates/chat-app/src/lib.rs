pub mod app;
pub mod markdown;
pub mod orchestrator;
pub mod scripted;
pub mod session;
pub mod settings;
pub mod store;

pub use app::ChatApp;
pub use markdown::{Segment, parse_segments};
pub use orchestrator::{ChatOrchestrator, IgnoreReason, SendFailure, SendReport};
pub use session::{AuthError, AuthResult, AuthSession};
pub use settings::{Settings, SettingsError, SettingsStore};
pub use store::ConversationStore;
