pub mod error;
pub mod ids;
pub mod json;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::{ConversationId, IdentityId, MessageId};
pub use json::JsonStorage;
pub use types::{
    ConversationCollection, ConversationRecord, IdentityRecord, MessageRecord, MessageRole,
    NewMessage, PLACEHOLDER_CONVERSATION_TITLE, current_unix_timestamp_ms,
};

/// Full-collection persistence for one identity's conversations.
///
/// Every save is a whole-collection overwrite; there is no incremental write
/// path, mirroring the one-blob-per-identity layout of the persisted state.
pub trait ConversationRepository: Send + Sync {
    /// Loads the collection for an identity. A missing blob is an empty collection.
    fn load_conversations(&self, identity_id: IdentityId)
    -> StorageResult<ConversationCollection>;
    fn save_conversations(
        &self,
        identity_id: IdentityId,
        conversations: &[ConversationRecord],
    ) -> StorageResult<()>;
    /// Drops the identity's blob entirely. Missing blob is not an error.
    fn remove_conversations(&self, identity_id: IdentityId) -> StorageResult<()>;
}

/// Persistence for the single active identity and the signup account registry.
pub trait IdentityRepository: Send + Sync {
    fn load_active_identity(&self) -> StorageResult<Option<IdentityRecord>>;
    fn save_active_identity(&self, identity: &IdentityRecord) -> StorageResult<()>;
    fn clear_active_identity(&self) -> StorageResult<()>;
    fn find_account(&self, email: &str) -> StorageResult<Option<IdentityRecord>>;
    fn register_account(&self, identity: &IdentityRecord) -> StorageResult<()>;
}

pub trait Storage: ConversationRepository + IdentityRepository {}

impl<T> Storage for T where T: ConversationRepository + IdentityRepository {}
