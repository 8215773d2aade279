use std::sync::Arc;

use quantalex_storage::{
    ConversationId, ConversationRecord, ConversationRepository, IdentityId, MessageId,
    MessageRecord, MessageRole, NewMessage, StorageResult,
};

/// Titles derived from the first user message are cut to this many characters.
pub const TITLE_MAX_CHARS: usize = 50;
pub const TITLE_TRUNCATION_MARKER: &str = "...";

/// Ordered collection of one identity's conversations, newest-first.
///
/// Every mutation writes the full collection back through the repository; the
/// store never issues incremental writes. The active selection is process-local
/// UI state and is not persisted.
pub struct ConversationStore {
    identity_id: IdentityId,
    repository: Arc<dyn ConversationRepository>,
    conversations: Vec<ConversationRecord>,
    active_id: Option<ConversationId>,
}

impl ConversationStore {
    pub fn load(
        repository: Arc<dyn ConversationRepository>,
        identity_id: IdentityId,
    ) -> StorageResult<Self> {
        let conversations = repository.load_conversations(identity_id)?;
        tracing::debug!(
            identity = %identity_id,
            conversations = conversations.len(),
            "loaded conversation collection"
        );

        Ok(Self {
            identity_id,
            repository,
            conversations,
            active_id: None,
        })
    }

    pub fn identity_id(&self) -> IdentityId {
        self.identity_id
    }

    pub fn conversations(&self) -> &[ConversationRecord] {
        &self.conversations
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active_id
    }

    pub fn active_conversation(&self) -> Option<&ConversationRecord> {
        self.active_id.and_then(|id| self.conversation(id))
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&ConversationRecord> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == id)
    }

    /// Inserts a fresh placeholder-titled conversation at the front and selects it.
    pub fn create_conversation(&mut self) -> StorageResult<ConversationId> {
        let conversation = ConversationRecord::new_empty();
        let id = conversation.id;
        self.conversations.insert(0, conversation);
        self.active_id = Some(id);
        self.persist()?;
        Ok(id)
    }

    /// Selects a conversation iff the id is present; an unknown id is ignored.
    pub fn select_conversation(&mut self, id: ConversationId) {
        if self.conversation(id).is_none() {
            tracing::debug!(conversation = %id, "ignoring selection of unknown conversation");
            return;
        }

        self.active_id = Some(id);
    }

    /// Removes a conversation. Deleting the active one clears the selection;
    /// it does not fall back to a neighbor.
    pub fn delete_conversation(&mut self, id: ConversationId) -> StorageResult<()> {
        let before = self.conversations.len();
        self.conversations.retain(|conversation| conversation.id != id);
        if self.conversations.len() == before {
            return Ok(());
        }

        if self.active_id == Some(id) {
            self.active_id = None;
        }
        self.persist()
    }

    pub fn clear_all(&mut self) -> StorageResult<()> {
        self.conversations.clear();
        self.active_id = None;
        self.persist()
    }

    /// Appends a message to the named conversation. Appending the first user
    /// message replaces the placeholder title with a derived one.
    ///
    /// Returns `None` when the conversation is gone, which only happens with a
    /// stale id; messages already appended are never touched.
    pub fn append_message(
        &mut self,
        conversation_id: ConversationId,
        draft: NewMessage,
    ) -> StorageResult<Option<MessageId>> {
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|conversation| conversation.id == conversation_id)
        else {
            tracing::warn!(conversation = %conversation_id, "dropping append to unknown conversation");
            return Ok(None);
        };

        if conversation.has_placeholder_title() && draft.role == MessageRole::User {
            conversation.title = derive_title(&draft.content);
        }

        let record = MessageRecord::from_draft(draft);
        let message_id = record.id;
        conversation.messages.push(record);
        self.persist()?;
        Ok(Some(message_id))
    }

    fn persist(&self) -> StorageResult<()> {
        self.repository
            .save_conversations(self.identity_id, &self.conversations)
    }
}

/// Derives a conversation title from the first user message.
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str(TITLE_TRUNCATION_MARKER);
    }
    title
}
