use std::sync::Arc;

use quantalex_llm::CompletionProvider;
use quantalex_storage::{
    ConversationId, ConversationRecord, IdentityRecord, Storage, StorageResult,
};

use crate::orchestrator::{ChatOrchestrator, IgnoreReason, SendReport};
use crate::session::{AuthResult, AuthSession};
use crate::store::ConversationStore;

/// Wires session, conversation store and orchestrator into the surface the UI
/// consumes.
///
/// A conversation store exists only while an identity is active; every
/// operation that needs one degrades to a no-op when nobody is signed in.
pub struct ChatApp {
    storage: Arc<dyn Storage>,
    session: AuthSession,
    store: Option<ConversationStore>,
    orchestrator: ChatOrchestrator,
}

impl ChatApp {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            session: AuthSession::new(storage.clone()),
            storage,
            store: None,
            orchestrator: ChatOrchestrator::new(provider),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.orchestrator = self.orchestrator.with_model(model);
        self
    }

    /// Picks up a previously persisted identity and its conversations.
    pub fn restore_session(&mut self) -> AuthResult<()> {
        self.session.restore()?;
        self.activate_store()
    }

    pub fn login(&mut self, email: &str, password: &str) -> AuthResult<()> {
        self.session.login(email, password)?;
        self.activate_store()
    }

    pub fn signup(&mut self, email: &str, password: &str, name: &str) -> AuthResult<()> {
        self.session.signup(email, password, name)?;
        self.activate_store()
    }

    pub fn logout(&mut self) -> AuthResult<()> {
        self.store = None;
        self.session.logout()
    }

    pub fn identity(&self) -> Option<&IdentityRecord> {
        self.session.identity()
    }

    pub fn is_loading(&self) -> bool {
        self.orchestrator.is_loading()
    }

    pub fn conversations(&self) -> &[ConversationRecord] {
        self.store
            .as_ref()
            .map(ConversationStore::conversations)
            .unwrap_or_default()
    }

    pub fn active_conversation(&self) -> Option<&ConversationRecord> {
        self.store.as_ref()?.active_conversation()
    }

    pub fn new_conversation(&mut self) -> StorageResult<Option<ConversationId>> {
        match self.store.as_mut() {
            Some(store) => store.create_conversation().map(Some),
            None => Ok(None),
        }
    }

    pub fn select_conversation(&mut self, id: ConversationId) {
        if let Some(store) = self.store.as_mut() {
            store.select_conversation(id);
        }
    }

    pub fn delete_conversation(&mut self, id: ConversationId) -> StorageResult<()> {
        match self.store.as_mut() {
            Some(store) => store.delete_conversation(id),
            None => Ok(()),
        }
    }

    pub fn clear_all(&mut self) -> StorageResult<()> {
        match self.store.as_mut() {
            Some(store) => store.clear_all(),
            None => Ok(()),
        }
    }

    /// Sends one utterance. Without an active identity this is a no-op and the
    /// completion collaborator is never invoked.
    pub async fn send(&mut self, text: &str) -> StorageResult<SendReport> {
        let Some(store) = self.store.as_mut() else {
            return Ok(SendReport::Ignored(IgnoreReason::Unauthenticated));
        };
        self.orchestrator.send(store, text).await
    }

    fn activate_store(&mut self) -> AuthResult<()> {
        self.store = match self.session.identity() {
            Some(identity) => Some(
                ConversationStore::load(self.storage.clone(), identity.id).map_err(|source| {
                    crate::session::AuthError::Persistence {
                        stage: "activate-load-conversations",
                        source,
                    }
                })?,
            ),
            None => None,
        };
        Ok(())
    }
}
