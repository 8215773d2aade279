use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use super::error::{
    CreateStorageDirectorySnafu, DeserializeBlobSnafu, ReadBlobSnafu, RemoveBlobSnafu,
    ReplaceBlobSnafu, SerializeBlobSnafu, StorageResult, WriteBlobSnafu,
};
use super::ids::IdentityId;
use super::types::{ConversationCollection, ConversationRecord, IdentityRecord};
use super::{ConversationRepository, IdentityRepository};

const ACTIVE_IDENTITY_FILE_NAME: &str = "identity.json";
const ACCOUNT_REGISTRY_FILE_NAME: &str = "accounts.json";

/// JSON-file storage backend.
///
/// One blob per identity for conversations, one global blob for the active
/// identity, and one registry blob keyed by email for signup bookkeeping.
/// Writes are staged through a temp file and renamed into place.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    root: PathBuf,
}

type AccountRegistry = BTreeMap<String, IdentityRecord>;

impl JsonStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn conversations_path(&self, identity_id: IdentityId) -> PathBuf {
        self.root.join(format!("chats-{identity_id}.json"))
    }

    fn active_identity_path(&self) -> PathBuf {
        self.root.join(ACTIVE_IDENTITY_FILE_NAME)
    }

    fn account_registry_path(&self) -> PathBuf {
        self.root.join(ACCOUNT_REGISTRY_FILE_NAME)
    }

    fn read_blob<T: DeserializeOwned>(
        &self,
        path: &Path,
        what: &'static str,
    ) -> StorageResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path).context(ReadBlobSnafu {
            stage: "read-blob",
            what,
            path: display_path(path),
        })?;
        let parsed = serde_json::from_str(&raw).context(DeserializeBlobSnafu {
            stage: "deserialize-blob",
            what,
            path: display_path(path),
        })?;
        Ok(Some(parsed))
    }

    fn write_blob<T: Serialize>(
        &self,
        path: &Path,
        what: &'static str,
        value: &T,
    ) -> StorageResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateStorageDirectorySnafu {
                stage: "create-storage-directory",
                path: display_path(parent),
            })?;
        }

        let serialized = serde_json::to_string_pretty(value).context(SerializeBlobSnafu {
            stage: "serialize-blob",
            what,
        })?;

        // Stage-and-rename keeps a crash from leaving a half-written blob behind.
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, serialized).context(WriteBlobSnafu {
            stage: "write-temporary-blob",
            what,
            path: display_path(&temp_path),
        })?;
        std::fs::rename(&temp_path, path).context(ReplaceBlobSnafu {
            stage: "replace-blob",
            what,
            from: display_path(&temp_path),
            to: display_path(path),
        })?;

        tracing::debug!(what, path = %path.display(), "persisted storage blob");
        Ok(())
    }

    fn remove_blob(&self, path: &Path, what: &'static str) -> StorageResult<()> {
        if !path.exists() {
            return Ok(());
        }

        std::fs::remove_file(path).context(RemoveBlobSnafu {
            stage: "remove-blob",
            what,
            path: display_path(path),
        })
    }

    fn load_account_registry(&self) -> StorageResult<AccountRegistry> {
        Ok(self
            .read_blob(&self.account_registry_path(), "account-registry")?
            .unwrap_or_default())
    }
}

impl ConversationRepository for JsonStorage {
    fn load_conversations(
        &self,
        identity_id: IdentityId,
    ) -> StorageResult<ConversationCollection> {
        Ok(self
            .read_blob(&self.conversations_path(identity_id), "conversations")?
            .unwrap_or_default())
    }

    fn save_conversations(
        &self,
        identity_id: IdentityId,
        conversations: &[ConversationRecord],
    ) -> StorageResult<()> {
        self.write_blob(
            &self.conversations_path(identity_id),
            "conversations",
            &conversations,
        )
    }

    fn remove_conversations(&self, identity_id: IdentityId) -> StorageResult<()> {
        self.remove_blob(&self.conversations_path(identity_id), "conversations")
    }
}

impl IdentityRepository for JsonStorage {
    fn load_active_identity(&self) -> StorageResult<Option<IdentityRecord>> {
        self.read_blob(&self.active_identity_path(), "active-identity")
    }

    fn save_active_identity(&self, identity: &IdentityRecord) -> StorageResult<()> {
        self.write_blob(&self.active_identity_path(), "active-identity", identity)
    }

    fn clear_active_identity(&self) -> StorageResult<()> {
        self.remove_blob(&self.active_identity_path(), "active-identity")
    }

    fn find_account(&self, email: &str) -> StorageResult<Option<IdentityRecord>> {
        let registry = self.load_account_registry()?;
        Ok(registry.get(email.trim()).cloned())
    }

    fn register_account(&self, identity: &IdentityRecord) -> StorageResult<()> {
        let mut registry = self.load_account_registry()?;
        registry.insert(identity.email.trim().to_string(), identity.clone());
        self.write_blob(&self.account_registry_path(), "account-registry", &registry)
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageRecord, NewMessage};

    fn storage_in(tempdir: &tempfile::TempDir) -> JsonStorage {
        JsonStorage::new(tempdir.path().join("quantalex"))
    }

    #[test]
    fn missing_conversation_blob_loads_as_empty_collection() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);

        let loaded = storage
            .load_conversations(IdentityId::new_v7())
            .expect("load should tolerate a missing blob");
        assert!(loaded.is_empty());
    }

    #[test]
    fn conversation_collection_round_trips_unchanged() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);
        let identity_id = IdentityId::new_v7();

        let mut first = ConversationRecord::new_empty();
        first.title = "contract review".to_string();
        first.messages.push(MessageRecord::from_draft(NewMessage::user(
            "summarize clause 4",
        )));
        first
            .messages
            .push(MessageRecord::from_draft(NewMessage::assistant(
                "Clause 4 limits liability.",
                Some("the clause caps damages".to_string()),
            )));
        let second = ConversationRecord::new_empty();
        let collection = vec![second.clone(), first.clone()];

        storage.save_conversations(identity_id, &collection).unwrap();
        let reloaded = storage.load_conversations(identity_id).unwrap();

        assert_eq!(reloaded, collection);
        assert_eq!(reloaded[1].messages[0].timestamp_unix_ms, first.messages[0].timestamp_unix_ms);
    }

    #[test]
    fn collections_are_scoped_per_identity() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);
        let alice = IdentityId::new_v7();
        let bob = IdentityId::new_v7();

        storage
            .save_conversations(alice, &[ConversationRecord::new_empty()])
            .unwrap();

        assert_eq!(storage.load_conversations(alice).unwrap().len(), 1);
        assert!(storage.load_conversations(bob).unwrap().is_empty());
    }

    #[test]
    fn remove_conversations_drops_the_blob_and_tolerates_absence() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);
        let identity_id = IdentityId::new_v7();

        storage
            .save_conversations(identity_id, &[ConversationRecord::new_empty()])
            .unwrap();
        storage.remove_conversations(identity_id).unwrap();
        storage.remove_conversations(identity_id).unwrap();

        assert!(storage.load_conversations(identity_id).unwrap().is_empty());
    }

    #[test]
    fn active_identity_lifecycle() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);

        assert!(storage.load_active_identity().unwrap().is_none());

        let identity = IdentityRecord::new("ada@example.com", "Ada");
        storage.save_active_identity(&identity).unwrap();
        assert_eq!(storage.load_active_identity().unwrap(), Some(identity));

        storage.clear_active_identity().unwrap();
        assert!(storage.load_active_identity().unwrap().is_none());
    }

    #[test]
    fn account_registry_finds_registered_emails_only() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);

        let identity = IdentityRecord::new("grace@example.com", "Grace");
        storage.register_account(&identity).unwrap();

        assert_eq!(
            storage.find_account("grace@example.com").unwrap(),
            Some(identity)
        );
        assert!(storage.find_account("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn corrupt_blob_surfaces_a_deserialize_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let storage = storage_in(&tempdir);
        let identity_id = IdentityId::new_v7();

        std::fs::create_dir_all(storage.root()).unwrap();
        std::fs::write(
            storage.root().join(format!("chats-{identity_id}.json")),
            "{not json",
        )
        .unwrap();

        let error = storage.load_conversations(identity_id).unwrap_err();
        assert!(error.to_string().contains("deserialize"));
    }
}
