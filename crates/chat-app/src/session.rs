use std::sync::{Arc, OnceLock};

use regex::Regex;
use snafu::{ResultExt, Snafu, ensure};

use quantalex_storage::{IdentityRecord, Storage, StorageError};

pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MIN_NAME_CHARS: usize = 2;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).unwrap())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("'{email}' is not a valid email address"))]
    InvalidEmail { stage: &'static str, email: String },
    #[snafu(display("password must be at least {minimum} characters"))]
    PasswordTooShort {
        stage: &'static str,
        minimum: usize,
    },
    #[snafu(display("name must be at least {minimum} characters"))]
    NameTooShort {
        stage: &'static str,
        minimum: usize,
    },
    #[snafu(display("an account for '{email}' already exists"))]
    DuplicateAccount { stage: &'static str, email: String },
    #[snafu(display("session persistence failed: {source}"))]
    Persistence {
        stage: &'static str,
        source: StorageError,
    },
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Holds the single active identity and its storage lifecycle.
///
/// Authentication here is a local simulation: credentials are validated in
/// shape only, never checked against a server. At most one identity is active
/// at a time.
pub struct AuthSession {
    storage: Arc<dyn Storage>,
    identity: Option<IdentityRecord>,
}

impl AuthSession {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            identity: None,
        }
    }

    pub fn identity(&self) -> Option<&IdentityRecord> {
        self.identity.as_ref()
    }

    /// Reloads the persisted active identity, if any.
    pub fn restore(&mut self) -> AuthResult<Option<&IdentityRecord>> {
        self.identity = self
            .storage
            .load_active_identity()
            .context(PersistenceSnafu {
                stage: "restore-active-identity",
            })?;
        Ok(self.identity.as_ref())
    }

    pub fn login(&mut self, email: &str, password: &str) -> AuthResult<&IdentityRecord> {
        let email = email.trim();
        validate_credentials(email, password)?;

        let identity = match self.storage.find_account(email).context(PersistenceSnafu {
            stage: "login-find-account",
        })? {
            Some(existing) => existing,
            None => {
                // Registering on login too keeps the registry consistent with
                // signup, so a returning identity is recognized either way.
                let identity = IdentityRecord::new(email, derive_display_name(email));
                self.storage
                    .register_account(&identity)
                    .context(PersistenceSnafu {
                        stage: "login-register-account",
                    })?;
                identity
            }
        };

        self.activate(identity)
    }

    pub fn signup(&mut self, email: &str, password: &str, name: &str) -> AuthResult<&IdentityRecord> {
        let email = email.trim();
        let name = name.trim();
        validate_credentials(email, password)?;
        ensure!(
            name.chars().count() >= MIN_NAME_CHARS,
            NameTooShortSnafu {
                stage: "signup-validate-name",
                minimum: MIN_NAME_CHARS,
            }
        );

        let existing = self.storage.find_account(email).context(PersistenceSnafu {
            stage: "signup-find-account",
        })?;
        ensure!(
            existing.is_none(),
            DuplicateAccountSnafu {
                stage: "signup-duplicate-check",
                email: email.to_string(),
            }
        );

        let identity = IdentityRecord::new(email, name);
        self.storage
            .register_account(&identity)
            .context(PersistenceSnafu {
                stage: "signup-register-account",
            })?;
        self.activate(identity)
    }

    /// Deactivates the identity and drops its conversation blob, matching the
    /// destroy-on-logout lifecycle of the identity's collection.
    pub fn logout(&mut self) -> AuthResult<()> {
        if let Some(identity) = self.identity.take() {
            self.storage
                .clear_active_identity()
                .context(PersistenceSnafu {
                    stage: "logout-clear-identity",
                })?;
            self.storage
                .remove_conversations(identity.id)
                .context(PersistenceSnafu {
                    stage: "logout-remove-conversations",
                })?;
            tracing::info!(email = %identity.email, "identity deactivated");
        }
        Ok(())
    }

    fn activate(&mut self, identity: IdentityRecord) -> AuthResult<&IdentityRecord> {
        self.storage
            .save_active_identity(&identity)
            .context(PersistenceSnafu {
                stage: "activate-save-identity",
            })?;
        tracing::info!(email = %identity.email, "identity activated");
        Ok(self.identity.insert(identity))
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    ensure!(
        email_regex().is_match(email),
        InvalidEmailSnafu {
            stage: "validate-email",
            email: email.to_string(),
        }
    );
    ensure!(
        password.chars().count() >= MIN_PASSWORD_CHARS,
        PasswordTooShortSnafu {
            stage: "validate-password",
            minimum: MIN_PASSWORD_CHARS,
        }
    );
    Ok(())
}

/// Derives a display name from the email local part, first letter uppercased.
fn derive_display_name(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or(email);
    let mut characters = local_part.chars();
    match characters.next() {
        Some(first) => first.to_uppercase().chain(characters).collect(),
        None => local_part.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantalex_storage::{ConversationRecord, ConversationRepository, IdentityRepository, JsonStorage};

    fn session_in(tempdir: &tempfile::TempDir) -> (AuthSession, Arc<JsonStorage>) {
        let storage = Arc::new(JsonStorage::new(tempdir.path().join("data")));
        (AuthSession::new(storage.clone()), storage)
    }

    #[test]
    fn login_derives_the_display_name_from_the_email() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, _storage) = session_in(&tempdir);

        let identity = session.login("ada@example.com", "hunter22").unwrap();

        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.email, "ada@example.com");
    }

    #[test]
    fn login_rejects_malformed_emails_and_short_passwords() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, _storage) = session_in(&tempdir);

        assert!(matches!(
            session.login("not-an-email", "hunter22"),
            Err(AuthError::InvalidEmail { .. })
        ));
        assert!(matches!(
            session.login("ada@example.com", "short"),
            Err(AuthError::PasswordTooShort { .. })
        ));
        assert!(session.identity().is_none());
    }

    #[test]
    fn signup_rejects_duplicate_emails_even_after_logout() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, _storage) = session_in(&tempdir);

        session
            .signup("grace@example.com", "password", "Grace")
            .unwrap();
        session.logout().unwrap();

        assert!(matches!(
            session.signup("grace@example.com", "password", "Grace"),
            Err(AuthError::DuplicateAccount { .. })
        ));
    }

    #[test]
    fn signup_after_login_with_the_same_email_is_rejected() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, _storage) = session_in(&tempdir);

        session.login("ada@example.com", "hunter22").unwrap();
        session.logout().unwrap();

        assert!(matches!(
            session.signup("ada@example.com", "password", "Ada L."),
            Err(AuthError::DuplicateAccount { .. })
        ));
    }

    #[test]
    fn signup_requires_a_usable_name() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, _storage) = session_in(&tempdir);

        assert!(matches!(
            session.signup("grace@example.com", "password", " g "),
            Err(AuthError::NameTooShort { .. })
        ));
    }

    #[test]
    fn logout_clears_the_identity_and_its_conversations() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, storage) = session_in(&tempdir);

        let identity_id = session.login("ada@example.com", "hunter22").unwrap().id;
        storage
            .save_conversations(identity_id, &[ConversationRecord::new_empty()])
            .unwrap();

        session.logout().unwrap();

        assert!(session.identity().is_none());
        assert!(storage.load_active_identity().unwrap().is_none());
        assert!(storage.load_conversations(identity_id).unwrap().is_empty());
    }

    #[test]
    fn restore_picks_up_the_persisted_identity() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, storage) = session_in(&tempdir);
        session.login("ada@example.com", "hunter22").unwrap();

        let mut next_session = AuthSession::new(storage);
        let restored = next_session.restore().unwrap();

        assert_eq!(restored.unwrap().email, "ada@example.com");
    }

    #[test]
    fn returning_identity_logs_back_into_the_same_account() {
        let tempdir = tempfile::tempdir().unwrap();
        let (mut session, _storage) = session_in(&tempdir);

        let first_id = session.login("ada@example.com", "hunter22").unwrap().id;
        session.logout().unwrap();
        let second_id = session.login("ada@example.com", "hunter22").unwrap().id;

        assert_eq!(first_id, second_id);
    }
}
