// ============================
// crates/backend-lib/src/auth/accounts.rs
// ============================
//! Account registration, login, and session lifecycle.
//!
//! Sessions are explicit-revocation only: they accumulate without cap or
//! expiry and disappear through `logout` or as a side effect of room-code
//! rotation. Unbounded growth is a known resource-accounting gap.

use metrics::counter;
use rand::Rng;
use smartdoor_common::{DisplayDocument, SessionToken};
use std::sync::Arc;
use zeroize::Zeroize;

use crate::auth::password::{hash_password_secure, verify_password};
use crate::error::AppError;
use crate::store::DisplayStore;
use crate::validation::{validate_password, validate_username};

/// Attempts before conceding the room-code space is exhausted.
const MAX_ROOM_CODE_ATTEMPTS: usize = 32;

/// What a successful pairing-by-credentials hands back to the client.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub room_code: String,
    pub session_code: String,
    pub username: Option<String>,
}

/// Credential & session service over the document store.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn DisplayStore>,
    room_code_len: usize,
}

impl AccountService {
    pub fn new(store: Arc<dyn DisplayStore>, room_code_len: usize) -> Self {
        Self {
            store,
            room_code_len,
        }
    }

    /// Create an account, its display document, and a first session.
    /// Takes the password by value; the plain-text buffer is wiped once
    /// the hash exists.
    pub async fn register(
        &self,
        username: &str,
        mut password: String,
    ) -> Result<LoginOutcome, AppError> {
        let username = validate_username(username)?;
        validate_password(&password)?;

        if self.store.find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict("username already exists".to_string()));
        }

        let room_code = self.generate_room_code().await?;
        let hash = hash_password_secure(&mut password)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

        let mut doc = DisplayDocument::new(
            room_code.clone(),
            Some(username.to_string()),
            Some(hash),
        );
        let session = SessionToken::generate();
        let session_code = session.code.clone();
        doc.sessions.push(session);

        self.store.insert(doc).await?;
        counter!(crate::metrics::ACCOUNT_REGISTERED).increment(1);

        Ok(LoginOutcome {
            room_code,
            session_code,
            username: Some(username.to_string()),
        })
    }

    /// Verify credentials and issue a fresh session. The plain-text
    /// buffer is wiped as soon as verification is done.
    pub async fn login(
        &self,
        username: &str,
        mut password: String,
    ) -> Result<LoginOutcome, AppError> {
        let doc = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::Auth("invalid username".to_string()))?;

        let verified = doc
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(hash, &password));
        password.zeroize();
        if !verified {
            return Err(AppError::Auth("incorrect password".to_string()));
        }

        let session = SessionToken::generate();
        let session_code = session.code.clone();
        let updated = self
            .store
            .update_by_room_code(&doc.room_code, Box::new(move |d| d.sessions.push(session)))
            .await?
            .ok_or_else(|| AppError::Internal("document vanished during login".to_string()))?;

        counter!(crate::metrics::SESSION_ISSUED).increment(1);

        Ok(LoginOutcome {
            room_code: updated.room_code,
            session_code,
            username: updated.username,
        })
    }

    /// Resolve a bearer session code back to its room.
    ///
    /// Deliberately leaves `last_access` untouched: no caller needs
    /// freshness semantics.
    pub async fn login_from_session(&self, code: &str) -> Result<LoginOutcome, AppError> {
        let doc = self
            .store
            .find_by_session(code)
            .await?
            .ok_or_else(|| AppError::Auth("expired".to_string()))?;

        Ok(LoginOutcome {
            room_code: doc.room_code,
            session_code: code.to_string(),
            username: doc.username,
        })
    }

    /// Remove exactly the matching session entry. Other sessions of the
    /// same account stay valid.
    pub async fn logout(&self, code: &str) -> Result<(), AppError> {
        let code_owned = code.to_string();
        self.store
            .update_by_session(
                code,
                Box::new(move |doc| doc.sessions.retain(|s| s.code != code_owned)),
            )
            .await?;
        counter!(crate::metrics::SESSION_REVOKED).increment(1);
        Ok(())
    }

    /// Swap the room code for a freshly generated one and return it.
    /// The registry acts on the returned code to migrate or evict members.
    pub async fn reset_room_code(&self, current: &str) -> Result<String, AppError> {
        let new_code = self.generate_room_code().await?;
        let assigned = new_code.clone();
        self.store
            .update_by_room_code(current, Box::new(move |doc| doc.room_code = assigned))
            .await?
            .ok_or_else(|| AppError::NotFound("invalid room code".to_string()))?;

        counter!(crate::metrics::ROOM_CODE_ROTATED).increment(1);
        Ok(new_code)
    }

    /// Generate a numeric room code, retrying until it is unused.
    async fn generate_room_code(&self) -> Result<String, AppError> {
        for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
            let code = random_numeric(self.room_code_len);
            if self.store.find_by_room_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(AppError::Internal(
            "could not generate an unused room code".to_string(),
        ))
    }
}

fn random_numeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FlatFileStore;
    use tempfile::TempDir;

    async fn setup() -> (AccountService, Arc<FlatFileStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlatFileStore::open(dir.path()).unwrap());
        let accounts = AccountService::new(store.clone(), 6);
        (accounts, store, dir)
    }

    #[tokio::test]
    async fn register_creates_document_with_defaults() {
        let (accounts, store, _dir) = setup().await;
        let outcome = accounts.register("alice", "password123".to_string()).await.unwrap();

        assert_eq!(outcome.room_code.len(), 6);
        assert!(outcome.room_code.chars().all(|c| c.is_ascii_digit()));

        let doc = store
            .find_by_room_code(&outcome.room_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.username.as_deref(), Some("alice"));
        assert_eq!(doc.sessions.len(), 1);
        assert_eq!(doc.widgets[1].as_deref(), Some("ScheduleWidget"));
    }

    #[tokio::test]
    async fn register_rejects_bad_credentials() {
        let (accounts, _store, _dir) = setup().await;
        let err = accounts.register("al", "password123".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = accounts.register("alice", "short".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_username() {
        let (accounts, _store, _dir) = setup().await;
        accounts.register("alice", "password123".to_string()).await.unwrap();
        let err = accounts.register("alice", "password456".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_verifies_password() {
        let (accounts, _store, _dir) = setup().await;
        let registered = accounts.register("alice", "password123".to_string()).await.unwrap();

        let login = accounts.login("alice", "password123".to_string()).await.unwrap();
        assert_eq!(login.room_code, registered.room_code);
        // a new session, not the registration one
        assert_ne!(login.session_code, registered.session_code);

        let err = accounts.login("alice", "wrongpassword".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(msg) if msg == "incorrect password"));

        let err = accounts.login("bob", "password123".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(msg) if msg == "invalid username"));
    }

    #[tokio::test]
    async fn sessions_accumulate_across_logins() {
        let (accounts, store, _dir) = setup().await;
        let outcome = accounts.register("alice", "password123".to_string()).await.unwrap();
        accounts.login("alice", "password123".to_string()).await.unwrap();
        accounts.login("alice", "password123".to_string()).await.unwrap();

        let doc = store
            .find_by_room_code(&outcome.room_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.sessions.len(), 3);
    }

    #[tokio::test]
    async fn session_code_resolves_to_registered_room() {
        let (accounts, _store, _dir) = setup().await;
        let registered = accounts.register("alice", "password123".to_string()).await.unwrap();

        let resumed = accounts
            .login_from_session(&registered.session_code)
            .await
            .unwrap();
        assert_eq!(resumed.room_code, registered.room_code);
        assert_eq!(resumed.username.as_deref(), Some("alice"));

        let err = accounts.login_from_session("bogus").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(msg) if msg == "expired"));
    }

    #[tokio::test]
    async fn logout_revokes_only_the_matching_session() {
        let (accounts, store, _dir) = setup().await;
        let registered = accounts.register("alice", "password123".to_string()).await.unwrap();
        let second = accounts.login("alice", "password123".to_string()).await.unwrap();

        accounts.logout(&registered.session_code).await.unwrap();

        let doc = store
            .find_by_room_code(&registered.room_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.sessions.len(), 1);
        assert_eq!(doc.sessions[0].code, second.session_code);
    }

    #[tokio::test]
    async fn reset_room_code_swaps_the_capability() {
        let (accounts, store, _dir) = setup().await;
        let registered = accounts.register("alice", "password123".to_string()).await.unwrap();

        let new_code = accounts
            .reset_room_code(&registered.room_code)
            .await
            .unwrap();
        assert_ne!(new_code, registered.room_code);

        assert!(store
            .find_by_room_code(&registered.room_code)
            .await
            .unwrap()
            .is_none());
        assert!(store.find_by_room_code(&new_code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_unknown_room_code_fails() {
        let (accounts, _store, _dir) = setup().await;
        let err = accounts.reset_room_code("000000").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
