// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! The session manager: single owner of the current identity and token.
//!
//! One manager exists per process. It is the only writer of the in-memory
//! session pair and the durable token slot, and it keeps the two consistent:
//! after any operation completes - success or failure - memory and store
//! hold the same token, or both are empty.
//!
//! Lifecycle operations serialize on an internal lock held across the store
//! write and the memory swap, so a logout racing a refresh resolves
//! deterministically: logout clears unconditionally, and refresh commits
//! only if the session still holds the exact token it started from.
//!
//! Collaborators observe the session read-only ([`current_user`],
//! [`current_token`]) or reactively through the [`subscribe`] watch channel,
//! which broadcasts the authenticated flag on every transition.
//!
//! [`current_user`]: SessionManager::current_user
//! [`current_token`]: SessionManager::current_token
//! [`subscribe`]: SessionManager::subscribe

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::watch;

use crate::config::AuthConfig;
use crate::directory::{DirectoryError, UserDirectory};
use crate::policy::{CredentialPolicy, DemoPolicy, PolicyViolation};
use crate::store::{SessionStore, StoreError};
use crate::token::{TokenCodec, TokenError};
use crate::types::{Role, User};

/// Classified failures of the lifecycle operations.
///
/// The first four are user-displayable credential rejections; the rest wrap
/// infrastructure faults. Codec internals (bad signature vs. malformed vs.
/// expired) are never distinguished here - they all collapse to "not
/// authenticated" before reaching a caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already exists")]
    EmailTaken,

    #[error("All fields are required")]
    MissingField,

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("credential signing failed: {0}")]
    Token(#[from] TokenError),

    #[error("session persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("user directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Authentication state of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No identity; the token slot is empty.
    Unauthenticated,
    /// Startup restore has not completed yet.
    Authenticating,
    /// An identity and a verified token are held.
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            Self::Authenticating => write!(f, "AUTHENTICATING"),
            Self::Authenticated => write!(f, "AUTHENTICATED"),
        }
    }
}

struct SessionInner {
    state: SessionState,
    user: Option<User>,
    token: Option<String>,
}

/// Owns the process-wide session.
pub struct SessionManager {
    inner: RwLock<SessionInner>,
    codec: TokenCodec,
    store: SessionStore,
    directory: UserDirectory,
    policy: Box<dyn CredentialPolicy>,
    config: AuthConfig,
    auth_tx: watch::Sender<bool>,
}

impl SessionManager {
    /// Build a manager with the demo credential policy.
    ///
    /// The manager starts in `Authenticating`; call [`restore`](Self::restore)
    /// to complete startup.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        Self::with_policy(config, Box::new(DemoPolicy::default()))
    }

    /// Build a manager with a custom credential policy.
    pub fn with_policy(
        config: AuthConfig,
        policy: Box<dyn CredentialPolicy>,
    ) -> Result<Self, AuthError> {
        let codec = TokenCodec::new(config.secret.clone())?;
        let store = SessionStore::open(config.data_dir.clone());
        let directory = UserDirectory::open(config.data_dir.clone());
        let (auth_tx, _) = watch::channel(false);

        Ok(Self {
            inner: RwLock::new(SessionInner {
                state: SessionState::Authenticating,
                user: None,
                token: None,
            }),
            codec,
            store,
            directory,
            policy,
            config,
            auth_tx,
        })
    }

    // -- Observers ---------------------------------------------------------

    /// The authenticated identity, if any.
    pub fn current_user(&self) -> Option<User> {
        self.read().user.clone()
    }

    /// The current token string, if any.
    pub fn current_token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn state(&self) -> SessionState {
        self.read().state
    }

    /// True until the startup restore has completed.
    pub fn is_loading(&self) -> bool {
        self.state() == SessionState::Authenticating
    }

    /// Subscribe to the authenticated flag. The receiver sees `true` while
    /// a session is held and `false` otherwise; every transition is
    /// broadcast.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.auth_tx.subscribe()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticated verification of an arbitrary token, for collaborators
    /// that gate on credential validity without touching session state.
    pub fn validate_token(&self, token: &str) -> bool {
        self.codec.verify(token).is_some()
    }

    // -- Lifecycle operations ----------------------------------------------

    /// Complete startup by restoring the session persisted in the token
    /// slot, if there is one and it still verifies.
    ///
    /// A slot that is absent leaves the session unauthenticated; a slot
    /// that fails verification is cleared as well, so a stale or tampered
    /// token never survives a restart.
    pub fn restore(&self) -> Option<User> {
        let Some(token) = self.store.load() else {
            self.transition_unauthenticated(false);
            return None;
        };

        let Some(claims) = self.codec.verify(&token) else {
            tracing::info!("SESSION_RESTORE_REJECTED | persisted token invalid");
            self.transition_unauthenticated(true);
            return None;
        };

        // The verified claims are the identity; the directory only
        // contributes the display name. A directory miss (or a directory
        // that cannot be read) falls back to the email local-part.
        let name = match self.directory.find_by_id(&claims.user_id) {
            Ok(Some(user)) => user.name,
            Ok(None) => local_part(&claims.email).to_string(),
            Err(e) => {
                tracing::warn!("SESSION_RESTORE_DIRECTORY_MISS | error={}", e);
                local_part(&claims.email).to_string()
            }
        };

        let user = User {
            id: claims.user_id,
            name,
            email: claims.email,
            role: claims.role,
        };

        {
            let mut inner = self.write();
            inner.state = SessionState::Authenticated;
            inner.user = Some(user.clone());
            inner.token = Some(token);
        }
        self.auth_tx.send_replace(true);

        tracing::info!("SESSION_RESTORED | user={} role={}", user.email, user.role);
        Some(user)
    }

    /// Authenticate against the directory and establish a session.
    pub fn login(&self, email: &str, secret: &str, role: Role) -> Result<User, AuthError> {
        if email.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::MissingField);
        }
        self.policy.check_login(secret)?;

        let user = self
            .directory
            .find_by_email_and_role(email, role)?
            .ok_or(AuthError::InvalidCredentials)?;

        self.establish(user, "LOGIN")
    }

    /// Create an account and establish a session for it.
    pub fn register(
        &self,
        name: &str,
        email: &str,
        secret: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        if name.trim().is_empty() || email.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::MissingField);
        }
        self.policy.check_registration(secret)?;

        if self.directory.exists_by_email(email)? {
            return Err(AuthError::EmailTaken);
        }
        let user = self.directory.create(name, email, role)?;

        self.establish(user, "REGISTER")
    }

    /// Clear the session, in memory and in the slot. Idempotent, and it
    /// always wins: an in-flight refresh observing the cleared slot
    /// abandons its write.
    pub fn logout(&self) {
        {
            let mut inner = self.write();
            inner.state = SessionState::Unauthenticated;
            inner.user = None;
            inner.token = None;
            if let Err(e) = self.store.clear() {
                tracing::warn!("LOGOUT_CLEAR_FAILED | error={}", e);
            }
        }
        self.auth_tx.send_replace(false);
        tracing::info!("LOGOUT");
    }

    /// Replace the current token with a freshly signed one carrying the
    /// same identity and a full new lifetime.
    ///
    /// Returns `false` - with no mutation anywhere - when there is no
    /// current token, the current token no longer verifies, or the session
    /// changed while the replacement was being minted. Failures here are
    /// not user-facing errors; the expiry monitor escalates them to a
    /// logout.
    pub fn refresh(&self) -> bool {
        let Some(current) = self.current_token() else {
            return false;
        };

        let Some(claims) = self.codec.verify(&current) else {
            tracing::info!("REFRESH_REJECTED | current token failed verification");
            return false;
        };

        let minted = self.codec.sign(
            &claims.user_id,
            &claims.email,
            claims.role,
            &self.config.token_ttl,
        );
        let fresh = match minted {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("REFRESH_FAILED | error={}", e);
                return false;
            }
        };

        let mut inner = self.write();
        if inner.token.as_deref() != Some(current.as_str()) {
            // The session was cleared or replaced mid-refresh; whoever did
            // that wins.
            tracing::debug!("REFRESH_ABANDONED | session changed during refresh");
            return false;
        }
        if let Err(e) = self.store.save(&fresh) {
            tracing::warn!("REFRESH_FAILED | error={}", e);
            return false;
        }
        inner.token = Some(fresh);

        tracing::info!("TOKEN_REFRESHED | user={}", claims.email);
        true
    }

    // -- Internals ---------------------------------------------------------

    /// Shared tail of login and registration: mint, persist, then commit.
    ///
    /// The slot write happens before the memory swap; if it fails the
    /// session is left exactly as it was.
    fn establish(&self, user: User, event: &str) -> Result<User, AuthError> {
        let token = self
            .codec
            .sign(&user.id, &user.email, user.role, &self.config.token_ttl)?;

        {
            let mut inner = self.write();
            self.store.save(&token)?;
            inner.state = SessionState::Authenticated;
            inner.user = Some(user.clone());
            inner.token = Some(token);
        }
        self.auth_tx.send_replace(true);

        tracing::info!("{} | user={} role={}", event, user.email, user.role);
        Ok(user)
    }

    /// Enter `Unauthenticated`, optionally clearing the slot.
    fn transition_unauthenticated(&self, clear_slot: bool) {
        {
            let mut inner = self.write();
            inner.state = SessionState::Unauthenticated;
            inner.user = None;
            inner.token = None;
            if clear_slot {
                if let Err(e) = self.store.clear() {
                    tracing::warn!("SESSION_CLEAR_FAILED | error={}", e);
                }
            }
        }
        self.auth_tx.send_replace(false);
    }

    /// Lock helpers that recover from poisoning: a panicked writer must
    /// not turn every later session operation into a panic.
    fn read(&self) -> RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The part of an email address before the `@`, used as a display-name
/// fallback when the directory has no record for a restored subject.
fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Claims;
    use chrono::Utc;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> AuthConfig {
        AuthConfig {
            secret: "manager-test-secret".to_string(),
            ..AuthConfig::default()
        }
        .with_data_dir(dir.to_path_buf())
    }

    fn manager(dir: &std::path::Path) -> SessionManager {
        SessionManager::new(test_config(dir)).unwrap()
    }

    /// The memory/slot consistency invariant, asserted after operations.
    fn assert_consistent(mgr: &SessionManager, dir: &std::path::Path) {
        let slot = SessionStore::open(Some(dir.to_path_buf())).load();
        assert_eq!(mgr.current_token(), slot, "memory and slot diverged");
    }

    #[test]
    fn test_new_manager_is_loading_until_restore() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        assert!(mgr.is_loading());
        assert_eq!(mgr.state(), SessionState::Authenticating);

        mgr.restore();
        assert!(!mgr.is_loading());
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_login_establishes_and_persists_session() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        let user = mgr
            .login("john@example.com", "anything", Role::Employee)
            .unwrap();

        assert_eq!(user.name, "John Doe");
        assert_eq!(mgr.state(), SessionState::Authenticated);
        assert_eq!(mgr.current_user().unwrap().email, "john@example.com");
        assert!(mgr.current_token().is_some());
        assert!(*mgr.subscribe().borrow());
        assert_consistent(&mgr, dir.path());
    }

    #[test]
    fn test_login_unknown_user_rejected_without_mutation() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        let err = mgr
            .login("nobody@example.com", "pw", Role::Employee)
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
        assert!(mgr.current_token().is_none());
        assert_consistent(&mgr, dir.path());
    }

    #[test]
    fn test_login_requires_matching_role() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        // John exists, but as an employee.
        let err = mgr
            .login("john@example.com", "pw", Role::Manager)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn test_login_rejects_empty_fields() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        assert!(matches!(
            mgr.login("", "pw", Role::Employee),
            Err(AuthError::MissingField)
        ));
        assert!(matches!(
            mgr.login("john@example.com", "", Role::Employee),
            Err(AuthError::MissingField)
        ));
    }

    #[test]
    fn test_register_creates_account_and_session() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        let user = mgr
            .register("Grace Hopper", "grace@example.com", "seaworthy", Role::Manager)
            .unwrap();

        assert!(user.id.starts_with("usr_"));
        assert_eq!(mgr.state(), SessionState::Authenticated);
        assert_consistent(&mgr, dir.path());

        // The account outlives the session.
        mgr.logout();
        let again = mgr
            .login("grace@example.com", "seaworthy", Role::Manager)
            .unwrap();
        assert_eq!(again.id, user.id);
    }

    #[test]
    fn test_register_duplicate_email_rejected() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        let err = mgr
            .register("Imposter", "john@example.com", "longpassword", Role::Manager)
            .unwrap_err();

        assert!(matches!(err, AuthError::EmailTaken));
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
        assert_consistent(&mgr, dir.path());
    }

    #[test]
    fn test_register_weak_password_rejected() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        let err = mgr
            .register("Ada", "ada@example.com", "tiny", Role::Employee)
            .unwrap_err();

        assert!(matches!(err, AuthError::Policy(_)));
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_logout_clears_everything_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();
        mgr.login("john@example.com", "pw", Role::Employee).unwrap();

        mgr.logout();
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
        assert!(mgr.current_user().is_none());
        assert!(mgr.current_token().is_none());
        assert!(!*mgr.subscribe().borrow());
        assert_consistent(&mgr, dir.path());

        // Logging out again changes nothing and does not fail.
        mgr.logout();
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_refresh_without_token_is_a_pure_no_op() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();

        assert!(!mgr.refresh());
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
        assert!(mgr.current_token().is_none());
        assert_consistent(&mgr, dir.path());
    }

    #[test]
    fn test_refresh_preserves_identity_with_later_expiry() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let codec = TokenCodec::new(config.secret.clone()).unwrap();

        // Persist a mid-life token so the refreshed expiry is strictly
        // later even within the same clock second.
        let now = Utc::now().timestamp();
        let aged = codec
            .encode(&Claims {
                user_id: "1".to_string(),
                email: "john@example.com".to_string(),
                role: Role::Employee,
                iat: now - 600,
                exp: now + 600,
            })
            .unwrap();
        SessionStore::open(Some(dir.path().to_path_buf()))
            .save(&aged)
            .unwrap();

        let mgr = SessionManager::new(config).unwrap();
        mgr.restore().expect("aged token restores");

        assert!(mgr.refresh());

        let renewed = mgr.current_token().unwrap();
        assert_ne!(renewed, aged);
        let claims = TokenCodec::decode(&renewed).unwrap();
        assert_eq!(claims.user_id, "1");
        assert_eq!(claims.email, "john@example.com");
        assert_eq!(claims.role, Role::Employee);
        assert!(claims.exp > now + 600, "expiry must move strictly later");
        assert_consistent(&mgr, dir.path());
    }

    #[test]
    fn test_restore_with_empty_slot_is_unauthenticated() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        assert!(mgr.restore().is_none());
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_restore_rejects_and_clears_expired_token() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let codec = TokenCodec::new(config.secret.clone()).unwrap();

        let now = Utc::now().timestamp();
        let stale = codec
            .encode(&Claims {
                user_id: "1".to_string(),
                email: "john@example.com".to_string(),
                role: Role::Employee,
                iat: now - 7200,
                exp: now - 1,
            })
            .unwrap();
        let store = SessionStore::open(Some(dir.path().to_path_buf()));
        store.save(&stale).unwrap();

        let mgr = SessionManager::new(config).unwrap();
        assert!(mgr.restore().is_none());
        assert_eq!(mgr.state(), SessionState::Unauthenticated);
        assert_eq!(store.load(), None, "stale token must be cleared");
    }

    #[test]
    fn test_restore_rejects_token_signed_with_other_secret() {
        let dir = tempdir().unwrap();
        let foreign = TokenCodec::new("some-other-secret").unwrap();
        let forged = foreign
            .sign("1", "john@example.com", Role::Employee, "24h")
            .unwrap();
        let store = SessionStore::open(Some(dir.path().to_path_buf()));
        store.save(&forged).unwrap();

        let mgr = manager(dir.path());
        assert!(mgr.restore().is_none());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_restore_resolves_display_name_from_directory() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();
        mgr.login("john@example.com", "pw", Role::Employee).unwrap();

        let restored = manager(dir.path()).restore().unwrap();
        assert_eq!(restored.name, "John Doe");
        assert_eq!(restored.email, "john@example.com");
        assert_eq!(restored.role, Role::Employee);
    }

    #[test]
    fn test_restore_falls_back_to_email_local_part() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let codec = TokenCodec::new(config.secret.clone()).unwrap();

        // A subject the directory has never heard of.
        let token = codec
            .sign("usr_gone", "ghost@example.com", Role::Employee, "24h")
            .unwrap();
        SessionStore::open(Some(dir.path().to_path_buf()))
            .save(&token)
            .unwrap();

        let mgr = SessionManager::new(config).unwrap();
        let restored = mgr.restore().unwrap();
        assert_eq!(restored.name, "ghost");
    }

    #[test]
    fn test_validate_token_accepts_own_rejects_foreign() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.restore();
        mgr.login("john@example.com", "pw", Role::Employee).unwrap();

        let own = mgr.current_token().unwrap();
        assert!(mgr.validate_token(&own));

        let foreign = TokenCodec::new("some-other-secret")
            .unwrap()
            .sign("1", "john@example.com", Role::Employee, "24h")
            .unwrap();
        assert!(!mgr.validate_token(&foreign));
    }
}
