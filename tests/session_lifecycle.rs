//! End-to-end session lifecycle tests.
//!
//! These run the full stack - codec, store, directory, manager, monitor -
//! against a temporary data directory, simulating process restarts by
//! building a fresh `SessionManager` over the same directory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::tempdir;

use leavedesk::{
    AuthConfig, Claims, ExpiryMonitor, Role, SessionManager, SessionState, SessionStore,
    TokenCodec,
};

const SECRET: &str = "lifecycle-test-secret";

fn config_for(dir: &std::path::Path) -> AuthConfig {
    AuthConfig {
        secret: SECRET.to_string(),
        ..AuthConfig::default()
    }
    .with_data_dir(dir.to_path_buf())
}

/// Simulate a fresh process over an existing data directory.
fn boot(dir: &std::path::Path) -> SessionManager {
    let manager = SessionManager::new(config_for(dir)).unwrap();
    assert!(manager.is_loading(), "fresh manager starts in Authenticating");
    manager
}

// =============================================================================
// Login / restore across restarts
// =============================================================================

#[test]
fn test_login_then_restart_restores_identity_without_reauth() {
    let dir = tempdir().unwrap();

    // First process: sign in as a seeded employee.
    let first = boot(dir.path());
    first.restore();
    let user = first
        .login("john@example.com", "any-password", Role::Employee)
        .unwrap();
    assert_eq!(user.role, Role::Employee);
    let token = first.current_token().unwrap();
    drop(first);

    // Second process: the persisted token alone restores the identity.
    let second = boot(dir.path());
    let restored = second.restore().expect("persisted session restores");

    assert_eq!(restored.email, "john@example.com");
    assert_eq!(restored.role, Role::Employee);
    assert_eq!(restored.name, "John Doe");
    assert_eq!(second.current_token().unwrap(), token);
    assert_eq!(second.state(), SessionState::Authenticated);
}

#[test]
fn test_expired_token_at_restore_clears_the_slot() {
    let dir = tempdir().unwrap();

    // Plant a token that expired one second ago.
    let codec = TokenCodec::new(SECRET).unwrap();
    let now = Utc::now().timestamp();
    let stale = codec
        .encode(&Claims {
            user_id: "1".to_string(),
            email: "john@example.com".to_string(),
            role: Role::Employee,
            iat: now - 3600,
            exp: now - 1,
        })
        .unwrap();
    let store = SessionStore::open(Some(dir.path().to_path_buf()));
    store.save(&stale).unwrap();

    let manager = boot(dir.path());
    assert!(manager.restore().is_none());
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(store.load(), None, "expired token must not survive restore");
}

#[test]
fn test_logout_ends_the_session_for_the_next_process_too() {
    let dir = tempdir().unwrap();

    let first = boot(dir.path());
    first.restore();
    first
        .login("jane@example.com", "pw", Role::Manager)
        .unwrap();
    first.logout();
    drop(first);

    let second = boot(dir.path());
    assert!(second.restore().is_none());
    assert_eq!(second.state(), SessionState::Unauthenticated);
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_register_restart_login_round_trip() {
    let dir = tempdir().unwrap();

    let first = boot(dir.path());
    first.restore();
    let created = first
        .register("Marge Piercy", "marge@example.com", "longenough", Role::Manager)
        .unwrap();
    drop(first);

    // Restart: restore picks the registered identity up from the token.
    let second = boot(dir.path());
    let restored = second.restore().unwrap();
    assert_eq!(restored.id, created.id);
    assert_eq!(restored.name, "Marge Piercy");

    // Log out and back in against the persisted directory record.
    second.logout();
    let again = second
        .login("marge@example.com", "longenough", Role::Manager)
        .unwrap();
    assert_eq!(again.id, created.id);
}

// =============================================================================
// Monitor-driven renewal and teardown
// =============================================================================

#[tokio::test]
async fn test_monitor_renews_near_expiry_session_across_the_stack() {
    let dir = tempdir().unwrap();

    // A session with ten minutes left, restored as if after a reload.
    let codec = TokenCodec::new(SECRET).unwrap();
    let now = Utc::now().timestamp();
    let near_expiry = codec
        .encode(&Claims {
            user_id: "2".to_string(),
            email: "jane@example.com".to_string(),
            role: Role::Manager,
            iat: now - 3000,
            exp: now + 600,
        })
        .unwrap();
    SessionStore::open(Some(dir.path().to_path_buf()))
        .save(&near_expiry)
        .unwrap();

    let manager = Arc::new(boot(dir.path()));
    manager.restore().unwrap();

    let monitor = ExpiryMonitor::spawn_with(
        manager.clone(),
        Duration::from_millis(50),
        Duration::from_secs(3600),
    );
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Renewed in memory, in the slot, and for the next process.
    let renewed = manager.current_token().unwrap();
    assert_ne!(renewed, near_expiry);
    let claims = TokenCodec::decode(&renewed).unwrap();
    assert_eq!(claims.email, "jane@example.com");
    assert_eq!(claims.role, Role::Manager);
    assert!(claims.exp > now + 600);

    monitor.shutdown();
    drop(manager);
    let next = boot(dir.path());
    let restored = next.restore().expect("renewed session restores");
    assert_eq!(restored.email, "jane@example.com");
}

#[tokio::test]
async fn test_monitor_forces_logout_when_renewal_is_impossible() {
    let dir = tempdir().unwrap();

    let codec = TokenCodec::new(SECRET).unwrap();
    let now = Utc::now().timestamp();
    let dying = codec
        .encode(&Claims {
            user_id: "1".to_string(),
            email: "john@example.com".to_string(),
            role: Role::Employee,
            iat: now - 3600,
            exp: now + 1,
        })
        .unwrap();
    let store = SessionStore::open(Some(dir.path().to_path_buf()));
    store.save(&dying).unwrap();

    let manager = Arc::new(boot(dir.path()));
    manager.restore().unwrap();

    // Let the token cross its expiry, then arm the monitor: the immediate
    // first check finds an unrefreshable token and tears the session down.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let _monitor = ExpiryMonitor::spawn_with(
        manager.clone(),
        Duration::from_millis(50),
        Duration::from_secs(3600),
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert!(manager.current_user().is_none());
    assert_eq!(store.load(), None);
}
