// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! leavedesk - vacation & sick-leave workflow, session core
//!
//! Token-based session management for the leave-request workflow: employees
//! and managers sign in, hold a signed time-bound credential, and stay
//! signed in across restarts until the credential can no longer be renewed.
//!
//! # Core Modules
//!
//! - [`token`] - credential codec: signing, verification, expiry inspection
//! - [`store`] - durable single-slot token persistence
//! - [`directory`] - file-backed account registry
//! - [`session`] - session manager (lifecycle state machine) and expiry monitor
//! - [`policy`] - replaceable credential acceptance policy
//! - [`config`] - signing secret and timing configuration

pub mod config;
pub mod directory;
pub mod policy;
pub mod session;
pub mod store;
pub mod token;
pub mod types;

// Re-export commonly used types from the types module
pub use types::{Role, User};

// Re-export the session lifecycle surface
pub use session::{
    manager::{AuthError, SessionManager, SessionState},
    monitor::ExpiryMonitor,
};

// Re-export codec types
pub use token::{Claims, TokenCodec, TokenError};

// Re-export collaborators
pub use config::AuthConfig;
pub use directory::{DirectoryError, UserDirectory};
pub use policy::{CredentialPolicy, DemoPolicy, PolicyViolation};
pub use store::{SessionStore, StoreError};
