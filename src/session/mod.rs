// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Session lifecycle: the state machine that owns the current identity.
//!
//! [`manager`] holds the single `(identity, token)` slot and the five
//! lifecycle operations (restore, login, register, logout, refresh).
//! [`monitor`] keeps an authenticated session alive by renewing its token
//! before expiry, and tears it down when renewal is no longer possible.

pub mod manager;
pub mod monitor;

pub use manager::{AuthError, SessionManager, SessionState};
pub use monitor::ExpiryMonitor;
