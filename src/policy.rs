// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Replaceable credential acceptance policy.
//!
//! The shipped behavior is a demo shortcut: any non-empty password is
//! accepted at login (there is no stored credential to verify against),
//! and registration only enforces a minimum length. The point of the trait
//! is that hardening this - real password verification, complexity rules -
//! must not touch the token lifecycle.

use thiserror::Error;

/// Default minimum password length at registration.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// A rejected credential, with a user-displayable reason.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Password must be at least {min} characters")]
    TooShort { min: usize },
}

/// Decides whether a presented secret is acceptable.
pub trait CredentialPolicy: Send + Sync {
    /// Check a secret presented at login.
    fn check_login(&self, secret: &str) -> Result<(), PolicyViolation>;

    /// Check a secret chosen at registration.
    fn check_registration(&self, secret: &str) -> Result<(), PolicyViolation>;
}

/// The demo policy: accept anything at login, require a minimum length at
/// registration. Field emptiness is checked by the session manager before
/// the policy runs.
pub struct DemoPolicy {
    pub min_registration_chars: usize,
}

impl Default for DemoPolicy {
    fn default() -> Self {
        Self {
            min_registration_chars: MIN_PASSWORD_CHARS,
        }
    }
}

impl CredentialPolicy for DemoPolicy {
    fn check_login(&self, _secret: &str) -> Result<(), PolicyViolation> {
        // No stored credential exists to compare against.
        Ok(())
    }

    fn check_registration(&self, secret: &str) -> Result<(), PolicyViolation> {
        if secret.chars().count() < self.min_registration_chars {
            return Err(PolicyViolation::TooShort {
                min: self.min_registration_chars,
            });
        }
        Ok(())
    }
}
