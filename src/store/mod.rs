// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Durable single-slot storage for the session token.
//!
//! Exactly one token survives process restarts, written to a fixed slot
//! under the data directory. Last write wins; the session manager is the
//! only writer by construction.
//!
//! When no storage location can be resolved (no home directory, e.g. a
//! stripped-down container), the store runs inert: loads report absent and
//! writes succeed as no-ops. Callers never have to special-case the
//! storageless environment.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

/// File name of the token slot inside the data directory.
const SLOT_FILE: &str = "auth_token";

/// Errors from the persistence substrate.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist session token: {0}")]
    Persist(#[source] std::io::Error),

    #[error("failed to clear session token: {0}")]
    Clear(#[source] std::io::Error),
}

/// The one durable token slot.
pub struct SessionStore {
    /// Resolved slot path; `None` means the store is inert.
    slot: Option<PathBuf>,
}

impl SessionStore {
    /// Open the store under the given data directory, or the default
    /// `~/.leavedesk` when `None`.
    ///
    /// Failure to resolve or create the directory degrades to an inert
    /// store rather than an error; a session that cannot persist is still
    /// a working session for the life of the process.
    pub fn open(data_dir: Option<PathBuf>) -> Self {
        let dir = data_dir.or_else(|| dirs::home_dir().map(|home| home.join(".leavedesk")));

        let slot = match dir {
            Some(dir) => match fs::create_dir_all(&dir) {
                Ok(()) => Some(dir.join(SLOT_FILE)),
                Err(e) => {
                    tracing::warn!(
                        "SESSION_STORE_INERT | dir={} error={}",
                        dir.display(),
                        e
                    );
                    None
                }
            },
            None => {
                tracing::warn!("SESSION_STORE_INERT | no home directory");
                None
            }
        };

        Self { slot }
    }

    /// Read the persisted token, if any.
    ///
    /// An unreadable slot is reported as absent - the caller's restore path
    /// treats both identically, so there is nothing useful to propagate.
    pub fn load(&self) -> Option<String> {
        let slot = self.slot.as_ref()?;
        match fs::read_to_string(slot) {
            Ok(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    None
                } else {
                    Some(token)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("SESSION_SLOT_UNREADABLE | error={}", e);
                None
            }
        }
    }

    /// Write the token to the slot, replacing any previous value.
    pub fn save(&self, token: &str) -> Result<(), StoreError> {
        let Some(slot) = self.slot.as_ref() else {
            tracing::debug!("SESSION_SLOT_SKIPPED | store is inert");
            return Ok(());
        };
        fs::write(slot, token).map_err(StoreError::Persist)?;
        tracing::debug!("SESSION_SLOT_SAVED | path={}", slot.display());
        Ok(())
    }

    /// Remove the persisted token. Clearing an empty slot succeeds.
    pub fn clear(&self) -> Result<(), StoreError> {
        let Some(slot) = self.slot.as_ref() else {
            return Ok(());
        };
        match fs::remove_file(slot) {
            Ok(()) => {
                tracing::debug!("SESSION_SLOT_CLEARED | path={}", slot.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Clear(e)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
