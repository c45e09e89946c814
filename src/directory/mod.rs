// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! File-backed user directory.
//!
//! The account registry the session layer resolves identities against:
//! lookup by email+role at login, by id at restore, uniqueness checks and
//! account creation at registration. Backed by a single `users.json` under
//! the data directory, seeded with demo accounts on first open.
//!
//! Read-modify-write cycles hold an exclusive file lock so two processes
//! sharing a data directory cannot interleave updates. Within one process
//! the session manager is the only caller.
//!
//! Without a resolvable data directory the directory serves the seed
//! accounts read-only, mirroring the storageless-environment behavior of
//! the session store.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::types::{Role, User};

/// File name of the account registry inside the data directory.
const USERS_FILE: &str = "users.json";

/// Errors from the user directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read user directory: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write user directory: {0}")]
    Write(#[source] std::io::Error),

    #[error("user directory is corrupted: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Demo accounts written on first open so a fresh install can log in.
fn seed_users() -> Vec<User> {
    vec![
        User {
            id: "1".to_string(),
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            role: Role::Employee,
        },
        User {
            id: "2".to_string(),
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            role: Role::Manager,
        },
        User {
            id: "3".to_string(),
            name: "Bob Johnson".to_string(),
            email: "bob@example.com".to_string(),
            role: Role::Employee,
        },
    ]
}

/// Generate a directory id: `usr_` plus 128 random bits, hex-encoded.
fn generate_user_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("usr_{}", hex::encode(bytes))
}

/// The account registry.
pub struct UserDirectory {
    /// Resolved registry path; `None` means read-only seed accounts.
    path: Option<PathBuf>,
}

impl UserDirectory {
    /// Open the directory under the given data directory, or the default
    /// `~/.leavedesk` when `None`.
    pub fn open(data_dir: Option<PathBuf>) -> Self {
        let dir = data_dir.or_else(|| dirs::home_dir().map(|home| home.join(".leavedesk")));

        let path = match dir {
            Some(dir) => match std::fs::create_dir_all(&dir) {
                Ok(()) => Some(dir.join(USERS_FILE)),
                Err(e) => {
                    tracing::warn!("USER_DIRECTORY_INERT | dir={} error={}", dir.display(), e);
                    None
                }
            },
            None => {
                tracing::warn!("USER_DIRECTORY_INERT | no home directory");
                None
            }
        };

        Self { path }
    }

    /// Look up the account matching both email and role.
    pub fn find_by_email_and_role(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<User>, DirectoryError> {
        let users = self.load_users()?;
        Ok(users
            .into_iter()
            .find(|u| u.email == email && u.role == role))
    }

    /// Look up an account by its directory id.
    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError> {
        let users = self.load_users()?;
        Ok(users.into_iter().find(|u| u.id == id))
    }

    /// True when any account (either role) already uses this email.
    pub fn exists_by_email(&self, email: &str) -> Result<bool, DirectoryError> {
        let users = self.load_users()?;
        Ok(users.iter().any(|u| u.email == email))
    }

    /// Create an account with a fresh id and persist it.
    ///
    /// Uniqueness is the caller's business rule; this method appends
    /// unconditionally.
    pub fn create(&self, name: &str, email: &str, role: Role) -> Result<User, DirectoryError> {
        let user = User {
            id: generate_user_id(),
            name: name.to_string(),
            email: email.to_string(),
            role,
        };

        let Some(path) = self.path.as_ref() else {
            // No storage: hand back the account for this process lifetime.
            tracing::warn!("USER_CREATED_UNPERSISTED | email={}", user.email);
            return Ok(user);
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(DirectoryError::Read)?;
        file.lock_exclusive().map_err(DirectoryError::Write)?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(DirectoryError::Read)?;
        let mut users: Vec<User> = if contents.trim().is_empty() {
            seed_users()
        } else {
            serde_json::from_str(&contents)?
        };

        users.push(user.clone());
        let serialized = serde_json::to_string_pretty(&users)?;
        file.seek(SeekFrom::Start(0)).map_err(DirectoryError::Write)?;
        file.set_len(0).map_err(DirectoryError::Write)?;
        file.write_all(serialized.as_bytes())
            .map_err(DirectoryError::Write)?;

        tracing::info!("USER_CREATED | id={} email={} role={}", user.id, user.email, user.role);
        Ok(user)
    }

    /// Read the registry, writing the seed accounts on first open.
    fn load_users(&self) -> Result<Vec<User>, DirectoryError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(seed_users());
        };

        let file = match OpenOptions::new().read(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.write_seed(path.clone());
            }
            Err(e) => return Err(DirectoryError::Read(e)),
        };

        file.lock_shared().map_err(DirectoryError::Read)?;
        let mut contents = String::new();
        (&file)
            .read_to_string(&mut contents)
            .map_err(DirectoryError::Read)?;

        if contents.trim().is_empty() {
            return self.write_seed(path.clone());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_seed(&self, path: PathBuf) -> Result<Vec<User>, DirectoryError> {
        let users = seed_users();
        let serialized = serde_json::to_string_pretty(&users)?;
        std::fs::write(&path, serialized).map_err(DirectoryError::Write)?;
        tracing::info!("USER_DIRECTORY_SEEDED | path={} accounts={}", path.display(), users.len());
        Ok(users)
    }
}

// ============================================================================
// TESTS
// ============================================================================
