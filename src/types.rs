// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Shared types used across the session subsystem.

use serde::{Deserialize, Serialize};

/// Access role carried in every credential.
///
/// Roles are flat: an account is either an employee or a manager, and the
/// pair (email, role) identifies a login. The same address may exist once
/// per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "employee" => Ok(Self::Employee),
            "manager" => Ok(Self::Manager),
            other => Err(format!("unknown role '{other}' (expected employee or manager)")),
        }
    }
}

/// An account in the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Directory identifier, stable across sessions.
    pub id: String,
    /// Display name shown in the UI layers.
    pub name: String,
    pub email: String,
    pub role: Role,
}
