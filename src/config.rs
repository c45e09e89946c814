// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Runtime configuration for the session subsystem.
//!
//! One process-wide signing secret plus the timing knobs for token issuance
//! and proactive renewal. The secret comes from the `LEAVEDESK_AUTH_SECRET`
//! environment variable; without it we fall back to a development-only
//! default and log a warning, since a predictable secret makes every token
//! forgeable.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the token signing secret.
pub const AUTH_SECRET_ENV: &str = "LEAVEDESK_AUTH_SECRET";

/// Development fallback secret. Forgeable by anyone who reads the source.
pub const DEV_FALLBACK_SECRET: &str = "fallback-secret-key-for-development-only";

/// Default token lifetime used for issuance and refresh.
pub const DEFAULT_TOKEN_TTL: &str = "24h";

/// How often the expiry monitor inspects the current token: 30 minutes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30 * 60;

/// Remaining lifetime below which a token is proactively renewed: 1 hour.
pub const DEFAULT_RENEW_THRESHOLD_SECS: u64 = 60 * 60;

/// Configuration for the session manager and expiry monitor.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret used to sign and verify tokens.
    pub secret: String,
    /// Token lifetime expression, e.g. "24h", "30m", "90s".
    pub token_ttl: String,
    /// Interval between expiry monitor checks.
    pub poll_interval: Duration,
    /// Renew the token once its remaining lifetime drops below this.
    pub renew_threshold: Duration,
    /// Override for the data directory (token slot, users file).
    /// `None` resolves to `~/.leavedesk`.
    pub data_dir: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEV_FALLBACK_SECRET.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            renew_threshold: Duration::from_secs(DEFAULT_RENEW_THRESHOLD_SECS),
            data_dir: None,
        }
    }
}

impl AuthConfig {
    /// Build a configuration from the environment.
    ///
    /// Reads the signing secret from [`AUTH_SECRET_ENV`]; everything else
    /// keeps its default. An empty value is treated the same as an unset
    /// one so a misconfigured shell export does not silently weaken signing.
    pub fn from_env() -> Self {
        let secret = match std::env::var(AUTH_SECRET_ENV) {
            Ok(s) if !s.trim().is_empty() => s,
            _ => {
                tracing::warn!(
                    "AUTH_SECRET_FALLBACK | {} not set, using insecure development secret",
                    AUTH_SECRET_ENV
                );
                DEV_FALLBACK_SECRET.to_string()
            }
        };

        Self {
            secret,
            ..Self::default()
        }
    }

    /// Override the data directory (used by tests and the CLI `--data-dir` flag).
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }
}
