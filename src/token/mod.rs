// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Credential codec: signed, time-bound session tokens.
//!
//! Tokens are three dot-separated base64url segments (header, claims,
//! signature) with an HMAC-SHA256 signature over the first two segments.
//! A token is either fully valid or wholly unusable; nothing downstream is
//! allowed to act on a partially-trusted credential.
//!
//! Two read paths with deliberately different trust:
//!
//! - [`TokenCodec::verify`] checks structure, signature, and expiry. Its
//!   output is authenticated identity.
//! - [`TokenCodec::decode`] checks structure only. It exists for the cheap
//!   expiry-polling path, where trust was already established by a prior
//!   `verify`; its output must never be treated as authenticated.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::types::Role;

type HmacSha256 = Hmac<Sha256>;

/// Fixed token header: algorithm tag only, no negotiation.
const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// TTL applied when the expression cannot be parsed.
const FALLBACK_TTL_SECS: i64 = 24 * 60 * 60;

/// Errors raised by the codec.
///
/// Expected verification outcomes (bad signature, malformed input, expiry)
/// are not errors; they surface as `None` from [`TokenCodec::verify`] and
/// [`TokenCodec::decode`]. Only configuration faults land here.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("signing key rejected: {0}")]
    InvalidKey(String),

    #[error("claims serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The signed claim set carried inside every token.
///
/// Wire keys follow the conventional JWT shape; `iat` and `exp` are integer
/// seconds since the Unix epoch. Claims are immutable once signed - refresh
/// mints a whole new set rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch. Always strictly greater than `iat`
    /// for any positive TTL.
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Signs and verifies session tokens with a process-wide secret.
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    /// Create a codec over the given secret.
    ///
    /// An empty secret is the one hard configuration fault: signing with it
    /// would make every token forgeable, so we refuse up front rather than
    /// failing per-operation.
    pub fn new(secret: impl Into<String>) -> Result<Self, TokenError> {
        let secret: String = secret.into();
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            secret: secret.into_bytes(),
        })
    }

    /// Mint a token for the given identity.
    ///
    /// Stamps `iat = now` and `exp = now + ttl`. The TTL expression is a
    /// number plus a unit (`s`, `m`, `h`, `d`, e.g. "24h"); unrecognized
    /// expressions fall back to 24 hours.
    pub fn sign(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        ttl: &str,
    ) -> Result<String, TokenError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role,
            iat,
            exp: iat + parse_ttl(ttl),
        };
        self.encode(&claims)
    }

    /// Serialize and sign an explicit claim set.
    ///
    /// [`sign`](Self::sign) is the normal entry point; this one exists for
    /// callers that need full control over the timestamps.
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signature = self.compute_signature(&header, &payload)?;
        Ok(format!("{header}.{payload}.{signature}"))
    }

    /// Verify a token: structure, signature, expiry.
    ///
    /// Returns `None` for any failure - malformed segments, unknown
    /// algorithm, signature mismatch, or a token past its expiry. Callers
    /// get no distinction between those cases because none of them has a
    /// distinct recovery.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let (header_b64, payload_b64, signature_b64) = split_segments(token)?;

        let header_bytes = URL_SAFE_NO_PAD.decode(header_b64).ok()?;
        let header: Header = serde_json::from_slice(&header_bytes).ok()?;
        if header.alg != "HS256" {
            return None;
        }

        // Recompute over the exact transmitted bytes, never over a re-encoding.
        let expected = self.compute_signature(header_b64, payload_b64).ok()?;
        let given = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        if !bool::from(expected.as_bytes().ct_eq(&given)) {
            return None;
        }

        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let claims: Claims = serde_json::from_slice(&payload_bytes).ok()?;
        if claims.exp <= Utc::now().timestamp() {
            return None;
        }

        Some(claims)
    }

    /// Structural decode with no signature check.
    ///
    /// Only for local expiry inspection on tokens this process already
    /// verified. The result is unauthenticated.
    pub fn decode(token: &str) -> Option<Claims> {
        let (_, payload_b64, _) = split_segments(token)?;
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        serde_json::from_slice(&payload_bytes).ok()
    }

    /// True when the token cannot be decoded or its expiry has passed.
    ///
    /// The boundary instant counts as expired: a token with `exp == now`
    /// is already dead. `verify` applies the same rule, so the two can
    /// never disagree about a token's liveness.
    pub fn is_expired(token: &str) -> bool {
        match Self::decode(token) {
            Some(claims) => claims.exp <= Utc::now().timestamp(),
            None => true,
        }
    }

    /// The expiry instant of a decodable token.
    pub fn expiration_time(token: &str) -> Option<DateTime<Utc>> {
        let claims = Self::decode(token)?;
        DateTime::from_timestamp(claims.exp, 0)
    }

    fn compute_signature(&self, header_b64: &str, payload_b64: &str) -> Result<Signature, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        Ok(Signature(mac.finalize().into_bytes().to_vec()))
    }
}

/// A computed HMAC, kept as raw bytes for constant-time comparison.
struct Signature(Vec<u8>);

impl Signature {
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(&self.0))
    }
}

/// Split a token into its three segments, rejecting anything else.
fn split_segments(token: &str) -> Option<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
            Some((h, p, s))
        }
        _ => None,
    }
}

/// Parse a TTL expression (`<digits><s|m|h|d>`) into seconds.
///
/// Anything that does not match the grammar falls back to 24 hours, the
/// default lifetime for issued credentials.
fn parse_ttl(ttl: &str) -> i64 {
    let Some((last_idx, unit)) = ttl.char_indices().last() else {
        return FALLBACK_TTL_SECS;
    };
    let digits = &ttl[..last_idx];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return FALLBACK_TTL_SECS;
    }
    let Ok(value) = digits.parse::<i64>() else {
        return FALLBACK_TTL_SECS;
    };

    match unit {
        's' => value,
        'm' => value * 60,
        'h' => value * 60 * 60,
        'd' => value * 24 * 60 * 60,
        _ => FALLBACK_TTL_SECS,
    }
}

// ============================================================================
// TESTS
// ============================================================================
