//! Bearer credential codec: issuance and verification.
//!
//! A credential is `base64url(claims JSON) . base64url(mac)` signed with the
//! server-held secret (HMAC-SHA256 over the encoded payload segment). The
//! token is opaque to clients; they store and replay it verbatim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const BEARER_PREFIX: &str = "Bearer ";

/// Server-held signing secret. Read-only after startup.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Fresh random secret. Used when the environment provides none; tokens
    /// then survive only as long as the process. Fails if the OS cannot
    /// provide entropy; signing with a predictable key is never acceptable.
    pub fn random() -> anyhow::Result<Self> {
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(Self(buf.to_vec()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("SigningSecret(..)")
    }
}

/// Decoded credential payload. Derived from the token on every request,
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: stable account id.
    pub sub: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Pull the bearer token out of a raw `Authorization` header value.
/// Anything other than `Bearer <token>` counts as no credential at all.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let raw = header.ok_or(AuthError::MissingCredential)?;
    let rest = raw.strip_prefix(BEARER_PREFIX).ok_or(AuthError::MissingCredential)?;
    let token = rest.split_whitespace().next().unwrap_or("");
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

/// Sign a credential for `account_id` valid for `ttl_secs` from `now`.
pub fn issue_credential(account_id: &str, ttl_secs: i64, secret: &SigningSecret, now: DateTime<Utc>) -> String {
    let claims = Claims {
        sub: account_id.to_string(),
        iat: now.timestamp(),
        exp: now.timestamp() + ttl_secs,
    };
    // Claims are plain strings and ints; serialization cannot fail
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
    let mac = compute_mac(secret, payload.as_bytes());
    format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(mac))
}

/// Verify signature and expiry, returning the decoded claims.
///
/// Every failure collapses to `InvalidCredential`; the cause is only logged.
pub fn verify_credential(token: &str, secret: &SigningSecret, now: DateTime<Utc>) -> Result<Claims, AuthError> {
    let (payload, mac_part) = token.split_once('.').ok_or_else(|| {
        debug!(target: "identity", "credential rejected: not two segments");
        AuthError::InvalidCredential
    })?;
    let presented = URL_SAFE_NO_PAD.decode(mac_part).map_err(|e| {
        debug!(target: "identity", "credential rejected: mac segment not base64: {e}");
        AuthError::InvalidCredential
    })?;
    let expected = compute_mac(secret, payload.as_bytes());
    if presented.len() != expected.len() || !bool::from(presented.ct_eq(&expected)) {
        debug!(target: "identity", "credential rejected: signature mismatch");
        return Err(AuthError::InvalidCredential);
    }
    let claims_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        debug!(target: "identity", "credential rejected: payload segment not base64: {e}");
        AuthError::InvalidCredential
    })?;
    let claims: Claims = serde_json::from_slice(&claims_bytes).map_err(|e| {
        debug!(target: "identity", "credential rejected: malformed claims: {e}");
        AuthError::InvalidCredential
    })?;
    if claims.exp <= now.timestamp() {
        debug!(target: "identity", "credential rejected: expired at {}", claims.exp);
        return Err(AuthError::InvalidCredential);
    }
    Ok(claims)
}

fn compute_mac(secret: &SigningSecret, payload: &[u8]) -> Vec<u8> {
    // HMAC accepts any key length; new_from_slice cannot fail for SHA-256
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}
