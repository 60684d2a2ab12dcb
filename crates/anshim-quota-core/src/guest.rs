//! Signed guest passes
//!
//! Guests have no server-side profile. Their session question count travels
//! with the client as `base64url(json) "." base64url(hmac_sha256)`, signed by
//! the server, so a client can clear its pass but cannot lower the count in it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::HmacKey;
use crate::QuotaError;

/// Guest pass payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestPass {
    /// Browser session id
    pub sid: String,
    /// Questions asked in this session
    pub used: u32,
    /// Issue time (unix seconds)
    pub iat: i64,
}

impl GuestPass {
    /// Fresh pass for a new browser session
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            sid: Uuid::new_v4().simple().to_string(),
            used: 0,
            iat: now.timestamp(),
        }
    }

    /// Same session with one more question counted
    pub fn incremented(&self, now: DateTime<Utc>) -> Self {
        Self {
            sid: self.sid.clone(),
            used: self.used.saturating_add(1),
            iat: now.timestamp(),
        }
    }
}

/// Issues and verifies guest passes
#[derive(Clone)]
pub struct GuestPassSigner {
    key: HmacKey,
}

impl GuestPassSigner {
    /// Create a signer.
    ///
    /// # Errors
    /// Returns `Configuration` if the secret is shorter than 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, QuotaError> {
        let key = HmacKey::new(secret).map_err(|e| QuotaError::Configuration(e.to_string()))?;
        Ok(Self { key })
    }

    /// Encode and sign a pass
    pub fn sign(&self, pass: &GuestPass) -> Result<String, QuotaError> {
        let json = serde_json::to_vec(pass).map_err(|e| {
            tracing::error!("Failed to serialize guest pass: {}", e);
            QuotaError::Internal("Failed to sign guest pass".to_string())
        })?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.key.sign(payload.as_bytes()));
        Ok(format!("{payload}.{signature}"))
    }

    /// Check the signature and decode a pass
    pub fn verify(&self, token: &str) -> Result<GuestPass, QuotaError> {
        let (payload, signature) = token.split_once('.').ok_or(QuotaError::InvalidGuestPass)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| QuotaError::InvalidGuestPass)?;
        if !self.key.verify(payload.as_bytes(), &signature) {
            tracing::warn!("Guest pass signature mismatch");
            return Err(QuotaError::InvalidGuestPass);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| QuotaError::InvalidGuestPass)?;
        serde_json::from_slice(&json).map_err(|_| QuotaError::InvalidGuestPass)
    }
}

impl std::fmt::Debug for GuestPassSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestPassSigner").finish_non_exhaustive()
    }
}
