use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered WebAuthn credential.
///
/// `mfa_only` separates security keys used as a second factor from passkeys
/// that can log a user in on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebauthnCredential {
    /// Base64url encoded credential id as returned by the authenticator.
    pub id: String,
    pub user_id: UserId,
    pub name: Option<String>,
    pub public_key: String,
    pub attestation_type: String,
    pub aaguid: Uuid,
    pub sign_count: u32,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub mfa_only: bool,
    pub transports: Vec<Transport>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebauthnCredential {
    pub fn new(
        id: impl Into<String>,
        user_id: UserId,
        public_key: impl Into<String>,
        mfa_only: bool,
    ) -> Self {
        let now = crate::now();
        Self {
            id: id.into(),
            user_id,
            name: None,
            public_key: public_key.into(),
            attestation_type: "none".to_string(),
            aaguid: Uuid::nil(),
            sign_count: 0,
            backup_eligible: false,
            backup_state: false,
            mfa_only,
            transports: Vec::new(),
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Authenticator transport hint (`usb`, `nfc`, `ble`, `internal`, `hybrid`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    pub id: Uuid,
    pub name: String,
    pub credential_id: String,
}
