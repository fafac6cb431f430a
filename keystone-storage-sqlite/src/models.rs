//! Row types as stored in SQLite and their conversion into domain types
use chrono::{DateTime, Utc};
use keystone_core::{
    Email, Error, Identity, OtpSecret, PasswordCredential, PrimaryEmail, Transport, User, UserId,
    UserMetadata, Username, WebauthnCredential,
};
use uuid::Uuid;

use crate::error::corrupt_row;

pub(crate) fn parse_uuid(what: &str, value: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(|e| corrupt_row(what, format!("{value}: {e}")))
}

pub(crate) fn parse_user_id(what: &str, value: &str) -> Result<UserId, Error> {
    parse_uuid(what, value).map(UserId::new)
}

pub(crate) fn from_millis(what: &str, millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt_row(what, format!("timestamp out of range: {millis}")))
}

fn parse_json(what: &str, value: Option<String>) -> Result<Option<serde_json::Value>, Error> {
    value
        .map(|raw| serde_json::from_str(&raw).map_err(|e| corrupt_row(what, e)))
        .transpose()
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteUser {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteUser> for User {
    type Error = Error;

    fn try_from(row: SqliteUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_user_id("user", &row.id)?,
            emails: Vec::new(),
            webauthn_credentials: Vec::new(),
            username: None,
            password_credential: None,
            otp_secret: None,
            metadata: None,
            created_at: from_millis("user", row.created_at)?,
            updated_at: from_millis("user", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteEmail {
    pub id: String,
    pub user_id: Option<String>,
    pub address: String,
    pub verified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteEmail> for Email {
    type Error = Error;

    fn try_from(row: SqliteEmail) -> Result<Self, Self::Error> {
        Ok(Email {
            id: parse_uuid("email", &row.id)?,
            user_id: row
                .user_id
                .as_deref()
                .map(|id| parse_user_id("email", id))
                .transpose()?,
            address: row.address,
            verified: row.verified,
            primary_email: None,
            identities: Vec::new(),
            created_at: from_millis("email", row.created_at)?,
            updated_at: from_millis("email", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqlitePrimaryEmail {
    pub id: String,
    pub email_id: String,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqlitePrimaryEmail> for PrimaryEmail {
    type Error = Error;

    fn try_from(row: SqlitePrimaryEmail) -> Result<Self, Self::Error> {
        Ok(PrimaryEmail {
            id: parse_uuid("primary email", &row.id)?,
            email_id: parse_uuid("primary email", &row.email_id)?,
            user_id: parse_user_id("primary email", &row.user_id)?,
            created_at: from_millis("primary email", row.created_at)?,
            updated_at: from_millis("primary email", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteIdentity {
    pub id: String,
    pub email_id: String,
    pub provider_id: String,
    pub provider_name: String,
    pub saml_domain: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteIdentity> for Identity {
    type Error = Error;

    fn try_from(row: SqliteIdentity) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: parse_uuid("identity", &row.id)?,
            email_id: parse_uuid("identity", &row.email_id)?,
            provider_id: row.provider_id,
            provider_name: row.provider_name,
            saml_domain: row.saml_domain,
            created_at: from_millis("identity", row.created_at)?,
            updated_at: from_millis("identity", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteUsername {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteUsername> for Username {
    type Error = Error;

    fn try_from(row: SqliteUsername) -> Result<Self, Self::Error> {
        Ok(Username {
            id: parse_uuid("username", &row.id)?,
            user_id: parse_user_id("username", &row.user_id)?,
            username: row.username,
            created_at: from_millis("username", row.created_at)?,
            updated_at: from_millis("username", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteWebauthnCredential {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub public_key: String,
    pub attestation_type: String,
    pub aaguid: String,
    pub sign_count: i64,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub mfa_only: bool,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteWebauthnCredential> for WebauthnCredential {
    type Error = Error;

    fn try_from(row: SqliteWebauthnCredential) -> Result<Self, Self::Error> {
        const WHAT: &str = "webauthn credential";
        Ok(WebauthnCredential {
            user_id: parse_user_id(WHAT, &row.user_id)?,
            aaguid: parse_uuid(WHAT, &row.aaguid)?,
            sign_count: u32::try_from(row.sign_count).map_err(|e| corrupt_row(WHAT, e))?,
            last_used_at: row
                .last_used_at
                .map(|millis| from_millis(WHAT, millis))
                .transpose()?,
            created_at: from_millis(WHAT, row.created_at)?,
            updated_at: from_millis(WHAT, row.updated_at)?,
            id: row.id,
            name: row.name,
            public_key: row.public_key,
            attestation_type: row.attestation_type,
            backup_eligible: row.backup_eligible,
            backup_state: row.backup_state,
            mfa_only: row.mfa_only,
            transports: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteTransport {
    pub id: String,
    pub name: String,
    pub webauthn_credential_id: String,
}

impl TryFrom<SqliteTransport> for Transport {
    type Error = Error;

    fn try_from(row: SqliteTransport) -> Result<Self, Self::Error> {
        Ok(Transport {
            id: parse_uuid("transport", &row.id)?,
            name: row.name,
            credential_id: row.webauthn_credential_id,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqlitePasswordCredential {
    pub id: String,
    pub user_id: String,
    pub password: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqlitePasswordCredential> for PasswordCredential {
    type Error = Error;

    fn try_from(row: SqlitePasswordCredential) -> Result<Self, Self::Error> {
        Ok(PasswordCredential {
            id: parse_uuid("password credential", &row.id)?,
            user_id: parse_user_id("password credential", &row.user_id)?,
            password_hash: row.password,
            created_at: from_millis("password credential", row.created_at)?,
            updated_at: from_millis("password credential", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteOtpSecret {
    pub id: String,
    pub user_id: String,
    pub secret: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteOtpSecret> for OtpSecret {
    type Error = Error;

    fn try_from(row: SqliteOtpSecret) -> Result<Self, Self::Error> {
        Ok(OtpSecret {
            id: parse_uuid("otp secret", &row.id)?,
            user_id: parse_user_id("otp secret", &row.user_id)?,
            secret: row.secret,
            created_at: from_millis("otp secret", row.created_at)?,
            updated_at: from_millis("otp secret", row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteUserMetadata {
    pub id: String,
    pub user_id: String,
    pub public_metadata: Option<String>,
    pub private_metadata: Option<String>,
    pub unsafe_metadata: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<SqliteUserMetadata> for UserMetadata {
    type Error = Error;

    fn try_from(row: SqliteUserMetadata) -> Result<Self, Self::Error> {
        const WHAT: &str = "user metadata";
        Ok(UserMetadata {
            id: parse_uuid(WHAT, &row.id)?,
            user_id: parse_user_id(WHAT, &row.user_id)?,
            public_metadata: parse_json(WHAT, row.public_metadata)?,
            private_metadata: parse_json(WHAT, row.private_metadata)?,
            unsafe_metadata: parse_json(WHAT, row.unsafe_metadata)?,
            created_at: from_millis(WHAT, row.created_at)?,
            updated_at: from_millis(WHAT, row.updated_at)?,
        })
    }
}
