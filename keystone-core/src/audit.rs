//! Audit trail contract
//!
//! Audit entries are written on the same transaction as the change they
//! describe, so a failed write aborts the change as well.
use crate::{Error, UserId, flow::RequestContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLogType {
    EmailCreated,
    EmailVerified,
}

impl AuditLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLogType::EmailCreated => "email_created",
            AuditLogType::EmailVerified => "email_verified",
        }
    }
}

impl fmt::Display for AuditLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditLogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_created" => Ok(AuditLogType::EmailCreated),
            "email_verified" => Ok(AuditLogType::EmailVerified),
            other => Err(Error::Audit(format!("unknown audit log type: {other}"))),
        }
    }
}

/// A key/value pair attached to an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDetail {
    pub key: String,
    pub value: serde_json::Value,
}

impl AuditDetail {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A persisted audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub kind: AuditLogType,
    pub subject_user_id: Option<UserId>,
    pub actor_user_id: Option<UserId>,
    pub request_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.get(key)
    }
}

#[async_trait]
pub trait AuditLogger: Send + Sync + 'static {
    type Tx: Send;

    /// Record `kind` for `subject`, performed by `actor` (`None` for the
    /// subject acting on itself).
    async fn create(
        &self,
        tx: &mut Self::Tx,
        request: &RequestContext,
        kind: AuditLogType,
        subject: Option<&UserId>,
        actor: Option<&UserId>,
        details: Vec<AuditDetail>,
    ) -> Result<(), Error>;
}
