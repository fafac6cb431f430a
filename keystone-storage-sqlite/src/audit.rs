use async_trait::async_trait;
use chrono::Utc;
use keystone_core::{
    Error, UserId,
    audit::{AuditDetail, AuditLog, AuditLogType, AuditLogger},
    flow::RequestContext,
};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{corrupt_row, db_error};
use crate::models::{from_millis, parse_user_id, parse_uuid};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteAuditLog {
    id: String,
    #[sqlx(rename = "type")]
    kind: String,
    subject_user_id: Option<String>,
    actor_user_id: Option<String>,
    request_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: String,
    created_at: i64,
}

impl TryFrom<SqliteAuditLog> for AuditLog {
    type Error = Error;

    fn try_from(row: SqliteAuditLog) -> Result<Self, Self::Error> {
        const WHAT: &str = "audit log";
        let details = match serde_json::from_str(&row.details) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(other) => return Err(corrupt_row(WHAT, format!("details not an object: {other}"))),
            Err(e) => return Err(corrupt_row(WHAT, e)),
        };

        Ok(AuditLog {
            id: parse_uuid(WHAT, &row.id)?,
            kind: row.kind.parse()?,
            subject_user_id: row
                .subject_user_id
                .as_deref()
                .map(|id| parse_user_id(WHAT, id))
                .transpose()?,
            actor_user_id: row
                .actor_user_id
                .as_deref()
                .map(|id| parse_user_id(WHAT, id))
                .transpose()?,
            request_id: row
                .request_id
                .as_deref()
                .map(|id| parse_uuid(WHAT, id))
                .transpose()?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            details,
            created_at: from_millis(WHAT, row.created_at)?,
        })
    }
}

/// Writes audit entries into the `audit_logs` table of the flow's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAuditLogger;

impl SqliteAuditLogger {
    pub fn new() -> Self {
        Self
    }

    /// Entries about `subject`, oldest first.
    pub async fn find_by_subject(
        &self,
        conn: &mut SqliteConnection,
        subject: &UserId,
    ) -> Result<Vec<AuditLog>, Error> {
        let rows = sqlx::query_as::<_, SqliteAuditLog>(
            "SELECT * FROM audit_logs WHERE subject_user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(subject.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("Failed to fetch audit logs"))?;

        rows.into_iter().map(AuditLog::try_from).collect()
    }
}

#[async_trait]
impl AuditLogger for SqliteAuditLogger {
    type Tx = SqliteConnection;

    async fn create(
        &self,
        tx: &mut Self::Tx,
        request: &RequestContext,
        kind: AuditLogType,
        subject: Option<&UserId>,
        actor: Option<&UserId>,
        details: Vec<AuditDetail>,
    ) -> Result<(), Error> {
        let details: serde_json::Map<String, serde_json::Value> = details
            .into_iter()
            .map(|detail| (detail.key, detail.value))
            .collect();
        let details = serde_json::Value::Object(details).to_string();

        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, type, subject_user_id, actor_user_id, request_id, ip_address, user_agent, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(kind.as_str())
        .bind(subject.map(|id| id.to_string()))
        .bind(actor.map(|id| id.to_string()))
        .bind(request.request_id.to_string())
        .bind(&request.ip_address)
        .bind(&request.user_agent)
        .bind(details)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, kind = %kind, "Failed to write audit log");
            Error::Audit(format!("failed to write {kind} entry"))
        })?;

        Ok(())
    }
}
