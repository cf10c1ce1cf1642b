//! Postgres-backed audit store.
//!
//! `audit_logs` is append-only: this adapter only inserts and selects.
//!
//! ## Error Mapping
//!
//! | SQLx Error | AuditStoreError |
//! |------------|-----------------|
//! | Database (any code) | `Storage` |
//! | PoolClosed | `Storage` |
//! | ColumnDecode / Decode | `Serialization` |
//! | Other | `Storage` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use campus_audit::{
    AuditAction, AuditEntry, AuditFilter, AuditPage, AuditStore, AuditStoreError, ChangeSet,
    PrincipalSnapshot,
};
use campus_auth::Role;
use campus_core::UserId;

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), AuditStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id            UUID        PRIMARY KEY,
                user_id       UUID        NULL,
                user_email    TEXT        NULL,
                user_role     TEXT        NULL,
                action        TEXT        NOT NULL,
                resource      TEXT        NOT NULL,
                resource_id   TEXT        NULL,
                http_method   TEXT        NOT NULL,
                path          TEXT        NOT NULL,
                status_code   INTEGER     NOT NULL,
                ip            TEXT        NULL,
                user_agent    TEXT        NULL,
                request_body  JSONB       NULL,
                response_body JSONB       NULL,
                changes       JSONB       NULL,
                error_message TEXT        NULL,
                created_at    TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS audit_logs_created_at_idx
            ON audit_logs (created_at DESC)
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    user_email: Option<String>,
    user_role: Option<String>,
    action: String,
    resource: String,
    resource_id: Option<String>,
    http_method: String,
    path: String,
    status_code: i32,
    ip: Option<String>,
    user_agent: Option<String>,
    request_body: Option<JsonValue>,
    response_body: Option<JsonValue>,
    changes: Option<JsonValue>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn from_pg(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            user_email: row.try_get("user_email")?,
            user_role: row.try_get("user_role")?,
            action: row.try_get("action")?,
            resource: row.try_get("resource")?,
            resource_id: row.try_get("resource_id")?,
            http_method: row.try_get("http_method")?,
            path: row.try_get("path")?,
            status_code: row.try_get("status_code")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            request_body: row.try_get("request_body")?,
            response_body: row.try_get("response_body")?,
            changes: row.try_get("changes")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = AuditStoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = AuditAction::parse(&row.action).ok_or_else(|| {
            AuditStoreError::Serialization(format!("unknown audit action '{}'", row.action))
        })?;

        let principal = row.user_id.map(|id| PrincipalSnapshot {
            user_id: UserId::from_uuid(id),
            email: row.user_email.clone().unwrap_or_default(),
            role: Role::normalize(row.user_role.as_deref().unwrap_or_default()),
        });

        let changes = row
            .changes
            .map(serde_json::from_value::<ChangeSet>)
            .transpose()
            .map_err(|e| AuditStoreError::Serialization(e.to_string()))?;

        Ok(AuditEntry {
            id: row.id,
            principal,
            action,
            resource: row.resource,
            resource_id: row.resource_id,
            http_method: row.http_method,
            path: row.path,
            status_code: u16::try_from(row.status_code).unwrap_or_default(),
            ip: row.ip,
            user_agent: row.user_agent,
            request_body: row.request_body,
            response_body: row.response_body,
            changes,
            error_message: row.error_message,
            timestamp: row.created_at,
        })
    }
}

#[async_trait::async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(
        skip(self, entry),
        fields(audit_id = %entry.id, action = %entry.action, resource = %entry.resource),
        err
    )]
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        let changes = entry
            .changes
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AuditStoreError::Serialization(e.to_string()))?;
        let principal = entry.principal.as_ref();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, user_id, user_email, user_role, action, resource, resource_id,
                http_method, path, status_code, ip, user_agent,
                request_body, response_body, changes, error_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(entry.id)
        .bind(principal.map(|p| *p.user_id.as_uuid()))
        .bind(principal.map(|p| p.email.as_str()))
        .bind(principal.map(|p| p.role.as_str()))
        .bind(entry.action.as_str())
        .bind(&entry.resource)
        .bind(entry.resource_id.as_deref())
        .bind(&entry.http_method)
        .bind(&entry.path)
        .bind(i32::from(entry.status_code))
        .bind(entry.ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.request_body.as_ref())
        .bind(entry.response_body.as_ref())
        .bind(changes)
        .bind(entry.error_message.as_deref())
        .bind(entry.timestamp)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;

        Ok(())
    }

    #[instrument(skip(self, filter), err)]
    async fn query(&self, filter: AuditFilter) -> Result<AuditPage, AuditStoreError> {
        let limit = filter.limit();
        let offset = filter.offset();
        let user_id = filter.user_id.map(|id| *id.as_uuid());
        let resource = filter.resource.as_deref();
        let action = filter.action.map(|a| a.as_str());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
                AND ($2::text IS NULL OR resource = $2)
                AND ($3::text IS NULL OR action = $3)
                AND ($4::timestamptz IS NULL OR created_at >= $4)
                AND ($5::timestamptz IS NULL OR created_at <= $5)
            "#,
        )
        .bind(user_id)
        .bind(resource)
        .bind(action)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_audit_logs", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_audit_logs", e))?;

        let rows = sqlx::query(
            r#"
            SELECT
                id, user_id, user_email, user_role, action, resource, resource_id,
                http_method, path, status_code, ip, user_agent,
                request_body, response_body, changes, error_message, created_at
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
                AND ($2::text IS NULL OR resource = $2)
                AND ($3::text IS NULL OR action = $3)
                AND ($4::timestamptz IS NULL OR created_at >= $4)
                AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(user_id)
        .bind(resource)
        .bind(action)
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_audit_logs", e))?;

        let entries = rows
            .iter()
            .map(|row| {
                let row =
                    AuditRow::from_pg(row).map_err(|e| map_sqlx_error("query_audit_logs", e))?;
                AuditEntry::try_from(row)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total = u64::try_from(total).unwrap_or_default();
        Ok(AuditPage {
            has_more: u64::from(offset) + (entries.len() as u64) < total,
            entries,
            total,
            limit,
            offset,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AuditStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            AuditStoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            AuditStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            AuditStoreError::Serialization(format!("decode error in {}: {}", operation, err))
        }
        _ => AuditStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(action: &str) -> AuditRow {
        AuditRow {
            id: Uuid::now_v7(),
            user_id: Some(Uuid::now_v7()),
            user_email: Some("tes@escola.test".to_string()),
            user_role: Some("treasury".to_string()),
            action: action.to_string(),
            resource: "payments".to_string(),
            resource_id: None,
            http_method: "POST".to_string(),
            path: "/payments".to_string(),
            status_code: 201,
            ip: None,
            user_agent: None,
            request_body: None,
            response_body: None,
            changes: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rows_map_back_to_entries() {
        let entry = AuditEntry::try_from(row("permissao_insuficiente")).unwrap();
        assert_eq!(entry.action, AuditAction::PermissionDenied);
        assert_eq!(entry.status_code, 201);
        assert_eq!(entry.principal.unwrap().role, Role::Treasury);
    }

    #[test]
    fn unknown_actions_are_rejected() {
        assert!(AuditEntry::try_from(row("approve")).is_err());
    }
}
