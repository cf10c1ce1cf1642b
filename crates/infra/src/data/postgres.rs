//! Postgres-backed record store.
//!
//! Every resource shares one `records` table keyed by `(resource, id)` with the
//! record body in a `jsonb` column. Ownership chains are resolved with a single
//! joined query per lookup.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use campus_auth::{OwnerKind, Resource};
use campus_core::{RecordId, UserId};

use super::{
    DataError, DataLayer, FieldMatch, RecordStore, is_student_child, merge_patch, prepare_insert,
};

#[derive(Debug, Clone)]
pub struct PostgresDataStore {
    pool: Arc<PgPool>,
}

impl PostgresDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `records` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), DataError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                resource   TEXT        NOT NULL,
                id         UUID        NOT NULL,
                data       JSONB       NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (resource, id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_row(&self, resource: Resource, id: RecordId) -> Result<Option<JsonValue>, DataError> {
        let row = sqlx::query(
            r#"
            SELECT data
            FROM records
            WHERE resource = $1 AND id = $2
            "#,
        )
        .bind(resource.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_row", e))?;

        row.map(|r| r.try_get::<JsonValue, _>("data"))
            .transpose()
            .map_err(|e| map_sqlx_error("fetch_row", e))
    }
}

/// Query returning the owner id as text, with `$1` = resource and `$2` = id.
fn owner_query(resource: Resource, kind: OwnerKind) -> Option<&'static str> {
    match (kind, resource) {
        (OwnerKind::Guardian, Resource::Guardians) => Some(
            r#"
            SELECT g.id::text AS owner
            FROM records g
            WHERE g.resource = $1 AND g.id = $2
            "#,
        ),
        (OwnerKind::Guardian, Resource::Students) => Some(
            r#"
            SELECT s.data->>'guardian_id' AS owner
            FROM records s
            WHERE s.resource = $1 AND s.id = $2
            "#,
        ),
        (OwnerKind::Guardian, r) if is_student_child(r) => Some(
            r#"
            SELECT s.data->>'guardian_id' AS owner
            FROM records c
            JOIN records s
              ON s.resource = 'students' AND s.id = (c.data->>'student_id')::uuid
            WHERE c.resource = $1 AND c.id = $2
            "#,
        ),
        (OwnerKind::ClassDirector, Resource::Classes) => Some(
            r#"
            SELECT k.data->>'director_id' AS owner
            FROM records k
            WHERE k.resource = $1 AND k.id = $2
            "#,
        ),
        (OwnerKind::ClassDirector, Resource::Students) => Some(
            r#"
            SELECT k.data->>'director_id' AS owner
            FROM records s
            JOIN records k
              ON k.resource = 'classes' AND k.id = (s.data->>'class_id')::uuid
            WHERE s.resource = $1 AND s.id = $2
            "#,
        ),
        (OwnerKind::ClassDirector, r) if is_student_child(r) => Some(
            r#"
            SELECT k.data->>'director_id' AS owner
            FROM records c
            JOIN records s
              ON s.resource = 'students' AND s.id = (c.data->>'student_id')::uuid
            JOIN records k
              ON k.resource = 'classes' AND k.id = (s.data->>'class_id')::uuid
            WHERE c.resource = $1 AND c.id = $2
            "#,
        ),
        _ => None,
    }
}

#[async_trait::async_trait]
impl DataLayer for PostgresDataStore {
    #[instrument(
        skip(self),
        fields(resource = %resource, id = %id, kind = ?kind, resolved = tracing::field::Empty),
        err
    )]
    async fn owner_of(
        &self,
        resource: Resource,
        id: RecordId,
        kind: OwnerKind,
    ) -> Result<Option<UserId>, DataError> {
        let Some(sql) = owner_query(resource, kind) else {
            return Ok(None);
        };

        let row = sqlx::query(sql)
            .bind(resource.as_str())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("owner_of", e))?;

        let owner: Option<String> = match row {
            Some(r) => r
                .try_get("owner")
                .map_err(|e| map_sqlx_error("owner_of", e))?,
            None => None,
        };

        Span::current().record("resolved", owner.is_some());
        Ok(owner.and_then(|o| o.parse().ok()))
    }

    #[instrument(skip(self), fields(resource = %resource, id = %id), err)]
    async fn row_by_id(
        &self,
        resource: Resource,
        id: RecordId,
    ) -> Result<Option<JsonValue>, DataError> {
        self.fetch_row(resource, id).await
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresDataStore {
    #[instrument(skip(self, filter), fields(resource = %resource), err)]
    async fn list(
        &self,
        resource: Resource,
        filter: Option<FieldMatch>,
    ) -> Result<Vec<JsonValue>, DataError> {
        let (field, value) = match &filter {
            Some(f) => (Some(f.field.as_str()), Some(f.value.as_str())),
            None => (None, None),
        };

        let rows = sqlx::query(
            r#"
            SELECT data
            FROM records
            WHERE resource = $1
                AND ($2::text IS NULL OR data->>$2 = $3)
            ORDER BY id ASC
            "#,
        )
        .bind(resource.as_str())
        .bind(field)
        .bind(value)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter()
            .map(|r| r.try_get::<JsonValue, _>("data"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list", e))
    }

    async fn get(&self, resource: Resource, id: RecordId) -> Result<Option<JsonValue>, DataError> {
        self.fetch_row(resource, id).await
    }

    #[instrument(skip(self, data), fields(resource = %resource), err)]
    async fn insert(&self, resource: Resource, data: JsonValue) -> Result<JsonValue, DataError> {
        let (id, row) = prepare_insert(data)?;
        sqlx::query(
            r#"
            INSERT INTO records (resource, id, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(resource.as_str())
        .bind(id.as_uuid())
        .bind(&row)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(row)
    }

    #[instrument(skip(self, patch), fields(resource = %resource, id = %id), err)]
    async fn update(
        &self,
        resource: Resource,
        id: RecordId,
        patch: JsonValue,
    ) -> Result<Option<JsonValue>, DataError> {
        let Some(mut row) = self.fetch_row(resource, id).await? else {
            return Ok(None);
        };
        merge_patch(&mut row, patch)?;

        let result = sqlx::query(
            r#"
            UPDATE records
            SET data = $3, updated_at = now()
            WHERE resource = $1 AND id = $2
            "#,
        )
        .bind(resource.as_str())
        .bind(id.as_uuid())
        .bind(&row)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        Ok((result.rows_affected() > 0).then_some(row))
    }

    #[instrument(skip(self), fields(resource = %resource, id = %id), err)]
    async fn delete(&self, resource: Resource, id: RecordId) -> Result<bool, DataError> {
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE resource = $1 AND id = $2
            "#,
        )
        .bind(resource.as_str())
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique / check violations come from bad input, not the database.
                Some("23505") | Some("23514") => DataError::InvalidRecord(msg),
                _ => DataError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            DataError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => DataError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scoped_family_has_an_owner_query() {
        for resource in [
            Resource::Students,
            Resource::Grades,
            Resource::Attendance,
            Resource::Payments,
        ] {
            assert!(owner_query(resource, OwnerKind::Guardian).is_some());
            assert!(owner_query(resource, OwnerKind::ClassDirector).is_some());
        }
        assert!(owner_query(Resource::Guardians, OwnerKind::Guardian).is_some());
        assert!(owner_query(Resource::Classes, OwnerKind::ClassDirector).is_some());
        assert!(owner_query(Resource::Staff, OwnerKind::Guardian).is_none());
    }

    #[test]
    fn owner_joins_compare_ids_as_uuids() {
        for resource in [Resource::Students, Resource::Grades, Resource::Payments] {
            for kind in [OwnerKind::Guardian, OwnerKind::ClassDirector] {
                let sql = owner_query(resource, kind).unwrap();
                assert!(!sql.contains("id::text ="), "{resource} {kind:?}");
            }
        }
        let sql = owner_query(Resource::Grades, OwnerKind::ClassDirector).unwrap();
        assert!(sql.contains("(c.data->>'student_id')::uuid"));
        assert!(sql.contains("(s.data->>'class_id')::uuid"));
    }
}
