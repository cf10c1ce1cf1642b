//! Read access to school records for ownership and age checks, plus the thin
//! CRUD store used by the business routes.
//!
//! Records are JSON objects carrying an `id` and the relation fields the
//! ownership checks follow:
//!
//! | resource | fields |
//! |---|---|
//! | `students` | `guardian_id`, `class_id`, `birth_date` |
//! | `classes` | `director_id` |
//! | `grades`, `attendance`, `payments` | `student_id` |

pub mod in_memory;
pub mod postgres;

use serde_json::Value as JsonValue;
use thiserror::Error;

use campus_auth::{OwnerKind, Resource};
use campus_core::{RecordId, UserId};

pub use in_memory::InMemoryDataStore;
pub use postgres::PostgresDataStore;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Read-only lookups consumed by the authorization pipeline.
#[async_trait::async_trait]
pub trait DataLayer: Send + Sync {
    /// The owner of `resource/id` of the given kind, if the chain resolves.
    async fn owner_of(
        &self,
        resource: Resource,
        id: RecordId,
        kind: OwnerKind,
    ) -> Result<Option<UserId>, DataError>;

    async fn row_by_id(&self, resource: Resource, id: RecordId)
    -> Result<Option<JsonValue>, DataError>;
}

/// Equality filter on a top-level record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: String,
    pub value: String,
}

impl FieldMatch {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &JsonValue) -> bool {
        match row.get(&self.field) {
            Some(JsonValue::String(s)) => *s == self.value,
            Some(JsonValue::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// CRUD over JSON records, keyed by resource and id.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(
        &self,
        resource: Resource,
        filter: Option<FieldMatch>,
    ) -> Result<Vec<JsonValue>, DataError>;

    async fn get(&self, resource: Resource, id: RecordId) -> Result<Option<JsonValue>, DataError>;

    /// Store a new record; an `id` is assigned unless the body carries a valid one.
    async fn insert(&self, resource: Resource, data: JsonValue) -> Result<JsonValue, DataError>;

    /// Merge `patch` into the stored record. `None` when the record is missing.
    async fn update(
        &self,
        resource: Resource,
        id: RecordId,
        patch: JsonValue,
    ) -> Result<Option<JsonValue>, DataError>;

    async fn delete(&self, resource: Resource, id: RecordId) -> Result<bool, DataError>;
}

/// Resources whose rows point at a student through `student_id`.
pub(crate) fn is_student_child(resource: Resource) -> bool {
    matches!(
        resource,
        Resource::Grades | Resource::Attendance | Resource::Payments
    )
}

pub(crate) fn id_field<T: std::str::FromStr>(row: &JsonValue, field: &str) -> Option<T> {
    row.get(field)?.as_str()?.parse().ok()
}

/// Give `data` a valid `id`, keeping one supplied by the caller.
pub(crate) fn prepare_insert(mut data: JsonValue) -> Result<(RecordId, JsonValue), DataError> {
    let JsonValue::Object(map) = &mut data else {
        return Err(DataError::InvalidRecord(
            "record body must be a JSON object".to_string(),
        ));
    };
    let id = map
        .get("id")
        .and_then(JsonValue::as_str)
        .and_then(|s| s.parse::<RecordId>().ok())
        .unwrap_or_default();
    map.insert("id".to_string(), JsonValue::String(id.to_string()));
    Ok((id, data))
}

/// Shallow-merge `patch` into `current`; the `id` field is never overwritten.
pub(crate) fn merge_patch(current: &mut JsonValue, patch: JsonValue) -> Result<(), DataError> {
    let (JsonValue::Object(target), JsonValue::Object(patch)) = (current, patch) else {
        return Err(DataError::InvalidRecord(
            "record body must be a JSON object".to_string(),
        ));
    };
    for (key, value) in patch {
        if key != "id" {
            target.insert(key, value);
        }
    }
    Ok(())
}
