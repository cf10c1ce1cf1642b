use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use campus_auth::{OwnerKind, Resource};
use campus_core::{RecordId, UserId};

use super::{
    DataError, DataLayer, FieldMatch, RecordStore, id_field, is_student_child, merge_patch,
    prepare_insert,
};

/// In-memory record store.
///
/// Intended for tests/dev. Ownership chains are walked row by row.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    rows: RwLock<BTreeMap<(Resource, RecordId), JsonValue>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_row(&self, resource: Resource, id: RecordId) -> Result<Option<JsonValue>, DataError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| DataError::Storage("lock poisoned".to_string()))?;
        Ok(rows.get(&(resource, id)).cloned())
    }

    /// The student row a record belongs to.
    fn student_of(&self, resource: Resource, id: RecordId) -> Result<Option<JsonValue>, DataError> {
        if resource == Resource::Students {
            return self.read_row(Resource::Students, id);
        }
        if !is_student_child(resource) {
            return Ok(None);
        }
        let Some(row) = self.read_row(resource, id)? else {
            return Ok(None);
        };
        match id_field::<RecordId>(&row, "student_id") {
            Some(student_id) => self.read_row(Resource::Students, student_id),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl DataLayer for InMemoryDataStore {
    async fn owner_of(
        &self,
        resource: Resource,
        id: RecordId,
        kind: OwnerKind,
    ) -> Result<Option<UserId>, DataError> {
        match (kind, resource) {
            (OwnerKind::Guardian, Resource::Guardians) => Ok(self
                .read_row(Resource::Guardians, id)?
                .map(|_| UserId::from_uuid(*id.as_uuid()))),
            (OwnerKind::Guardian, _) => Ok(self
                .student_of(resource, id)?
                .and_then(|s| id_field(&s, "guardian_id"))),
            (OwnerKind::ClassDirector, Resource::Classes) => Ok(self
                .read_row(Resource::Classes, id)?
                .and_then(|c| id_field(&c, "director_id"))),
            (OwnerKind::ClassDirector, _) => {
                let Some(class_id) = self
                    .student_of(resource, id)?
                    .and_then(|s| id_field::<RecordId>(&s, "class_id"))
                else {
                    return Ok(None);
                };
                Ok(self
                    .read_row(Resource::Classes, class_id)?
                    .and_then(|c| id_field(&c, "director_id")))
            }
        }
    }

    async fn row_by_id(
        &self,
        resource: Resource,
        id: RecordId,
    ) -> Result<Option<JsonValue>, DataError> {
        self.read_row(resource, id)
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryDataStore {
    async fn list(
        &self,
        resource: Resource,
        filter: Option<FieldMatch>,
    ) -> Result<Vec<JsonValue>, DataError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| DataError::Storage("lock poisoned".to_string()))?;
        Ok(rows
            .iter()
            .filter(|((r, _), _)| *r == resource)
            .map(|(_, row)| row)
            .filter(|row| filter.as_ref().is_none_or(|f| f.matches(row)))
            .cloned()
            .collect())
    }

    async fn get(&self, resource: Resource, id: RecordId) -> Result<Option<JsonValue>, DataError> {
        self.read_row(resource, id)
    }

    async fn insert(&self, resource: Resource, data: JsonValue) -> Result<JsonValue, DataError> {
        let (id, row) = prepare_insert(data)?;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DataError::Storage("lock poisoned".to_string()))?;
        rows.insert((resource, id), row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        resource: Resource,
        id: RecordId,
        patch: JsonValue,
    ) -> Result<Option<JsonValue>, DataError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DataError::Storage("lock poisoned".to_string()))?;
        let Some(row) = rows.get_mut(&(resource, id)) else {
            return Ok(None);
        };
        merge_patch(row, patch)?;
        Ok(Some(row.clone()))
    }

    async fn delete(&self, resource: Resource, id: RecordId) -> Result<bool, DataError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DataError::Storage("lock poisoned".to_string()))?;
        Ok(rows.remove(&(resource, id)).is_some())
    }
}
