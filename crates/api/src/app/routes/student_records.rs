//! Shared handlers for records that hang off a student (`student_id`).
//!
//! Grades, attendance and payments all scope the same way: listing needs a
//! `studentId` query parameter, creation reads `student_id` from the body, and
//! single-record routes check ownership of the record itself. Updates that
//! rewrite `student_id` are also checked against the new student.

use axum::response::Response;
use serde::Deserialize;

use campus_auth::{Action, Resource};
use campus_infra::FieldMatch;

use crate::app::routes::records;
use crate::app::services::AppServices;
use crate::authz::{IdSource, Reassignment, RequireAccess};

#[derive(Debug, Default, Deserialize)]
pub struct StudentQuery {
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
}

pub fn list_access(resource: Resource) -> RequireAccess {
    RequireAccess::new(resource, Action::Read).scoped(Resource::Students, IdSource::Query("studentId"))
}

pub fn create_access(resource: Resource) -> RequireAccess {
    RequireAccess::new(resource, Action::Create)
        .scoped(Resource::Students, IdSource::Body("student_id"))
}

pub fn record_access(resource: Resource, action: Action) -> RequireAccess {
    RequireAccess::new(resource, action).scoped(resource, IdSource::Path("id"))
}

pub fn update_access(resource: Resource) -> RequireAccess {
    record_access(resource, Action::Update).reassigns(Reassignment::Record {
        field: "student_id",
        resource: Resource::Students,
    })
}

pub async fn list_for_student(
    services: &AppServices,
    resource: Resource,
    query: StudentQuery,
) -> Response {
    let filter = query
        .student_id
        .filter(|s| !s.trim().is_empty())
        .map(|s| FieldMatch::new("student_id", s.trim()));
    records::list(services, resource, filter).await
}
