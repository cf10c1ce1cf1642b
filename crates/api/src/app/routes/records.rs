//! CRUD plumbing shared by the thin record routes.
//!
//! Access decisions are already made by the route's guard layer; these helpers
//! only talk to the record store and shape the JSON responses.

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde_json::{Value as JsonValue, json};

use campus_auth::Resource;
use campus_core::RecordId;
use campus_infra::FieldMatch;

use crate::app::errors;
use crate::app::services::AppServices;

fn parse_id(resource: Resource, raw: &str) -> Result<RecordId, Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "INVALID_ID",
            format!("'{raw}' is not a valid {resource} id"),
        )
    })
}

fn singular(resource: Resource) -> &'static str {
    match resource {
        Resource::Students => "Student",
        Resource::Guardians => "Guardian",
        Resource::Staff => "Staff member",
        Resource::Classes => "Class",
        Resource::Grades => "Grade",
        Resource::Attendance => "Attendance record",
        Resource::Payments => "Payment",
        Resource::Users => "User",
        Resource::Dashboard | Resource::AuditLogs => "Record",
    }
}

pub async fn list(services: &AppServices, resource: Resource, filter: Option<FieldMatch>) -> Response {
    match services.records.list(resource, filter).await {
        Ok(items) => (StatusCode::OK, Json(json!({ "items": items }))).into_response(),
        Err(e) => errors::data_error_to_response(e),
    }
}

pub async fn fetch(services: &AppServices, resource: Resource, raw_id: &str) -> Response {
    let id = match parse_id(resource, raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.records.get(resource, id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => errors::not_found(singular(resource)),
        Err(e) => errors::data_error_to_response(e),
    }
}

pub async fn create(services: &AppServices, resource: Resource, body: JsonValue) -> Response {
    match services.records.insert(resource, body).await {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(e) => errors::data_error_to_response(e),
    }
}

pub async fn update(
    services: &AppServices,
    resource: Resource,
    raw_id: &str,
    patch: JsonValue,
) -> Response {
    let id = match parse_id(resource, raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.records.update(resource, id, patch).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => errors::not_found(singular(resource)),
        Err(e) => errors::data_error_to_response(e),
    }
}

pub async fn remove(services: &AppServices, resource: Resource, raw_id: &str) -> Response {
    let id = match parse_id(resource, raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.records.delete(resource, id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => errors::not_found(singular(resource)),
        Err(e) => errors::data_error_to_response(e),
    }
}
