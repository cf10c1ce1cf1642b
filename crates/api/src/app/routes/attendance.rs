use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    handler::Handler,
    response::Response,
    routing::get,
};
use serde_json::Value as JsonValue;

use campus_auth::{Action, Resource};

use crate::app::routes::records;
use crate::app::routes::student_records::{self, StudentQuery};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_attendance.layer(student_records::list_access(Resource::Attendance)))
                .post(create_attendance.layer(student_records::create_access(Resource::Attendance))),
        )
        .route(
            "/:id",
            get(get_attendance.layer(student_records::record_access(Resource::Attendance, Action::Read)))
                .put(update_attendance.layer(student_records::update_access(Resource::Attendance)))
                .delete(delete_attendance.layer(student_records::record_access(Resource::Attendance, Action::Delete))),
        )
}

pub async fn list_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<StudentQuery>,
) -> Response {
    student_records::list_for_student(&services, Resource::Attendance, query).await
}

pub async fn create_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Attendance, body).await
}

pub async fn get_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Attendance, &id).await
}

pub async fn update_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Attendance, &id, patch).await
}

pub async fn delete_attendance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Attendance, &id).await
}
