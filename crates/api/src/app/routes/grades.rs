//! Grade records. Teachers write grades only for students of classes they direct.

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
            get(list_grades.layer(student_records::list_access(Resource::Grades)))
                .post(create_grade.layer(student_records::create_access(Resource::Grades))),
        )
        .route(
            "/:id",
            get(get_grade.layer(student_records::record_access(Resource::Grades, Action::Read)))
                .put(update_grade.layer(student_records::update_access(Resource::Grades)))
                .delete(delete_grade.layer(student_records::record_access(Resource::Grades, Action::Delete))),
        )
}

pub async fn list_grades(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<StudentQuery>,
) -> Response {
    student_records::list_for_student(&services, Resource::Grades, query).await
}

pub async fn create_grade(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Grades, body).await
}

pub async fn get_grade(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Grades, &id).await
}

pub async fn update_grade(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Grades, &id, patch).await
}

pub async fn delete_grade(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Grades, &id).await
}
