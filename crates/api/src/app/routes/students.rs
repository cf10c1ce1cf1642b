use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    handler::Handler,
    response::Response,
    routing::get,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use campus_auth::{Action, Resource};
use campus_infra::FieldMatch;

use crate::app::routes::records;
use crate::app::services::AppServices;
use crate::authz::{IdSource, RequireAccess};

#[derive(Debug, Default, Deserialize)]
pub struct StudentListQuery {
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
}

pub fn router() -> Router {
    let by_id = |action| {
        RequireAccess::new(Resource::Students, action).identified_by(Resource::Students, IdSource::Path("id"))
    };

    Router::new()
        .route(
            "/",
            get(list_students.layer(
                RequireAccess::new(Resource::Students, Action::Read)
                    .scoped(Resource::Students, IdSource::Query("studentId")),
            ))
            .post(create_student.layer(RequireAccess::new(Resource::Students, Action::Create))),
        )
        .route(
            "/:id",
            get(get_student.layer(
                RequireAccess::new(Resource::Students, Action::Read)
                    .scoped(Resource::Students, IdSource::Path("id")),
            ))
            .put(update_student.layer(by_id(Action::Update)))
            .delete(delete_student.layer(by_id(Action::Delete))),
        )
}

/// Admins list every student; everyone else must name one they may see.
pub async fn list_students(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<StudentListQuery>,
) -> Response {
    let filter = query
        .student_id
        .filter(|s| !s.trim().is_empty())
        .map(|s| FieldMatch::new("id", s.trim()));
    records::list(&services, Resource::Students, filter).await
}

pub async fn create_student(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Students, body).await
}

pub async fn get_student(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Students, &id).await
}

pub async fn update_student(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Students, &id, patch).await
}

pub async fn delete_student(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Students, &id).await
}
