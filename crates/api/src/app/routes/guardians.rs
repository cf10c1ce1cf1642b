//! Guardian records. A guardian's record id is their user id.

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
pub struct GuardianQuery {
    #[serde(rename = "guardianId")]
    pub guardian_id: Option<String>,
}

pub fn router() -> Router {
    let admin_by_id = |action| {
        RequireAccess::new(Resource::Guardians, action)
            .identified_by(Resource::Guardians, IdSource::Path("id"))
    };

    Router::new()
        .route(
            "/",
            get(list_guardians.layer(
                RequireAccess::new(Resource::Guardians, Action::Read)
                    .scoped(Resource::Guardians, IdSource::Query("guardianId")),
            ))
            .post(create_guardian.layer(RequireAccess::new(Resource::Guardians, Action::Create))),
        )
        .route(
            "/:id",
            get(get_guardian.layer(
                RequireAccess::new(Resource::Guardians, Action::Read)
                    .scoped(Resource::Guardians, IdSource::Path("id")),
            ))
            .put(update_guardian.layer(admin_by_id(Action::Update)))
            .delete(delete_guardian.layer(admin_by_id(Action::Delete))),
        )
}

pub async fn list_guardians(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<GuardianQuery>,
) -> Response {
    let filter = query
        .guardian_id
        .filter(|s| !s.trim().is_empty())
        .map(|s| FieldMatch::new("id", s.trim()));
    records::list(&services, Resource::Guardians, filter).await
}

pub async fn create_guardian(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Guardians, body).await
}

pub async fn get_guardian(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Guardians, &id).await
}

pub async fn update_guardian(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Guardians, &id, patch).await
}

pub async fn delete_guardian(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Guardians, &id).await
}
