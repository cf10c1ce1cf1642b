//! User accounts. Admin-only; passwords in bodies are redacted before audit.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    handler::Handler,
    response::Response,
    routing::get,
};
use serde_json::Value as JsonValue;

use campus_auth::{Action, Resource};

use crate::app::routes::records;
use crate::app::services::AppServices;
use crate::authz::{IdSource, RequireAccess};

fn access(action: Action) -> RequireAccess {
    RequireAccess::new(Resource::Users, action)
}

fn access_by_id(action: Action) -> RequireAccess {
    access(action).identified_by(Resource::Users, IdSource::Path("id"))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_users.layer(access(Action::Read)))
                .post(create_user.layer(access(Action::Create))),
        )
        .route(
            "/:id",
            get(get_user.layer(access_by_id(Action::Read)))
                .put(update_user.layer(access_by_id(Action::Update)))
                .delete(delete_user.layer(access_by_id(Action::Delete))),
        )
}

pub async fn list_users(Extension(services): Extension<Arc<AppServices>>) -> Response {
    records::list(&services, Resource::Users, None).await
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Users, body).await
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Users, &id).await
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Users, &id, patch).await
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Users, &id).await
}
