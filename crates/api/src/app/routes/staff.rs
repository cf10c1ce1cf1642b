//! Staff records. Admin-only end to end.

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
    RequireAccess::new(Resource::Staff, action)
}

fn access_by_id(action: Action) -> RequireAccess {
    access(action).identified_by(Resource::Staff, IdSource::Path("id"))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_staff.layer(access(Action::Read)))
                .post(create_staff_member.layer(access(Action::Create))),
        )
        .route(
            "/:id",
            get(get_staff_member.layer(access_by_id(Action::Read)))
                .put(update_staff_member.layer(access_by_id(Action::Update)))
                .delete(delete_staff_member.layer(access_by_id(Action::Delete))),
        )
}

pub async fn list_staff(Extension(services): Extension<Arc<AppServices>>) -> Response {
    records::list(&services, Resource::Staff, None).await
}

pub async fn create_staff_member(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Staff, body).await
}

pub async fn get_staff_member(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Staff, &id).await
}

pub async fn update_staff_member(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Staff, &id, patch).await
}

pub async fn delete_staff_member(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Staff, &id).await
}
