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
use crate::authz::{IdSource, Reassignment, RequireAccess};

#[derive(Debug, Default, Deserialize)]
pub struct ClassQuery {
    #[serde(rename = "classId")]
    pub class_id: Option<String>,
}

/// Class directors read and edit their own classes but cannot hand them over;
/// creation and removal are admin-only.
pub fn router() -> Router {
    let directed = |action| {
        RequireAccess::new(Resource::Classes, action).scoped(Resource::Classes, IdSource::Path("id"))
    };

    Router::new()
        .route(
            "/",
            get(list_classes.layer(
                RequireAccess::new(Resource::Classes, Action::Read)
                    .scoped(Resource::Classes, IdSource::Query("classId")),
            ))
            .post(create_class.layer(RequireAccess::new(Resource::Classes, Action::Create))),
        )
        .route(
            "/:id",
            get(get_class.layer(directed(Action::Read)))
                .put(update_class.layer(
                    directed(Action::Update).reassigns(Reassignment::Owner { field: "director_id" }),
                ))
                .delete(delete_class.layer(
                    RequireAccess::new(Resource::Classes, Action::Delete)
                        .identified_by(Resource::Classes, IdSource::Path("id")),
                )),
        )
}

pub async fn list_classes(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ClassQuery>,
) -> Response {
    let filter = query
        .class_id
        .filter(|s| !s.trim().is_empty())
        .map(|s| FieldMatch::new("id", s.trim()));
    records::list(&services, Resource::Classes, filter).await
}

pub async fn create_class(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Classes, body).await
}

pub async fn get_class(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Classes, &id).await
}

pub async fn update_class(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Classes, &id, patch).await
}

pub async fn delete_class(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Classes, &id).await
}
