use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    handler::Handler,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Map, Value as JsonValue, json};

use campus_auth::{Action, Permission, Resource, Role};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::RequireAccess;
use crate::context::PrincipalContext;

const COUNTED: [Resource; 6] = [
    Resource::Students,
    Resource::Guardians,
    Resource::Staff,
    Resource::Classes,
    Resource::Payments,
    Resource::Users,
];

pub fn router() -> Router {
    Router::new().route(
        "/",
        get(dashboard.layer(RequireAccess::new(Resource::Dashboard, Action::Read))),
    )
}

/// Role summary for the caller; admins also get record counts.
pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let permissions: Vec<String> = services
        .matrix
        .permissions_for(principal.role())
        .iter()
        .map(Permission::to_string)
        .collect();

    let mut body = json!({
        "role": principal.role(),
        "permissions": permissions,
    });

    if principal.role() == Role::Admin {
        let mut counts = Map::new();
        for resource in COUNTED {
            match services.records.list(resource, None).await {
                Ok(rows) => {
                    counts.insert(resource.as_str().to_string(), JsonValue::from(rows.len()));
                }
                Err(e) => return errors::data_error_to_response(e),
            }
        }
        body["counts"] = JsonValue::Object(counts);
    }

    (StatusCode::OK, Json(body)).into_response()
}
