//! RBAC inspection endpoints.
//!
//! Read-only views over the permission matrix for answering "why was this
//! request denied?". The explanation covers the matrix stage only.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    handler::Handler,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use campus_auth::{Action, Permission, Principal, RbacRegistry, Resource, Role, explain_authorization};
use campus_core::UserId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::RequireAccess;
use crate::context::PrincipalContext;

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
    /// Explain for a hypothetical principal with this raw role instead of the caller.
    pub role: Option<String>,
}

pub fn router() -> Router {
    let inspect = || RequireAccess::new(Resource::Users, Action::Read);

    Router::new()
        .route("/roles", get(list_roles.layer(inspect())))
        .route("/roles/:name", get(get_role.layer(inspect())))
        .route("/permissions", get(list_permissions.layer(inspect())))
        .route("/permissions/:name", get(get_permission.layer(inspect())))
        .route("/explain", get(explain.layer(inspect())))
}

/// GET /admin/rbac/roles
pub async fn list_roles(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let registry = RbacRegistry::from_matrix(&services.matrix);
    let roles: Vec<_> = registry.roles.into_values().collect();
    (StatusCode::OK, Json(serde_json::json!({ "roles": roles }))).into_response()
}

/// GET /admin/rbac/roles/:name
///
/// Accepts any synonym the principal resolver knows.
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> Response {
    let mut registry = RbacRegistry::from_matrix(&services.matrix);
    match registry.roles.remove(Role::normalize(&name).as_str()) {
        Some(role) => (StatusCode::OK, Json(serde_json::json!({ "role": role }))).into_response(),
        None => errors::not_found("Role"),
    }
}

/// GET /admin/rbac/permissions
pub async fn list_permissions(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let registry = RbacRegistry::from_matrix(&services.matrix);
    let permissions: Vec<_> = registry.permissions.into_values().collect();
    (StatusCode::OK, Json(serde_json::json!({ "permissions": permissions }))).into_response()
}

/// GET /admin/rbac/permissions/:name
pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> Response {
    let mut registry = RbacRegistry::from_matrix(&services.matrix);
    match registry.permissions.remove(&name) {
        Some(permission) => {
            (StatusCode::OK, Json(serde_json::json!({ "permission": permission }))).into_response()
        }
        None => errors::not_found("Permission"),
    }
}

/// GET /admin/rbac/explain?permission=grades.update[&role=docente]
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> Response {
    let permission: Permission = match query.permission.parse() {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "INVALID_PERMISSION", e.to_string()),
    };

    let subject = match query.role.as_deref() {
        Some(raw) => Principal::new(UserId::new(), Role::normalize(raw), "hypothetical@local"),
        None => caller.principal().clone(),
    };

    let explanation = explain_authorization(&services.matrix, &subject, permission);
    (StatusCode::OK, Json(explanation)).into_response()
}
