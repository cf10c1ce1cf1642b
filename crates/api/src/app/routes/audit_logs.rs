//! Read side of the audit trail (admin only).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    handler::Handler,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use campus_audit::{AuditAction, AuditFilter};
use campus_auth::{Action, Resource};
use campus_core::UserId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::RequireAccess;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub user_id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditLogQuery {
    fn into_filter(self) -> Result<AuditFilter, String> {
        let user_id = self
            .user_id
            .map(|raw| raw.parse::<UserId>().map_err(|_| format!("invalid userId '{raw}'")))
            .transpose()?;
        let action = self
            .action
            .map(|raw| AuditAction::parse(&raw).ok_or_else(|| format!("unknown action '{raw}'")))
            .transpose()?;

        Ok(AuditFilter {
            user_id,
            resource: self.resource,
            action,
            from: self.from,
            to: self.to,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

pub fn router() -> Router {
    Router::new().route(
        "/",
        get(list_audit_logs.layer(RequireAccess::new(Resource::AuditLogs, Action::Read))),
    )
}

/// GET /audit-logs - newest entries first, paginated.
pub async fn list_audit_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<AuditLogQuery>,
) -> Response {
    let filter = match query.into_filter() {
        Ok(filter) => filter,
        Err(message) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "INVALID_FILTER", message);
        }
    };

    match services.audit_store().query(filter).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "audit log query failed");
            errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUDIT_STORE_ERROR",
                "The audit store is unavailable",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_maps_to_filter() {
        let user = UserId::new();
        let filter = AuditLogQuery {
            user_id: Some(user.to_string()),
            action: Some("permissao_insuficiente".to_string()),
            limit: Some(10),
            ..AuditLogQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.user_id, Some(user));
        assert_eq!(filter.action, Some(AuditAction::PermissionDenied));
        assert_eq!(filter.limit(), 10);
    }

    #[test]
    fn bad_values_are_rejected() {
        let bad_user = AuditLogQuery {
            user_id: Some("nope".to_string()),
            ..AuditLogQuery::default()
        };
        assert!(bad_user.into_filter().is_err());

        let bad_action = AuditLogQuery {
            action: Some("approve".to_string()),
            ..AuditLogQuery::default()
        };
        assert!(bad_action.into_filter().is_err());
    }
}
