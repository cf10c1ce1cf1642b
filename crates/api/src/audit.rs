//! Response-completion audit hook.
//!
//! Runs inside the auth middleware and outside the per-route access guard.
//! The guard describes what it decided through an [`AuditAnnotation`] response
//! extension; this layer turns that plus the final status and bodies into at
//! most one audit entry per request, written off the response path.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use futures_util::FutureExt;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use campus_audit::{AuditAction, AuditEntry, ChangeSet};
use campus_auth::{Action, Principal, Resource};
use campus_core::RecordId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// What the access guard tells the audit layer about a request.
#[derive(Debug, Clone, Default)]
pub struct AuditAnnotation {
    pub resource: Option<Resource>,
    pub action: Option<Action>,
    pub resource_id: Option<String>,
    /// Set when the guard refused the request.
    pub denial: Option<String>,
    /// Set when an entry was already written for this request.
    pub recorded: bool,
    pub snapshot: Option<Snapshot>,
}

/// Row state read before a change-tracked mutation ran.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub resource: Resource,
    pub id: Option<RecordId>,
    pub before: Option<JsonValue>,
}

/// Request facts every audit entry carries.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_request(req: &Request) -> Self {
        let connect_info = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self {
            method: req.method().clone(),
            // Nested routers strip their prefix from the request uri.
            path: req
                .extensions()
                .get::<OriginalUri>()
                .map_or_else(|| req.uri().path(), |OriginalUri(uri)| uri.path())
                .to_string(),
            ip: client_ip(req.headers(), connect_info),
            user_agent: header_str(req.headers(), "user-agent"),
        }
    }

    pub fn entry(&self, action: AuditAction, resource: &str, status: u16) -> AuditEntry {
        AuditEntry::new(action, resource, self.method.as_str(), &self.path, status)
            .with_client(self.ip.clone(), self.user_agent.clone())
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

pub async fn audit_middleware(
    State(services): State<Arc<AppServices>>,
    req: Request,
    next: Next,
) -> Response {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .map(|p| p.principal().clone());
    let meta = RequestMeta::from_request(&req);
    let eligible = services.policy.is_eligible(meta.method.as_str(), &meta.path);

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, services.body_limit).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return errors::json_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Request body is too large",
            );
        }
    };
    let request_body = parse_json(&bytes);
    let req = Request::from_parts(parts, Body::from(bytes));

    let (response, panicked) = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => (response, None),
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(method = %meta.method, path = %meta.path, panic = %message, "handler panicked");
            (errors::internal_error(), Some(message))
        }
    };

    let annotation = response
        .extensions()
        .get::<AuditAnnotation>()
        .cloned()
        .unwrap_or_default();
    if annotation.recorded || !(eligible || annotation.denial.is_some()) {
        return response;
    }

    let (response, response_body) = capture_body(response, services.body_limit).await;
    let status = response.status();

    let action = if annotation.denial.is_some() {
        AuditAction::PermissionDenied
    } else {
        annotation
            .action
            .or_else(|| Action::from_method(meta.method.as_str()))
            .map(AuditAction::from)
            .unwrap_or(AuditAction::Read)
    };
    let resource = annotation
        .resource
        .map(|r| r.as_str().to_string())
        .unwrap_or_else(|| first_segment(&meta.path));
    let resource_id = annotation
        .resource_id
        .clone()
        .or_else(|| body_id(response_body.as_ref()));
    let error_message = panicked
        .or(annotation.denial.clone())
        .or_else(|| handler_error(status, response_body.as_ref()));

    let mut entry = meta
        .entry(action, &resource, status.as_u16())
        .with_resource_id(resource_id)
        .with_bodies(request_body, response_body.clone())
        .with_error(error_message);
    if let Some(p) = &principal {
        entry = entry.with_principal(p);
    }

    match (annotation.snapshot, principal) {
        (Some(snapshot), Some(principal)) if status.is_success() => {
            let services = Arc::clone(&services);
            let is_delete = meta.method == Method::DELETE;
            tokio::spawn(async move {
                let after = if is_delete {
                    None
                } else {
                    reread_after(&services, &snapshot, response_body.as_ref())
                        .await
                        .or(response_body)
                };
                let entry = entry.with_changes(Some(change_set(&principal, snapshot.before, after)));
                services.audit.write(entry).await;
            });
        }
        _ => services.audit.record(entry),
    }

    response
}

fn change_set(principal: &Principal, before: Option<JsonValue>, after: Option<JsonValue>) -> ChangeSet {
    ChangeSet {
        before,
        after,
        modified_by: principal.id,
        modified_at: Utc::now(),
    }
}

/// Bounded re-read of the mutated row; `None` on miss, error or timeout.
async fn reread_after(
    services: &AppServices,
    snapshot: &Snapshot,
    response_body: Option<&JsonValue>,
) -> Option<JsonValue> {
    let id = snapshot
        .id
        .or_else(|| body_id(response_body).and_then(|s| s.parse().ok()))?;
    match tokio::time::timeout(
        services.lookup_timeout,
        services.data.row_by_id(snapshot.resource, id),
    )
    .await
    {
        Ok(Ok(row)) => row,
        Ok(Err(e)) => {
            warn!(resource = %snapshot.resource, %id, error = %e, "after-image read failed");
            None
        }
        Err(_) => {
            warn!(resource = %snapshot.resource, %id, "after-image read timed out");
            None
        }
    }
}

/// Buffer a response body when its exact size is known and within `limit`.
async fn capture_body(response: Response, limit: usize) -> (Response, Option<JsonValue>) {
    let fits = response
        .body()
        .size_hint()
        .exact()
        .is_some_and(|n| usize::try_from(n).is_ok_and(|n| n <= limit));
    if !fits {
        return (response, None);
    }

    let (parts, body) = response.into_parts();
    match to_bytes(body, limit).await {
        Ok(bytes) => {
            let json = parse_json(&bytes);
            (Response::from_parts(parts, Body::from(bytes)), json)
        }
        Err(e) => {
            warn!(error = %e, "failed to buffer response body for audit");
            (Response::from_parts(parts, Body::empty()), None)
        }
    }
}

fn parse_json(bytes: &[u8]) -> Option<JsonValue> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

fn handler_error(status: StatusCode, body: Option<&JsonValue>) -> Option<String> {
    if status.as_u16() < 400 {
        return None;
    }
    body.and_then(|b| b.get("message"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .or_else(|| status.canonical_reason().map(str::to_string))
}

fn body_id(body: Option<&JsonValue>) -> Option<String> {
    body?.get("id")?.as_str().map(str::to_string)
}

fn first_segment(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
        .replace('-', "_")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Extension, Json, Router,
        http::HeaderValue,
        routing::{post, put},
    };
    use serde_json::json;
    use tower::ServiceExt;

    use campus_audit::InMemoryAuditStore;
    use campus_auth::Role;
    use campus_core::UserId;
    use campus_infra::{AppConfig, InMemoryDataStore};

    use super::*;

    struct Harness {
        router: Router,
        audit: Arc<InMemoryAuditStore>,
    }

    fn harness(routes: Router) -> Harness {
        let data = Arc::new(InMemoryDataStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let services = Arc::new(
            AppServices::new(data.clone(), data, audit.clone(), &AppConfig::default()).unwrap(),
        );
        let principal = Principal::new(UserId::new(), Role::Admin, "admin@escola.test");
        let router = routes
            .layer(axum::middleware::from_fn_with_state(
                services.clone(),
                audit_middleware,
            ))
            .layer(Extension(services))
            .layer(Extension(PrincipalContext::new(principal)));
        Harness { router, audit }
    }

    async fn entries_eventually(store: &InMemoryAuditStore, n: usize) -> Vec<AuditEntry> {
        for _ in 0..50 {
            let entries = store.snapshot();
            if entries.len() >= n {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} audit entries, found {}", store.snapshot().len());
    }

    fn request(method: Method, uri: &str, body: JsonValue) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn panicking_handler_becomes_an_audited_500() {
        async fn boom() -> Json<JsonValue> {
            panic!("grade table exploded")
        }
        let h = harness(Router::new().route("/grades/:id", put(boom)));

        let res = h
            .router
            .oneshot(request(Method::PUT, "/grades/1", json!({"score": 1})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let entries = entries_eventually(&h.audit, 1).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status_code, 500);
        assert_eq!(entries[0].error_message.as_deref(), Some("grade table exploded"));
    }

    #[tokio::test]
    async fn handler_errors_take_the_json_message() {
        async fn reject() -> Response {
            errors::json_error(StatusCode::UNPROCESSABLE_ENTITY, "BAD", "score out of range")
        }
        let h = harness(Router::new().route("/grades", post(reject)));

        let res = h
            .router
            .oneshot(request(Method::POST, "/grades", json!({"score": 99, "password": "x"})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let entries = entries_eventually(&h.audit, 1).await;
        let entry = &entries[0];
        assert_eq!(entry.action, AuditAction::Create);
        assert_eq!(entry.resource, "grades");
        assert_eq!(entry.error_message.as_deref(), Some("score out of range"));
        assert_eq!(entry.request_body.as_ref().unwrap()["password"], campus_audit::REDACTED);
    }

    #[tokio::test]
    async fn ineligible_requests_are_not_audited() {
        async fn ok() -> Json<JsonValue> {
            Json(json!({"ok": true}))
        }
        let h = harness(Router::new().route("/dashboard", post(ok)));
        let res = h
            .router
            .oneshot(request(Method::POST, "/dashboard", json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.audit.snapshot().is_empty());
    }

    #[test]
    fn client_ip_prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.2"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
    }
}
