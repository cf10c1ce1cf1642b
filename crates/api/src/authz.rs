//! Per-route access guard.
//!
//! Every protected handler is wrapped in a [`RequireAccess`] layer naming the
//! `(resource, action)` it needs and, for scoped routes, where the target
//! record id comes from. The guard runs the [`AuthorizationPipeline`] in a
//! fixed order (permission matrix, ownership scope, age) and either stops the
//! request with a denial or lets the handler run.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    extract::{FromRequestParts, Query, RawPathParams, Request},
    http::StatusCode,
    response::Response,
};
use chrono::{NaiveDate, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use campus_audit::{AuditAction, AuditRecorder};
use campus_auth::{
    Action, Decision, Denial, DenialKind, PermissionMatrix, Principal, Resource, ScopeStep,
    authorize, check_age, check_owner_reassignment, plan_scope,
};
use campus_core::RecordId;
use campus_infra::DataLayer;
use campus_observability::SECURITY_TARGET;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::audit::{AuditAnnotation, RequestMeta, Snapshot};
use crate::context::PrincipalContext;

/// Where a route's target record id is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Path(&'static str),
    Query(&'static str),
    Body(&'static str),
}

/// The record a route acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeTarget {
    pub resource: Resource,
    pub source: IdSource,
    /// Whether ownership of the target is enforced, or the id is only reported.
    pub enforced: bool,
}

/// An ownership field that an update body may rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassignment {
    /// `field` references a record of `resource` the principal must own (`student_id`).
    Record {
        field: &'static str,
        resource: Resource,
    },
    /// `field` names the owning user directly (`director_id`).
    Owner { field: &'static str },
}

impl Reassignment {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Record { field, .. } | Self::Owner { field } => field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRule {
    pub resource: Resource,
    pub action: Action,
    pub target: Option<ScopeTarget>,
    pub reassign: Option<Reassignment>,
}

/// Ids a request names, as read by the guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    /// The record the route acts on.
    pub current: Option<RecordId>,
    /// Raw value of the reassignment field, present only when the body sets it.
    pub reassigned: Option<String>,
}

impl From<Option<RecordId>> for Targets {
    fn from(current: Option<RecordId>) -> Self {
        Self {
            current,
            reassigned: None,
        }
    }
}

impl AccessRule {
    fn scoped_target(&self) -> Option<&ScopeTarget> {
        self.target.as_ref().filter(|t| t.enforced)
    }
}

/// Composes the permission matrix, the ownership scope and the age guard.
#[derive(Clone)]
pub struct AuthorizationPipeline {
    matrix: Arc<PermissionMatrix>,
    data: Arc<dyn DataLayer>,
    recorder: AuditRecorder,
    lookup_timeout: Duration,
}

impl AuthorizationPipeline {
    pub fn new(
        matrix: Arc<PermissionMatrix>,
        data: Arc<dyn DataLayer>,
        recorder: AuditRecorder,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            matrix,
            data,
            recorder,
            lookup_timeout,
        }
    }

    /// Run all three checks; the first denial wins.
    ///
    /// An update that rewrites an ownership field is scoped twice: against
    /// the record as stored and against the owner it would move to.
    pub async fn evaluate(
        &self,
        principal: &Principal,
        rule: &AccessRule,
        targets: impl Into<Targets>,
        today: NaiveDate,
    ) -> Decision {
        let targets = targets.into();
        authorize(&self.matrix, principal, rule.resource, rule.action)?;
        if let Some(target) = rule.scoped_target() {
            self.check_scope(principal, rule.resource, target.resource, targets.current)
                .await?;
        }
        if let (Some(reassign), Some(raw)) = (rule.reassign, targets.reassigned.as_deref()) {
            match reassign {
                Reassignment::Record { resource, .. } => {
                    self.check_scope(principal, rule.resource, resource, raw.parse().ok())
                        .await?
                }
                Reassignment::Owner { .. } => {
                    check_owner_reassignment(principal, rule.resource, raw.parse().ok())?
                }
            }
        }
        self.check_age(principal, today).await
    }

    /// [`evaluate`](Self::evaluate) plus decision logging and the minor-blocked
    /// security entry.
    pub async fn authorize_request(
        &self,
        principal: &Principal,
        rule: &AccessRule,
        targets: impl Into<Targets>,
        meta: &RequestMeta,
    ) -> Decision {
        let targets = targets.into();
        let target_id = targets.current;
        let decision = self
            .evaluate(principal, rule, targets, Utc::now().date_naive())
            .await;

        match &decision {
            Ok(()) => debug!(
                user_id = %principal.id,
                role = %principal.role,
                resource = %rule.resource,
                action = %rule.action,
                "access granted"
            ),
            Err(denial) if denial.kind == DenialKind::AgeBlocked => {
                warn!(
                    target: SECURITY_TARGET,
                    user_id = %principal.id,
                    resource = %rule.resource,
                    path = %meta.path,
                    code = %denial.code,
                    "minor student blocked"
                );
                let entry = meta
                    .entry(AuditAction::MinorBlocked, rule.resource.as_str(), denial.status())
                    .with_principal(principal)
                    .with_resource_id(target_id.map(|id| id.to_string()))
                    .with_error(Some(denial.to_string()));
                self.recorder.record(entry);
            }
            Err(denial) => info!(
                user_id = %principal.id,
                role = %principal.role,
                resource = %rule.resource,
                action = %rule.action,
                code = %denial.code,
                reason = %denial.reason,
                "access denied"
            ),
        }

        decision
    }

    async fn check_scope(
        &self,
        principal: &Principal,
        route_resource: Resource,
        target_resource: Resource,
        target_id: Option<RecordId>,
    ) -> Decision {
        let lookup = match plan_scope(principal, route_resource, target_resource, target_id) {
            ScopeStep::Bypass => return Ok(()),
            ScopeStep::Deny(denial) => return Err(denial),
            ScopeStep::Lookup(lookup) => lookup,
        };

        let owner = tokio::time::timeout(
            self.lookup_timeout,
            self.data
                .owner_of(lookup.resource, lookup.id, lookup.owner_kind),
        )
        .await;

        match owner {
            Ok(Ok(owner)) => lookup.resolve(owner),
            Ok(Err(e)) => Err(Denial::scope(
                lookup.deny_code,
                format!("ownership lookup failed: {e}"),
            )),
            Err(_) => Err(Denial::scope(
                lookup.deny_code,
                format!("ownership lookup timed out after {:?}", self.lookup_timeout),
            )),
        }
    }

    async fn check_age(&self, principal: &Principal, today: NaiveDate) -> Decision {
        let row = tokio::time::timeout(
            self.lookup_timeout,
            self.data
                .row_by_id(Resource::Students, RecordId::from(principal.id)),
        )
        .await;

        match row {
            Ok(Ok(row)) => check_age(row.as_ref(), today),
            Ok(Err(e)) => Err(Denial::minor(format!("student lookup failed: {e}"))),
            Err(_) => Err(Denial::minor(format!(
                "student lookup timed out after {:?}",
                self.lookup_timeout
            ))),
        }
    }
}

/// Route layer that admits a request only when the pipeline allows it.
///
/// Needs [`PrincipalContext`] and `Arc<AppServices>` in the request
/// extensions.
#[derive(Debug, Clone, Copy)]
pub struct RequireAccess {
    rule: AccessRule,
}

impl RequireAccess {
    pub fn new(resource: Resource, action: Action) -> Self {
        Self {
            rule: AccessRule {
                resource,
                action,
                target: None,
                reassign: None,
            },
        }
    }

    /// Enforce ownership of the record named by `source`.
    pub fn scoped(self, resource: Resource, source: IdSource) -> Self {
        self.with_target(resource, source, true)
    }

    /// Report the record named by `source` without an ownership check.
    pub fn identified_by(self, resource: Resource, source: IdSource) -> Self {
        self.with_target(resource, source, false)
    }

    /// Also scope the owner an update body moves the record to.
    pub fn reassigns(mut self, reassign: Reassignment) -> Self {
        self.rule.reassign = Some(reassign);
        self
    }

    fn with_target(mut self, resource: Resource, source: IdSource, enforced: bool) -> Self {
        self.rule.target = Some(ScopeTarget {
            resource,
            source,
            enforced,
        });
        self
    }

    pub fn rule(&self) -> &AccessRule {
        &self.rule
    }
}

impl<S> Layer<S> for RequireAccess {
    type Service = RequireAccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAccessService {
            inner,
            rule: self.rule,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequireAccessService<S> {
    inner: S,
    rule: AccessRule,
}

impl<S> Service<Request> for RequireAccessService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Take the service that was polled ready and leave a fresh clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let rule = self.rule;

        Box::pin(async move { Ok(guard(inner, rule, req).await) })
    }
}

async fn guard<S>(mut inner: S, rule: AccessRule, req: Request) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    let Some(principal) = req
        .extensions()
        .get::<PrincipalContext>()
        .map(|ctx| ctx.principal().clone())
    else {
        return errors::json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "Authentication required",
        );
    };
    let Some(services) = req.extensions().get::<Arc<AppServices>>().cloned() else {
        tracing::error!("access guard mounted without application services");
        return errors::internal_error();
    };

    let (req, raw_id, reassigned) = match extract_targets(req, &rule, services.body_limit).await {
        Ok(extracted) => extracted,
        Err(response) => return response,
    };
    let target_id = raw_id.as_deref().and_then(|s| s.parse::<RecordId>().ok());
    let targets = Targets {
        current: target_id,
        reassigned,
    };
    let meta = RequestMeta::from_request(&req);

    // Only an id naming a record of the route's own resource describes the entry.
    let reports_own_id = rule
        .target
        .is_some_and(|t| t.resource == rule.resource);
    let mut annotation = AuditAnnotation {
        resource: Some(rule.resource),
        action: Some(rule.action),
        resource_id: raw_id.filter(|_| reports_own_id),
        ..AuditAnnotation::default()
    };

    if let Err(denial) = services
        .pipeline
        .authorize_request(&principal, &rule, targets, &meta)
        .await
    {
        annotation.denial = Some(denial.to_string());
        annotation.recorded = denial.kind == DenialKind::AgeBlocked;
        let mut response = errors::denial_response(&denial);
        response.extensions_mut().insert(annotation);
        return response;
    }

    if rule.action != Action::Read && services.policy.tracks_changes(&meta.path) {
        let id = target_id.filter(|_| reports_own_id);
        annotation.snapshot = Some(take_snapshot(&services, rule.resource, id).await);
    }

    let mut response = match inner.call(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    response.extensions_mut().insert(annotation);
    response
}

/// Read the pre-mutation row, bounded; a failed read leaves `before` empty.
async fn take_snapshot(services: &AppServices, resource: Resource, id: Option<RecordId>) -> Snapshot {
    let before = match id {
        None => None,
        Some(id) => match tokio::time::timeout(
            services.lookup_timeout,
            services.data.row_by_id(resource, id),
        )
        .await
        {
            Ok(Ok(row)) => row,
            Ok(Err(e)) => {
                warn!(%resource, %id, error = %e, "before-image read failed");
                None
            }
            Err(_) => {
                warn!(%resource, %id, "before-image read timed out");
                None
            }
        },
    };
    Snapshot {
        resource,
        id,
        before,
    }
}

/// Pull the raw target id, and the raw reassignment value, out of the request.
///
/// The body is buffered only when one of them lives there, and the request is
/// rebuilt around the buffered bytes.
async fn extract_targets(
    req: Request,
    rule: &AccessRule,
    body_limit: usize,
) -> Result<(Request, Option<String>, Option<String>), Response> {
    let reads_body = rule.reassign.is_some()
        || rule
            .target
            .is_some_and(|t| matches!(t.source, IdSource::Body(_)));
    let (req, body) = if reads_body {
        buffer_json(req, body_limit).await?
    } else {
        (req, None)
    };

    let (req, raw) = match rule.target.map(|t| t.source) {
        None => (req, None),
        Some(IdSource::Path(name)) => {
            let (mut parts, body) = req.into_parts();
            let raw = RawPathParams::from_request_parts(&mut parts, &())
                .await
                .ok()
                .and_then(|params| {
                    params
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| value.to_string())
                });
            (Request::from_parts(parts, body), raw)
        }
        Some(IdSource::Query(name)) => {
            let raw = Query::<HashMap<String, String>>::try_from_uri(req.uri())
                .ok()
                .and_then(|Query(mut params)| params.remove(name));
            (req, raw)
        }
        Some(IdSource::Body(name)) => {
            let raw = body
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            (req, raw)
        }
    };

    // A present field that is not a string still counts as a reassignment.
    let reassigned = rule.reassign.and_then(|r| {
        body.as_ref()?
            .get(r.field())
            .map(|v| v.as_str().unwrap_or_default().trim().to_string())
    });

    Ok((
        req,
        raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        reassigned,
    ))
}

async fn buffer_json(req: Request, body_limit: usize) -> Result<(Request, Option<JsonValue>), Response> {
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, body_limit).await.map_err(|_| {
        errors::json_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            "Request body is too large",
        )
    })?;
    let json = serde_json::from_slice::<JsonValue>(&bytes).ok();
    Ok((Request::from_parts(parts, Body::from(bytes)), json))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::{
        Extension, Json, Router,
        handler::Handler,
        http::Method,
        routing::{get, post},
    };
    use chrono::Months;
    use serde_json::json;
    use tower::ServiceExt;

    use campus_audit::InMemoryAuditStore;
    use campus_auth::{DenialCode, OwnerKind, Role};
    use campus_core::UserId;
    use campus_infra::{AppConfig, DataError, InMemoryDataStore, RecordStore};

    use super::*;

    struct School {
        store: Arc<InMemoryDataStore>,
        teacher_a: UserId,
        teacher_b: UserId,
        guardian: UserId,
        student_a: RecordId,
        student_b: RecordId,
    }

    async fn school() -> School {
        let store = Arc::new(InMemoryDataStore::new());
        let (teacher_a, teacher_b, guardian) = (UserId::new(), UserId::new(), UserId::new());
        let (class_a, class_b) = (RecordId::new(), RecordId::new());
        let (student_a, student_b) = (RecordId::new(), RecordId::new());

        for (class, director) in [(class_a, teacher_a), (class_b, teacher_b)] {
            store
                .insert(
                    Resource::Classes,
                    json!({"id": class.to_string(), "director_id": director.to_string()}),
                )
                .await
                .unwrap();
        }
        for (student, class) in [(student_a, class_a), (student_b, class_b)] {
            store
                .insert(
                    Resource::Students,
                    json!({
                        "id": student.to_string(),
                        "class_id": class.to_string(),
                        "guardian_id": guardian.to_string(),
                        "birth_date": "2012-05-01",
                    }),
                )
                .await
                .unwrap();
        }

        School {
            store,
            teacher_a,
            teacher_b,
            guardian,
            student_a,
            student_b,
        }
    }

    fn pipeline(data: Arc<dyn DataLayer>, audit: Arc<InMemoryAuditStore>) -> AuthorizationPipeline {
        AuthorizationPipeline::new(
            Arc::new(PermissionMatrix::standard().unwrap()),
            data,
            AuditRecorder::new(audit),
            Duration::from_millis(200),
        )
    }

    fn grade_create() -> AccessRule {
        *RequireAccess::new(Resource::Grades, Action::Create)
            .scoped(Resource::Students, IdSource::Body("student_id"))
            .rule()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[tokio::test]
    async fn teacher_is_limited_to_students_of_own_class() {
        let s = school().await;
        let p = pipeline(s.store.clone(), Arc::new(InMemoryAuditStore::new()));
        let teacher_a = Principal::new(s.teacher_a, Role::Teacher, "a@escola.test");

        assert!(p
            .evaluate(&teacher_a, &grade_create(), Some(s.student_a), today())
            .await
            .is_ok());

        let denial = p
            .evaluate(&teacher_a, &grade_create(), Some(s.student_b), today())
            .await
            .unwrap_err();
        assert_eq!(denial.code, DenialCode::StudentAccessDenied);

        let teacher_b = Principal::new(s.teacher_b, Role::Teacher, "b@escola.test");
        assert!(p
            .evaluate(&teacher_b, &grade_create(), Some(s.student_b), today())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn permission_check_runs_before_scope() {
        let s = school().await;
        let p = pipeline(s.store.clone(), Arc::new(InMemoryAuditStore::new()));
        let guardian = Principal::new(s.guardian, Role::Guardian, "g@escola.test");

        let denial = p
            .evaluate(&guardian, &grade_create(), Some(s.student_a), today())
            .await
            .unwrap_err();
        assert_eq!(denial.kind, DenialKind::PermissionDenied);
    }

    #[tokio::test]
    async fn minor_principal_is_blocked_and_logged_once() {
        let s = school().await;
        let audit = Arc::new(InMemoryAuditStore::new());
        let p = pipeline(s.store.clone(), audit.clone());

        let minor = UserId::new();
        let birth = today().checked_sub_months(Months::new(12 * 18)).unwrap().succ_opt().unwrap();
        s.store
            .insert(
                Resource::Students,
                json!({"id": minor.to_string(), "birth_date": birth.to_string()}),
            )
            .await
            .unwrap();

        let principal = Principal::new(minor, Role::Guardian, "m@escola.test");
        let rule = *RequireAccess::new(Resource::Dashboard, Action::Read).rule();
        let meta = RequestMeta {
            method: Method::GET,
            path: "/dashboard".to_string(),
            ip: None,
            user_agent: None,
        };

        let denial = p
            .authorize_request(&principal, &rule, Targets::default(), &meta)
            .await
            .unwrap_err();
        assert_eq!(denial.code, DenialCode::MinorStudentBlocked);

        for _ in 0..50 {
            if !audit.snapshot().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let entries = audit.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::MinorBlocked);
        assert_eq!(entries[0].status_code, 403);
    }

    #[tokio::test]
    async fn update_cannot_move_a_grade_to_a_foreign_student() {
        let s = school().await;
        let p = pipeline(s.store.clone(), Arc::new(InMemoryAuditStore::new()));
        let teacher_a = Principal::new(s.teacher_a, Role::Teacher, "a@escola.test");
        let grade = s
            .store
            .insert(
                Resource::Grades,
                json!({"student_id": s.student_a.to_string(), "score": 12}),
            )
            .await
            .unwrap();
        let grade_id = grade["id"].as_str().unwrap().parse::<RecordId>().unwrap();
        let rule = *RequireAccess::new(Resource::Grades, Action::Update)
            .scoped(Resource::Grades, IdSource::Path("id"))
            .reassigns(Reassignment::Record {
                field: "student_id",
                resource: Resource::Students,
            })
            .rule();

        let moved = |student: String| Targets {
            current: Some(grade_id),
            reassigned: Some(student),
        };

        assert!(p
            .evaluate(&teacher_a, &rule, moved(s.student_a.to_string()), today())
            .await
            .is_ok());

        let denial = p
            .evaluate(&teacher_a, &rule, moved(s.student_b.to_string()), today())
            .await
            .unwrap_err();
        assert_eq!(denial.code, DenialCode::StudentAccessDenied);

        let denial = p
            .evaluate(&teacher_a, &rule, moved(String::new()), today())
            .await
            .unwrap_err();
        assert_eq!(denial.code, DenialCode::MissingIdentifier);

        let admin = Principal::new(UserId::new(), Role::Admin, "root@escola.test");
        assert!(p
            .evaluate(&admin, &rule, moved(s.student_b.to_string()), today())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn class_director_cannot_hand_the_class_over() {
        let s = school().await;
        let p = pipeline(s.store.clone(), Arc::new(InMemoryAuditStore::new()));
        let teacher_a = Principal::new(s.teacher_a, Role::Teacher, "a@escola.test");
        let class = s
            .store
            .insert(
                Resource::Classes,
                json!({"director_id": s.teacher_a.to_string()}),
            )
            .await
            .unwrap();
        let class_id = class["id"].as_str().unwrap().parse::<RecordId>().unwrap();
        let rule = *RequireAccess::new(Resource::Classes, Action::Update)
            .scoped(Resource::Classes, IdSource::Path("id"))
            .reassigns(Reassignment::Owner { field: "director_id" })
            .rule();

        let denial = p
            .evaluate(
                &teacher_a,
                &rule,
                Targets {
                    current: Some(class_id),
                    reassigned: Some(s.teacher_b.to_string()),
                },
                today(),
            )
            .await
            .unwrap_err();
        assert_eq!(denial.code, DenialCode::ClassAccessDenied);
    }

    struct StalledData;

    #[async_trait::async_trait]
    impl DataLayer for StalledData {
        async fn owner_of(
            &self,
            _: Resource,
            _: RecordId,
            _: OwnerKind,
        ) -> Result<Option<UserId>, DataError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn row_by_id(&self, _: Resource, _: RecordId) -> Result<Option<JsonValue>, DataError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn stalled_ownership_lookup_fails_closed() {
        let p = pipeline(Arc::new(StalledData), Arc::new(InMemoryAuditStore::new()));
        let teacher = Principal::new(UserId::new(), Role::Teacher, "t@escola.test");

        let denial = p
            .evaluate(&teacher, &grade_create(), Some(RecordId::new()), today())
            .await
            .unwrap_err();
        assert_eq!(denial.kind, DenialKind::ScopeDenied);
        assert_eq!(denial.code, DenialCode::StudentAccessDenied);
    }

    async fn router_for(principal: Principal, store: Arc<InMemoryDataStore>, hit: Arc<AtomicBool>) -> Router {
        let services = Arc::new(
            AppServices::new(
                store.clone(),
                store,
                Arc::new(InMemoryAuditStore::new()),
                &AppConfig::default(),
            )
            .unwrap(),
        );
        let handler = move |Json(body): Json<JsonValue>| {
            let hit = Arc::clone(&hit);
            async move {
                hit.store(true, Ordering::SeqCst);
                Json(body)
            }
        };
        Router::new()
            .route(
                "/grades",
                post(handler.layer(
                    RequireAccess::new(Resource::Grades, Action::Create)
                        .scoped(Resource::Students, IdSource::Body("student_id")),
                )),
            )
            .route(
                "/grades/list",
                get((|| async { "ok" }).layer(
                    RequireAccess::new(Resource::Grades, Action::Read)
                        .scoped(Resource::Students, IdSource::Query("studentId")),
                )),
            )
            .layer(Extension(services))
            .layer(Extension(PrincipalContext::new(principal)))
    }

    fn post_grade(student: RecordId) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/grades")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"student_id": student.to_string(), "score": 17}).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn denied_request_never_reaches_the_handler() {
        let s = school().await;
        let hit = Arc::new(AtomicBool::new(false));
        let teacher_a = Principal::new(s.teacher_a, Role::Teacher, "a@escola.test");
        let app = router_for(teacher_a, s.store.clone(), hit.clone()).await;

        let res = app.oneshot(post_grade(s.student_b)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(!hit.load(Ordering::SeqCst));

        let annotation = res.extensions().get::<AuditAnnotation>().unwrap();
        assert!(annotation.denial.is_some());
        assert!(!annotation.recorded);
    }

    #[tokio::test]
    async fn allowed_request_sees_the_original_body() {
        let s = school().await;
        let hit = Arc::new(AtomicBool::new(false));
        let teacher_a = Principal::new(s.teacher_a, Role::Teacher, "a@escola.test");
        let app = router_for(teacher_a, s.store.clone(), hit.clone()).await;

        let res = app.oneshot(post_grade(s.student_a)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(hit.load(Ordering::SeqCst));

        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["score"], 17);
    }

    #[tokio::test]
    async fn scoped_route_without_identifier_is_a_bad_request() {
        let s = school().await;
        let guardian = Principal::new(s.guardian, Role::Guardian, "g@escola.test");
        let app = router_for(guardian, s.store.clone(), Arc::new(AtomicBool::new(false))).await;

        let req = Request::builder()
            .uri("/grades/list")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
