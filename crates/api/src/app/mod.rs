//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, matrix, audit recorder and pipeline shared by every request
//! - `routes/`: HTTP routes + handlers (one file per resource family)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::audit;
use crate::middleware::{self, ClaimsVerifier};

pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
///
/// Request order on protected routes: principal middleware, then the audit
/// completion layer, then the per-route access guard, then the handler.
pub fn build_app(services: Arc<AppServices>, verifier: Arc<dyn ClaimsVerifier>) -> Router {
    let auth_state = middleware::AuthState { verifier };

    let protected = routes::router()
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&services),
            audit::audit_middleware,
        ))
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
