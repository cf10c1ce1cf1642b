use axum::{Router, handler::Handler, routing::get};

use campus_auth::{Action, Resource};

use crate::authz::RequireAccess;

pub mod attendance;
pub mod audit_logs;
pub mod classes;
pub mod dashboard;
pub mod grades;
pub mod guardians;
pub mod payments;
pub mod rbac;
pub mod records;
pub mod staff;
pub mod student_records;
pub mod students;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        // Open to every known role; the age guard still applies.
        .route(
            "/whoami",
            get(system::whoami.layer(RequireAccess::new(Resource::Dashboard, Action::Read))),
        )
        .nest("/students", students::router())
        .nest("/guardians", guardians::router())
        .nest("/staff", staff::router())
        .nest("/classes", classes::router())
        .nest("/grades", grades::router())
        .nest("/attendance", attendance::router())
        .nest("/payments", payments::router())
        .nest("/users", users::router())
        .nest("/dashboard", dashboard::router())
        .nest("/audit-logs", audit_logs::router())
        .nest("/admin/rbac", rbac::router())
}
