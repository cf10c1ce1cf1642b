//! Payment records.
//!
//! Treasury staff bypass ownership on every route here; guardians only see
//! payments of their own wards.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    handler::Handler,
    response::Response,
    routing::get,
};
use serde_json::Value as JsonValue;

use campus_auth::{Action, Resource};

use crate::app::routes::records;
use crate::app::routes::student_records::{self, StudentQuery};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_payments.layer(student_records::list_access(Resource::Payments)))
                .post(create_payment.layer(student_records::create_access(Resource::Payments))),
        )
        .route(
            "/:id",
            get(get_payment.layer(student_records::record_access(Resource::Payments, Action::Read)))
                .put(update_payment.layer(student_records::update_access(Resource::Payments)))
                .delete(delete_payment.layer(student_records::record_access(Resource::Payments, Action::Delete))),
        )
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<StudentQuery>,
) -> Response {
    student_records::list_for_student(&services, Resource::Payments, query).await
}

pub async fn create_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Response {
    records::create(&services, Resource::Payments, body).await
}

pub async fn get_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::fetch(&services, Resource::Payments, &id).await
}

pub async fn update_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> Response {
    records::update(&services, Resource::Payments, &id, patch).await
}

pub async fn delete_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    records::remove(&services, Resource::Payments, &id).await
}
