use axum::{
    body::Body,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::tracing::{http_span, request_id_middleware};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, app, customer};
use crate::middleware::access_gate;
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(app::health_check))
        // Operator surface
        .route("/admin/login", post(admin::login))
        .route("/admin/logout", post(admin::logout))
        .route("/dashboard", get(admin::dashboard))
        .route("/dashboard/*rest", get(admin::dashboard))
        .route("/api/admin/session", get(admin::session_info))
        // Customer surface
        .route("/account", get(customer::account))
        .route("/account/login", post(customer::login))
        .route("/account/register", post(customer::register))
        .route("/account/logout", post(customer::logout))
        .route("/account/activate", post(customer::activate))
        .fallback(app::not_found)
        .layer(from_fn_with_state(state.clone(), access_gate))
        .layer(TraceLayer::new_for_http().make_span_with(http_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
