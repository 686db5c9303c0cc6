use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::healthcheck))
        // Device routes
        .route("/api/devices", get(handlers::devices::list_devices).post(handlers::devices::create_device))
        .route(
            "/api/devices/:id",
            get(handlers::devices::get_device).put(handlers::devices::update_device),
        )
        .route(
            "/api/devices/:id/monitor",
            post(handlers::devices::start_monitoring).delete(handlers::devices::stop_monitoring),
        )
        .route("/api/devices/:id/metrics", get(handlers::devices::get_metrics))
        .route("/api/devices/:id/connection", get(handlers::devices::get_connection))
        .route("/api/devices/:id/connect", post(handlers::devices::test_connection))
        // Policy routes
        .route("/api/policies", post(handlers::policies::create_policy))
        .route("/api/policies/:id", get(handlers::policies::get_policy).put(handlers::policies::update_policy))
        .route("/api/policies/:id/deploy", post(handlers::policies::deploy_policy))
        .route("/api/policies/:id/rollback", post(handlers::policies::rollback_policy))
        .route("/api/policies/:id/status", get(handlers::policies::policy_status))
        .route("/api/policies/:id/verify", post(handlers::policies::verify_policy))
        .route("/api/policies/:id/deployments", get(handlers::policies::list_deployments))
        .route("/api/policies/:id/audit-logs", get(handlers::policies::list_audit_logs))
        .route("/api/deployments/:id", get(handlers::policies::get_deployment))
        // Sync routes
        .route("/api/sync", post(handlers::sync::sync_policies))
        .route(
            "/api/sync/scheduler",
            get(handlers::sync::scheduler_status).put(handlers::sync::update_scheduler),
        )
        .route("/api/sync/scheduler/start", post(handlers::sync::start_scheduler))
        .route("/api/sync/scheduler/stop", post(handlers::sync::stop_scheduler))
        .route("/api/sync/scheduler/force", post(handlers::sync::force_sync))
        // Alert routes
        .route("/api/alerts", get(handlers::alerts::list_alerts))
        .route("/api/alerts/:id/acknowledge", post(handlers::alerts::acknowledge_alert))
        .route("/api/alerts/:id/resolve", post(handlers::alerts::resolve_alert))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
