use axum::{extract::State, response::Response, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::deploy::OpSuccess;
use crate::scheduler::{SchedulerConfigUpdate, SchedulerStatus};
use crate::AppState;

use super::{op_response, ApiError, MessageResponse};

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub policy_id: Option<i64>,
    #[serde(default)]
    pub device_id: Option<i64>,
}

/// Re-check deployed policies against their devices; body is optional
pub async fn sync_policies(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SyncRequest>>,
) -> Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    op_response(state.engine.sync_policy_status(req.policy_id, req.device_id).await)
}

pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.get_status())
}

pub async fn update_scheduler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SchedulerConfigUpdate>,
) -> Json<SchedulerStatus> {
    state.scheduler.set_config(&update).await;
    Json(state.scheduler.get_status())
}

pub async fn start_scheduler(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, ApiError> {
    if state.scheduler.start() {
        Ok(MessageResponse::new("scheduler started"))
    } else {
        Err(ApiError::conflict("scheduler is already running or disabled"))
    }
}

pub async fn stop_scheduler(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, ApiError> {
    if state.scheduler.stop().await {
        Ok(MessageResponse::new("scheduler stopped"))
    } else {
        Err(ApiError::conflict("scheduler is not running"))
    }
}

pub async fn force_sync(State(state): State<Arc<AppState>>) -> Response {
    let result = state.scheduler.force_sync().await;
    op_response(Ok(OpSuccess::data(result)))
}
