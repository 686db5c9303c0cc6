use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::*;
use crate::validation::validate_policy;
use crate::AppState;

use super::{created, op_response, ApiError};

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub device_id: i64,
    #[serde(default)]
    pub operator_id: Option<i64>,
    #[serde(default)]
    pub options: Option<DeployOptions>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceOperationRequest {
    pub device_id: i64,
    #[serde(default)]
    pub operator_id: Option<i64>,
}

/// Status and/or config change; absent fields are left alone
#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    pub device_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i32,
}

fn default_history_limit() -> i32 {
    50
}

/// Create a policy; active policies must carry a valid config
pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePolicyRequest>,
) -> Result<(axum::http::StatusCode, Json<Policy>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if !policy_type::ALL.contains(&req.policy_type.as_str()) {
        return Err(ApiError::bad_request(format!("unknown policy type: {}", req.policy_type)));
    }
    if ![policy_status::DRAFT, policy_status::ACTIVE].contains(&req.status.as_str()) {
        return Err(ApiError::bad_request("status must be draft or active"));
    }
    if req.status == policy_status::ACTIVE {
        validate_policy(&req.policy_type, &req.config).map_err(|e| ApiError::bad_request(e.to_string()))?;
    }

    let policy = state.store.create_policy(&req).await?;
    Ok(created(policy))
}

pub async fn get_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Policy>, ApiError> {
    let policy = state
        .store
        .get_policy(id)
        .await?
        .ok_or_else(|| ApiError::not_found("policy"))?;
    Ok(Json(policy))
}

/// Update a policy. A policy only becomes (or stays) active with a valid config.
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePolicyRequest>,
) -> Result<Json<Policy>, ApiError> {
    let policy = state
        .store
        .get_policy(id)
        .await?
        .ok_or_else(|| ApiError::not_found("policy"))?;

    let status = req.status.unwrap_or_else(|| policy.status.clone());
    let known = [policy_status::DRAFT, policy_status::ACTIVE, policy_status::DELETED];
    if !known.contains(&status.as_str()) {
        return Err(ApiError::bad_request(format!("unknown policy status: {}", status)));
    }
    let config = req.config.unwrap_or_else(|| policy.config.clone());
    if status == policy_status::ACTIVE {
        validate_policy(&policy.policy_type, &config).map_err(|e| ApiError::bad_request(e.to_string()))?;
    }

    if config != policy.config {
        state.store.update_policy_config(id, &config).await?;
    }
    if status != policy.status {
        state.store.update_policy_status(id, &status).await?;
    }
    let updated = state
        .store
        .get_policy(id)
        .await?
        .ok_or_else(|| ApiError::not_found("policy"))?;
    Ok(Json(updated))
}

pub async fn deploy_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DeployRequest>,
) -> Response {
    let options = req.options.unwrap_or_default();
    op_response(state.engine.deploy(id, req.device_id, req.operator_id, &options).await)
}

pub async fn rollback_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DeviceOperationRequest>,
) -> Response {
    op_response(state.engine.rollback(id, req.device_id, req.operator_id).await)
}

/// Live status of a deployed policy on one device
pub async fn policy_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<DeviceQuery>,
) -> Response {
    op_response(state.engine.get_status(id, q.device_id).await)
}

pub async fn verify_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DeviceOperationRequest>,
) -> Response {
    op_response(state.engine.verify(id, req.device_id, req.operator_id).await)
}

/// Deployment history, newest first
pub async fn list_deployments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<PolicyDeployment>>, ApiError> {
    if state.store.get_policy(id).await?.is_none() {
        return Err(ApiError::not_found("policy"));
    }
    let deployments = state
        .store
        .list_policy_deployments(id, q.limit.clamp(1, 1000))
        .await?;
    Ok(Json(deployments))
}

pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PolicyAuditLog>>, ApiError> {
    let logs = state.store.list_policy_audit_logs(id).await?;
    Ok(Json(logs))
}

pub async fn get_deployment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PolicyDeployment>, ApiError> {
    let deployment = state
        .store
        .get_deployment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("deployment"))?;
    Ok(Json(deployment))
}
