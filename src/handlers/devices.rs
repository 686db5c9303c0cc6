use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::*;
use crate::monitor::DeviceSnapshot;
use crate::pool::ConnectionStatus;
use crate::validation::is_valid_ipv4;
use crate::AppState;

use super::{created, ApiError, MessageResponse};

#[derive(Serialize)]
pub struct ConnectionInfo {
    #[serde(flatten)]
    pub status: ConnectionStatus,
    pub monitoring: bool,
}

async fn load_device(state: &AppState, id: i64) -> Result<Device, ApiError> {
    state
        .store
        .get_device(id)
        .await?
        .ok_or_else(|| ApiError::not_found("device"))
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Device>>, ApiError> {
    let devices = state.store.list_devices().await?;
    Ok(Json(devices))
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Device>, ApiError> {
    Ok(Json(load_device(&state, id).await?))
}

/// Register a device
pub async fn create_device(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<CreateDeviceRequest>,
) -> Result<(axum::http::StatusCode, Json<Device>), ApiError> {
    check_device_request(&mut req)?;
    let device = state.store.create_device(&req).await?;
    Ok(created(device))
}

/// Replace a device's inventory fields. Pooled sessions and monitoring pick
/// up the change on their next use.
pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(mut req): Json<CreateDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    check_device_request(&mut req)?;
    let device = state
        .store
        .update_device(id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("device"))?;
    Ok(Json(device))
}

fn check_device_request(req: &mut CreateDeviceRequest) -> Result<(), ApiError> {
    req.connection_protocol = req.connection_protocol.trim().to_ascii_lowercase();

    if req.name.trim().is_empty() || req.ip_address.trim().is_empty() {
        return Err(ApiError::bad_request("name and ip_address are required"));
    }
    if !is_valid_ipv4(&req.ip_address) {
        return Err(ApiError::bad_request("invalid IPv4 address"));
    }
    if !(1..=65535).contains(&req.port) {
        return Err(ApiError::bad_request("port must be between 1 and 65535"));
    }
    let protocols = [
        connection_protocol::SSH,
        connection_protocol::TELNET,
        connection_protocol::SNMP,
    ];
    if !protocols.contains(&req.connection_protocol.as_str()) {
        return Err(ApiError::bad_request("connection_protocol must be ssh, telnet or snmp"));
    }
    Ok(())
}

/// Start background polling and keepalive for a device
pub async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let device = load_device(&state, id).await?;
    if !state.monitor.start_monitoring(device) {
        return Err(ApiError::conflict("device is already monitored"));
    }
    Ok(MessageResponse::new("monitoring started"))
}

pub async fn stop_monitoring(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.monitor.stop_monitoring(id).await {
        return Err(ApiError::not_found("monitoring session"));
    }
    Ok(MessageResponse::new("monitoring stopped"))
}

/// Latest snapshot of a monitored device, or a one-off poll otherwise
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeviceSnapshot>, ApiError> {
    if let Some(snapshot) = state.monitor.latest(id) {
        return Ok(Json(snapshot));
    }
    let device = load_device(&state, id).await?;
    Ok(Json(state.monitor.poll(&device).await))
}

/// One-off connection test outside the pool: connect, report, disconnect
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let device = load_device(&state, id).await?;
    let factory = state.pool.factory().clone();
    let probe = device.clone();
    let connected = tokio::task::spawn_blocking(move || {
        factory
            .create_and_connect(&probe)
            .map(|conn| conn.profile().vendor)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(match connected {
        Some(vendor) => json!({ "device_id": device.id, "reachable": true, "vendor": vendor }),
        None => json!({ "device_id": device.id, "reachable": false }),
    }))
}

pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    load_device(&state, id).await?;
    Ok(Json(ConnectionInfo {
        status: state.pool.connection_status(id),
        monitoring: state.monitor.is_monitoring(id),
    }))
}
