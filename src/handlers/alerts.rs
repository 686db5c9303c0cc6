use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::alerts::{self, AlertError};
use crate::models::*;
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub policy_id: Option<i64>,
    #[serde(default)]
    pub device_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::NotFound(_) => ApiError::not_found("alert"),
            AlertError::AlreadyResolved(_) => ApiError::conflict(err.to_string()),
            AlertError::Store(e) => e.into(),
        }
    }
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AlertQuery>,
) -> Result<Json<Vec<PolicyAlert>>, ApiError> {
    let filter = AlertFilter {
        status: q.status,
        policy_id: q.policy_id,
        device_id: q.device_id,
    };
    let list = alerts::list(&state.store, &filter, q.limit).await?;
    Ok(Json(list))
}

pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Option<Json<AcknowledgeRequest>>,
) -> Result<Json<PolicyAlert>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let alert = alerts::acknowledge(&state.store, id, req.user_id).await?;
    Ok(Json(alert))
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PolicyAlert>, ApiError> {
    let alert = alerts::resolve(&state.store, id).await?;
    Ok(Json(alert))
}
