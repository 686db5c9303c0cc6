//! Alert lifecycle: new -> acknowledged -> resolved.

use thiserror::Error;
use tracing::info;

use crate::db::Store;
use crate::models::{alert_status, AlertFilter, PolicyAlert};

pub const DEFAULT_LIST_LIMIT: i32 = 100;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(i64),
    #[error("alert {0} is already resolved")]
    AlreadyResolved(i64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub async fn list(store: &Store, filter: &AlertFilter, limit: Option<i32>) -> Result<Vec<PolicyAlert>, AlertError> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000);
    Ok(store.list_alerts(filter, limit).await?)
}

async fn load(store: &Store, id: i64) -> Result<PolicyAlert, AlertError> {
    store.get_alert(id).await?.ok_or(AlertError::NotFound(id))
}

/// Record who looked at the alert. Acknowledging twice refreshes the
/// operator and time.
pub async fn acknowledge(store: &Store, id: i64, user_id: Option<i64>) -> Result<PolicyAlert, AlertError> {
    let alert = load(store, id).await?;
    if alert.status == alert_status::RESOLVED {
        return Err(AlertError::AlreadyResolved(id));
    }
    store.acknowledge_alert(id, user_id).await?;
    info!(alert_id = id, ?user_id, "Alert acknowledged");
    load(store, id).await
}

/// Resolving is idempotent
pub async fn resolve(store: &Store, id: i64) -> Result<PolicyAlert, AlertError> {
    let alert = load(store, id).await?;
    if alert.status != alert_status::RESOLVED {
        store.resolve_alert(id).await?;
        info!(alert_id = id, "Alert resolved");
    }
    load(store, id).await
}
