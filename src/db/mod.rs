mod alerts;
mod audit;
mod deployments;
mod devices;
mod policies;
pub(crate) mod row_helpers;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;

use alerts::AlertRepo;
use audit::AuditRepo;
use deployments::DeploymentRepo;
use devices::DeviceRepo;
use policies::PolicyRepo;

/// Typed error for "resource not found" so the API error handler can
/// downcast instead of matching strings.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database; one connection so every query sees the same data
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ========== Devices ==========

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        DeviceRepo::list(&self.pool).await
    }

    pub async fn get_device(&self, id: i64) -> Result<Option<Device>> {
        DeviceRepo::get(&self.pool, id).await
    }

    pub async fn create_device(&self, req: &CreateDeviceRequest) -> Result<Device> {
        DeviceRepo::create(&self.pool, req).await
    }

    pub async fn update_device(&self, id: i64, req: &CreateDeviceRequest) -> Result<Option<Device>> {
        DeviceRepo::update(&self.pool, id, req).await
    }

    // ========== Policies ==========

    pub async fn get_policy(&self, id: i64) -> Result<Option<Policy>> {
        PolicyRepo::get(&self.pool, id).await
    }

    pub async fn create_policy(&self, req: &CreatePolicyRequest) -> Result<Policy> {
        PolicyRepo::create(&self.pool, req).await
    }

    pub async fn update_policy_status(&self, id: i64, status: &str) -> Result<()> {
        PolicyRepo::update_status(&self.pool, id, status).await
    }

    pub async fn update_policy_config(&self, id: i64, config: &serde_json::Value) -> Result<()> {
        PolicyRepo::update_config(&self.pool, id, config).await
    }

    // ========== Deployments ==========

    pub async fn create_deployment(&self, new: &NewDeployment) -> Result<PolicyDeployment> {
        DeploymentRepo::create(&self.pool, new).await
    }

    pub async fn get_deployment(&self, id: i64) -> Result<Option<PolicyDeployment>> {
        DeploymentRepo::get(&self.pool, id).await
    }

    pub async fn latest_deployment(&self, policy_id: i64, device_id: i64) -> Result<Option<PolicyDeployment>> {
        DeploymentRepo::latest(&self.pool, policy_id, device_id).await
    }

    pub async fn list_policy_deployments(&self, policy_id: i64, limit: i32) -> Result<Vec<PolicyDeployment>> {
        DeploymentRepo::list_for_policy(&self.pool, policy_id, limit).await
    }

    #[cfg(test)]
    pub async fn list_pair_deployments(&self, policy_id: i64, device_id: i64) -> Result<Vec<PolicyDeployment>> {
        DeploymentRepo::list_for_pair(&self.pool, policy_id, device_id).await
    }

    pub async fn list_current_deployed(
        &self,
        policy_id: Option<i64>,
        device_id: Option<i64>,
    ) -> Result<Vec<PolicyDeployment>> {
        DeploymentRepo::list_current_deployed(&self.pool, policy_id, device_id).await
    }

    pub async fn finish_deployment(&self, id: i64, status: &str, result: &serde_json::Value) -> Result<()> {
        DeploymentRepo::finish(&self.pool, id, status, result).await
    }

    pub async fn update_deployment_result(&self, id: i64, result: &serde_json::Value) -> Result<()> {
        DeploymentRepo::update_result(&self.pool, id, result).await
    }

    // ========== Alerts ==========

    pub async fn create_alert(&self, new: &NewAlert) -> Result<PolicyAlert> {
        AlertRepo::create(&self.pool, new).await
    }

    pub async fn get_alert(&self, id: i64) -> Result<Option<PolicyAlert>> {
        AlertRepo::get(&self.pool, id).await
    }

    pub async fn list_alerts(&self, filter: &AlertFilter, limit: i32) -> Result<Vec<PolicyAlert>> {
        AlertRepo::list(&self.pool, filter, limit).await
    }

    pub async fn find_open_alert(
        &self,
        policy_id: Option<i64>,
        device_id: Option<i64>,
        alert_type: &str,
    ) -> Result<Option<PolicyAlert>> {
        AlertRepo::find_open(&self.pool, policy_id, device_id, alert_type).await
    }

    pub async fn acknowledge_alert(&self, id: i64, user_id: Option<i64>) -> Result<()> {
        AlertRepo::acknowledge(&self.pool, id, user_id).await
    }

    pub async fn resolve_alert(&self, id: i64) -> Result<()> {
        AlertRepo::resolve(&self.pool, id).await
    }

    // ========== Audit log ==========

    pub async fn log_policy_action(
        &self,
        policy_id: i64,
        user_id: Option<i64>,
        action: &str,
        details: &serde_json::Value,
    ) -> Result<()> {
        AuditRepo::create(&self.pool, policy_id, user_id, action, details).await
    }

    pub async fn list_policy_audit_logs(&self, policy_id: i64) -> Result<Vec<PolicyAuditLog>> {
        AuditRepo::list_for_policy(&self.pool, policy_id).await
    }
}
