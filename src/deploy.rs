//! Policy deployment orchestration.
//!
//! The engine pushes a policy to a device, verifies it, rolls it back and
//! re-checks deployed policies against live device state. Every attempt is
//! recorded as a `policy_deployments` row before the device is touched; the
//! newest row of a (policy, device) pair is that pair's current state.
//!
//! Public operations never return raw errors. They return [`OpResult`], whose
//! two sides serialize to the `{message|data}` and `{error}` payloads.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::connector::{CommandError, Connector, ConnectorError};
use crate::db::Store;
use crate::models::*;
use crate::pool::ConnectionPool;
use crate::validation::{parse_config, validate_policy, ValidationError};
use crate::vendor::{profile, select_vendor, PolicyStatus, TunnelState, VendorProfile};

pub type OpResult = Result<OpSuccess, OpFailure>;

/// Success payload: always carries a message or data, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct OpSuccess {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<i64>,
}

impl OpSuccess {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            data: None,
            deployment_id: None,
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            message: None,
            data: Some(data),
            deployment_id: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn with_deployment(mut self, id: i64) -> Self {
        self.deployment_id = Some(id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad input or a failed precondition
    InvalidInput,
    NotFound,
    /// Policy objects missing from the device configuration
    Mismatch,
    /// The device could not be reached or rejected a command
    Device,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpFailure {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<i64>,
    #[serde(skip)]
    pub kind: FailureKind,
}

impl OpFailure {
    fn new(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            deployment_id: None,
            kind,
        }
    }

    fn with_deployment(mut self, id: i64) -> Self {
        self.deployment_id = Some(id);
        self
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("policy not found: {0}")]
    PolicyNotFound(i64),
    #[error("device not found: {0}")]
    DeviceNotFound(i64),
    #[error("only active policies can be deployed, current status: {0}")]
    PolicyNotActive(String),
    #[error("no deployment record found")]
    NoDeployment,
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("cannot connect to device: {0}")]
    CannotConnect(String),
    #[error("device {0} is managed over snmp and has no CLI for policy operations")]
    CliRequired(String),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    fn kind(&self) -> FailureKind {
        match self {
            EngineError::PolicyNotFound(_) | EngineError::DeviceNotFound(_) | EngineError::NoDeployment => {
                FailureKind::NotFound
            }
            EngineError::PolicyNotActive(_) | EngineError::Validation(_) | EngineError::CliRequired(_) => {
                FailureKind::InvalidInput
            }
            EngineError::CannotConnect(_) | EngineError::Connector(_) | EngineError::Command(_) => FailureKind::Device,
            EngineError::Store(_) => FailureKind::Internal,
        }
    }
}

impl From<EngineError> for OpFailure {
    fn from(err: EngineError) -> Self {
        OpFailure::new(err.kind(), err.to_string())
    }
}

/// Outcome of one (policy, device) check during a sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncDetail {
    pub policy_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    pub device_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub not_found: usize,
    pub details: Vec<SyncDetail>,
}

enum SyncOutcome {
    Checked,
    Failed,
    NotFound,
}

pub struct PolicyDeployEngine {
    store: Store,
    pool: Arc<ConnectionPool>,
}

impl PolicyDeployEngine {
    pub fn new(store: Store, pool: Arc<ConnectionPool>) -> Self {
        Self { store, pool }
    }

    async fn load_policy(&self, id: i64) -> Result<Policy, EngineError> {
        self.store.get_policy(id).await?.ok_or(EngineError::PolicyNotFound(id))
    }

    async fn load_device(&self, id: i64) -> Result<Device, EngineError> {
        self.store.get_device(id).await?.ok_or(EngineError::DeviceNotFound(id))
    }

    /// Policy operations need a CLI; SNMP devices are read-only.
    async fn load_cli_device(&self, id: i64) -> Result<Device, EngineError> {
        let device = self.load_device(id).await?;
        if device.connection_protocol.trim().eq_ignore_ascii_case(connection_protocol::SNMP) {
            return Err(EngineError::CliRequired(device.name));
        }
        Ok(device)
    }

    fn profile_for(device: &Device) -> &'static VendorProfile {
        profile(select_vendor(&device.manufacturer, &device.model))
    }

    async fn audit(&self, policy_id: i64, user_id: Option<i64>, action: &str, details: Value) {
        if let Err(e) = self.store.log_policy_action(policy_id, user_id, action, &details).await {
            warn!(policy_id, action, "Failed to write audit log: {:#}", e);
        }
    }

    async fn finish(&self, deployment_id: i64, status: &str, result: Value) {
        if let Err(e) = self.store.finish_deployment(deployment_id, status, &result).await {
            error!(deployment_id, status, "Failed to record deployment outcome: {:#}", e);
        }
    }

    /// Run `f` on a connected session. A session opened here is closed again;
    /// one that was already warm (monitoring) stays open.
    async fn on_device<T, F>(&self, device: &Device, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Connector) -> Result<T, CommandError> + Send + 'static,
        T: Send + 'static,
    {
        let mut lease = self.pool.checkout(device).await;
        let warm = lease.is_connected();
        lease
            .run(|conn| conn.connect())
            .await
            .and_then(|r| r)
            .map_err(|e| EngineError::CannotConnect(e.to_string()))?;
        let result = lease
            .run(move |conn| {
                let result = f(conn);
                if result.is_err() {
                    conn.disconnect();
                }
                result
            })
            .await;
        if !warm {
            let _ = lease.run(|conn| conn.disconnect()).await;
        }
        Ok(result??)
    }

    // ========== Deploy ==========

    pub async fn deploy(
        &self,
        policy_id: i64,
        device_id: i64,
        operator_id: Option<i64>,
        options: &DeployOptions,
    ) -> OpResult {
        let result = self.try_deploy(policy_id, device_id, operator_id, options).await;
        match &result {
            Ok(_) => info!(policy_id, device_id, "Policy deployed"),
            Err(f) => error!(policy_id, device_id, "Policy deployment failed: {}", f.error),
        }
        result
    }

    async fn try_deploy(
        &self,
        policy_id: i64,
        device_id: i64,
        operator_id: Option<i64>,
        options: &DeployOptions,
    ) -> OpResult {
        let policy = self.load_policy(policy_id).await?;
        if policy.status != policy_status::ACTIVE {
            return Err(EngineError::PolicyNotActive(policy.status).into());
        }
        let device = self.load_cli_device(device_id).await?;

        // Offline dry run: shape validation plus command generation, no device I/O
        let checked = if options.verify_before_deploy {
            validate_policy(&policy.policy_type, &policy.config)
        } else {
            parse_config(&policy.config)
        };
        let config = checked.map_err(EngineError::from)?;

        let profile = Self::profile_for(&device);
        let commands = profile.deploy_commands(policy.id, &config);
        let rollback_commands = profile.rollback_commands(policy.id, &config);
        let marker = options
            .verify_after_deploy
            .then(|| profile.policy_marker(policy.id, &config));

        let row = self
            .store
            .create_deployment(&NewDeployment {
                policy_id,
                device_id,
                operation: deployment_operation::DEPLOY,
                deployed_by: operator_id,
                config_snapshot: policy.config.clone(),
                result: json!({ "message": "deployment started" }),
            })
            .await
            .map_err(EngineError::from)?;

        if options.log_deployment {
            self.audit(
                policy_id,
                operator_id,
                audit_action::DEPLOY,
                json!({
                    "deployment_id": row.id,
                    "device_id": device_id,
                    "device_name": device.name,
                    "vendor": profile.vendor,
                    "command_count": commands.len(),
                }),
            )
            .await;
        }

        let mut lease = self.pool.checkout(&device).await;
        let warm = lease.is_connected();
        let connected = lease.run(|conn| conn.connect()).await.and_then(|r| r);
        if let Err(e) = connected {
            let error = EngineError::CannotConnect(e.to_string());
            self.finish(
                row.id,
                deployment_status::FAILED,
                json!({
                    "error": error.to_string(),
                    "rollback": "skipped, nothing was pushed",
                }),
            )
            .await;
            return Err(OpFailure::from(error).with_deployment(row.id));
        }

        let command_count = commands.len();
        let pushed = lease
            .run(move |conn| -> Result<Option<PolicyStatus>, String> {
                conn.execute_all(&commands).map_err(|e| e.to_string())?;
                if let Some(marker) = marker {
                    match conn.config_contains(&marker) {
                        Ok(true) => {}
                        Ok(false) => {
                            return Err(format!(
                                "post-deploy verification failed: {} not present in device configuration",
                                marker
                            ))
                        }
                        Err(e) => return Err(format!("post-deploy verification failed: {}", e)),
                    }
                }
                Ok(conn.policy_status().ok())
            })
            .await
            .unwrap_or_else(|e| Err(e.to_string()));

        match pushed {
            Ok(live) => {
                if !warm {
                    let _ = lease.run(|conn| conn.disconnect()).await;
                }
                let data = json!({
                    "command_count": command_count,
                    "device_status": live,
                    "deployed_at": Utc::now(),
                });
                self.finish(
                    row.id,
                    deployment_status::SUCCESS,
                    json!({ "message": "policy deployed successfully", "details": data }),
                )
                .await;
                Ok(OpSuccess::message("policy deployed successfully")
                    .with_data(data)
                    .with_deployment(row.id))
            }
            Err(reason) => {
                let mut error = format!("deployment failed: {}", reason);
                let mut result = json!({ "error": reason });

                if options.enable_rollback {
                    match self
                        .auto_rollback(&policy, &device, operator_id, &mut lease, rollback_commands)
                        .await
                    {
                        Ok((rollback_id, errors)) if errors.is_empty() => {
                            error.push_str(", rolled back automatically");
                            result["rollback"] = json!({ "deployment_id": rollback_id, "status": deployment_status::SUCCESS });
                        }
                        Ok((rollback_id, errors)) => {
                            error.push_str(&format!(", automatic rollback failed: {}", errors.join("; ")));
                            result["rollback"] = json!({
                                "deployment_id": rollback_id,
                                "status": deployment_status::FAILED,
                                "errors": errors,
                            });
                        }
                        Err(e) => {
                            error.push_str(&format!(", automatic rollback failed: {}", e));
                            result["rollback"] = json!({ "status": deployment_status::FAILED, "error": e.to_string() });
                        }
                    }
                }

                if !warm {
                    let _ = lease.run(|conn| conn.disconnect()).await;
                }
                result["error"] = json!(error);
                self.finish(row.id, deployment_status::FAILED, result).await;
                Err(OpFailure::new(FailureKind::Device, error).with_deployment(row.id))
            }
        }
    }

    /// Undo a failed deploy on the session that attempted it. The rollback is
    /// recorded as its own deployment row.
    async fn auto_rollback(
        &self,
        policy: &Policy,
        device: &Device,
        operator_id: Option<i64>,
        lease: &mut crate::pool::DeviceLease,
        commands: Vec<String>,
    ) -> Result<(i64, Vec<String>), EngineError> {
        let row = self
            .store
            .create_deployment(&NewDeployment {
                policy_id: policy.id,
                device_id: device.id,
                operation: deployment_operation::ROLLBACK,
                deployed_by: operator_id,
                config_snapshot: policy.config.clone(),
                result: json!({ "message": "automatic rollback started" }),
            })
            .await?;

        let errors = run_rollback(lease, commands).await;
        if errors.is_empty() {
            self.finish(
                row.id,
                deployment_status::SUCCESS,
                json!({ "message": "policy rolled back automatically" }),
            )
            .await;
        } else {
            self.finish(row.id, deployment_status::FAILED, json!({ "error": errors.join("; ") }))
                .await;
        }
        Ok((row.id, errors))
    }

    // ========== Rollback ==========

    pub async fn rollback(&self, policy_id: i64, device_id: i64, operator_id: Option<i64>) -> OpResult {
        let result = self.try_rollback(policy_id, device_id, operator_id).await;
        match &result {
            Ok(_) => info!(policy_id, device_id, "Policy rolled back"),
            Err(f) => error!(policy_id, device_id, "Policy rollback failed: {}", f.error),
        }
        result
    }

    async fn try_rollback(&self, policy_id: i64, device_id: i64, operator_id: Option<i64>) -> OpResult {
        self.load_policy(policy_id).await?;
        let device = self.load_cli_device(device_id).await?;
        let latest = self
            .store
            .latest_deployment(policy_id, device_id)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::NoDeployment)?;

        let config = parse_config(&latest.config_snapshot).map_err(EngineError::from)?;
        let commands = Self::profile_for(&device).rollback_commands(policy_id, &config);

        let row = self
            .store
            .create_deployment(&NewDeployment {
                policy_id,
                device_id,
                operation: deployment_operation::ROLLBACK,
                deployed_by: operator_id,
                config_snapshot: latest.config_snapshot.clone(),
                result: json!({ "message": "rollback started", "rollback_of": latest.id }),
            })
            .await
            .map_err(EngineError::from)?;

        self.audit(
            policy_id,
            operator_id,
            audit_action::ROLLBACK,
            json!({ "deployment_id": row.id, "rollback_of": latest.id, "device_id": device_id, "device_name": device.name }),
        )
        .await;

        let mut lease = self.pool.checkout(&device).await;
        let warm = lease.is_connected();
        if let Err(e) = lease.run(|conn| conn.connect()).await.and_then(|r| r) {
            let error = EngineError::CannotConnect(e.to_string());
            self.finish(row.id, deployment_status::FAILED, json!({ "error": error.to_string() }))
                .await;
            return Err(OpFailure::from(error).with_deployment(row.id));
        }

        let errors = run_rollback(&mut lease, commands).await;
        if !warm {
            let _ = lease.run(|conn| conn.disconnect()).await;
        }

        if errors.is_empty() {
            self.finish(
                row.id,
                deployment_status::SUCCESS,
                json!({ "message": "policy rolled back successfully", "rollback_of": latest.id }),
            )
            .await;
            Ok(OpSuccess::message("policy rolled back successfully").with_deployment(row.id))
        } else {
            let error = format!("rollback failed: {}", errors.join("; "));
            self.finish(
                row.id,
                deployment_status::FAILED,
                json!({ "error": error, "rollback_of": latest.id }),
            )
            .await;
            Err(OpFailure::new(FailureKind::Device, error).with_deployment(row.id))
        }
    }

    // ========== Status / verify ==========

    /// Query the device live and merge its state into the latest deployment's
    /// result. The deployment's status is never changed here.
    pub async fn get_status(&self, policy_id: i64, device_id: i64) -> OpResult {
        let result = self.try_get_status(policy_id, device_id).await;
        if let Err(f) = &result {
            warn!(policy_id, device_id, "Policy status query failed: {}", f.error);
        }
        result
    }

    async fn try_get_status(&self, policy_id: i64, device_id: i64) -> OpResult {
        let policy = self.load_policy(policy_id).await?;
        let device = self.load_cli_device(device_id).await?;
        let latest = self
            .store
            .latest_deployment(policy_id, device_id)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::NoDeployment)?;

        let live = self.on_device(&device, |conn| conn.policy_status()).await?;
        let device_status = device_status_value(&policy, &device, &live);
        self.merge_device_status(&latest, &device_status)
            .await
            .map_err(EngineError::from)?;

        Ok(OpSuccess::data(json!({
            "deployment_id": latest.id,
            "deployment_status": latest.status,
            "device_status": device_status,
        }))
        .with_deployment(latest.id))
    }

    async fn merge_device_status(&self, deployment: &PolicyDeployment, device_status: &Value) -> anyhow::Result<()> {
        let mut result = match &deployment.result {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(Value::Null) | None => json!({}),
            Some(other) => json!({ "message": other }),
        };
        result["device_status"] = device_status.clone();
        self.store.update_deployment_result(deployment.id, &result).await
    }

    /// Check that the policy's objects are present on the device. Read-only
    /// on the device; works whether or not the policy was ever deployed.
    pub async fn verify(&self, policy_id: i64, device_id: i64, operator_id: Option<i64>) -> OpResult {
        let result = self.try_verify(policy_id, device_id, operator_id).await;
        if let Err(f) = &result {
            warn!(policy_id, device_id, "Policy verification failed: {}", f.error);
        }
        result
    }

    async fn try_verify(&self, policy_id: i64, device_id: i64, operator_id: Option<i64>) -> OpResult {
        let policy = self.load_policy(policy_id).await?;
        let device = self.load_cli_device(device_id).await?;
        let config = validate_policy(&policy.policy_type, &policy.config).map_err(EngineError::from)?;
        let marker = Self::profile_for(&device).policy_marker(policy.id, &config);

        let probe_marker = marker.clone();
        let (present, live) = self
            .on_device(&device, move |conn| {
                let present = conn.config_contains(&probe_marker)?;
                let live = conn.policy_status()?;
                Ok((present, live))
            })
            .await?;

        let data = json!({
            "config_present": present,
            "marker": marker,
            "device_status": device_status_value(&policy, &device, &live),
        });
        self.audit(
            policy_id,
            operator_id,
            audit_action::VERIFY,
            json!({ "device_id": device_id, "device_name": device.name, "config_present": present }),
        )
        .await;

        if present {
            Ok(OpSuccess::message("policy configuration verified on device").with_data(data))
        } else {
            Err(OpFailure::new(
                FailureKind::Mismatch,
                format!("verification failed: {} not present in device configuration", marker),
            ))
        }
    }

    // ========== Sync ==========

    /// `sync_all` wrapped in the operation payload contract
    pub async fn sync_policy_status(&self, policy_id: Option<i64>, device_id: Option<i64>) -> OpResult {
        match self.sync_all(policy_id, device_id).await {
            Ok(summary) => Ok(OpSuccess::message(format!(
                "sync finished: {} checked, {} failed, {} not found",
                summary.success, summary.failed, summary.not_found
            ))
            .with_data(json!(summary))),
            Err(e) => {
                error!("Policy sync failed: {:#}", e);
                Err(OpFailure::new(FailureKind::Internal, format!("sync failed: {:#}", e)))
            }
        }
    }

    /// Re-check every deployed (policy, device) pair against the live device.
    /// Pairs run concurrently; one failing device never aborts the batch.
    pub async fn sync_all(&self, policy_id: Option<i64>, device_id: Option<i64>) -> anyhow::Result<SyncSummary> {
        let deployments = self.store.list_current_deployed(policy_id, device_id).await?;
        let outcomes = join_all(deployments.iter().map(|d| self.sync_one(d))).await;

        let mut summary = SyncSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for (outcome, detail) in outcomes {
            match outcome {
                SyncOutcome::Checked => summary.success += 1,
                SyncOutcome::Failed => summary.failed += 1,
                SyncOutcome::NotFound => summary.not_found += 1,
            }
            summary.details.push(detail);
        }
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            not_found = summary.not_found,
            "Policy sync finished"
        );
        Ok(summary)
    }

    async fn sync_one(&self, deployment: &PolicyDeployment) -> (SyncOutcome, SyncDetail) {
        let mut detail = SyncDetail {
            policy_id: deployment.policy_id,
            policy_name: None,
            device_id: deployment.device_id,
            device_name: None,
            status: "unknown".to_string(),
            error: None,
        };

        let loaded = tokio::try_join!(
            self.load_policy(deployment.policy_id),
            self.load_device(deployment.device_id)
        );
        let (policy, device) = match loaded {
            Ok(pair) => pair,
            Err(e @ (EngineError::PolicyNotFound(_) | EngineError::DeviceNotFound(_))) => {
                detail.status = "not_found".to_string();
                detail.error = Some(e.to_string());
                return (SyncOutcome::NotFound, detail);
            }
            Err(e) => {
                detail.status = "error".to_string();
                detail.error = Some(e.to_string());
                return (SyncOutcome::Failed, detail);
            }
        };
        detail.policy_name = Some(policy.name.clone());
        detail.device_name = Some(device.name.clone());

        let live = match self.on_device(&device, |conn| conn.policy_status()).await {
            Ok(live) => live,
            Err(e) => {
                warn!(policy_id = policy.id, device = %device.name, "Sync check failed: {}", e);
                detail.status = "error".to_string();
                detail.error = Some(e.to_string());
                return (SyncOutcome::Failed, detail);
            }
        };

        let device_status = device_status_value(&policy, &device, &live);
        if let Err(e) = self.merge_device_status(deployment, &device_status).await {
            detail.status = "error".to_string();
            detail.error = Some(format!("{:#}", e));
            return (SyncOutcome::Failed, detail);
        }
        if live.status == TunnelState::Inactive {
            self.raise_divergence(&policy, &device, deployment.id).await;
        }

        detail.status = serde_json::to_value(live.status)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "unknown".to_string());
        (SyncOutcome::Checked, detail)
    }

    /// At most one open divergence alert per pair
    async fn raise_divergence(&self, policy: &Policy, device: &Device, deployment_id: i64) {
        match self
            .store
            .find_open_alert(Some(policy.id), Some(device.id), alert_type::POLICY_DIVERGENCE)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                let alert = NewAlert {
                    policy_id: Some(policy.id),
                    device_id: Some(device.id),
                    alert_type: alert_type::POLICY_DIVERGENCE,
                    severity: alert_severity::WARNING,
                    details: json!({
                        "message": format!("policy {} is deployed but inactive on {}", policy.name, device.name),
                        "deployment_id": deployment_id,
                    }),
                };
                match self.store.create_alert(&alert).await {
                    Ok(a) => warn!(alert_id = a.id, policy_id = policy.id, device = %device.name, "Policy divergence detected"),
                    Err(e) => error!("Failed to create divergence alert: {:#}", e),
                }
            }
            Err(e) => error!("Failed to look up open alerts: {:#}", e),
        }
    }
}

/// Best-effort undo on a leased session; reconnects first when the deploy
/// broke the session. Returns the errors encountered.
async fn run_rollback(lease: &mut crate::pool::DeviceLease, commands: Vec<String>) -> Vec<String> {
    lease
        .run(move |conn| {
            if let Err(e) = conn.connect() {
                return vec![e.to_string()];
            }
            conn.execute_best_effort(&commands)
                .into_iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| vec![e.to_string()])
}

fn device_status_value(policy: &Policy, device: &Device, live: &PolicyStatus) -> Value {
    json!({
        "status": live.status,
        "details": live.details,
        "check_time": Utc::now(),
        "policy_id": policy.id,
        "policy_name": policy.name,
        "device_id": device.id,
        "device_name": device.name,
    })
}
