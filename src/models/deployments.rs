use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical deployment status values
pub mod deployment_status {
    pub const PENDING: &str = "pending";
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
}

/// What a deployment row records: a push of the policy or an undo of it
pub mod deployment_operation {
    pub const DEPLOY: &str = "deploy";
    pub const ROLLBACK: &str = "rollback";
}

/// PolicyDeployment is one deploy or rollback attempt of a policy on a device.
/// The newest row for a (policy, device) pair is that pair's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDeployment {
    pub id: i64,
    pub policy_id: i64,
    pub device_id: i64,
    pub operation: String,
    pub status: String,
    pub deployed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_by: Option<i64>,
    pub config_snapshot: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// NewDeployment holds the columns written when an attempt starts
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub policy_id: i64,
    pub device_id: i64,
    pub operation: &'static str,
    pub deployed_by: Option<i64>,
    pub config_snapshot: serde_json::Value,
    pub result: serde_json::Value,
}

fn default_true() -> bool {
    true
}

/// DeployOptions controls the optional steps of a deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOptions {
    #[serde(default = "default_true")]
    pub verify_before_deploy: bool,
    #[serde(default = "default_true")]
    pub verify_after_deploy: bool,
    #[serde(default = "default_true")]
    pub enable_rollback: bool,
    #[serde(default = "default_true")]
    pub log_deployment: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            verify_before_deploy: true,
            verify_after_deploy: true,
            enable_rollback: true,
            log_deployment: true,
        }
    }
}
