use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical alert status values
pub mod alert_status {
    pub const NEW: &str = "new";
    pub const ACKNOWLEDGED: &str = "acknowledged";
    pub const RESOLVED: &str = "resolved";
}

/// Canonical alert severity values
#[allow(dead_code)]
pub mod alert_severity {
    pub const INFO: &str = "info";
    pub const WARNING: &str = "warning";
    pub const CRITICAL: &str = "critical";
}

/// Alert types raised by the policy core
pub mod alert_type {
    pub const SYNC_FAILURE: &str = "sync_failure";
    pub const POLICY_DIVERGENCE: &str = "policy_divergence";
}

/// PolicyAlert is raised when sync detects divergence or repeated failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAlert {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
    pub alert_type: String,
    pub severity: String,
    pub details: serde_json::Value,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NewAlert holds the columns written when an alert is raised
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub policy_id: Option<i64>,
    pub device_id: Option<i64>,
    pub alert_type: &'static str,
    pub severity: &'static str,
    pub details: serde_json::Value,
}

/// AlertFilter narrows alert listings; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub policy_id: Option<i64>,
    #[serde(default)]
    pub device_id: Option<i64>,
}
