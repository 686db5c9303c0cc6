use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical audit action values
pub mod audit_action {
    pub const DEPLOY: &str = "deploy";
    pub const ROLLBACK: &str = "rollback";
    pub const VERIFY: &str = "verify";
}

/// PolicyAuditLog records who ran which policy operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAuditLog {
    pub id: i64,
    pub policy_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
