use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical policy lifecycle values
pub mod policy_status {
    pub const DRAFT: &str = "draft";
    pub const ACTIVE: &str = "active";
    pub const DELETED: &str = "deleted";
}

/// Canonical policy type values
pub mod policy_type {
    pub const IPSEC: &str = "ipsec";
    pub const ALLOW_ALL: &str = "allow_all";
    pub const IPSEC_ONLY: &str = "ipsec_only";
    pub const IPSEC_SPECIFIC_IP: &str = "ipsec_specific_ip";

    pub const ALL: &[&str] = &[IPSEC, ALLOW_ALL, IPSEC_ONLY, IPSEC_SPECIFIC_IP];
}

/// Policy is a firewall/IPSec policy with a structured config document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub name: String,
    pub policy_type: String,
    pub description: String,
    pub config: serde_json::Value,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_policy_status() -> String {
    policy_status::DRAFT.to_string()
}

/// CreatePolicyRequest for creating a policy
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub policy_type: String,
    #[serde(default)]
    pub description: String,
    pub config: serde_json::Value,
    #[serde(default = "default_policy_status")]
    pub status: String,
    #[serde(default)]
    pub created_by: Option<i64>,
}
