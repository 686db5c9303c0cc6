use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical device connection protocol values
pub mod connection_protocol {
    pub const SSH: &str = "ssh";
    pub const TELNET: &str = "telnet";
    pub const SNMP: &str = "snmp";
}

/// Device is a managed network device (router, switch, firewall).
/// Inventory is maintained elsewhere; the policy core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub manufacturer: String,
    pub model: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub snmp_community: String,
    pub port: i64,
    pub connection_protocol: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_port() -> i64 {
    22
}

fn default_protocol() -> String {
    connection_protocol::SSH.to_string()
}

/// CreateDeviceRequest for registering a device
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub ip_address: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub snmp_community: String,
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default = "default_protocol")]
    pub connection_protocol: String,
}
