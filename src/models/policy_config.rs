//! Typed view of a policy's `config` document.
//!
//! The stored document stays an opaque `serde_json::Value` so snapshots
//! round-trip exactly; command generation works from this typed view.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_deny() -> String {
    "deny".to_string()
}

fn default_psk_method() -> String {
    "psk".to_string()
}

fn default_phase1_lifetime() -> u32 {
    86400
}

fn default_phase2_lifetime() -> u32 {
    3600
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub firewall_settings: FirewallSettings,
    #[serde(default)]
    pub ipsec_settings: IpsecSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_settings: Option<TunnelSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_restrictions: Option<SourceRestrictions>,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

impl PolicyConfig {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallSettings {
    #[serde(default = "default_deny")]
    pub default_action: String,
    #[serde(default)]
    pub allowed_protocols: Vec<AllowedProtocol>,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            default_action: default_deny(),
            allowed_protocols: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedProtocol {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpsecSettings {
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    #[serde(default)]
    pub lifetime: Lifetime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(default = "default_psk_method")]
    pub method: String,
    #[serde(default)]
    pub psk: String,
}

impl Default for Authentication {
    fn default() -> Self {
        Self {
            method: default_psk_method(),
            psk: String::new(),
        }
    }
}

/// Requested algorithm tokens per IKE phase, e.g. `["aes-256", "sha256", "group14"]`.
/// Empty lists fall back to the documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    #[serde(default)]
    pub phase1: Vec<String>,
    #[serde(default)]
    pub phase2: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    #[serde(default = "default_phase1_lifetime")]
    pub phase1: u32,
    #[serde(default = "default_phase2_lifetime")]
    pub phase2: u32,
}

impl Default for Lifetime {
    fn default() -> Self {
        Self {
            phase1: default_phase1_lifetime(),
            phase2: default_phase2_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelSettings {
    #[serde(default)]
    pub local_subnet: String,
    #[serde(default)]
    pub remote_subnet: String,
    #[serde(default)]
    pub remote_gateway: String,
    /// Interface the crypto map / IPSec policy is bound to; vendor default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_interface: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRestrictions {
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_true")]
    pub dpd_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpd_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpd_timeout: Option<u32>,
    #[serde(default = "default_true")]
    pub nat_traversal: bool,
    #[serde(default = "default_true")]
    pub perfect_forward_secrecy: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            dpd_enabled: true,
            dpd_delay: None,
            dpd_timeout: None,
            nat_traversal: true,
            perfect_forward_secrecy: true,
        }
    }
}
