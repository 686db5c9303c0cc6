//! Shape validation for policy config documents.
//!
//! Runs before any device I/O so a malformed policy never reaches a device.

use serde_json::Value;
use thiserror::Error;

use crate::models::{policy_type, PolicyConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown policy type: {0}")]
    UnknownPolicyType(String),
    #[error("malformed policy config: {0}")]
    Malformed(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Parse the config document leniently; missing optional sections take defaults.
pub fn parse_config(config: &Value) -> Result<PolicyConfig, ValidationError> {
    PolicyConfig::from_value(config).map_err(|e| ValidationError::Malformed(e.to_string()))
}

/// Validate a policy config against its type and return the typed view.
pub fn validate_policy(kind: &str, config: &Value) -> Result<PolicyConfig, ValidationError> {
    if !policy_type::ALL.contains(&kind) {
        return Err(ValidationError::UnknownPolicyType(kind.to_string()));
    }
    if !config.is_object() {
        return Err(ValidationError::Malformed("config must be an object".to_string()));
    }

    for (key, field) in [
        ("version", "version"),
        ("firewall_settings", "firewall_settings"),
        ("ipsec_settings", "ipsec_settings"),
    ] {
        if config.get(key).is_none() {
            return Err(ValidationError::MissingField(field));
        }
    }
    if config.pointer("/ipsec_settings/authentication").is_none() {
        return Err(ValidationError::MissingField("ipsec_settings.authentication"));
    }
    if config.pointer("/ipsec_settings/encryption").is_none() {
        return Err(ValidationError::MissingField("ipsec_settings.encryption"));
    }

    let parsed = parse_config(config)?;

    let action = parsed.firewall_settings.default_action.as_str();
    if action != "deny" && action != "allow" {
        return Err(invalid("firewall_settings.default_action", format!("expected deny or allow, got {}", action)));
    }
    for proto in &parsed.firewall_settings.allowed_protocols {
        if proto.protocol.trim().is_empty() {
            return Err(invalid("firewall_settings.allowed_protocols", "protocol must not be empty"));
        }
        if let Some(port) = proto.port {
            if port == 0 || port > 65535 {
                return Err(invalid("firewall_settings.allowed_protocols", format!("port {} out of range", port)));
            }
        }
    }

    let auth = &parsed.ipsec_settings.authentication;
    match auth.method.as_str() {
        "psk" => {
            if auth.psk.trim().is_empty() {
                return Err(ValidationError::MissingField("ipsec_settings.authentication.psk"));
            }
        }
        "cert" => {}
        other => return Err(invalid("ipsec_settings.authentication.method", format!("expected psk or cert, got {}", other))),
    }

    let lifetime = &parsed.ipsec_settings.lifetime;
    if lifetime.phase1 < 300 {
        return Err(invalid("ipsec_settings.lifetime.phase1", "must be at least 300 seconds"));
    }
    if lifetime.phase2 < 300 {
        return Err(invalid("ipsec_settings.lifetime.phase2", "must be at least 300 seconds"));
    }

    match &parsed.tunnel_settings {
        Some(tunnel) => {
            if !is_valid_subnet(&tunnel.local_subnet) {
                return Err(invalid("tunnel_settings.local_subnet", format!("not a subnet: {:?}", tunnel.local_subnet)));
            }
            if !is_valid_subnet(&tunnel.remote_subnet) {
                return Err(invalid("tunnel_settings.remote_subnet", format!("not a subnet: {:?}", tunnel.remote_subnet)));
            }
            if !is_valid_ipv4(&tunnel.remote_gateway) {
                return Err(invalid("tunnel_settings.remote_gateway", format!("not an IPv4 address: {:?}", tunnel.remote_gateway)));
            }
        }
        None if kind == policy_type::IPSEC => {
            return Err(ValidationError::MissingField("tunnel_settings"));
        }
        None => {}
    }

    if let Some(restrictions) = &parsed.source_restrictions {
        for ip in &restrictions.allowed_ips {
            if !is_valid_ipv4(ip) && !is_valid_subnet(ip) {
                return Err(invalid("source_restrictions.allowed_ips", format!("not an address or subnet: {:?}", ip)));
            }
        }
    }

    Ok(parsed)
}

/// Validate an IPv4 address (e.g., "192.168.1.1").
pub fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts
        .iter()
        .all(|p| !p.is_empty() && p.len() <= 3 && p.chars().all(|c| c.is_ascii_digit()) && p.parse::<u8>().is_ok())
}

/// Validate a subnet in `a.b.c.d/len` form.
pub fn is_valid_subnet(subnet: &str) -> bool {
    match subnet.split_once('/') {
        Some((ip, len)) => {
            is_valid_ipv4(ip) && !len.is_empty() && len.len() <= 2 && len.parse::<u8>().map(|l| l <= 32).unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ipsec_config() -> Value {
        json!({
            "version": "1.0",
            "firewall_settings": {
                "default_action": "deny",
                "allowed_protocols": [{"protocol": "udp", "port": 500}]
            },
            "ipsec_settings": {
                "authentication": {"method": "psk", "psk": "s3cret"},
                "encryption": {"phase1": [], "phase2": []},
                "lifetime": {"phase1": 86400, "phase2": 3600}
            },
            "tunnel_settings": {
                "local_subnet": "10.1.0.0/24",
                "remote_subnet": "10.2.0.0/24",
                "remote_gateway": "203.0.113.9"
            }
        })
    }

    #[test]
    fn test_accepts_complete_ipsec_config() {
        let parsed = validate_policy("ipsec", &ipsec_config()).unwrap();
        assert!(parsed.ipsec_settings.encryption.phase1.is_empty());
        assert!(parsed.advanced.perfect_forward_secrecy);
    }

    #[test]
    fn test_ipsec_requires_tunnel_settings() {
        let mut config = ipsec_config();
        config.as_object_mut().unwrap().remove("tunnel_settings");
        assert_eq!(
            validate_policy("ipsec", &config),
            Err(ValidationError::MissingField("tunnel_settings"))
        );
        // Other policy types do not need a tunnel
        assert!(validate_policy("allow_all", &config).is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = ipsec_config();
        config["tunnel_settings"]["remote_gateway"] = json!("300.1.1.1");
        assert!(matches!(
            validate_policy("ipsec", &config),
            Err(ValidationError::InvalidField { field: "tunnel_settings.remote_gateway", .. })
        ));

        let mut config = ipsec_config();
        config["ipsec_settings"]["lifetime"]["phase1"] = json!(60);
        assert!(validate_policy("ipsec", &config).is_err());

        let mut config = ipsec_config();
        config["firewall_settings"]["default_action"] = json!("drop");
        assert!(validate_policy("ipsec", &config).is_err());

        let mut config = ipsec_config();
        config["ipsec_settings"]["authentication"]["psk"] = json!("");
        assert_eq!(
            validate_policy("ipsec", &config),
            Err(ValidationError::MissingField("ipsec_settings.authentication.psk"))
        );

        assert!(matches!(validate_policy("vpn", &ipsec_config()), Err(ValidationError::UnknownPolicyType(_))));
        assert_eq!(validate_policy("ipsec", &json!({})), Err(ValidationError::MissingField("version")));
    }

    #[test]
    fn test_malformed_types_are_validation_errors() {
        let mut config = ipsec_config();
        config["ipsec_settings"]["lifetime"]["phase2"] = json!("an hour");
        assert!(matches!(validate_policy("ipsec", &config), Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn test_subnet_and_ip_helpers() {
        assert!(is_valid_ipv4("192.168.1.1"));
        assert!(!is_valid_ipv4("192.168.1"));
        assert!(!is_valid_ipv4("256.0.0.1"));
        assert!(!is_valid_ipv4("1.2.3.+4"));
        assert!(is_valid_subnet("10.0.0.0/8"));
        assert!(is_valid_subnet("0.0.0.0/0"));
        assert!(!is_valid_subnet("10.0.0.0/33"));
        assert!(!is_valid_subnet("10.0.0.0"));
        assert!(!is_valid_subnet("10.0.0.0/"));
    }
}
