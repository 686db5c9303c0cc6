use std::env;
use std::time::Duration;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    /// Seconds allowed for establishing a device session
    pub device_connect_timeout: u64,
    /// Seconds to wait for the first output of a device command
    pub device_command_timeout: u64,
    /// Minimum seconds between two connection attempts to the same device
    pub device_reconnect_backoff: u64,
    pub keepalive_interval: u64,
    pub monitor_interval: u64,
    pub sync_interval: u64,
    pub sync_enabled: bool,
    pub sync_alert_on_failure: bool,
    pub sync_alert_threshold: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            db_path: get_env("DB_PATH", "/data/csms.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            device_connect_timeout: get_env("DEVICE_CONNECT_TIMEOUT", "30")
                .parse()
                .unwrap_or(30),
            device_command_timeout: get_env("DEVICE_COMMAND_TIMEOUT", "30")
                .parse()
                .unwrap_or(30),
            device_reconnect_backoff: get_env("DEVICE_RECONNECT_BACKOFF", "5")
                .parse::<u64>()
                .unwrap_or(5)
                .max(5),
            keepalive_interval: get_env("KEEPALIVE_INTERVAL", "25")
                .parse::<u64>()
                .unwrap_or(25)
                .clamp(25, 60),
            monitor_interval: get_env("MONITOR_INTERVAL", "60")
                .parse::<u64>()
                .unwrap_or(60)
                .max(1),
            sync_interval: get_env("SYNC_INTERVAL", "300")
                .parse::<u64>()
                .unwrap_or(300)
                .max(60),
            sync_enabled: parse_bool(&get_env("SYNC_ENABLED", "true"), true),
            sync_alert_on_failure: parse_bool(&get_env("SYNC_ALERT_ON_FAILURE", "false"), false),
            sync_alert_threshold: get_env("SYNC_ALERT_THRESHOLD", "3")
                .parse::<u32>()
                .unwrap_or(3)
                .max(1),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.device_connect_timeout)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.device_command_timeout)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.device_reconnect_backoff)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "/data/csms.db".to_string(),
            db_max_connections: 5,
            listen_addr: "0.0.0.0:8080".to_string(),
            device_connect_timeout: 30,
            device_command_timeout: 30,
            device_reconnect_backoff: 5,
            keepalive_interval: 25,
            monitor_interval: 60,
            sync_interval: 300,
            sync_enabled: true,
            sync_alert_on_failure: false,
            sync_alert_threshold: 3,
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool("on", false));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("maybe", true));
        assert!(!parse_bool("", false));
    }
}
