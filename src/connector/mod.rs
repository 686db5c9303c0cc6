//! One administrative session to one device.
//!
//! A [`Connector`] owns a blocking [`Transport`] (SSH or Telnet) plus the
//! vendor profile for the device, and turns raw shell I/O into a command
//! surface: paging is drained, output is cleaned and checked against the
//! vendor's error patterns. Devices declared as `snmp` get a read-only
//! connector that serves metrics and refuses CLI commands. All methods
//! block; async callers run them inside `tokio::task::spawn_blocking`.

pub mod factory;
#[cfg(test)]
pub mod scripted;
pub mod snmp;
mod ssh;
mod telnet;

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{connection_protocol, Device};
use crate::vendor::parse::{clean_output, find_error, first_capture, format_bandwidth, strip_pagination};
use crate::vendor::{select_vendor, MetricSpec, PolicyStatus, VendorProfile};

pub use factory::{ConnectorFactory, NetworkTransportProvider, TransportProvider};
pub use self::snmp::{SnmpClient, UdpSnmpClient};
pub use ssh::SshTransport;
pub use telnet::TelnetTransport;

use self::snmp::{SnmpPoller, SNMP_PORT};

/// Upper bound on `--More--` continuations for a single command
const MAX_PAGES: usize = 500;
/// Bytes of already received output rescanned for a pagination prompt that
/// straddles two reads
const PROMPT_TAIL: usize = 32;
/// Interfaces collected per `interface_stats` call
const MAX_INTERFACES: usize = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("connection timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not connected")]
    NotConnected,
    #[error("device rejected `{command}`: {output}")]
    Rejected { command: String, output: String },
    #[error("no response to `{command}`")]
    Timeout { command: String },
    #[error("session failed during `{command}`: {reason}")]
    Io { command: String, reason: String },
    #[error("output of `{command}` exceeded {pages} pages")]
    Truncated { command: String, pages: usize },
    #[error("`{command}` needs a CLI session; the device is managed over SNMP")]
    CliRequired { command: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("protocol `{0}` does not provide a CLI session")]
    Unsupported(String),
    #[error("device worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last liveness probe or command failed; the session is gone
    Stale,
    AuthFailed,
    Unreachable,
}

impl ConnectionState {
    fn after_failure(err: &ConnectionError) -> Self {
        match err {
            ConnectionError::AuthFailed(_) => ConnectionState::AuthFailed,
            ConnectionError::Unreachable(_) | ConnectionError::Timeout(_) => ConnectionState::Unreachable,
        }
    }
}

/// Where and how to reach a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub device_id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub community: String,
    pub protocol: String,
}

impl DeviceTarget {
    /// SNMP agents are always polled on the standard port; the inventory
    /// port belongs to the CLI.
    pub fn from_device(device: &Device) -> Self {
        let protocol = device.connection_protocol.trim().to_ascii_lowercase();
        let port = if protocol == connection_protocol::SNMP {
            SNMP_PORT
        } else {
            let default_port = if protocol == connection_protocol::TELNET { 23 } else { 22 };
            u16::try_from(device.port).ok().filter(|p| *p != 0).unwrap_or(default_port)
        };
        let community = if device.snmp_community.trim().is_empty() {
            "public".to_string()
        } else {
            device.snmp_community.clone()
        };
        Self {
            device_id: device.id,
            name: device.name.clone(),
            host: device.ip_address.clone(),
            port,
            username: device.username.clone(),
            password: device.password.clone(),
            community,
            protocol,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    pub connect_timeout: Duration,
    /// Wait for the first output of a command
    pub command_timeout: Duration,
    /// Quiet period that marks the end of a command's output
    pub settle: Duration,
    pub reconnect_backoff: Duration,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            settle: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(5),
        }
    }
}

/// Blocking byte-stream access to a device shell.
pub trait Transport: Send {
    /// Open and authenticate a session. May be called again after `close`.
    fn open(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError>;
    fn send(&mut self, data: &str) -> io::Result<()>;
    /// Whatever arrives within `wait`; `None` when the device stayed quiet.
    fn recv(&mut self, wait: Duration) -> io::Result<Option<String>>;
    fn close(&mut self);
}

/// A metric value with an explicit flag telling a parsed reading apart from
/// the fallback sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric<T> {
    pub value: T,
    pub parsed: bool,
}

impl<T> Metric<T> {
    fn parsed(value: T) -> Self {
        Self { value, parsed: true }
    }

    fn sentinel(value: T) -> Self {
        Self { value, parsed: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceStats {
    pub name: String,
    pub status: String,
    pub input_bps: u64,
    pub output_bps: u64,
    pub input_rate: String,
    pub output_rate: String,
    /// False when neither rate could be read from the detail output
    pub parsed: bool,
}

enum Channel {
    Cli(Box<dyn Transport>),
    Snmp(SnmpPoller),
}

pub struct Connector {
    target: DeviceTarget,
    profile: &'static VendorProfile,
    channel: Channel,
    options: ConnectorOptions,
    state: ConnectionState,
    last_attempt: Option<Instant>,
}

fn reading(value: Option<f64>) -> Metric<f64> {
    value.map(Metric::parsed).unwrap_or_else(|| Metric::sentinel(0.0))
}

impl Connector {
    pub fn new(
        target: DeviceTarget,
        profile: &'static VendorProfile,
        transport: Box<dyn Transport>,
        options: ConnectorOptions,
    ) -> Self {
        Self {
            target,
            profile,
            channel: Channel::Cli(transport),
            options,
            state: ConnectionState::Disconnected,
            last_attempt: None,
        }
    }

    /// Metrics-only connector over SNMP
    pub fn snmp(
        target: DeviceTarget,
        profile: &'static VendorProfile,
        client: Box<dyn SnmpClient>,
        options: ConnectorOptions,
    ) -> Self {
        let poller = SnmpPoller::new(client, &profile.snmp, target.name.clone());
        Self {
            target,
            profile,
            channel: Channel::Snmp(poller),
            options,
            state: ConnectionState::Disconnected,
            last_attempt: None,
        }
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn profile(&self) -> &'static VendorProfile {
        self.profile
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Cached state only; never touches the network.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether this connector still points at what the inventory record
    /// describes: same address, credentials, protocol and vendor.
    pub fn matches(&self, device: &Device) -> bool {
        self.target == DeviceTarget::from_device(device)
            && self.profile.vendor == select_vendor(&device.manufacturer, &device.model)
    }

    fn snmp_poller(&mut self) -> Option<&mut SnmpPoller> {
        match &mut self.channel {
            Channel::Snmp(poller) => Some(poller),
            Channel::Cli(_) => None,
        }
    }

    /// Establish the session, or confirm an existing one with a probe.
    /// A failed probe tears the session down and reconnects once the
    /// reconnect backoff since the previous attempt has elapsed.
    pub fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.state == ConnectionState::Connected {
            if self.probe() {
                return Ok(());
            }
            warn!(device = %self.target.name, "Session failed liveness probe, reconnecting");
            self.teardown(ConnectionState::Stale);
        }

        let protocol = self.target.protocol.as_str();
        let cli = matches!(self.channel, Channel::Cli(_));
        if cli && protocol != connection_protocol::SSH && protocol != connection_protocol::TELNET {
            return Err(ConnectorError::Unsupported(self.target.protocol.clone()));
        }

        if let Some(last) = self.last_attempt {
            let elapsed = last.elapsed();
            if elapsed < self.options.reconnect_backoff {
                let wait = self.options.reconnect_backoff - elapsed;
                debug!(device = %self.target.name, wait_ms = wait.as_millis() as u64, "Waiting out reconnect backoff");
                thread::sleep(wait);
            }
        }
        self.last_attempt = Some(Instant::now());
        self.state = ConnectionState::Connecting;

        let opened = match &mut self.channel {
            Channel::Cli(transport) => transport.open(&self.target, self.options.connect_timeout),
            Channel::Snmp(poller) => poller.open(&self.target, self.options.connect_timeout),
        };
        if let Err(e) = opened {
            self.close_channel();
            self.state = ConnectionState::after_failure(&e);
            warn!(device = %self.target.name, addr = %self.target.addr(), "Connection failed: {}", e);
            return Err(e.into());
        }
        self.state = ConnectionState::Connected;
        if !cli {
            info!(device = %self.target.name, "SNMP agent answering at {}", self.target.addr());
            return Ok(());
        }
        self.drain();

        if let Some(paging) = self.profile.disable_paging {
            if let Err(e) = self.execute(paging) {
                warn!(device = %self.target.name, "Could not disable paging: {}", e);
                if !self.is_connected() {
                    return Err(e.into());
                }
            }
        }

        info!(device = %self.target.name, vendor = %self.profile.vendor, "Connected to {}", self.target.addr());
        Ok(())
    }

    /// Release the session. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!(device = %self.target.name, "Disconnecting");
        }
        self.teardown(ConnectionState::Disconnected);
    }

    fn teardown(&mut self, state: ConnectionState) {
        self.close_channel();
        self.state = state;
    }

    fn close_channel(&mut self) {
        match &mut self.channel {
            Channel::Cli(transport) => transport.close(),
            Channel::Snmp(poller) => poller.close(),
        }
    }

    /// Liveness check on the current session: the vendor probe command on a
    /// CLI, a sysUpTime read over SNMP.
    pub fn probe(&mut self) -> bool {
        if let Some(poller) = self.snmp_poller() {
            return poller.probe();
        }
        let probe = self.profile.probe_command;
        self.execute(probe).is_ok()
    }

    /// Discard login banners and the first prompt
    fn drain(&mut self) {
        let Channel::Cli(transport) = &mut self.channel else {
            return;
        };
        for _ in 0..MAX_PAGES {
            match transport.recv(self.options.settle) {
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
    }

    /// Run one command and return its cleaned output. Pagination prompts are
    /// answered until the output is complete; a device error line turns the
    /// result into `CommandError::Rejected`.
    /// Secrets in the command (pre-shared keys) are masked in every error it
    /// produces.
    pub fn execute(&mut self, command: &str) -> Result<String, CommandError> {
        let shown = self.profile.redact(command);
        if !matches!(self.channel, Channel::Cli(_)) {
            return Err(CommandError::CliRequired { command: shown });
        }
        if self.state != ConnectionState::Connected {
            return Err(CommandError::NotConnected);
        }

        let raw = match self.read_response(command, &shown) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(device = %self.target.name, "{}", e);
                self.teardown(ConnectionState::Stale);
                return Err(e);
            }
        };

        let output = clean_output(&raw);
        if let Some(line) = find_error(&output, self.profile.error_patterns) {
            return Err(CommandError::Rejected {
                command: shown,
                output: self.profile.redact(&line),
            });
        }
        Ok(output)
    }

    fn read_response(&mut self, command: &str, shown: &str) -> Result<String, CommandError> {
        let io_err = |e: io::Error| CommandError::Io {
            command: shown.to_string(),
            reason: e.to_string(),
        };
        let Channel::Cli(transport) = &mut self.channel else {
            return Err(CommandError::CliRequired {
                command: shown.to_string(),
            });
        };

        transport.send(&format!("{}\n", command)).map_err(io_err)?;

        let mut output = String::new();
        let mut wait = self.options.command_timeout;
        let mut received = false;
        let mut pages = 0;
        loop {
            let Some(chunk) = transport.recv(wait).map_err(io_err)? else {
                break;
            };
            received = true;
            // a prompt can arrive split over two reads, so rescan the tail
            let mut from = output.len().saturating_sub(PROMPT_TAIL);
            while !output.is_char_boundary(from) {
                from -= 1;
            }
            output.push_str(&chunk);
            let (text, paged) = strip_pagination(&output[from..]);
            if !paged {
                wait = self.options.settle;
                continue;
            }
            output.truncate(from);
            output.push_str(&text);
            if pages == MAX_PAGES {
                warn!(device = %self.target.name, command = shown, pages, "Pagination limit reached");
                return Err(CommandError::Truncated {
                    command: shown.to_string(),
                    pages,
                });
            }
            pages += 1;
            transport.send(" ").map_err(io_err)?;
            wait = self.options.command_timeout;
        }

        if !received {
            return Err(CommandError::Timeout {
                command: shown.to_string(),
            });
        }
        if pages > 0 {
            debug!(device = %self.target.name, command = shown, pages, "Drained paged output");
        }
        Ok(output)
    }

    /// Run commands in order, stopping at the first failure.
    pub fn execute_all(&mut self, commands: &[String]) -> Result<Vec<String>, CommandError> {
        commands.iter().map(|cmd| self.execute(cmd)).collect()
    }

    /// Run every command even when some are rejected. Stops only when the
    /// session itself is lost. Returns the failures.
    pub fn execute_best_effort(&mut self, commands: &[String]) -> Vec<CommandError> {
        let mut errors = Vec::new();
        for cmd in commands {
            match self.execute(cmd) {
                Ok(_) => {}
                Err(e @ CommandError::Rejected { .. }) => errors.push(e),
                Err(e) => {
                    errors.push(e);
                    break;
                }
            }
        }
        errors
    }

    /// Run the vendor status commands and parse the combined output.
    pub fn policy_status(&mut self) -> Result<PolicyStatus, CommandError> {
        let mut combined = String::new();
        for cmd in self.profile.status_commands {
            combined.push_str(&self.execute(cmd)?);
            combined.push('\n');
        }
        Ok((self.profile.parse_status)(&combined))
    }

    /// Run the vendor verify commands and report whether `marker` appears as a
    /// whole token in their output.
    pub fn config_contains(&mut self, marker: &str) -> Result<bool, CommandError> {
        let mut found = false;
        for cmd in self.profile.verify_commands {
            let output = self.execute(cmd)?;
            found |= output
                .split(|c: char| c.is_whitespace())
                .any(|token| token == marker);
        }
        Ok(found)
    }

    fn metric_text(&mut self, name: &str, spec: &MetricSpec) -> Option<String> {
        match self.execute(spec.command) {
            Ok(output) => {
                let value = spec.parse(&output);
                if value.is_none() {
                    warn!(device = %self.target.name, metric = name, "Unrecognized {} output", name);
                }
                value
            }
            Err(e) => {
                warn!(device = %self.target.name, metric = name, "Metric command failed: {}", e);
                None
            }
        }
    }

    fn percentage(&mut self, name: &str, spec: &MetricSpec) -> Metric<f64> {
        match self.metric_text(name, spec).and_then(|v| v.trim_end_matches('%').trim().parse::<f64>().ok()) {
            Some(value) => Metric::parsed(value),
            None => Metric::sentinel(0.0),
        }
    }

    /// CPU utilization in percent; 0.0 with `parsed: false` when unreadable.
    pub fn cpu_usage(&mut self) -> Metric<f64> {
        let connected = self.is_connected();
        if let Some(poller) = self.snmp_poller() {
            return reading(if connected { poller.cpu() } else { None });
        }
        let profile = self.profile;
        self.percentage("cpu", &profile.cpu)
    }

    /// Memory utilization in percent; 0.0 with `parsed: false` when unreadable.
    pub fn memory_usage(&mut self) -> Metric<f64> {
        let connected = self.is_connected();
        if let Some(poller) = self.snmp_poller() {
            return reading(if connected { poller.memory() } else { None });
        }
        let profile = self.profile;
        self.percentage("memory", &profile.memory)
    }

    /// Uptime as reported by the device; "unknown" when unreadable.
    pub fn uptime(&mut self) -> Metric<String> {
        let connected = self.is_connected();
        let value = match self.snmp_poller() {
            Some(poller) if connected => poller.uptime(),
            Some(_) => None,
            None => {
                let profile = self.profile;
                self.metric_text("uptime", &profile.uptime)
            }
        };
        match value {
            Some(value) if !value.is_empty() => Metric::parsed(value),
            _ => Metric::sentinel("unknown".to_string()),
        }
    }

    /// Rates for the first few interfaces that are up.
    pub fn interface_stats(&mut self) -> Vec<InterfaceStats> {
        let connected = self.is_connected();
        if let Some(poller) = self.snmp_poller() {
            return if connected { poller.interface_stats(MAX_INTERFACES) } else { Vec::new() };
        }
        let listing = match self.execute(self.profile.interface_list_command) {
            Ok(output) => output,
            Err(e) => {
                warn!(device = %self.target.name, "Interface listing failed: {}", e);
                return Vec::new();
            }
        };

        let interfaces: Vec<_> = (self.profile.parse_interfaces)(&listing)
            .into_iter()
            .filter(|i| i.status == "up")
            .take(MAX_INTERFACES)
            .collect();

        let mut stats = Vec::with_capacity(interfaces.len());
        for iface in interfaces {
            let detail = self
                .execute(&self.profile.interface_detail(&iface.name))
                .unwrap_or_default();
            let input = first_capture(&detail, self.profile.input_rate_patterns).and_then(|v| v.parse::<u64>().ok());
            let output = first_capture(&detail, self.profile.output_rate_patterns).and_then(|v| v.parse::<u64>().ok());
            if input.is_none() && output.is_none() {
                warn!(device = %self.target.name, interface = %iface.name, "Unrecognized interface rate output");
            }
            let input_bps = input.unwrap_or(0);
            let output_bps = output.unwrap_or(0);
            stats.push(InterfaceStats {
                name: iface.name,
                status: iface.status,
                input_bps,
                output_bps,
                input_rate: format_bandwidth(input_bps),
                output_rate: format_bandwidth(output_bps),
                parsed: input.is_some() || output.is_some(),
            });
        }
        stats
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.close_channel();
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::{ScriptedDevice, ScriptedTransport};
    use super::*;
    use crate::vendor::{profile, TunnelState, Vendor};

    fn target(protocol: &str) -> DeviceTarget {
        DeviceTarget {
            device_id: 1,
            name: "edge-1".to_string(),
            host: "192.0.2.1".to_string(),
            port: 22,
            username: "admin".to_string(),
            password: "admin".to_string(),
            community: "public".to_string(),
            protocol: protocol.to_string(),
        }
    }

    fn connector(device: ScriptedDevice, vendor: Vendor) -> Connector {
        Connector::new(
            target("ssh"),
            profile(vendor),
            Box::new(ScriptedTransport::new(device)),
            ScriptedTransport::options(),
        )
    }

    #[test]
    fn test_execute_requires_connection() {
        let mut conn = connector(ScriptedDevice::default(), Vendor::Huawei);
        assert_eq!(conn.execute("display version"), Err(CommandError::NotConnected));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_disables_paging() {
        let device = ScriptedDevice::default();
        let mut conn = connector(device.clone(), Vendor::Huawei);
        conn.connect().unwrap();
        assert!(conn.is_connected());
        assert_eq!(device.sent(), vec!["screen-length 0 temporary".to_string()]);
    }

    #[test]
    fn test_connect_is_idempotent_while_alive() {
        let device = ScriptedDevice::default();
        let mut conn = connector(device.clone(), Vendor::Cisco);
        conn.connect().unwrap();
        conn.connect().unwrap();
        assert_eq!(device.opens(), 1);
        assert_eq!(device.sent(), vec!["terminal length 0".to_string(), String::new()]);
    }

    #[test]
    fn test_failed_liveness_check_reconnects() {
        let device = ScriptedDevice::default();
        let mut conn = connector(device.clone(), Vendor::Cisco);
        conn.connect().unwrap();
        device.fail_io(true);
        assert!(conn.connect().is_err());
        device.fail_io(false);
        conn.connect().unwrap();
        assert!(conn.is_connected());
        assert_eq!(device.opens(), 3);
    }

    #[test]
    fn test_connect_failure_state() {
        let device = ScriptedDevice::default().refuse(ConnectionError::AuthFailed("bad password".into()));
        let mut conn = connector(device, Vendor::Generic);
        let err = conn.connect().unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(ConnectionError::AuthFailed(_))));
        assert_eq!(conn.state(), ConnectionState::AuthFailed);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_unknown_protocol_is_unsupported() {
        let mut conn = Connector::new(
            target("netconf"),
            profile(Vendor::Generic),
            Box::new(ScriptedTransport::new(ScriptedDevice::default())),
            ScriptedTransport::options(),
        );
        assert_eq!(conn.connect(), Err(ConnectorError::Unsupported("netconf".to_string())));
    }

    /// Answers each command with a list of reads; a space releases the
    /// next page
    struct ChunkedTransport {
        replies: std::collections::VecDeque<Vec<&'static str>>,
        next_page: Vec<&'static str>,
        chunks: std::collections::VecDeque<&'static str>,
    }

    impl Transport for ChunkedTransport {
        fn open(&mut self, _target: &DeviceTarget, _timeout: Duration) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn send(&mut self, data: &str) -> io::Result<()> {
            if data == " " {
                self.chunks.extend(self.next_page.drain(..));
            } else if let Some(reply) = self.replies.pop_front() {
                self.chunks.extend(reply);
            }
            Ok(())
        }

        fn recv(&mut self, _wait: Duration) -> io::Result<Option<String>> {
            Ok(self.chunks.pop_front().map(str::to_string))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_prompt_split_across_reads_is_answered() {
        let transport = ChunkedTransport {
            replies: vec![vec!["<edge-1>"], vec!["line-1\n  ---- Mo", "re ----"]].into(),
            next_page: vec!["line-2\n<edge-1>"],
            chunks: Default::default(),
        };
        let mut conn = Connector::new(target("ssh"), profile(Vendor::Huawei), Box::new(transport), ScriptedTransport::options());
        conn.connect().unwrap();

        let output = conn.execute("display current-configuration").unwrap();
        assert!(output.contains("line-1"));
        assert!(output.contains("line-2"), "truncated: {:?}", output);
        assert!(!output.contains("More"));
    }

    #[test]
    fn test_endless_paging_is_an_error() {
        let pages: Vec<String> = (0..MAX_PAGES + 2).map(|i| format!("row-{}\n", i)).collect();
        let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
        let device = ScriptedDevice::default().paged("display logbuffer", &pages);
        let mut conn = connector(device, Vendor::Huawei);
        conn.connect().unwrap();
        assert_eq!(
            conn.execute("display logbuffer"),
            Err(CommandError::Truncated {
                command: "display logbuffer".to_string(),
                pages: MAX_PAGES,
            })
        );
        // the pager is left mid-output, so the session is dropped
        assert_eq!(conn.state(), ConnectionState::Stale);
    }

    #[test]
    fn test_rejected_secret_is_masked() {
        let device = ScriptedDevice::default().reject_matching("pre-shared-key");
        let mut conn = connector(device, Vendor::Huawei);
        conn.connect().unwrap();
        let err = conn.execute("pre-shared-key cipher s3cret").unwrap_err();
        assert!(!err.to_string().contains("s3cret"), "{}", err);
        assert!(err.to_string().contains("pre-shared-key cipher ******"));
    }

    #[test]
    fn test_matches_inventory_record() {
        let now = chrono::Utc::now();
        let mut device = Device {
            id: 1,
            name: "edge-1".into(),
            ip_address: "192.0.2.1".into(),
            manufacturer: "Cisco".into(),
            model: "ISR".into(),
            username: "admin".into(),
            password: "admin".into(),
            snmp_community: String::new(),
            port: 22,
            connection_protocol: "ssh".into(),
            created_at: now,
            updated_at: now,
        };
        let conn = Connector::new(
            DeviceTarget::from_device(&device),
            profile(Vendor::Cisco),
            Box::new(ScriptedTransport::new(ScriptedDevice::default())),
            ScriptedTransport::options(),
        );
        assert!(conn.matches(&device));
        device.ip_address = "192.0.2.99".into();
        assert!(!conn.matches(&device));
        device.ip_address = "192.0.2.1".into();
        device.manufacturer = "Huawei".into();
        assert!(!conn.matches(&device));
        device.manufacturer = "Cisco".into();
        device.password = "rotated".into();
        assert!(!conn.matches(&device));
    }

    #[test]
    fn test_paginated_output_is_fully_drained() {
        let device = ScriptedDevice::default().paged(
            "display current-configuration",
            &["line-1\nline-2\n", "line-3\n", "line-4\n<edge-1>"],
        );
        let mut conn = connector(device.clone(), Vendor::Huawei);
        conn.connect().unwrap();
        let output = conn.execute("display current-configuration").unwrap();
        for line in ["line-1", "line-2", "line-3", "line-4"] {
            assert!(output.contains(line), "missing {} in {:?}", line, output);
        }
        assert!(!output.contains("More"));
        // two continuation keystrokes for three pages
        assert_eq!(device.sent().iter().filter(|s| s.as_str() == " ").count(), 2);
    }

    #[test]
    fn test_device_error_is_rejected() {
        let device = ScriptedDevice::default().respond("bogus", "bogus\n% Invalid input detected at '^' marker.\n<edge-1>");
        let mut conn = connector(device, Vendor::Cisco);
        conn.connect().unwrap();
        match conn.execute("bogus") {
            Err(CommandError::Rejected { command, output }) => {
                assert_eq!(command, "bogus");
                assert!(output.contains("Invalid input"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        // a rejection keeps the session
        assert!(conn.is_connected());
    }

    #[test]
    fn test_io_failure_marks_stale() {
        let device = ScriptedDevice::default();
        let mut conn = connector(device.clone(), Vendor::Cisco);
        conn.connect().unwrap();
        device.fail_io(true);
        assert!(matches!(conn.execute("show clock"), Err(CommandError::Io { .. })));
        assert_eq!(conn.state(), ConnectionState::Stale);
    }

    #[test]
    fn test_best_effort_runs_every_command() {
        let device = ScriptedDevice::default().respond("no thing", "Error: object does not exist\n<edge-1>");
        let mut conn = connector(device.clone(), Vendor::Huawei);
        conn.connect().unwrap();
        let cmds: Vec<String> = ["undo a", "no thing", "undo b"].iter().map(|s| s.to_string()).collect();
        let errors = conn.execute_best_effort(&cmds);
        assert_eq!(errors.len(), 1);
        assert!(device.sent().contains(&"undo b".to_string()));

        let err = conn.execute_all(&cmds).unwrap_err();
        assert!(matches!(err, CommandError::Rejected { .. }));
    }

    #[test]
    fn test_metrics_parse_and_fall_back() {
        let device = ScriptedDevice::default()
            .respond("display cpu-usage", "CPU Usage            : 12% Max: 80%\n<edge-1>")
            .respond("display memory-usage", "nothing recognizable\n<edge-1>")
            .respond("display version", "HUAWEI USG6000 uptime is 10 days, 3 hours, 5 minutes\n<edge-1>");
        let mut conn = connector(device, Vendor::Huawei);
        conn.connect().unwrap();
        assert_eq!(conn.cpu_usage(), Metric { value: 12.0, parsed: true });
        assert_eq!(conn.memory_usage(), Metric { value: 0.0, parsed: false });
        let uptime = conn.uptime();
        assert!(uptime.parsed);
        assert_eq!(uptime.value, "10 days, 3 hours, 5 minutes");
    }

    #[test]
    fn test_metrics_when_disconnected_use_sentinels() {
        let mut conn = connector(ScriptedDevice::default(), Vendor::Cisco);
        assert_eq!(conn.cpu_usage(), Metric { value: 0.0, parsed: false });
        assert_eq!(conn.uptime().value, "unknown");
        assert!(conn.interface_stats().is_empty());
    }

    #[test]
    fn test_interface_stats() {
        let device = ScriptedDevice::default()
            .respond(
                "show ip interface brief",
                "Interface              IP-Address      OK? Method Status                Protocol\n\
                 GigabitEthernet0/0     10.0.0.1        YES manual up                    up\n\
                 GigabitEthernet0/1     unassigned      YES unset  administratively down down\n\
                 router#",
            )
            .respond(
                "show interfaces GigabitEthernet0/0",
                "  5 minute input rate 2500000 bits/sec, 300 packets/sec\n  5 minute output rate 1200 bits/sec, 2 packets/sec\nrouter#",
            );
        let mut conn = connector(device, Vendor::Cisco);
        conn.connect().unwrap();
        let stats = conn.interface_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "GigabitEthernet0/0");
        assert_eq!(stats[0].input_bps, 2_500_000);
        assert_eq!(stats[0].input_rate, "2.50 Mbps");
        assert_eq!(stats[0].output_rate, "1.20 Kbps");
        assert!(stats[0].parsed);
    }

    #[test]
    fn test_policy_status_and_marker() {
        let device = ScriptedDevice::default()
            .respond("show crypto isakmp sa", "dst             src             state          conn-id status\n203.0.113.9     198.51.100.1    QM_IDLE           1001 ACTIVE\nrouter#")
            .respond("show crypto ipsec sa", "router#")
            .respond("show running-config | include CSMS", "ip access-list extended CSMS-FW-7\n ip access-group CSMS-FW-7 in\nrouter#");
        let mut conn = connector(device, Vendor::Cisco);
        conn.connect().unwrap();
        let status = conn.policy_status().unwrap();
        assert_eq!(status.status, TunnelState::Active);
        assert!(conn.config_contains("CSMS-FW-7").unwrap());
        assert!(!conn.config_contains("CSMS-FW-70").unwrap());
    }

    #[test]
    fn test_target_defaults_port_by_protocol() {
        let now = chrono::Utc::now();
        let mut device = Device {
            id: 3,
            name: "fw".into(),
            ip_address: "192.0.2.3".into(),
            manufacturer: "Huawei".into(),
            model: "USG".into(),
            username: "u".into(),
            password: "p".into(),
            snmp_community: String::new(),
            port: 0,
            connection_protocol: "Telnet".into(),
            created_at: now,
            updated_at: now,
        };
        let target = DeviceTarget::from_device(&device);
        assert_eq!(target.protocol, "telnet");
        assert_eq!(target.port, 23);
        device.port = 2222;
        assert_eq!(DeviceTarget::from_device(&device).addr(), "192.0.2.3:2222");
    }
}
