//! In-process fake devices used by tests: scripted responses, paging,
//! refused logins and broken sessions, with a record of everything sent.
//! SNMP devices are faked by a scripted agent holding an OID table.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::snmp::{SnmpClient, SnmpValue, SYS_UPTIME};
use super::{ConnectionError, ConnectorOptions, DeviceTarget, Transport, TransportProvider};
use crate::models::Device;

const PROMPT: &str = "router#";
const MORE: &str = "\n  ---- More ----";

#[derive(Default)]
struct Script {
    responses: HashMap<String, Vec<String>>,
    rejected: Vec<String>,
    broken_on: Vec<String>,
    refuse: Option<ConnectionError>,
    fail_io: bool,
    sent: Vec<String>,
    opens: usize,
}

/// Shared handle to one fake device; clones observe the same state.
#[derive(Clone, Default)]
pub struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDevice {
    fn with(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.script.lock().unwrap());
        self
    }

    /// Answer `command` with `output`
    pub fn respond(self, command: &str, output: &str) -> Self {
        self.paged(command, &[output])
    }

    /// Answer `command` with several pages separated by a More prompt
    pub fn paged(self, command: &str, pages: &[&str]) -> Self {
        let pages = pages.iter().map(|p| p.to_string()).collect();
        self.with(|s| {
            s.responses.insert(command.to_string(), pages);
        })
    }

    /// Answer any command containing `fragment` with a device error
    pub fn reject_matching(self, fragment: &str) -> Self {
        self.with(|s| s.rejected.push(fragment.to_string()))
    }

    /// Drop the session when a command containing `fragment` is sent
    pub fn break_on(self, fragment: &str) -> Self {
        self.with(|s| s.broken_on.push(fragment.to_string()))
    }

    /// Refuse every login with `err`
    pub fn refuse(self, err: ConnectionError) -> Self {
        self.with(|s| s.refuse = Some(err))
    }

    pub fn fail_io(&self, fail: bool) {
        self.script.lock().unwrap().fail_io = fail;
    }

    /// Commands sent so far, without the trailing newline
    pub fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn opens(&self) -> usize {
        self.script.lock().unwrap().opens
    }

    /// Lines previously sent that contain `pattern`, like `| include` on a
    /// running configuration built from what was pushed.
    fn include(script: &Script, pattern: &str) -> String {
        let mut lines: Vec<&str> = script
            .sent
            .iter()
            .filter(|line| line.contains(pattern) && !line.contains("| include"))
            .map(String::as_str)
            .collect();
        lines.push(PROMPT);
        lines.join("\n")
    }
}

pub struct ScriptedTransport {
    device: ScriptedDevice,
    pending: VecDeque<String>,
    pages: VecDeque<String>,
}

impl ScriptedTransport {
    pub fn new(device: ScriptedDevice) -> Self {
        Self {
            device,
            pending: VecDeque::new(),
            pages: VecDeque::new(),
        }
    }

    /// Timings that make tests run without real waits
    pub fn options() -> ConnectorOptions {
        ConnectorOptions {
            connect_timeout: Duration::from_millis(10),
            command_timeout: Duration::from_millis(10),
            settle: Duration::from_millis(1),
            reconnect_backoff: Duration::ZERO,
        }
    }

    fn queue_page(&mut self) {
        if let Some(page) = self.pages.pop_front() {
            if self.pages.is_empty() {
                self.pending.push_back(page);
            } else {
                self.pending.push_back(format!("{}{}", page, MORE));
            }
        }
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, _target: &DeviceTarget, _timeout: Duration) -> Result<(), ConnectionError> {
        let mut script = self.device.script.lock().unwrap();
        script.opens += 1;
        if let Some(err) = &script.refuse {
            return Err(err.clone());
        }
        self.pending.clear();
        self.pages.clear();
        self.pending.push_back(format!("Welcome\n{}", PROMPT));
        Ok(())
    }

    fn send(&mut self, data: &str) -> io::Result<()> {
        let mut script = self.device.script.lock().unwrap();
        if script.fail_io {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed by peer"));
        }
        if data == " " {
            script.sent.push(data.to_string());
            drop(script);
            self.queue_page();
            return Ok(());
        }

        let command = data.trim_end_matches('\n').to_string();
        script.sent.push(command.clone());
        if script.broken_on.iter().any(|f| command.contains(f.as_str())) {
            script.fail_io = true;
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }

        let pages: Vec<String> = if let Some(pages) = script.responses.get(&command) {
            pages.clone()
        } else if script.rejected.iter().any(|f| command.contains(f.as_str())) {
            vec![format!("{}\nError: Unrecognized command found at '^' position.\n{}", command, PROMPT)]
        } else if let Some((_, pattern)) = command.split_once("| include ") {
            vec![ScriptedDevice::include(&script, pattern.trim())]
        } else if command.is_empty() {
            vec![PROMPT.to_string()]
        } else {
            vec![format!("{}\n{}", command, PROMPT)]
        };
        drop(script);

        self.pages = pages.into();
        self.queue_page();
        Ok(())
    }

    fn recv(&mut self, _wait: Duration) -> io::Result<Option<String>> {
        if self.device.script.lock().unwrap().fail_io {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed by peer"));
        }
        Ok(self.pending.pop_front())
    }

    fn close(&mut self) {
        self.pending.clear();
        self.pages.clear();
    }
}

struct AgentTable {
    values: BTreeMap<Vec<u32>, SnmpValue>,
    silent: bool,
    opens: usize,
}

/// Shared handle to one fake SNMP agent. Answers sysUpTime unless told
/// otherwise.
#[derive(Clone)]
pub struct ScriptedAgent {
    table: Arc<Mutex<AgentTable>>,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(SYS_UPTIME.to_vec(), SnmpValue::Ticks(100));
        Self {
            table: Arc::new(Mutex::new(AgentTable {
                values,
                silent: false,
                opens: 0,
            })),
        }
    }
}

impl ScriptedAgent {
    pub fn value(self, oid: &[u32], value: SnmpValue) -> Self {
        self.set(oid, value);
        self
    }

    pub fn set(&self, oid: &[u32], value: SnmpValue) {
        self.table.lock().unwrap().values.insert(oid.to_vec(), value);
    }

    /// Never answer, like a host without an agent or with another community
    pub fn silent(self) -> Self {
        self.table.lock().unwrap().silent = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.table.lock().unwrap().opens
    }

    pub fn client(&self) -> ScriptedAgentClient {
        ScriptedAgentClient {
            agent: self.clone(),
            open: false,
        }
    }
}

pub struct ScriptedAgentClient {
    agent: ScriptedAgent,
    open: bool,
}

impl ScriptedAgentClient {
    fn table(&self) -> io::Result<std::sync::MutexGuard<'_, AgentTable>> {
        let table = self.agent.table.lock().unwrap();
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "snmp session is closed"));
        }
        if table.silent {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "request timed out"));
        }
        Ok(table)
    }
}

impl SnmpClient for ScriptedAgentClient {
    fn open(&mut self, _target: &DeviceTarget, _timeout: Duration) -> Result<(), ConnectionError> {
        self.agent.table.lock().unwrap().opens += 1;
        self.open = true;
        Ok(())
    }

    fn get(&mut self, oid: &[u32]) -> io::Result<SnmpValue> {
        Ok(self.table()?.values.get(oid).cloned().unwrap_or(SnmpValue::Missing))
    }

    fn walk(&mut self, base: &[u32]) -> io::Result<Vec<(Vec<u32>, SnmpValue)>> {
        Ok(self
            .table()?
            .values
            .iter()
            .filter(|(oid, _)| oid.starts_with(base) && oid.len() > base.len())
            .map(|(oid, value)| (oid.clone(), value.clone()))
            .collect())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Hands out scripted transports and agents keyed by device IP address.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    devices: Arc<Mutex<HashMap<String, ScriptedDevice>>>,
    agents: Arc<Mutex<HashMap<String, ScriptedAgent>>>,
}

impl ScriptedProvider {
    pub fn insert(&self, ip: &str, device: ScriptedDevice) {
        self.devices.lock().unwrap().insert(ip.to_string(), device);
    }

    pub fn insert_agent(&self, ip: &str, agent: ScriptedAgent) {
        self.agents.lock().unwrap().insert(ip.to_string(), agent);
    }

    pub fn agent(&self, ip: &str) -> ScriptedAgent {
        self.agents
            .lock()
            .unwrap()
            .entry(ip.to_string())
            .or_default()
            .clone()
    }

    pub fn device(&self, ip: &str) -> ScriptedDevice {
        self.devices
            .lock()
            .unwrap()
            .entry(ip.to_string())
            .or_default()
            .clone()
    }
}

impl TransportProvider for ScriptedProvider {
    fn transport_for(&self, device: &Device) -> Box<dyn Transport> {
        Box::new(ScriptedTransport::new(self.device(&device.ip_address)))
    }

    fn snmp_client_for(&self, device: &Device) -> Box<dyn SnmpClient> {
        Box::new(self.agent(&device.ip_address).client())
    }
}
