//! Read-only SNMP v2c metrics for devices declared with the `snmp` protocol.
//!
//! SNMP devices have no CLI session: they can be monitored but not
//! configured. The poller reads CPU, memory, uptime and interface counters;
//! interface rates come from the octet counter delta between two polls.

use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use ::snmp::{SnmpError, SyncSession, Value};
use tracing::warn;

use super::{ConnectionError, DeviceTarget, InterfaceStats};
use crate::vendor::parse::format_bandwidth;
use crate::vendor::{SnmpMemory, SnmpOids};

pub const SNMP_PORT: u16 = 161;
/// Rows read by one walk before giving up on a misbehaving agent
const MAX_WALK: usize = 1024;

pub(super) const SYS_UPTIME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 3, 0];
const IF_DESCR: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];
const IF_OPER_STATUS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 8];
const IF_IN_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 10];
const IF_OUT_OCTETS: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 16];

/// Owned copy of the value kinds the poller reads
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    Text(String),
    Counter32(u32),
    Counter64(u64),
    Gauge(u32),
    Ticks(u32),
    /// noSuchObject, noSuchInstance, endOfMibView or a type not read here
    Missing,
}

impl SnmpValue {
    fn as_u64(&self) -> Option<u64> {
        match self {
            SnmpValue::Integer(v) => u64::try_from(*v).ok(),
            SnmpValue::Counter32(v) | SnmpValue::Gauge(v) | SnmpValue::Ticks(v) => Some(u64::from(*v)),
            SnmpValue::Counter64(v) => Some(*v),
            SnmpValue::Text(t) => t.trim().parse().ok(),
            SnmpValue::Missing => None,
        }
    }

    /// Growth of a counter since `earlier`, allowing one 32-bit wrap
    fn delta_since(&self, earlier: &SnmpValue) -> Option<u64> {
        match (self, earlier) {
            (SnmpValue::Counter32(now), SnmpValue::Counter32(then)) => Some(u64::from(now.wrapping_sub(*then))),
            _ => self.as_u64()?.checked_sub(earlier.as_u64()?),
        }
    }
}

/// Blocking access to one SNMP agent. Swapped for a scripted agent in tests.
pub trait SnmpClient: Send {
    fn open(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError>;
    fn get(&mut self, oid: &[u32]) -> io::Result<SnmpValue>;
    /// Every (oid, value) below `base`, in agent order
    fn walk(&mut self, base: &[u32]) -> io::Result<Vec<(Vec<u32>, SnmpValue)>>;
    fn close(&mut self);
}

/// SNMP v2c over UDP using the device's community string
#[derive(Default)]
pub struct UdpSnmpClient {
    session: Option<SyncSession>,
}

impl UdpSnmpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&mut self) -> io::Result<&mut SyncSession> {
        self.session
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "snmp session is closed"))
    }
}

fn snmp_error(e: SnmpError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("snmp request failed: {:?}", e))
}

fn owned(value: Value<'_>) -> SnmpValue {
    match value {
        Value::Integer(v) => SnmpValue::Integer(v),
        Value::OctetString(bytes) => SnmpValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        Value::Counter32(v) => SnmpValue::Counter32(v),
        Value::Counter64(v) => SnmpValue::Counter64(v),
        Value::Unsigned32(v) => SnmpValue::Gauge(v),
        Value::Timeticks(v) => SnmpValue::Ticks(v),
        _ => SnmpValue::Missing,
    }
}

impl SnmpClient for UdpSnmpClient {
    fn open(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError> {
        let session = SyncSession::new(
            (target.host.as_str(), target.port),
            target.community.as_bytes(),
            Some(timeout),
            0,
        )
        .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;
        self.session = Some(session);
        Ok(())
    }

    fn get(&mut self, oid: &[u32]) -> io::Result<SnmpValue> {
        let session = self.session()?;
        let mut pdu = session.get(oid).map_err(snmp_error)?;
        Ok(pdu.varbinds.next().map(|(_, value)| owned(value)).unwrap_or(SnmpValue::Missing))
    }

    fn walk(&mut self, base: &[u32]) -> io::Result<Vec<(Vec<u32>, SnmpValue)>> {
        let session = self.session()?;
        let mut rows = Vec::new();
        let mut current = base.to_vec();
        let mut buf = [0u32; 128];
        while rows.len() < MAX_WALK {
            let mut pdu = session.getnext(&current).map_err(snmp_error)?;
            let Some((name, value)) = pdu.varbinds.next() else {
                break;
            };
            let name = name.read_name(&mut buf).map_err(snmp_error)?.to_vec();
            // left the subtree, or an agent that does not advance
            if !name.starts_with(base) || name <= current {
                break;
            }
            let value = owned(value);
            if value == SnmpValue::Missing {
                break;
            }
            current = name.clone();
            rows.push((name, value));
        }
        Ok(rows)
    }

    fn close(&mut self) {
        self.session = None;
    }
}

struct CounterSample {
    at: Instant,
    input: SnmpValue,
    output: SnmpValue,
}

/// Metric reader over one SNMP agent
pub(super) struct SnmpPoller {
    client: Box<dyn SnmpClient>,
    oids: &'static SnmpOids,
    device: String,
    /// Octet counters from the previous poll, by interface index
    counters: HashMap<u32, CounterSample>,
}

fn with_suffix(base: &[u32], index: u32) -> Vec<u32> {
    let mut oid = base.to_vec();
    oid.push(index);
    oid
}

/// `1234567` hundredths of a second as `0 days, 3 hours, 25 minutes`
fn format_ticks(ticks: u64) -> String {
    let minutes = ticks / 100 / 60;
    format!("{} days, {} hours, {} minutes", minutes / 1440, minutes / 60 % 24, minutes % 60)
}

impl SnmpPoller {
    pub(super) fn new(client: Box<dyn SnmpClient>, oids: &'static SnmpOids, device: String) -> Self {
        Self {
            client,
            oids,
            device,
            counters: HashMap::new(),
        }
    }

    /// SNMP is connectionless; an answered sysUpTime request counts as connected.
    pub(super) fn open(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError> {
        self.client.open(target, timeout)?;
        if self.probe() {
            Ok(())
        } else {
            self.client.close();
            Err(ConnectionError::Timeout(format!("no SNMP response from {}", target.addr())))
        }
    }

    pub(super) fn close(&mut self) {
        self.client.close();
    }

    pub(super) fn probe(&mut self) -> bool {
        matches!(self.client.get(SYS_UPTIME), Ok(v) if v != SnmpValue::Missing)
    }

    fn read(&mut self, metric: &str, oid: &[u32]) -> Option<u64> {
        match self.client.get(oid) {
            Ok(value) => value.as_u64(),
            Err(e) => {
                warn!(device = %self.device, metric, "SNMP read failed: {}", e);
                None
            }
        }
    }

    pub(super) fn cpu(&mut self) -> Option<f64> {
        let oids = self.oids;
        let value = oids.cpu.iter().find_map(|oid| self.read("cpu", oid)).map(|v| v as f64);
        if value.is_none() {
            warn!(device = %self.device, metric = "cpu", "No CPU object answered");
        }
        value
    }

    pub(super) fn memory(&mut self) -> Option<f64> {
        let oids = self.oids;
        let value = oids.memory.iter().find_map(|candidate| match candidate {
            SnmpMemory::Percent(oid) => self.read("memory", oid).map(|v| v as f64),
            SnmpMemory::UsedFree(used, free) => {
                let used = self.read("memory", used)?;
                let free = self.read("memory", free)?;
                let total = used + free;
                (total > 0).then(|| used as f64 * 100.0 / total as f64)
            }
        });
        if value.is_none() {
            warn!(device = %self.device, metric = "memory", "No memory object answered");
        }
        value.map(|v| (v * 100.0).round() / 100.0)
    }

    pub(super) fn uptime(&mut self) -> Option<String> {
        self.read("uptime", SYS_UPTIME).map(format_ticks)
    }

    /// Interfaces that are up, at most `limit`. Rates need a previous poll;
    /// the first poll of an interface reports zero with `parsed: false`.
    pub(super) fn interface_stats(&mut self, limit: usize) -> Vec<InterfaceStats> {
        let states = match self.client.walk(IF_OPER_STATUS) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(device = %self.device, "SNMP interface walk failed: {}", e);
                return Vec::new();
            }
        };
        let up: Vec<u32> = states
            .into_iter()
            .filter(|(_, state)| *state == SnmpValue::Integer(1))
            .filter_map(|(oid, _)| oid.last().copied())
            .take(limit)
            .collect();

        let mut stats = Vec::with_capacity(up.len());
        for index in up {
            let name = match self.client.get(&with_suffix(IF_DESCR, index)) {
                Ok(SnmpValue::Text(name)) if !name.is_empty() => name,
                _ => format!("ifIndex {}", index),
            };
            let input = self.client.get(&with_suffix(IF_IN_OCTETS, index)).unwrap_or(SnmpValue::Missing);
            let output = self.client.get(&with_suffix(IF_OUT_OCTETS, index)).unwrap_or(SnmpValue::Missing);
            let now = Instant::now();

            let rates = self.counters.get(&index).and_then(|prev| {
                let secs = now.duration_since(prev.at).as_secs_f64();
                if secs <= 0.0 {
                    return None;
                }
                let bps = |delta: u64| (delta as f64 * 8.0 / secs) as u64;
                Some((
                    input.delta_since(&prev.input).map(bps),
                    output.delta_since(&prev.output).map(bps),
                ))
            });
            let (input_bps, output_bps) = rates.unwrap_or((None, None));
            if input != SnmpValue::Missing || output != SnmpValue::Missing {
                self.counters.insert(index, CounterSample { at: now, input, output });
            }

            stats.push(InterfaceStats {
                name,
                status: "up".to_string(),
                input_bps: input_bps.unwrap_or(0),
                output_bps: output_bps.unwrap_or(0),
                input_rate: format_bandwidth(input_bps.unwrap_or(0)),
                output_rate: format_bandwidth(output_bps.unwrap_or(0)),
                parsed: input_bps.is_some() || output_bps.is_some(),
            });
        }
        stats
    }
}
