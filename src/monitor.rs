use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connector::{InterfaceStats, Metric};
use crate::db::Store;
use crate::models::Device;
use crate::pool::ConnectionPool;

/// Latest metrics collected from one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: i64,
    pub collected_at: DateTime<Utc>,
    pub cpu_usage: Metric<f64>,
    pub memory_usage: Metric<f64>,
    pub uptime: Metric<String>,
    pub interfaces: Vec<InterfaceStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceSnapshot {
    fn unavailable(device_id: i64, error: String) -> Self {
        Self {
            device_id,
            collected_at: Utc::now(),
            cpu_usage: Metric { value: 0.0, parsed: false },
            memory_usage: Metric { value: 0.0, parsed: false },
            uptime: Metric { value: "unknown".to_string(), parsed: false },
            interfaces: Vec::new(),
            error: Some(error),
        }
    }
}

struct MonitorTask {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Explicitly started per-device polling. Each monitored device gets a
/// polling task and a keepalive task sharing one pooled session. The device
/// record is re-read before every poll so inventory edits take effect.
pub struct DeviceMonitor {
    pool: Arc<ConnectionPool>,
    store: Store,
    interval: Duration,
    tasks: Mutex<HashMap<i64, MonitorTask>>,
    snapshots: Arc<RwLock<HashMap<i64, DeviceSnapshot>>>,
}

impl DeviceMonitor {
    pub fn new(pool: Arc<ConnectionPool>, store: Store, interval: Duration) -> Self {
        Self {
            pool,
            store,
            interval,
            tasks: Mutex::new(HashMap::new()),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Collect one snapshot through the pooled session
    pub async fn poll(&self, device: &Device) -> DeviceSnapshot {
        let device_id = device.id;
        let result = self
            .pool
            .with_connection(device, move |conn| {
                Ok(DeviceSnapshot {
                    device_id,
                    collected_at: Utc::now(),
                    cpu_usage: conn.cpu_usage(),
                    memory_usage: conn.memory_usage(),
                    uptime: conn.uptime(),
                    interfaces: conn.interface_stats(),
                    error: None,
                })
            })
            .await;
        match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(device = %device.name, "Metric collection failed: {}", e);
                DeviceSnapshot::unavailable(device_id, e.to_string())
            }
        }
    }

    /// Current inventory record; the previous copy when it cannot be read
    async fn refresh(&self, device: Device) -> Device {
        match self.store.get_device(device.id).await {
            Ok(Some(current)) => current,
            Ok(None) => device,
            Err(e) => {
                warn!(device_id = device.id, "Device lookup failed: {:#}", e);
                device
            }
        }
    }

    /// Returns false when the device is already monitored.
    pub fn start_monitoring(self: &Arc<Self>, device: Device) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&device.id) {
            return false;
        }

        let cancel = CancellationToken::new();
        let device_id = device.id;
        let monitor = Arc::clone(self);
        let poll_cancel = cancel.clone();
        let poller = tokio::spawn(async move {
            let mut device = device;
            let mut ticker = tokio::time::interval(monitor.interval);
            loop {
                tokio::select! {
                    _ = poll_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        device = monitor.refresh(device).await;
                        let snapshot = monitor.poll(&device).await;
                        monitor
                            .snapshots
                            .write()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(device.id, snapshot);
                    }
                }
            }
        });
        let keepalive = self.pool.spawn_keepalive(device_id, cancel.clone());

        tasks.insert(
            device_id,
            MonitorTask {
                cancel,
                handles: vec![poller, keepalive],
            },
        );
        info!(device_id, interval_secs = self.interval.as_secs(), "Monitoring started");
        true
    }

    /// Returns false when the device was not monitored.
    pub async fn stop_monitoring(&self, device_id: i64) -> bool {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&device_id);
        let Some(task) = task else {
            return false;
        };
        task.cancel.cancel();
        for handle in task.handles {
            let _ = handle.await;
        }
        self.pool.close(device_id).await;
        info!(device_id, "Monitoring stopped");
        true
    }

    pub fn is_monitoring(&self, device_id: i64) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&device_id)
    }

    pub fn latest(&self, device_id: i64) -> Option<DeviceSnapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device_id)
            .cloned()
    }

    pub async fn stop_all(&self) {
        let ids: Vec<i64> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        for id in ids {
            self.stop_monitoring(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::scripted::{ScriptedAgent, ScriptedDevice, ScriptedProvider, ScriptedTransport};
    use crate::connector::snmp::SnmpValue;
    use crate::connector::{ConnectionError, ConnectorFactory};
    use crate::models::CreateDeviceRequest;
    use crate::vendor::oid;

    fn device(id: i64, ip: &str) -> Device {
        let now = Utc::now();
        Device {
            id,
            name: format!("fw-{}", id),
            ip_address: ip.to_string(),
            manufacturer: "Huawei".to_string(),
            model: "USG6000".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            snmp_community: String::new(),
            port: 22,
            connection_protocol: "ssh".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn monitor_with_store(provider: &ScriptedProvider) -> (Arc<DeviceMonitor>, Store) {
        let store = Store::in_memory().await.unwrap();
        let factory = ConnectorFactory::new(Arc::new(provider.clone()), ScriptedTransport::options());
        let pool = Arc::new(ConnectionPool::new(factory, Duration::from_millis(20)));
        let monitor = Arc::new(DeviceMonitor::new(pool, store.clone(), Duration::from_millis(20)));
        (monitor, store)
    }

    async fn monitor(provider: &ScriptedProvider) -> Arc<DeviceMonitor> {
        monitor_with_store(provider).await.0
    }

    async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_poll_collects_metrics() {
        let provider = ScriptedProvider::default();
        provider.insert(
            "192.0.2.1",
            ScriptedDevice::default()
                .respond("display cpu-usage", "CPU Usage            : 35% Max: 90%\n<fw>")
                .respond("display memory-usage", "Memory Using Percentage Is: 48%\n<fw>")
                .respond(
                    "display interface brief",
                    "Interface                   PHY   Protocol  InUti OutUti   inErrors  outErrors\nGigabitEthernet0/0/0        up    up           0%     0%          0          0\n<fw>",
                )
                .respond(
                    "display interface GigabitEthernet0/0/0",
                    "    Last 300 seconds input rate: 8000 bits/sec, 10 packets/sec\n    Last 300 seconds output rate: 16000 bits/sec, 12 packets/sec\n<fw>",
                ),
        );
        let monitor = monitor(&provider).await;
        let snapshot = monitor.poll(&device(1, "192.0.2.1")).await;
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.cpu_usage.value, 35.0);
        assert!(snapshot.cpu_usage.parsed);
        assert_eq!(snapshot.memory_usage.value, 48.0);
        assert!(!snapshot.uptime.parsed);
        assert_eq!(snapshot.interfaces.len(), 1);
        assert_eq!(snapshot.interfaces[0].output_rate, "16.00 Kbps");
    }

    #[tokio::test]
    async fn test_unreachable_device_yields_sentinels() {
        let provider = ScriptedProvider::default();
        provider.insert(
            "192.0.2.2",
            ScriptedDevice::default().refuse(ConnectionError::Unreachable("no route".into())),
        );
        let monitor = monitor(&provider).await;
        let snapshot = monitor.poll(&device(2, "192.0.2.2")).await;
        assert!(snapshot.error.is_some());
        assert_eq!(snapshot.uptime.value, "unknown");
        assert!(!snapshot.cpu_usage.parsed);
    }

    #[tokio::test]
    async fn test_start_and_stop_monitoring() {
        let provider = ScriptedProvider::default();
        let monitor = monitor(&provider).await;
        let dev = device(3, "192.0.2.3");

        assert!(monitor.start_monitoring(dev.clone()));
        assert!(!monitor.start_monitoring(dev));
        assert!(monitor.is_monitoring(3));

        assert!(wait_for(|| monitor.latest(3).is_some()).await);

        assert!(monitor.stop_monitoring(3).await);
        assert!(!monitor.stop_monitoring(3).await);
        assert!(!monitor.is_monitoring(3));
        // the last snapshot stays readable
        assert!(monitor.latest(3).is_some());
        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_snmp_device_is_monitored() {
        let provider = ScriptedProvider::default();
        provider.insert_agent(
            "192.0.2.8",
            ScriptedAgent::default()
                .value(oid::HUAWEI_CPU, SnmpValue::Integer(17))
                .value(oid::HUAWEI_MEMORY, SnmpValue::Integer(40)),
        );
        let monitor = monitor(&provider).await;
        let mut dev = device(8, "192.0.2.8");
        dev.connection_protocol = "snmp".to_string();
        dev.snmp_community = "public".to_string();

        let snapshot = monitor.poll(&dev).await;
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.cpu_usage, Metric { value: 17.0, parsed: true });
        assert_eq!(snapshot.memory_usage, Metric { value: 40.0, parsed: true });
        assert!(snapshot.uptime.parsed);
    }

    #[tokio::test]
    async fn test_polling_follows_inventory_changes() {
        let provider = ScriptedProvider::default();
        let (monitor, store) = monitor_with_store(&provider).await;
        let req = CreateDeviceRequest {
            name: "fw-moved".to_string(),
            ip_address: "192.0.2.10".to_string(),
            manufacturer: "Huawei".to_string(),
            model: "USG6000".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            snmp_community: String::new(),
            port: 22,
            connection_protocol: "ssh".to_string(),
        };
        let dev = store.create_device(&req).await.unwrap();
        assert!(monitor.start_monitoring(dev.clone()));
        assert!(wait_for(|| provider.device("192.0.2.10").opens() > 0).await);

        let moved = CreateDeviceRequest {
            ip_address: "192.0.2.11".to_string(),
            ..req
        };
        store.update_device(dev.id, &moved).await.unwrap();
        assert!(wait_for(|| provider.device("192.0.2.11").opens() > 0).await);
        monitor.stop_all().await;
    }
}
