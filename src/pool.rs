//! Per-device connection slots.
//!
//! One slot per device id holds the device's connector behind an async
//! mutex, so commands from concurrent callers never interleave on a device.
//! The connector object survives between uses, which keeps its reconnect
//! backoff meaningful across calls. A connector built from an older
//! version of the device record is replaced on the next checkout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::{CommandError, ConnectionState, Connector, ConnectorError, ConnectorFactory};
use crate::models::Device;

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub device_id: i64,
    pub state: ConnectionState,
    pub last_used: Option<DateTime<Utc>>,
}

struct DeviceSlot {
    connector: Arc<AsyncMutex<Option<Connector>>>,
    /// Readable without waiting for the device lock
    info: Mutex<(ConnectionState, Option<DateTime<Utc>>)>,
}

impl DeviceSlot {
    fn new() -> Self {
        Self {
            connector: Arc::new(AsyncMutex::new(None)),
            info: Mutex::new((ConnectionState::Disconnected, None)),
        }
    }

    fn record(&self, state: ConnectionState) {
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        *info = (state, Some(Utc::now()));
    }
}

/// Exclusive use of one device. Dropping the lease puts the connector back
/// into the slot and releases the device lock.
pub struct DeviceLease {
    slot: Arc<DeviceSlot>,
    guard: OwnedMutexGuard<Option<Connector>>,
    connector: Option<Connector>,
}

impl DeviceLease {
    /// Run blocking connector work on the blocking thread pool.
    pub async fn run<T, F>(&mut self, f: F) -> Result<T, ConnectorError>
    where
        F: FnOnce(&mut Connector) -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut connector = self
            .connector
            .take()
            .ok_or_else(|| ConnectorError::Worker("connector lost by an earlier failure".to_string()))?;
        let (connector, out) = tokio::task::spawn_blocking(move || {
            let out = f(&mut connector);
            (connector, out)
        })
        .await
        .map_err(|e| ConnectorError::Worker(e.to_string()))?;
        self.slot.record(connector.state());
        self.connector = Some(connector);
        Ok(out)
    }

    pub fn is_connected(&self) -> bool {
        self.connector.as_ref().map(Connector::is_connected).unwrap_or(false)
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        if let Some(connector) = self.connector.take() {
            self.slot.record(connector.state());
            *self.guard = Some(connector);
        }
    }
}

pub struct ConnectionPool {
    factory: ConnectorFactory,
    slots: Mutex<HashMap<i64, Arc<DeviceSlot>>>,
    keepalive_interval: Duration,
}

impl ConnectionPool {
    pub fn new(factory: ConnectorFactory, keepalive_interval: Duration) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            keepalive_interval,
        }
    }

    pub fn factory(&self) -> &ConnectorFactory {
        &self.factory
    }

    fn slot(&self, device_id: i64) -> Arc<DeviceSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(device_id).or_insert_with(|| Arc::new(DeviceSlot::new())))
    }

    fn existing_slots(&self) -> Vec<(i64, Arc<DeviceSlot>)> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter().map(|(id, slot)| (*id, Arc::clone(slot))).collect()
    }

    /// Wait for exclusive use of a device, reusing its warm connector when
    /// it still matches `device`.
    pub async fn checkout(&self, device: &Device) -> DeviceLease {
        let slot = self.slot(device.id);
        let mut guard = Arc::clone(&slot.connector).lock_owned().await;
        let connector = match guard.take() {
            Some(cached) if cached.matches(device) => cached,
            Some(mut outdated) => {
                info!(device_id = device.id, "Device settings changed, replacing session");
                let _ = tokio::task::spawn_blocking(move || outdated.disconnect()).await;
                slot.record(ConnectionState::Disconnected);
                self.factory.get_connector(device)
            }
            None => self.factory.get_connector(device),
        };
        DeviceLease {
            slot,
            guard,
            connector: Some(connector),
        }
    }

    /// Connect (or confirm the cached session) and run `f`. A command failure
    /// drops the session so the next caller starts fresh.
    pub async fn with_connection<T, F>(&self, device: &Device, f: F) -> Result<T, ConnectorError>
    where
        F: FnOnce(&mut Connector) -> Result<T, CommandError> + Send + 'static,
        T: Send + 'static,
    {
        let mut lease = self.checkout(device).await;
        lease
            .run(move |conn| {
                conn.connect()?;
                let result = f(conn);
                if result.is_err() {
                    conn.disconnect();
                }
                result.map_err(ConnectorError::from)
            })
            .await
            .and_then(|r| r)
    }

    /// Send the probe command on a warm session. Returns false when there is
    /// no live session or the probe failed.
    pub async fn keepalive(&self, device_id: i64) -> bool {
        let slot = self.slot(device_id);
        let mut guard = Arc::clone(&slot.connector).lock_owned().await;
        let connector = match guard.take() {
            Some(c) if c.is_connected() => c,
            other => {
                *guard = other;
                return false;
            }
        };
        let mut lease = DeviceLease {
            slot,
            guard,
            connector: Some(connector),
        };
        let alive = lease
            .run(|conn| conn.probe())
            .await
            .unwrap_or(false);
        if !alive {
            warn!(device_id, "Keepalive probe failed");
        }
        alive
    }

    /// Probe the device's session every keepalive interval until cancelled.
    pub fn spawn_keepalive(self: &Arc<Self>, device_id: i64, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.keepalive_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if pool.keepalive(device_id).await {
                            debug!(device_id, "Keepalive ok");
                        }
                    }
                }
            }
            debug!(device_id, "Keepalive stopped");
        })
    }

    /// Disconnect a device's session. The slot and its lock stay in place.
    pub async fn close(&self, device_id: i64) {
        let slot = self.slot(device_id);
        let mut guard = Arc::clone(&slot.connector).lock_owned().await;
        if let Some(mut connector) = guard.take() {
            let result = tokio::task::spawn_blocking(move || {
                connector.disconnect();
                connector
            })
            .await;
            if let Ok(connector) = result {
                *guard = Some(connector);
            }
        }
        slot.record(ConnectionState::Disconnected);
    }

    pub async fn close_all(&self) {
        let ids: Vec<i64> = self.existing_slots().into_iter().map(|(id, _)| id).collect();
        for id in &ids {
            self.close(*id).await;
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "Closed device sessions");
        }
    }

    /// Last recorded state of a device's session; does not wait for the device lock.
    pub fn connection_status(&self, device_id: i64) -> ConnectionStatus {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, last_used) = slots
            .get(&device_id)
            .map(|slot| *slot.info.lock().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or((ConnectionState::Disconnected, None));
        ConnectionStatus {
            device_id,
            state,
            last_used,
        }
    }
}
