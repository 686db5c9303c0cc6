//! Periodic policy sync.
//!
//! The scheduler runs `sync_all` once per interval on a background task and
//! raises a `sync_failure` alert after `alert_threshold` consecutive failed
//! cycles when alerting is enabled.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::deploy::PolicyDeployEngine;
use crate::models::{alert_severity, alert_type, NewAlert};

pub const MIN_INTERVAL_SECS: u64 = 60;
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Partial update for the scheduler; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfigUpdate {
    pub interval: Option<u64>,
    pub enabled: Option<bool>,
    pub alert_on_failure: Option<bool>,
    pub alert_threshold: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_sync_result: Option<Value>,
    pub failure_count: u32,
    pub alert_on_failure: bool,
    pub alert_threshold: u32,
}

struct SchedulerState {
    enabled: bool,
    interval: u64,
    alert_on_failure: bool,
    alert_threshold: u32,
    last_sync_time: Option<DateTime<Utc>>,
    last_sync_result: Option<Value>,
    /// Consecutive failures counted toward the next alert
    failure_count: u32,
    /// Consecutive failures since the last good cycle, for recovery logging
    failures_since_success: u32,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PolicySyncScheduler {
    engine: Arc<PolicyDeployEngine>,
    store: Store,
    state: Mutex<SchedulerState>,
    worker: Mutex<Option<Worker>>,
}

impl PolicySyncScheduler {
    pub fn new(engine: Arc<PolicyDeployEngine>, store: Store, config: &Config) -> Self {
        Self {
            engine,
            store,
            state: Mutex::new(SchedulerState {
                enabled: config.sync_enabled,
                interval: config.sync_interval.max(MIN_INTERVAL_SECS),
                alert_on_failure: config.sync_alert_on_failure,
                alert_threshold: config.sync_alert_threshold.max(1),
                last_sync_time: None,
                last_sync_result: None,
                failure_count: 0,
                failures_since_success: 0,
            }),
            worker: Mutex::new(None),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// Start the background loop. Returns false when already running or
    /// disabled.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.state().enabled {
            warn!("Policy sync scheduler is disabled, not starting");
            return false;
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().map(|w| !w.handle.is_finished()).unwrap_or(false) {
            warn!("Policy sync scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                scheduler.run_cycle().await;
                let wait = Duration::from_secs(scheduler.state().interval);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            info!("Policy sync loop exited");
        });
        *worker = Some(Worker { cancel, handle });
        info!(interval_secs = self.state().interval, "Policy sync scheduler started");
        true
    }

    /// Stop the loop, waiting up to five seconds for an in-flight cycle.
    /// Returns false when not running.
    pub async fn stop(&self) -> bool {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Worker { cancel, mut handle }) = worker else {
            warn!("Policy sync scheduler is not running");
            return false;
        };
        if handle.is_finished() {
            return false;
        }
        cancel.cancel();
        if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
            warn!("Policy sync cycle did not finish in time, aborting it");
            handle.abort();
        }
        info!("Policy sync scheduler stopped");
        true
    }

    pub fn get_status(&self) -> SchedulerStatus {
        let running = self.is_running();
        let state = self.state();
        SchedulerStatus {
            enabled: state.enabled,
            running,
            interval: state.interval,
            last_sync_time: state.last_sync_time,
            last_sync_result: state.last_sync_result.clone(),
            failure_count: state.failure_count,
            alert_on_failure: state.alert_on_failure,
            alert_threshold: state.alert_threshold,
        }
    }

    /// Apply a partial config. Enabling starts the loop, disabling stops it.
    pub async fn set_config(self: &Arc<Self>, update: &SchedulerConfigUpdate) {
        let enabled_changed = {
            let mut state = self.state();
            if let Some(interval) = update.interval {
                if interval < MIN_INTERVAL_SECS {
                    warn!(requested = interval, "Sync interval too short, using {}s", MIN_INTERVAL_SECS);
                }
                state.interval = interval.max(MIN_INTERVAL_SECS);
                info!(interval_secs = state.interval, "Sync interval updated");
            }
            if let Some(on) = update.alert_on_failure {
                state.alert_on_failure = on;
                info!(alert_on_failure = on, "Sync failure alerting updated");
            }
            if let Some(threshold) = update.alert_threshold {
                state.alert_threshold = threshold.clamp(1, u32::MAX as i64) as u32;
                info!(alert_threshold = state.alert_threshold, "Sync alert threshold updated");
            }
            update.enabled.map(|enabled| {
                state.enabled = enabled;
                enabled
            })
        };

        match enabled_changed {
            Some(true) if !self.is_running() => {
                self.start();
            }
            Some(false) if self.is_running() => {
                self.stop().await;
            }
            _ => {}
        }
    }

    /// Run one cycle now, outside the loop
    pub async fn force_sync(&self) -> Value {
        info!("Manual policy sync triggered");
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> Value {
        let started = Instant::now();
        let sync_time = Utc::now();
        self.state().last_sync_time = Some(sync_time);

        let outcome = self.engine.sync_all(None, None).await;
        let elapsed = format!("{:.2}s", started.elapsed().as_secs_f64());
        let (result, failure) = match outcome {
            Ok(summary) => {
                let failure = (summary.failed > 0)
                    .then(|| format!("{} of {} device checks failed", summary.failed, summary.total));
                let result = json!({
                    "sync_time": sync_time,
                    "elapsed_time": elapsed,
                    "total": summary.total,
                    "success": summary.success,
                    "failed": summary.failed,
                    "not_found": summary.not_found,
                    "details": summary.details,
                });
                (result, failure)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                let result = json!({
                    "error": error,
                    "sync_time": sync_time,
                    "elapsed_time": elapsed,
                    "total": 0,
                    "success": 0,
                    "failed": 0,
                    "not_found": 0,
                });
                (result, Some(error))
            }
        };

        self.state().last_sync_result = Some(result.clone());
        match failure {
            Some(reason) => self.record_failure(&reason).await,
            None => self.record_success(),
        }
        result
    }

    async fn record_failure(&self, reason: &str) {
        let alert_count = {
            let mut state = self.state();
            state.failure_count += 1;
            state.failures_since_success += 1;
            error!(consecutive = state.failure_count, "Policy sync failed: {}", reason);
            if state.alert_on_failure && state.failure_count >= state.alert_threshold {
                let count = state.failure_count;
                state.failure_count = 0;
                Some(count)
            } else {
                None
            }
        };

        if let Some(count) = alert_count {
            let message = format!("policy sync failed {} times in a row, latest error: {}", count, reason);
            warn!("Policy sync alert: {}", message);
            let alert = NewAlert {
                policy_id: None,
                device_id: None,
                alert_type: alert_type::SYNC_FAILURE,
                severity: alert_severity::WARNING,
                details: json!({ "message": message, "consecutive_failures": count }),
            };
            match self.store.create_alert(&alert).await {
                Ok(a) => info!(alert_id = a.id, "Sync failure alert recorded"),
                Err(e) => error!("Failed to record sync failure alert: {:#}", e),
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.state();
        if state.failures_since_success > 0 {
            info!(
                previous_failures = state.failures_since_success,
                "Policy sync recovered"
            );
        }
        state.failure_count = 0;
        state.failures_since_success = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::scripted::{ScriptedDevice, ScriptedProvider, ScriptedTransport};
    use crate::connector::ConnectorFactory;
    use crate::models::*;
    use crate::pool::ConnectionPool;

    fn config() -> Config {
        Config {
            sync_enabled: true,
            sync_interval: 300,
            sync_alert_on_failure: false,
            sync_alert_threshold: 3,
            ..Config::default()
        }
    }

    async fn scheduler_with(config: Config, provider: ScriptedProvider) -> (Arc<PolicySyncScheduler>, Store) {
        let store = Store::in_memory().await.unwrap();
        let factory = ConnectorFactory::new(Arc::new(provider), ScriptedTransport::options());
        let pool = Arc::new(ConnectionPool::new(factory, Duration::from_secs(25)));
        let engine = Arc::new(PolicyDeployEngine::new(store.clone(), pool));
        (Arc::new(PolicySyncScheduler::new(engine, store.clone(), &config)), store)
    }

    /// A successful deploy row on a device whose status query breaks
    async fn broken_pair(store: &Store, provider: &ScriptedProvider) {
        provider.insert("192.0.2.50", ScriptedDevice::default().break_on("display ike sa"));
        let device = store
            .create_device(&CreateDeviceRequest {
                name: "fw-50".to_string(),
                ip_address: "192.0.2.50".to_string(),
                manufacturer: "Huawei".to_string(),
                model: String::new(),
                username: "admin".to_string(),
                password: "admin".to_string(),
                snmp_community: String::new(),
                port: 22,
                connection_protocol: "ssh".to_string(),
            })
            .await
            .unwrap();
        let policy = store
            .create_policy(&CreatePolicyRequest {
                name: "p".to_string(),
                policy_type: policy_type::ALLOW_ALL.to_string(),
                description: String::new(),
                config: json!({}),
                status: policy_status::ACTIVE.to_string(),
                created_by: None,
            })
            .await
            .unwrap();
        let row = store
            .create_deployment(&NewDeployment {
                policy_id: policy.id,
                device_id: device.id,
                operation: deployment_operation::DEPLOY,
                deployed_by: None,
                config_snapshot: json!({}),
                result: json!({}),
            })
            .await
            .unwrap();
        store
            .finish_deployment(row.id, deployment_status::SUCCESS, &json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_config_bounds() {
        let (scheduler, _) = scheduler_with(
            Config {
                sync_enabled: false,
                ..config()
            },
            ScriptedProvider::default(),
        )
        .await;
        scheduler
            .set_config(&SchedulerConfigUpdate {
                interval: Some(10),
                alert_threshold: Some(0),
                ..Default::default()
            })
            .await;
        let status = scheduler.get_status();
        assert_eq!(status.interval, 60);
        assert_eq!(status.alert_threshold, 1);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (scheduler, _) = scheduler_with(config(), ScriptedProvider::default()).await;
        assert!(!scheduler.stop().await);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.get_status().running);
        assert!(scheduler.stop().await);
        assert!(!scheduler.get_status().running);
        assert!(!scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_start() {
        let (scheduler, _) = scheduler_with(
            Config {
                sync_enabled: false,
                ..config()
            },
            ScriptedProvider::default(),
        )
        .await;
        assert!(!scheduler.start());

        scheduler
            .set_config(&SchedulerConfigUpdate {
                enabled: Some(true),
                ..Default::default()
            })
            .await;
        assert!(scheduler.get_status().running);

        scheduler
            .set_config(&SchedulerConfigUpdate {
                enabled: Some(false),
                ..Default::default()
            })
            .await;
        let status = scheduler.get_status();
        assert!(!status.enabled);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_force_sync_records_result() {
        let (scheduler, _) = scheduler_with(config(), ScriptedProvider::default()).await;
        let result = scheduler.force_sync().await;
        assert_eq!(result["total"], 0);
        let status = scheduler.get_status();
        assert!(status.last_sync_time.is_some());
        assert_eq!(status.last_sync_result.unwrap()["failed"], 0);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn test_alert_after_threshold_then_reset() {
        let provider = ScriptedProvider::default();
        let (scheduler, store) = scheduler_with(
            Config {
                sync_alert_on_failure: true,
                ..config()
            },
            provider.clone(),
        )
        .await;
        broken_pair(&store, &provider).await;

        scheduler.force_sync().await;
        scheduler.force_sync().await;
        assert_eq!(scheduler.get_status().failure_count, 2);
        assert!(store.list_alerts(&AlertFilter::default(), 10).await.unwrap().is_empty());

        scheduler.force_sync().await;
        let alerts = store.list_alerts(&AlertFilter::default(), 10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, alert_type::SYNC_FAILURE);
        assert_eq!(alerts[0].severity, alert_severity::WARNING);
        assert_eq!(alerts[0].policy_id, None);
        assert_eq!(alerts[0].device_id, None);
        assert_eq!(scheduler.get_status().failure_count, 0);
    }

    #[tokio::test]
    async fn test_no_alert_when_alerting_disabled() {
        let provider = ScriptedProvider::default();
        let (scheduler, store) = scheduler_with(config(), provider.clone()).await;
        broken_pair(&store, &provider).await;

        for _ in 0..4 {
            scheduler.force_sync().await;
        }
        assert_eq!(scheduler.get_status().failure_count, 4);
        assert!(store.list_alerts(&AlertFilter::default(), 10).await.unwrap().is_empty());
    }

    async fn retire_pairs(store: &Store) {
        for deployed in store.list_current_deployed(None, None).await.unwrap() {
            store
                .create_deployment(&NewDeployment {
                    policy_id: deployed.policy_id,
                    device_id: deployed.device_id,
                    operation: deployment_operation::ROLLBACK,
                    deployed_by: None,
                    config_snapshot: json!({}),
                    result: json!({}),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_recovery_after_alert_raises_nothing_new() {
        let provider = ScriptedProvider::default();
        let (scheduler, store) = scheduler_with(
            Config {
                sync_alert_on_failure: true,
                ..config()
            },
            provider.clone(),
        )
        .await;
        broken_pair(&store, &provider).await;

        for _ in 0..3 {
            scheduler.force_sync().await;
        }
        assert_eq!(store.list_alerts(&AlertFilter::default(), 10).await.unwrap().len(), 1);

        provider.device("192.0.2.50").fail_io(false);
        retire_pairs(&store).await;
        scheduler.force_sync().await;
        scheduler.force_sync().await;

        assert_eq!(store.list_alerts(&AlertFilter::default(), 10).await.unwrap().len(), 1);
        assert_eq!(scheduler.get_status().failure_count, 0);
        assert_eq!(scheduler.state().failures_since_success, 0);
        assert_eq!(scheduler.get_status().last_sync_result.unwrap()["failed"], 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let provider = ScriptedProvider::default();
        let (scheduler, store) = scheduler_with(config(), provider.clone()).await;
        broken_pair(&store, &provider).await;
        scheduler.force_sync().await;
        assert_eq!(scheduler.get_status().failure_count, 1);

        provider.device("192.0.2.50").fail_io(false);
        // remove the pair from the sync set by recording a rollback
        let deployed = store.list_current_deployed(None, None).await.unwrap();
        store
            .create_deployment(&NewDeployment {
                policy_id: deployed[0].policy_id,
                device_id: deployed[0].device_id,
                operation: deployment_operation::ROLLBACK,
                deployed_by: None,
                config_snapshot: json!({}),
                result: json!({}),
            })
            .await
            .unwrap();
        scheduler.force_sync().await;
        assert_eq!(scheduler.get_status().failure_count, 0);
    }
}
