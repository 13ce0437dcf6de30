// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Threshold monitors.
//!
//! The monitors run while the `threshold` `ConfigMap` exists in the reserved
//! namespace:
//!
//! - **create** starts one periodic task per check (cluster, node, namespace)
//! - **update** swaps the thresholds; running tasks read them on their next tick
//! - **delete** stops every task
//!
//! Stopping is a handshake: the controller sends each task a one-shot ack
//! sender on its stop channel and waits until the task echoes it back, then
//! joins the task. Start and stop are idempotent.

pub mod checks;
pub mod threshold;
pub mod usage;

use crate::alerts::AlertSender;
use crate::constants::{RESERVED_NAMESPACE, THRESHOLD_CONFIGMAP};
use crate::informer::{ClusterEvent, Projection, ResourceEvent, ResourceKind};
use crate::metrics;
use async_trait::async_trait;
use checks::{Check, CheckContext, ClusterCheck, NamespaceCheck, NodeCheck};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use threshold::MonitorConfig;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Acknowledgement channel sent to a task that should stop.
type StopRequest = oneshot::Sender<()>;

struct RunningCheck {
    name: &'static str,
    stop: mpsc::Sender<StopRequest>,
    task: JoinHandle<()>,
}

struct Running {
    config: watch::Sender<MonitorConfig>,
    checks: Vec<RunningCheck>,
}

/// Starts, reconfigures and stops the periodic checks.
pub struct ThresholdMonitor {
    checks: Vec<Arc<dyn Check>>,
    alerts: AlertSender,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl ThresholdMonitor {
    /// Monitor running the cluster, node and namespace checks.
    #[must_use]
    pub fn new(ctx: CheckContext, alerts: AlertSender, interval: Duration) -> Self {
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(ClusterCheck::new(ctx.clone())),
            Arc::new(NodeCheck::new(ctx.clone())),
            Arc::new(NamespaceCheck::new(ctx)),
        ];
        Self::with_checks(checks, alerts, interval)
    }

    #[must_use]
    pub fn with_checks(
        checks: Vec<Arc<dyn Check>>,
        alerts: AlertSender,
        interval: Duration,
    ) -> Self {
        Self {
            checks,
            alerts,
            interval,
            running: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Current thresholds, if running.
    pub async fn config(&self) -> Option<MonitorConfig> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| *r.config.borrow())
    }

    /// Start every check; a running monitor is only reconfigured.
    pub async fn start(&self, config: MonitorConfig) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            debug!("Threshold monitor already running, applying thresholds");
            current.config.send_replace(config);
            return;
        }

        info!(
            "Starting threshold monitors (cpu={}%, memory={}%, storage={}%, podCount={}%)",
            config.cpu, config.memory, config.storage, config.pod_count
        );
        let (config_tx, config_rx) = watch::channel(config);
        let checks = self
            .checks
            .iter()
            .map(|check| {
                let (stop_tx, stop_rx) = mpsc::channel(1);
                let task = tokio::spawn(run_check(
                    Arc::clone(check),
                    config_rx.clone(),
                    self.interval,
                    self.alerts.clone(),
                    stop_rx,
                ));
                metrics::set_monitor_running(check.name(), true);
                RunningCheck {
                    name: check.name(),
                    stop: stop_tx,
                    task,
                }
            })
            .collect();

        *running = Some(Running {
            config: config_tx,
            checks,
        });
    }

    /// Swap the thresholds of a running monitor, starting it if needed.
    pub async fn reconfigure(&self, config: MonitorConfig) {
        let running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            info!(
                "Reconfiguring threshold monitors (cpu={}%, memory={}%, storage={}%, podCount={}%)",
                config.cpu, config.memory, config.storage, config.pod_count
            );
            current.config.send_replace(config);
            return;
        }
        drop(running);
        warn!("Threshold ConfigMap updated while monitors were stopped, starting them");
        self.start(config).await;
    }

    /// Stop every check and wait until each has acknowledged.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Threshold monitor not running, nothing to stop");
            return;
        };

        for check in running.checks {
            let (ack_tx, ack_rx) = oneshot::channel();
            if check.stop.send(ack_tx).await.is_ok() && ack_rx.await.is_err() {
                warn!("Monitor {} exited without acknowledging stop", check.name);
            }
            if let Err(e) = check.task.await {
                error!("Monitor {} task failed: {}", check.name, e);
            }
            metrics::set_monitor_running(check.name, false);
        }
        info!("Threshold monitors stopped");
    }

    pub async fn on_config_map(&self, event: ResourceEvent<ConfigMap>) {
        let cm = event.object();
        if cm.namespace().as_deref() != Some(RESERVED_NAMESPACE)
            || cm.name_any() != THRESHOLD_CONFIGMAP
        {
            return;
        }

        match &event {
            ResourceEvent::Created(cm) => {
                self.start(MonitorConfig::from_data(cm.data.as_ref())).await;
            }
            ResourceEvent::Updated { new, .. } => {
                self.reconfigure(MonitorConfig::from_data(new.data.as_ref()))
                    .await;
            }
            ResourceEvent::Deleted(_) => self.stop().await,
        }
    }
}

/// Tick loop of one check.
async fn run_check(
    check: Arc<dyn Check>,
    config: watch::Receiver<MonitorConfig>,
    interval: Duration,
    alerts: AlertSender,
    mut stop: mpsc::Receiver<StopRequest>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(monitor = check.name(), "Monitor loop started");

    loop {
        tokio::select! {
            biased;
            request = stop.recv() => {
                if let Some(ack) = request {
                    let _ = ack.send(());
                }
                break;
            }
            _ = ticker.tick() => {
                let thresholds = *config.borrow();
                for alert in check.run(&thresholds).await {
                    alerts.emit(alert).await;
                }
            }
        }
    }
    debug!(monitor = check.name(), "Monitor loop stopped");
}

#[async_trait]
impl Projection for ThresholdMonitor {
    fn name(&self) -> &'static str {
        "threshold-monitor"
    }

    fn interested_in(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::ConfigMap
    }

    async fn handle(&self, event: ClusterEvent) {
        if let ClusterEvent::ConfigMap(e) = event {
            self.on_config_map(e).await;
        }
    }
}
