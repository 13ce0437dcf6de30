// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Alert bus.
//!
//! Monitors and the node-agent pool push [`AlertEvent`]s onto one bounded
//! channel. Senders wait when the channel is full; alerts are never dropped.
//! A single [`AlertSink`] turns each alert into a `Warning` event addressed to
//! the agent's own pod.

use crate::constants::{
    ALERT_CHANNEL_CAPACITY, EVENT_COMPONENT, EVENT_NAME_SUFFIX_LEN, EVENT_TYPE_WARNING, KIND_POD,
};
use crate::metrics;
use crate::writer::ClusterWriter;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::jiff::Timestamp;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A breach or failure to report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertEvent {
    /// Kind of the subject (`Cluster`, `Node`, `Namespace`, `Pod`)
    pub kind: String,
    /// Namespace of the subject; empty for cluster-scoped subjects
    pub namespace: String,
    pub name: String,
    pub message: String,
    pub reason: &'static str,
}

impl AlertEvent {
    /// `Kind namespace/name` or `Kind name` for cluster-scoped subjects.
    #[must_use]
    pub fn subject(&self) -> String {
        if self.namespace.is_empty() {
            format!("{} {}", self.kind, self.name)
        } else {
            format!("{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Sending half of the alert channel.
#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<AlertEvent>,
}

impl AlertSender {
    /// Queue an alert, waiting for space if the channel is full.
    pub async fn emit(&self, alert: AlertEvent) {
        metrics::record_alert_emitted(&alert.kind);
        debug!(subject = %alert.subject(), reason = alert.reason, "Emitting alert");
        if self.tx.send(alert).await.is_err() {
            warn!("Alert sink has stopped, alert dropped");
        }
    }
}

/// Create the bounded alert channel.
#[must_use]
pub fn alert_channel() -> (AlertSender, mpsc::Receiver<AlertEvent>) {
    alert_channel_with_capacity(ALERT_CHANNEL_CAPACITY)
}

#[must_use]
pub fn alert_channel_with_capacity(capacity: usize) -> (AlertSender, mpsc::Receiver<AlertEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (AlertSender { tx }, rx)
}

/// Random lowercase alphanumeric suffix.
#[must_use]
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect()
}

/// Writes alerts to the orchestrator's event stream.
pub struct AlertSink {
    writer: Arc<dyn ClusterWriter>,
    pod_name: String,
    pod_namespace: String,
}

impl AlertSink {
    #[must_use]
    pub fn new(writer: Arc<dyn ClusterWriter>, pod_name: String, pod_namespace: String) -> Self {
        Self {
            writer,
            pod_name,
            pod_namespace,
        }
    }

    /// The `Warning` event for one alert.
    #[must_use]
    pub fn build_event(&self, alert: &AlertEvent) -> Event {
        let now = Time(Timestamp::now());
        Event {
            metadata: ObjectMeta {
                name: Some(format!(
                    "{}.{}",
                    self.pod_name,
                    random_suffix(EVENT_NAME_SUFFIX_LEN)
                )),
                namespace: Some(self.pod_namespace.clone()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some(KIND_POD.to_string()),
                name: Some(self.pod_name.clone()),
                namespace: Some(self.pod_namespace.clone()),
                ..Default::default()
            },
            type_: Some(EVENT_TYPE_WARNING.to_string()),
            reason: Some(alert.reason.to_string()),
            message: Some(format!("{}: {}", alert.subject(), alert.message)),
            source: Some(EventSource {
                component: Some(EVENT_COMPONENT.to_string()),
                host: None,
            }),
            reporting_component: Some(EVENT_COMPONENT.to_string()),
            reporting_instance: Some(self.pod_name.clone()),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            count: Some(1),
            ..Default::default()
        }
    }

    /// Consume alerts until every sender is dropped.
    ///
    /// # Errors
    ///
    /// Currently never fails; write errors are logged per alert.
    pub async fn run(self, mut alerts: mpsc::Receiver<AlertEvent>) -> anyhow::Result<()> {
        info!(
            "Alert sink started, writing events for pod {}/{}",
            self.pod_namespace, self.pod_name
        );
        while let Some(alert) = alerts.recv().await {
            let event = self.build_event(&alert);
            if let Err(e) = self.writer.create_event(&self.pod_namespace, &event).await {
                metrics::record_reconcile_error("alert-sink");
                warn!("Failed to write event for {}: {}", alert.subject(), e);
            }
        }
        info!("Alert sink stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod alerts_tests;
