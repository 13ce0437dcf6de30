// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Side effects against the orchestrator.
//!
//! The agent writes exactly three things: the config finalizer, the
//! `config-hash` pod-template annotation, and warning events. They go through
//! [`ClusterWriter`] so reconcilers and monitors can be exercised against a
//! recording fake.

use crate::labels::CONFIG_HASH;
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use crate::workload::{ConfigObject, WorkloadController};
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Event;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

#[async_trait]
pub trait ClusterWriter: Send + Sync {
    /// Add `finalizer` to a config if absent.
    async fn add_finalizer(&self, config: &ConfigObject, finalizer: &str) -> Result<()>;

    /// Remove `finalizer` from a config if present.
    async fn remove_finalizer(&self, config: &ConfigObject, finalizer: &str) -> Result<()>;

    /// Set the `config-hash` annotation on a workload's pod template.
    async fn set_config_hash(&self, workload: &WorkloadController, hash: &str) -> Result<()>;

    /// Create an event in `namespace`.
    async fn create_event(&self, namespace: &str, event: &Event) -> Result<()>;
}

/// [`ClusterWriter`] backed by the API server.
#[derive(Clone)]
pub struct KubeWriter {
    client: Client,
}

impl KubeWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterWriter for KubeWriter {
    async fn add_finalizer(&self, config: &ConfigObject, finalizer: &str) -> Result<()> {
        match config {
            ConfigObject::ConfigMap(cm) => {
                ensure_finalizer(&self.client, cm.as_ref(), finalizer).await
            }
            ConfigObject::Secret(s) => ensure_finalizer(&self.client, s.as_ref(), finalizer).await,
        }
    }

    async fn remove_finalizer(&self, config: &ConfigObject, finalizer: &str) -> Result<()> {
        match config {
            ConfigObject::ConfigMap(cm) => {
                remove_finalizer(&self.client, cm.as_ref(), finalizer).await
            }
            ConfigObject::Secret(s) => remove_finalizer(&self.client, s.as_ref(), finalizer).await,
        }
    }

    async fn set_config_hash(&self, workload: &WorkloadController, hash: &str) -> Result<()> {
        let annotations = BTreeMap::from([(CONFIG_HASH, hash)]);
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": annotations
                    }
                }
            }
        });
        let params = PatchParams::default();
        let namespace = workload.namespace();
        let name = workload.name();

        match workload {
            WorkloadController::Deployment(_) => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                api.patch(name, &params, &Patch::Merge(&patch)).await?;
            }
            WorkloadController::DaemonSet(_) => {
                let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
                api.patch(name, &params, &Patch::Merge(&patch)).await?;
            }
            WorkloadController::StatefulSet(_) => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                api.patch(name, &params, &Patch::Merge(&patch)).await?;
            }
        }

        info!(
            "Set {} on {} {}/{} to {}",
            CONFIG_HASH,
            workload.kind(),
            namespace,
            name,
            hash
        );
        Ok(())
    }

    async fn create_event(&self, namespace: &str, event: &Event) -> Result<()> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), event).await?;
        Ok(())
    }
}

/// One recorded write.
#[cfg(test)]
#[derive(Clone, Debug, PartialEq)]
pub enum WriteCall {
    AddFinalizer { namespace: String, config: String },
    RemoveFinalizer { namespace: String, config: String },
    SetConfigHash { namespace: String, workload: String, hash: String },
    CreateEvent { namespace: String, event: Box<Event> },
}

/// In-memory [`ClusterWriter`] that records every call.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingWriter {
    calls: std::sync::Mutex<Vec<WriteCall>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingWriter {
    /// Make every subsequent call fail after being recorded.
    pub fn fail_calls(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Hashes written so far, in order.
    pub fn hashes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                WriteCall::SetConfigHash { hash, .. } => Some(hash),
                _ => None,
            })
            .collect()
    }

    /// Events created so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                WriteCall::CreateEvent { event, .. } => Some(*event),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: WriteCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("injected write failure");
        }
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl ClusterWriter for RecordingWriter {
    async fn add_finalizer(&self, config: &ConfigObject, _finalizer: &str) -> Result<()> {
        self.record(WriteCall::AddFinalizer {
            namespace: config.namespace().to_string(),
            config: config.config_ref().to_string(),
        })
    }

    async fn remove_finalizer(&self, config: &ConfigObject, _finalizer: &str) -> Result<()> {
        self.record(WriteCall::RemoveFinalizer {
            namespace: config.namespace().to_string(),
            config: config.config_ref().to_string(),
        })
    }

    async fn set_config_hash(&self, workload: &WorkloadController, hash: &str) -> Result<()> {
        self.record(WriteCall::SetConfigHash {
            namespace: workload.namespace().to_string(),
            workload: workload.key().to_string(),
            hash: hash.to_string(),
        })
    }

    async fn create_event(&self, namespace: &str, event: &Event) -> Result<()> {
        self.record(WriteCall::CreateEvent {
            namespace: namespace.to_string(),
            event: Box::new(event.clone()),
        })
    }
}
