// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Config-change rollouts and config deletion protection.
//!
//! Workloads opt in with the `update-on-config-change: "true"` annotation.
//! For every opted-in workload the reconciler:
//!
//! 1. records which `ConfigMap`s and `Secret`s its pod template references,
//! 2. puts [`CONFIG_FINALIZER`] on each of them,
//! 3. keeps the pod-template `config-hash` annotation equal to the hash of
//!    their data, so a data change rolls the workload out.
//!
//! A config that is deleted while still referenced keeps its finalizer until
//! its last user goes away.

use crate::constants::CONFIG_FINALIZER;
use crate::context::Stores;
use crate::informer::{ClusterEvent, Projection, ResourceEvent, ResourceKind};
use crate::labels::{CONFIG_HASH, UPDATE_ON_CONFIG_CHANGE, UPDATE_ON_CONFIG_CHANGE_ENABLED};
use crate::metrics;
use crate::reconcilers::config_hash::{compute_config_hash, referenced_configs};
use crate::reconcilers::ownership::{NamespaceIndex, OwnershipIndex};
use crate::workload::{
    ConfigData, ConfigKind, ConfigObject, ConfigRef, WorkloadController, WorkloadKey,
    WorkloadKind,
};
use crate::writer::ClusterWriter;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "config-reconciler";

/// Whether a workload participates in config-change rollouts.
#[must_use]
pub fn is_opted_in(workload: &WorkloadController) -> bool {
    workload
        .annotations()
        .and_then(|a| a.get(UPDATE_ON_CONFIG_CHANGE))
        .is_some_and(|v| v == UPDATE_ON_CONFIG_CHANGE_ENABLED)
}

pub struct ConfigReconciler {
    stores: Stores,
    writer: Arc<dyn ClusterWriter>,
    index: OwnershipIndex,
}

impl ConfigReconciler {
    #[must_use]
    pub fn new(stores: Stores, writer: Arc<dyn ClusterWriter>) -> Self {
        Self {
            stores,
            writer,
            index: OwnershipIndex::new(),
        }
    }

    /// Workloads in `namespace` currently referencing `config`.
    pub async fn users_of(&self, namespace: &str, config: &ConfigRef) -> Vec<WorkloadKey> {
        self.index.lock(namespace).await.users_of(config)
    }

    pub async fn on_workload(&self, event: ResourceEvent<WorkloadController>) {
        match event {
            ResourceEvent::Created(workload) | ResourceEvent::Updated { new: workload, .. } => {
                self.reconcile_workload(&workload).await;
            }
            ResourceEvent::Deleted(workload) => self.forget_workload(&workload).await,
        }
    }

    pub async fn on_config(&self, event: ResourceEvent<ConfigObject>) {
        match event {
            ResourceEvent::Created(config) => self.config_created(&config).await,
            ResourceEvent::Updated { old, new } => self.config_updated(&old, &new).await,
            ResourceEvent::Deleted(config) => {
                debug!(
                    "{} {}/{} deleted",
                    config.kind(),
                    config.namespace(),
                    config.name()
                );
            }
        }
    }

    async fn reconcile_workload(&self, workload: &WorkloadController) {
        let namespace = workload.namespace();
        let key = workload.key();
        let mut index = self.index.lock(namespace).await;

        if !is_opted_in(workload) {
            let previous = index.remove(&key);
            if !previous.is_empty() {
                info!(
                    "{} {}/{} opted out of config-change rollouts",
                    key.kind,
                    namespace,
                    key.name
                );
                self.release(&index, namespace, &previous).await;
            }
            return;
        }

        let refs = workload
            .pod_template()
            .map(referenced_configs)
            .unwrap_or_default();
        let previous = index.set(key.clone(), refs.clone());
        debug!(
            "{} {}/{} references {} config(s)",
            key.kind,
            namespace,
            key.name,
            refs.len()
        );

        for config_ref in &refs {
            if let Some(config) = self.config_object(namespace, config_ref) {
                self.protect(&config).await;
            }
        }

        let released: BTreeSet<ConfigRef> = previous.difference(&refs).cloned().collect();
        self.release(&index, namespace, &released).await;

        self.roll_out(workload, &refs).await;
    }

    async fn forget_workload(&self, workload: &WorkloadController) {
        let namespace = workload.namespace();
        let key = workload.key();
        let mut index = self.index.lock(namespace).await;
        let previous = index.remove(&key);
        if previous.is_empty() {
            return;
        }
        info!(
            "{} {}/{} deleted, releasing {} config(s)",
            key.kind,
            namespace,
            key.name,
            previous.len()
        );
        self.release(&index, namespace, &previous).await;
    }

    async fn config_created(&self, config: &ConfigObject) {
        let namespace = config.namespace();
        let config_ref = config.config_ref();
        let index = self.index.lock(namespace).await;

        let users = index.users_of(&config_ref);
        if users.is_empty() {
            return;
        }
        self.protect(config).await;
        self.roll_out_users(&users, namespace).await;
    }

    async fn config_updated(&self, old: &ConfigObject, new: &ConfigObject) {
        let namespace = new.namespace();
        let config_ref = new.config_ref();
        let index = self.index.lock(namespace).await;
        let users = index.users_of(&config_ref);

        if new.is_pending_deletion() {
            if users.is_empty() {
                self.unprotect(new).await;
            } else if !old.is_pending_deletion() {
                let names: Vec<String> = users.iter().map(ToString::to_string).collect();
                info!(
                    "{} {}/{} is being deleted but is still used by {}; keeping finalizer",
                    new.kind(),
                    namespace,
                    new.name(),
                    names.join(", ")
                );
            }
            return;
        }

        if users.is_empty() {
            return;
        }
        self.protect(new).await;

        if old.data() != new.data() {
            info!(
                "{} {}/{} data changed, rolling out {} workload(s)",
                new.kind(),
                namespace,
                new.name(),
                users.len()
            );
            self.roll_out_users(&users, namespace).await;
        }
    }

    /// Strip the finalizer from released configs that have no users left and
    /// are already being deleted.
    async fn release(&self, index: &NamespaceIndex, namespace: &str, refs: &BTreeSet<ConfigRef>) {
        for config_ref in refs {
            if index.is_used(config_ref) {
                continue;
            }
            let Some(config) = self.config_object(namespace, config_ref) else {
                continue;
            };
            if config.is_pending_deletion() {
                self.unprotect(&config).await;
            }
        }
    }

    async fn protect(&self, config: &ConfigObject) {
        if config.has_finalizer(CONFIG_FINALIZER) {
            return;
        }
        if let Err(e) = self.writer.add_finalizer(config, CONFIG_FINALIZER).await {
            metrics::record_reconcile_error(COMPONENT);
            warn!(
                "Failed to add finalizer to {} {}/{}: {}",
                config.kind(),
                config.namespace(),
                config.name(),
                e
            );
        }
    }

    async fn unprotect(&self, config: &ConfigObject) {
        if !config.has_finalizer(CONFIG_FINALIZER) {
            return;
        }
        if let Err(e) = self.writer.remove_finalizer(config, CONFIG_FINALIZER).await {
            metrics::record_reconcile_error(COMPONENT);
            warn!(
                "Failed to remove finalizer from {} {}/{}: {}",
                config.kind(),
                config.namespace(),
                config.name(),
                e
            );
        }
    }

    async fn roll_out_users(&self, users: &[WorkloadKey], namespace: &str) {
        for key in users {
            let Some(workload) = self.workload(namespace, key) else {
                warn!(
                    "Workload {} in {} is indexed but not cached, skipping rollout",
                    key, namespace
                );
                continue;
            };
            let refs = workload
                .pod_template()
                .map(referenced_configs)
                .unwrap_or_default();
            self.roll_out(&workload, &refs).await;
        }
    }

    /// Write a new `config-hash` if the referenced data no longer matches.
    async fn roll_out(&self, workload: &WorkloadController, refs: &BTreeSet<ConfigRef>) {
        let namespace = workload.namespace();
        let hash = compute_config_hash(refs, |r| self.config_data(namespace, r));
        let current = workload
            .template_annotations()
            .and_then(|a| a.get(CONFIG_HASH));
        if current == Some(&hash) {
            return;
        }

        if let Err(e) = self.writer.set_config_hash(workload, &hash).await {
            metrics::record_reconcile_error(COMPONENT);
            error!(
                "Failed to update {} on {} {}/{}: {}",
                CONFIG_HASH,
                workload.kind(),
                namespace,
                workload.name(),
                e
            );
        }
    }

    fn config_object(&self, namespace: &str, config_ref: &ConfigRef) -> Option<ConfigObject> {
        match config_ref.kind {
            ConfigKind::ConfigMap => self
                .stores
                .get_config_map(&config_ref.name, namespace)
                .map(ConfigObject::from),
            ConfigKind::Secret => self
                .stores
                .get_secret(&config_ref.name, namespace)
                .map(ConfigObject::from),
        }
    }

    fn config_data(&self, namespace: &str, config_ref: &ConfigRef) -> Option<ConfigData> {
        self.config_object(namespace, config_ref)
            .map(|config| config.data())
    }

    fn workload(&self, namespace: &str, key: &WorkloadKey) -> Option<WorkloadController> {
        match key.kind {
            WorkloadKind::Deployment => self
                .stores
                .get_deployment(&key.name, namespace)
                .map(WorkloadController::from),
            WorkloadKind::DaemonSet => self
                .stores
                .get_daemon_set(&key.name, namespace)
                .map(WorkloadController::from),
            WorkloadKind::StatefulSet => self
                .stores
                .get_stateful_set(&key.name, namespace)
                .map(WorkloadController::from),
        }
    }
}

#[async_trait]
impl Projection for ConfigReconciler {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn interested_in(&self, kind: ResourceKind) -> bool {
        matches!(
            kind,
            ResourceKind::Deployment
                | ResourceKind::DaemonSet
                | ResourceKind::StatefulSet
                | ResourceKind::ConfigMap
                | ResourceKind::Secret
        )
    }

    async fn handle(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::Deployment(e) => {
                self.on_workload(e.map(WorkloadController::from)).await;
            }
            ClusterEvent::DaemonSet(e) => {
                self.on_workload(e.map(WorkloadController::from)).await;
            }
            ClusterEvent::StatefulSet(e) => {
                self.on_workload(e.map(WorkloadController::from)).await;
            }
            ClusterEvent::ConfigMap(e) => self.on_config(e.map(ConfigObject::from)).await,
            ClusterEvent::Secret(e) => self.on_config(e.map(ConfigObject::from)).await,
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
