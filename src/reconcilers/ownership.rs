// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Config-ownership index.
//!
//! Per namespace, maps each opted-in workload to the set of configs it
//! references. Each namespace has its own mutex; handlers hold it for the
//! whole of one reconcile so a workload event and a config event in the same
//! namespace cannot interleave their finalizer decisions.

use crate::workload::{ConfigRef, WorkloadKey};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// References held by the workloads of one namespace.
#[derive(Debug, Default)]
pub struct NamespaceIndex {
    owners: HashMap<WorkloadKey, BTreeSet<ConfigRef>>,
}

impl NamespaceIndex {
    /// Record the references of `workload`, returning the ones it held before.
    pub fn set(&mut self, workload: WorkloadKey, refs: BTreeSet<ConfigRef>) -> BTreeSet<ConfigRef> {
        self.owners.insert(workload, refs).unwrap_or_default()
    }

    /// Forget `workload`, returning the references it held.
    pub fn remove(&mut self, workload: &WorkloadKey) -> BTreeSet<ConfigRef> {
        self.owners.remove(workload).unwrap_or_default()
    }

    /// Workloads referencing `config`, sorted.
    #[must_use]
    pub fn users_of(&self, config: &ConfigRef) -> Vec<WorkloadKey> {
        let mut users: Vec<WorkloadKey> = self
            .owners
            .iter()
            .filter(|(_, refs)| refs.contains(config))
            .map(|(key, _)| key.clone())
            .collect();
        users.sort();
        users
    }

    #[must_use]
    pub fn is_used(&self, config: &ConfigRef) -> bool {
        self.owners.values().any(|refs| refs.contains(config))
    }
}

/// Per-namespace [`NamespaceIndex`]es.
#[derive(Default)]
pub struct OwnershipIndex {
    namespaces: Mutex<HashMap<String, Arc<Mutex<NamespaceIndex>>>>,
}

impl OwnershipIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the index of `namespace`, creating it on first use.
    pub async fn lock(&self, namespace: &str) -> OwnedMutexGuard<NamespaceIndex> {
        let index = {
            let mut namespaces = self.namespaces.lock().await;
            Arc::clone(namespaces.entry(namespace.to_string()).or_default())
        };
        index.lock_owned().await
    }
}

#[cfg(test)]
#[path = "ownership_tests.rs"]
mod ownership_tests;
