// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tagged handles over workload controllers and config objects.
//!
//! The config reconciler treats `Deployment`, `DaemonSet` and `StatefulSet`
//! uniformly through [`WorkloadController`], and `ConfigMap` and `Secret`
//! uniformly through [`ConfigObject`]. Both wrap the watched object in an
//! [`Arc`] so events can be fanned out to several consumers without copying.

use crate::constants::{
    KIND_CONFIG_MAP, KIND_DAEMON_SET, KIND_DEPLOYMENT, KIND_SECRET, KIND_STATEFUL_SET,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PodTemplateSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Kind tag of a workload controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
}

impl WorkloadKind {
    /// Kubernetes kind name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadKind::Deployment => KIND_DEPLOYMENT,
            WorkloadKind::DaemonSet => KIND_DAEMON_SET,
            WorkloadKind::StatefulSet => KIND_STATEFUL_SET,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a workload controller within its namespace, rendered `kind/name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadKey {
    pub kind: WorkloadKind,
    pub name: String,
}

impl WorkloadKey {
    #[must_use]
    pub fn new(kind: WorkloadKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A watched `Deployment`, `DaemonSet` or `StatefulSet`.
#[derive(Clone, Debug)]
pub enum WorkloadController {
    Deployment(Arc<Deployment>),
    DaemonSet(Arc<DaemonSet>),
    StatefulSet(Arc<StatefulSet>),
}

impl WorkloadController {
    fn metadata(&self) -> &ObjectMeta {
        match self {
            WorkloadController::Deployment(d) => &d.metadata,
            WorkloadController::DaemonSet(d) => &d.metadata,
            WorkloadController::StatefulSet(s) => &s.metadata,
        }
    }

    #[must_use]
    pub fn kind(&self) -> WorkloadKind {
        match self {
            WorkloadController::Deployment(_) => WorkloadKind::Deployment,
            WorkloadController::DaemonSet(_) => WorkloadKind::DaemonSet,
            WorkloadController::StatefulSet(_) => WorkloadKind::StatefulSet,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn key(&self) -> WorkloadKey {
        WorkloadKey::new(self.kind(), self.name())
    }

    /// Annotations on the controller object itself.
    #[must_use]
    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata().annotations.as_ref()
    }

    /// The pod template the controller stamps pods from.
    #[must_use]
    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            WorkloadController::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
            WorkloadController::DaemonSet(d) => d.spec.as_ref().map(|s| &s.template),
            WorkloadController::StatefulSet(s) => s.spec.as_ref().map(|s| &s.template),
        }
    }

    /// Annotations on the pod template.
    #[must_use]
    pub fn template_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref())
    }
}

impl From<Arc<Deployment>> for WorkloadController {
    fn from(d: Arc<Deployment>) -> Self {
        WorkloadController::Deployment(d)
    }
}

impl From<Arc<DaemonSet>> for WorkloadController {
    fn from(d: Arc<DaemonSet>) -> Self {
        WorkloadController::DaemonSet(d)
    }
}

impl From<Arc<StatefulSet>> for WorkloadController {
    fn from(s: Arc<StatefulSet>) -> Self {
        WorkloadController::StatefulSet(s)
    }
}

/// Kind tag of a config object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKind {
    ConfigMap,
    Secret,
}

impl ConfigKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKind::ConfigMap => KIND_CONFIG_MAP,
            ConfigKind::Secret => KIND_SECRET,
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a config within a namespace, rendered `Kind/Name`.
///
/// Ordering is by kind then name, which is the order references are sorted in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigRef {
    pub kind: ConfigKind,
    pub name: String,
}

impl ConfigRef {
    #[must_use]
    pub fn config_map(name: impl Into<String>) -> Self {
        Self {
            kind: ConfigKind::ConfigMap,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn secret(name: impl Into<String>) -> Self {
        Self {
            kind: ConfigKind::Secret,
            name: name.into(),
        }
    }
}

impl fmt::Display for ConfigRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Opaque payload of a config object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigData {
    /// `ConfigMap.data`
    Strings(BTreeMap<String, String>),
    /// `Secret.data`
    Bytes(BTreeMap<String, ByteString>),
}

/// A watched `ConfigMap` or `Secret`.
#[derive(Clone, Debug)]
pub enum ConfigObject {
    ConfigMap(Arc<ConfigMap>),
    Secret(Arc<Secret>),
}

impl ConfigObject {
    fn metadata(&self) -> &ObjectMeta {
        match self {
            ConfigObject::ConfigMap(c) => &c.metadata,
            ConfigObject::Secret(s) => &s.metadata,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ConfigKind {
        match self {
            ConfigObject::ConfigMap(_) => ConfigKind::ConfigMap,
            ConfigObject::Secret(_) => ConfigKind::Secret,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn config_ref(&self) -> ConfigRef {
        ConfigRef {
            kind: self.kind(),
            name: self.name().to_string(),
        }
    }

    #[must_use]
    pub fn finalizers(&self) -> &[String] {
        self.metadata().finalizers.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    #[must_use]
    pub fn is_pending_deletion(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }

    /// The object's data. Missing data is an empty map of the right variant.
    #[must_use]
    pub fn data(&self) -> ConfigData {
        match self {
            ConfigObject::ConfigMap(c) => ConfigData::Strings(c.data.clone().unwrap_or_default()),
            ConfigObject::Secret(s) => ConfigData::Bytes(s.data.clone().unwrap_or_default()),
        }
    }
}

impl From<Arc<ConfigMap>> for ConfigObject {
    fn from(c: Arc<ConfigMap>) -> Self {
        ConfigObject::ConfigMap(c)
    }
}

impl From<Arc<Secret>> for ConfigObject {
    fn from(s: Arc<Secret>) -> Self {
        ConfigObject::Secret(s)
    }
}

#[cfg(test)]
#[path = "workload_tests.rs"]
mod workload_tests;
