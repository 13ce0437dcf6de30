// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Entities of the service topology and the views served over REST.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Protocol of an ingress rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
    Udp,
}

impl Protocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressPath {
    /// URI prefix; empty for layer-4 rules
    pub path: String,
    pub service_name: String,
    /// Port number or named port
    pub service_port: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub paths: Vec<IngressPath>,
}

impl IngressRule {
    /// `http://<host>` for http rules, `<proto>:<port>` otherwise.
    #[must_use]
    pub fn entry_point(&self) -> String {
        match self.protocol {
            Protocol::Http => format!("http://{}", self.host),
            other => format!("{}:{}", other, self.port),
        }
    }
}

/// An ingress as seen by the topology: layer-7 rules from an `Ingress`
/// object merged with layer-4 rules synthesised from the transport ConfigMaps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngressRecord {
    pub name: String,
    pub rules: Vec<IngressRule>,
}

impl IngressRecord {
    /// Whether any path of any rule targets `service`.
    #[must_use]
    pub fn targets(&self, service: &str) -> bool {
        self.rules
            .iter()
            .flat_map(|r| r.paths.iter())
            .any(|p| p.service_name == service)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodView {
    pub name: String,
    pub state: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkloadView {
    pub name: String,
    pub kind: String,
    pub pods: Vec<PodView>,
}

/// A service with its pods grouped by owning workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub namespace: String,
    pub workloads: Vec<WorkloadView>,
}

/// One ingress rule flattened into an entry point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OuterServiceView {
    /// Name of the ingress the rule belongs to
    pub name: String,
    pub entry_point: String,
    pub protocol: Protocol,
    /// Path (empty for layer-4) to the service it routes to
    pub services: BTreeMap<String, ServiceView>,
}
