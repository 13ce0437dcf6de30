// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Layer-4 ingress mappings.
//!
//! The `tcp-services` and `udp-services` ConfigMaps in the reserved namespace
//! map a listen port to a service:
//!
//! ```yaml
//! data:
//!   "5553": "default/vanguard:8000"
//! ```
//!
//! Every entry becomes an ingress named after the target service, with one
//! rule for the listen port. Entries targeting the same service are merged.

use crate::constants::{TCP_SERVICES_CONFIGMAP, UDP_SERVICES_CONFIGMAP};
use crate::errors::TransportEntryError;
use crate::projections::topology::types::{IngressPath, IngressRecord, IngressRule, Protocol};
use std::collections::BTreeMap;
use tracing::error;

/// One parsed `"<port>": "<namespace>/<service>:<port>"` entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransportEntry {
    pub port: u16,
    pub namespace: String,
    pub service: String,
    pub service_port: u16,
    pub protocol: Protocol,
}

/// Protocol carried by a transport ConfigMap, or `None` for any other name.
#[must_use]
pub fn protocol_for_config_map(name: &str) -> Option<Protocol> {
    match name {
        TCP_SERVICES_CONFIGMAP => Some(Protocol::Tcp),
        UDP_SERVICES_CONFIGMAP => Some(Protocol::Udp),
        _ => None,
    }
}

/// Parse one entry.
///
/// # Errors
///
/// Returns [`TransportEntryError`] when the listen port, namespace, service
/// or target port is missing or malformed.
pub fn parse_entry(
    protocol: Protocol,
    listen_port: &str,
    target: &str,
) -> Result<TransportEntry, TransportEntryError> {
    let port: u16 = listen_port
        .trim()
        .parse()
        .map_err(|_| TransportEntryError::InvalidListenPort(listen_port.to_string()))?;

    let (namespace, rest) = target
        .trim()
        .split_once('/')
        .ok_or_else(|| TransportEntryError::MissingNamespace(target.to_string()))?;
    let (service, service_port) = rest
        .split_once(':')
        .ok_or_else(|| TransportEntryError::MissingPort(target.to_string()))?;

    if namespace.is_empty() || service.is_empty() {
        return Err(TransportEntryError::EmptyName(target.to_string()));
    }
    let service_port: u16 = service_port
        .parse()
        .map_err(|_| TransportEntryError::InvalidTargetPort(target.to_string()))?;

    Ok(TransportEntry {
        port,
        namespace: namespace.to_string(),
        service: service.to_string(),
        service_port,
        protocol,
    })
}

/// Parse every entry of a transport ConfigMap. Malformed entries are logged and dropped.
#[must_use]
pub fn parse_entries(protocol: Protocol, data: &BTreeMap<String, String>) -> Vec<TransportEntry> {
    data.iter()
        .filter_map(|(port, target)| match parse_entry(protocol, port, target) {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Dropping {} ingress entry {}: {}", protocol, port, e);
                None
            }
        })
        .collect()
}

/// Render entries back into ConfigMap data.
#[must_use]
pub fn format_entries(entries: &[TransportEntry]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|e| {
            (
                e.port.to_string(),
                format!("{}/{}:{}", e.namespace, e.service, e.service_port),
            )
        })
        .collect()
}

/// Synthesise ingresses from entries, keyed by namespace then ingress name.
#[must_use]
pub fn entries_to_ingresses(
    entries: &[TransportEntry],
) -> BTreeMap<String, BTreeMap<String, IngressRecord>> {
    let mut ingresses: BTreeMap<String, BTreeMap<String, IngressRecord>> = BTreeMap::new();
    for entry in entries {
        let rule = IngressRule {
            host: String::new(),
            port: entry.port,
            protocol: entry.protocol,
            paths: vec![IngressPath {
                path: String::new(),
                service_name: entry.service.clone(),
                service_port: entry.service_port.to_string(),
            }],
        };
        ingresses
            .entry(entry.namespace.clone())
            .or_default()
            .entry(entry.service.clone())
            .or_insert_with(|| IngressRecord {
                name: entry.service.clone(),
                rules: Vec::new(),
            })
            .rules
            .push(rule);
    }
    ingresses
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod transport_tests;
