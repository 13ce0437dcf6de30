// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Config reference extraction and content hashing.
//!
//! A workload's `config-hash` annotation is the SHA-256 of a canonical JSON
//! document holding the data of every config its pod template references:
//!
//! ```json
//! {"configMaps":{"app-settings":{"level":"debug"}},"secrets":{"db":{"password":"aHVudGVyMg=="}}}
//! ```
//!
//! Maps are `BTreeMap`s so keys serialise sorted and the hash does not depend
//! on the order references were discovered in.

use crate::workload::{ConfigData, ConfigRef};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::ByteString;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Every `ConfigMap` and `Secret` a pod template references.
///
/// References come from volumes, `envFrom` sources and `env[].valueFrom` key
/// selectors of both regular and init containers.
#[must_use]
pub fn referenced_configs(template: &PodTemplateSpec) -> BTreeSet<ConfigRef> {
    let mut refs = BTreeSet::new();
    let Some(spec) = template.spec.as_ref() else {
        return refs;
    };

    for volume in spec.volumes.iter().flatten() {
        if let Some(cm) = &volume.config_map {
            insert_named(&mut refs, ConfigRef::config_map(cm.name.as_str()));
        }
        if let Some(name) = volume.secret.as_ref().and_then(|s| s.secret_name.as_deref()) {
            insert_named(&mut refs, ConfigRef::secret(name));
        }
    }

    let containers = spec
        .containers
        .iter()
        .chain(spec.init_containers.iter().flatten());

    for container in containers {
        for source in container.env_from.iter().flatten() {
            if let Some(cm) = &source.config_map_ref {
                insert_named(&mut refs, ConfigRef::config_map(cm.name.as_str()));
            }
            if let Some(secret) = &source.secret_ref {
                insert_named(&mut refs, ConfigRef::secret(secret.name.as_str()));
            }
        }

        for var in container.env.iter().flatten() {
            let Some(value_from) = &var.value_from else {
                continue;
            };
            if let Some(cm) = &value_from.config_map_key_ref {
                insert_named(&mut refs, ConfigRef::config_map(cm.name.as_str()));
            }
            if let Some(secret) = &value_from.secret_key_ref {
                insert_named(&mut refs, ConfigRef::secret(secret.name.as_str()));
            }
        }
    }

    refs
}

fn insert_named(refs: &mut BTreeSet<ConfigRef>, config: ConfigRef) {
    if !config.name.is_empty() {
        refs.insert(config);
    }
}

#[derive(Serialize, Default)]
struct HashSource {
    #[serde(rename = "configMaps")]
    config_maps: BTreeMap<String, BTreeMap<String, String>>,
    secrets: BTreeMap<String, BTreeMap<String, ByteString>>,
}

/// Hash the data of the referenced configs.
///
/// `lookup` resolves a reference to the config's current data. References
/// that do not resolve (the config does not exist yet) are left out.
pub fn compute_config_hash<'a>(
    refs: impl IntoIterator<Item = &'a ConfigRef>,
    lookup: impl Fn(&ConfigRef) -> Option<ConfigData>,
) -> String {
    let mut source = HashSource::default();
    for config in refs {
        match lookup(config) {
            Some(ConfigData::Strings(data)) => {
                source.config_maps.insert(config.name.clone(), data);
            }
            Some(ConfigData::Bytes(data)) => {
                source.secrets.insert(config.name.clone(), data);
            }
            None => {}
        }
    }

    let json = serde_json::to_string(&source).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "config_hash_tests.rs"]
mod config_hash_tests;
