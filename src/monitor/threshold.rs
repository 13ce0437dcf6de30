// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Threshold configuration and breach math.
//!
//! Thresholds are integer percentages. A threshold of `0` disables its
//! dimension. Ratios are `(used * 100) / total` in integer arithmetic and are
//! only compared when `total > 0`. A dimension breaches when its ratio is
//! strictly greater than the threshold.

use crate::errors::MonitorConfigError;
use std::collections::BTreeMap;
use std::fmt;
use tracing::error;

pub const THRESHOLD_KEY_CPU: &str = "cpu";
pub const THRESHOLD_KEY_MEMORY: &str = "memory";
pub const THRESHOLD_KEY_STORAGE: &str = "storage";
pub const THRESHOLD_KEY_POD_COUNT: &str = "podCount";

/// Percent thresholds per dimension; `0` means disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorConfig {
    pub cpu: u64,
    pub memory: u64,
    pub storage: u64,
    pub pod_count: u64,
}

impl MonitorConfig {
    /// Read thresholds from the data of the threshold `ConfigMap`.
    ///
    /// Missing keys disable their dimension. Non-integer values are logged and
    /// also disable it.
    #[must_use]
    pub fn from_data(data: Option<&BTreeMap<String, String>>) -> Self {
        let read = |key: &str| {
            let Some(value) = data.and_then(|d| d.get(key)) else {
                return 0;
            };
            parse_threshold(key, value).unwrap_or_else(|e| {
                error!("{}; dimension disabled", e);
                0
            })
        };
        Self {
            cpu: read(THRESHOLD_KEY_CPU),
            memory: read(THRESHOLD_KEY_MEMORY),
            storage: read(THRESHOLD_KEY_STORAGE),
            pod_count: read(THRESHOLD_KEY_POD_COUNT),
        }
    }

    #[must_use]
    pub fn threshold(&self, dimension: Dimension) -> u64 {
        match dimension {
            Dimension::Cpu => self.cpu,
            Dimension::Memory => self.memory,
            Dimension::Storage => self.storage,
            Dimension::PodCount => self.pod_count,
        }
    }
}

/// Parse one threshold value.
///
/// # Errors
///
/// Returns [`MonitorConfigError::NotAnInteger`] when the value is not a
/// non-negative integer.
pub fn parse_threshold(key: &str, value: &str) -> Result<u64, MonitorConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| MonitorConfigError::NotAnInteger {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Cpu,
    Memory,
    Storage,
    PodCount,
}

impl Dimension {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Cpu => "cpu",
            Dimension::Memory => "memory",
            Dimension::Storage => "storage",
            Dimension::PodCount => "pod count",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer utilisation percentage, or `None` when `total` is zero.
#[must_use]
pub fn ratio(used: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    let percent = u128::from(used) * 100 / u128::from(total);
    Some(u64::try_from(percent).unwrap_or(u64::MAX))
}

/// A dimension whose utilisation exceeds its threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Breach {
    pub dimension: Dimension,
    pub ratio: u64,
    pub threshold: u64,
}

impl Breach {
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "{} usage {}% exceeds threshold {}%",
            self.dimension, self.ratio, self.threshold
        )
    }
}

/// Compare one dimension against its threshold.
#[must_use]
pub fn check(dimension: Dimension, used: u64, total: u64, config: &MonitorConfig) -> Option<Breach> {
    let threshold = config.threshold(dimension);
    if threshold == 0 {
        return None;
    }
    let ratio = ratio(used, total)?;
    (ratio > threshold).then_some(Breach {
        dimension,
        ratio,
        threshold,
    })
}

#[cfg(test)]
#[path = "threshold_tests.rs"]
mod threshold_tests;
