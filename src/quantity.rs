// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes resource quantity parsing.
//!
//! Quantities arrive as strings such as `250m`, `2`, `1.5Gi` or `1e3`. The
//! monitors work in integers: CPU in millicores, memory and storage in bytes,
//! pod counts as plain numbers. Fractional results are rounded up, matching
//! how the API server rounds quantities it cannot represent exactly.

use crate::errors::QuantityError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Scale factor for a quantity suffix, or `None` for an unknown suffix.
fn suffix_multiplier(suffix: &str) -> Option<f64> {
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0_f64.powi(2),
        "Gi" => 1024.0_f64.powi(3),
        "Ti" => 1024.0_f64.powi(4),
        "Pi" => 1024.0_f64.powi(5),
        "Ei" => 1024.0_f64.powi(6),
        _ => return None,
    };
    Some(multiplier)
}

/// Parse a quantity string into its value in base units.
///
/// # Errors
///
/// Returns [`QuantityError`] if the string is empty, the number is malformed,
/// the suffix is unknown, or the value is negative.
pub fn parse_quantity(raw: &str) -> Result<f64, QuantityError> {
    let quantity = raw.trim();
    if quantity.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| QuantityError::Invalid(quantity.to_string()))?;

    // Decimal exponent form: 1e3, 5E-2. A bare "E" is the exa suffix.
    let scaled = if suffix.len() > 1 && (suffix.starts_with('e') || suffix.starts_with('E')) {
        let exponent: i32 = suffix[1..]
            .parse()
            .map_err(|_| QuantityError::UnknownSuffix {
                quantity: quantity.to_string(),
                suffix: suffix.to_string(),
            })?;
        value * 10f64.powi(exponent)
    } else {
        let multiplier = suffix_multiplier(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
            quantity: quantity.to_string(),
            suffix: suffix.to_string(),
        })?;
        value * multiplier
    };

    if scaled < 0.0 {
        return Err(QuantityError::Negative(quantity.to_string()));
    }
    Ok(scaled)
}

/// Parse a CPU quantity into millicores.
///
/// # Errors
///
/// See [`parse_quantity`].
pub fn parse_cpu_millis(raw: &str) -> Result<u64, QuantityError> {
    Ok(ceil_snapped(parse_quantity(raw)? * 1000.0))
}

/// Parse a memory, storage or count quantity into base units (bytes for memory).
///
/// # Errors
///
/// See [`parse_quantity`].
pub fn parse_bytes(raw: &str) -> Result<u64, QuantityError> {
    Ok(ceil_snapped(parse_quantity(raw)?))
}

/// Round up, but snap to the nearest integer first so float noise such as
/// `0.1 * 1000 = 100.00000000000001` does not round up to 101.
fn ceil_snapped(value: f64) -> u64 {
    let nearest = value.round();
    if (value - nearest).abs() <= 1e-9 * value.abs().max(1.0) {
        nearest as u64
    } else {
        value.ceil() as u64
    }
}

/// Look up `key` in a resource list and parse it as millicores.
///
/// Missing keys count as zero; unparsable values are logged and count as zero.
#[must_use]
pub fn cpu_millis_of(resources: Option<&BTreeMap<String, Quantity>>, key: &str) -> u64 {
    lookup(resources, key, parse_cpu_millis)
}

/// Look up `key` in a resource list and parse it into base units.
///
/// Missing keys count as zero; unparsable values are logged and count as zero.
#[must_use]
pub fn bytes_of(resources: Option<&BTreeMap<String, Quantity>>, key: &str) -> u64 {
    lookup(resources, key, parse_bytes)
}

fn lookup(
    resources: Option<&BTreeMap<String, Quantity>>,
    key: &str,
    parse: fn(&str) -> Result<u64, QuantityError>,
) -> u64 {
    let Some(quantity) = resources.and_then(|r| r.get(key)) else {
        return 0;
    };
    match parse(&quantity.0) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Dropping unparsable quantity");
            0
        }
    }
}

#[cfg(test)]
#[path = "quantity_tests.rs"]
mod quantity_tests;
