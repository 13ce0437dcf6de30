// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `usage.rs`

#[cfg(test)]
mod tests {
    use crate::monitor::usage::{parse_usage, pod_metrics_usage, ResourceUsage};
    use serde_json::json;

    #[test]
    fn test_parse_node_usage() {
        let usage = parse_usage(&json!({"cpu": "250m", "memory": "1Gi"}));
        assert_eq!(
            usage,
            ResourceUsage {
                cpu_millis: 250,
                memory_bytes: 1024 * 1024 * 1024,
            }
        );
    }

    #[test]
    fn test_nanocore_cpu_rounds_up_to_millis() {
        let usage = parse_usage(&json!({"cpu": "1500000n", "memory": "2048Ki"}));
        assert_eq!(usage.cpu_millis, 2);
        assert_eq!(usage.memory_bytes, 2048 * 1024);
    }

    #[test]
    fn test_bad_or_missing_values_count_as_zero() {
        let usage = parse_usage(&json!({"cpu": "lots"}));
        assert_eq!(usage, ResourceUsage::default());
    }

    #[test]
    fn test_pod_usage_sums_containers() {
        let data = json!({
            "containers": [
                {"name": "app", "usage": {"cpu": "100m", "memory": "64Mi"}},
                {"name": "sidecar", "usage": {"cpu": "50m", "memory": "16Mi"}}
            ]
        });
        assert_eq!(
            pod_metrics_usage(&data),
            ResourceUsage {
                cpu_millis: 150,
                memory_bytes: 80 * 1024 * 1024,
            }
        );
        assert_eq!(pod_metrics_usage(&json!({})), ResourceUsage::default());
    }
}
