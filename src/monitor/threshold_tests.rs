// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `threshold.rs`

#[cfg(test)]
mod tests {
    use crate::errors::MonitorConfigError;
    use crate::monitor::threshold::{check, parse_threshold, ratio, Dimension, MonitorConfig};
    use std::collections::BTreeMap;

    fn config(cpu: u64) -> MonitorConfig {
        MonitorConfig {
            cpu,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_data_reads_all_keys() {
        let data = BTreeMap::from([
            ("cpu".to_string(), "80".to_string()),
            ("memory".to_string(), "70".to_string()),
            ("storage".to_string(), " 90 ".to_string()),
            ("podCount".to_string(), "95".to_string()),
        ]);
        assert_eq!(
            MonitorConfig::from_data(Some(&data)),
            MonitorConfig {
                cpu: 80,
                memory: 70,
                storage: 90,
                pod_count: 95,
            }
        );
    }

    #[test]
    fn test_invalid_and_missing_values_disable_dimension() {
        let data = BTreeMap::from([
            ("cpu".to_string(), "eighty".to_string()),
            ("memory".to_string(), "-5".to_string()),
        ]);
        assert_eq!(
            MonitorConfig::from_data(Some(&data)),
            MonitorConfig::default()
        );
        assert_eq!(MonitorConfig::from_data(None), MonitorConfig::default());
    }

    #[test]
    fn test_parse_threshold_error() {
        assert_eq!(
            parse_threshold("cpu", "1.5"),
            Err(MonitorConfigError::NotAnInteger {
                key: "cpu".to_string(),
                value: "1.5".to_string(),
            })
        );
    }

    #[test]
    fn test_ratio_is_integer_percentage() {
        assert_eq!(ratio(900, 1000), Some(90));
        assert_eq!(ratio(2, 3), Some(66));
        assert_eq!(ratio(5, 0), None);
        assert_eq!(ratio(u64::MAX, 1), Some(u64::MAX));
    }

    #[test]
    fn test_breach_message_contains_ratio() {
        let breach = check(Dimension::Cpu, 900, 1000, &config(80)).unwrap();
        assert_eq!(breach.ratio, 90);
        assert!(breach.message().contains("90%"));
        assert_eq!(breach.message(), "cpu usage 90% exceeds threshold 80%");
    }

    #[test]
    fn test_threshold_zero_never_fires() {
        assert!(check(Dimension::Cpu, 1000, 1000, &config(0)).is_none());
        assert!(check(Dimension::Cpu, 1, 1000, &config(0)).is_none());
    }

    #[test]
    fn test_threshold_hundred_with_headroom_never_fires() {
        assert!(check(Dimension::Cpu, 999, 1000, &config(100)).is_none());
    }

    #[test]
    fn test_ratio_equal_to_threshold_does_not_fire() {
        assert!(check(Dimension::Cpu, 800, 1000, &config(80)).is_none());
        assert!(check(Dimension::Cpu, 801, 1000, &config(80)).is_none());
        assert!(check(Dimension::Cpu, 810, 1000, &config(80)).is_some());
    }

    #[test]
    fn test_zero_total_is_skipped() {
        assert!(check(Dimension::Cpu, 10, 0, &config(1)).is_none());
    }
}
