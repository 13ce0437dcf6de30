// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::errors::{FrameError, MonitorConfigError, QuantityError, TransportEntryError};

    #[test]
    fn test_quantity_error_messages() {
        let err = QuantityError::UnknownSuffix {
            quantity: "5Xi".to_string(),
            suffix: "Xi".to_string(),
        };
        assert_eq!(err.to_string(), "unknown suffix 'Xi' in quantity '5Xi'");
        assert_eq!(QuantityError::Empty.to_string(), "empty quantity");
    }

    #[test]
    fn test_transport_entry_error_messages() {
        let err = TransportEntryError::MissingNamespace("vanguard:8000".to_string());
        assert!(err.to_string().contains("vanguard:8000"));
        assert!(err.to_string().contains("missing a namespace"));

        let err = TransportEntryError::InvalidListenPort("abc".to_string());
        assert_eq!(err.to_string(), "invalid listen port 'abc'");
    }

    #[test]
    fn test_frame_error_messages() {
        assert_eq!(
            FrameError::TooShort(2).to_string(),
            "frame too short: 2 bytes, need at least 4"
        );
        let err = FrameError::Truncated {
            declared: 10,
            available: 3,
        };
        assert!(err.to_string().contains("declares 10 bytes"));
    }

    #[test]
    fn test_monitor_config_error_message() {
        let err = MonitorConfigError::NotAnInteger {
            key: "cpu".to_string(),
            value: "eighty".to_string(),
        };
        assert_eq!(err.to_string(), "threshold 'cpu' has non-integer value 'eighty'");
    }
}
