// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::AgentConfig;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_flags_override_defaults() {
        let config = AgentConfig::try_parse_from([
            "cluster-agent",
            "--cache-time",
            "5",
            "--check-interval",
            "10",
            "--listen",
            "127.0.0.1:9000",
            "--node-agent-concurrency",
            "2",
        ])
        .unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(5));
        assert_eq!(config.check_interval(), Duration::from_secs(10));
        assert_eq!(config.listen_address.port(), 9000);
        assert_eq!(config.node_agent_concurrency, 2);
    }

    #[test]
    fn test_zero_check_interval_is_rejected() {
        assert!(AgentConfig::try_parse_from(["cluster-agent", "--check-interval", "0"]).is_err());
    }

    #[test]
    fn test_invalid_listen_address_is_rejected() {
        assert!(AgentConfig::try_parse_from(["cluster-agent", "--listen", "not-an-addr"]).is_err());
    }
}
