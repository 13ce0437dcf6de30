// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the agent's parsers and remote collaborators.
//!
//! Orchestrator calls return `anyhow::Result` like the reconcilers do; the enums
//! here cover input the agent parses itself and the RPCs it makes to node agents
//! and the mesh controller, where callers branch on the failure kind.

use thiserror::Error;

/// Errors raised while parsing a Kubernetes resource quantity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The quantity string was empty
    #[error("empty quantity")]
    Empty,

    /// The numeric part could not be parsed
    #[error("invalid quantity '{0}'")]
    Invalid(String),

    /// The suffix is not a known SI or binary suffix
    #[error("unknown suffix '{suffix}' in quantity '{quantity}'")]
    UnknownSuffix {
        /// Full quantity string
        quantity: String,
        /// Unrecognised suffix
        suffix: String,
    },

    /// The quantity is negative where only non-negative values make sense
    #[error("negative quantity '{0}'")]
    Negative(String),
}

/// Errors raised while parsing a layer-4 ingress entry.
///
/// Entries have the form `"<listen-port>": "<namespace>/<service>:<port>"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportEntryError {
    /// Listen port is not a valid port number
    #[error("invalid listen port '{0}'")]
    InvalidListenPort(String),

    /// Target does not contain a namespace separator
    #[error("target '{0}' is missing a namespace ('<namespace>/<service>:<port>')")]
    MissingNamespace(String),

    /// Target does not contain a port separator
    #[error("target '{0}' is missing a port ('<namespace>/<service>:<port>')")]
    MissingPort(String),

    /// Target port is not a valid port number
    #[error("invalid target port in '{0}'")]
    InvalidTargetPort(String),

    /// Namespace or service part is empty
    #[error("empty namespace or service in '{0}'")]
    EmptyName(String),
}

/// Errors raised by node-agent RPCs.
#[derive(Error, Debug)]
pub enum NodeAgentError {
    /// The call did not finish within the per-call timeout
    #[error("node agent on {node} timed out after {seconds}s")]
    Timeout {
        /// Node the agent runs on
        node: String,
        /// Timeout that elapsed
        seconds: u64,
    },

    /// The node has no address the agent can be dialled on
    #[error("node {0} has no reachable address")]
    MissingAddress(String),

    /// Connection or protocol failure
    #[error("node agent on {node} unreachable: {source}")]
    Transport {
        /// Node the agent runs on
        node: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// The agent answered with a non-success status
    #[error("node agent on {node} returned HTTP {status}")]
    Status {
        /// Node the agent runs on
        node: String,
        /// HTTP status code
        status: u16,
    },

    /// The agent answered with a body that is not the expected JSON
    #[error("node agent on {node} sent an undecodable reply: {source}")]
    Decode {
        /// Node the agent runs on
        node: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while decoding a length-prefixed protobuf frame.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Fewer than four bytes were available for the length prefix
    #[error("frame too short: {0} bytes, need at least 4")]
    TooShort(usize),

    /// The length prefix exceeds the remaining payload
    #[error("frame declares {declared} bytes but only {available} are available")]
    Truncated {
        /// Length from the prefix
        declared: usize,
        /// Bytes remaining after the prefix
        available: usize,
    },

    /// The payload is not a valid message
    #[error("malformed protobuf payload: {0}")]
    Decode(#[from] prost::DecodeError),

    /// HTTP failure while talking to the mesh controller
    #[error("mesh controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The mesh controller answered with an error message
    #[error("mesh controller error: {0}")]
    Remote(String),
}

/// Errors raised while parsing threshold values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorConfigError {
    /// A threshold key holds a value that is not a non-negative integer
    #[error("threshold '{key}' has non-integer value '{value}'")]
    NotAnInteger {
        /// Threshold key
        key: String,
        /// Raw value
        value: String,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
