// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Annotation keys and values the agent reads or writes.

// ============================================================================
// Config Rollout Annotations
// ============================================================================

/// Opt-in annotation on a workload controller
pub const UPDATE_ON_CONFIG_CHANGE: &str = "update-on-config-change";

/// Value of [`UPDATE_ON_CONFIG_CHANGE`] that enables config rollouts
pub const UPDATE_ON_CONFIG_CHANGE_ENABLED: &str = "true";

/// Pod-template annotation carrying the hash of all referenced configs
pub const CONFIG_HASH: &str = "config-hash";

// ============================================================================
// Service Mesh
// ============================================================================

/// Pod-template annotation requesting proxy injection
pub const LINKERD_INJECT: &str = "linkerd.io/inject";

/// Value of [`LINKERD_INJECT`] that enables injection
pub const LINKERD_INJECT_ENABLED: &str = "enabled";

/// Name of the admin port exposed by the injected proxy
pub const LINKERD_ADMIN_PORT: &str = "linkerd-admin";
