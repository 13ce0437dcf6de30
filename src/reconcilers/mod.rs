// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcilers that write back to the cluster.
//!
//! # Reconciliation Architecture
//!
//! The config reconciler follows the usual controller loop, driven by typed
//! events instead of a work queue:
//!
//! 1. **Observe** - a workload or config event arrives from the informer
//! 2. **Index** - the config-ownership index records which configs each
//!    opted-in workload references
//! 3. **Update** - finalizers and the pod-template `config-hash` annotation
//!    are patched to match
//!
//! There is no retry queue. A failed write is logged and picked up again on
//! the next event for the same object.

pub mod config;
pub mod config_hash;
pub mod finalizers;
pub mod ownership;

pub use config::ConfigReconciler;
