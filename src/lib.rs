// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Cluster Agent
//!
//! A cluster-side agent that watches Kubernetes and keeps query-ready views of
//! the cluster in memory.
//!
//! ## Overview
//!
//! Watch streams from the API server are turned into typed create/update/delete
//! deliveries and fanned out to independent consumers:
//!
//! - **Config rollouts** - workloads annotated `update-on-config-change=true`
//!   get a `config-hash` pod-template annotation that tracks the content of
//!   every `ConfigMap` and `Secret` they reference; referenced configs carry a
//!   finalizer until their last user is gone
//! - **Service topology** - services grouped into workloads and pods, split into
//!   inner services and outer services reached through an ingress
//! - **Storage** - persistent volumes per storage class, joined with the
//!   mountpoint usage reported by the node agents
//! - **Networks** - node, pod and service networks
//! - **Threshold monitors** - periodic cluster, node and namespace utilisation
//!   checks that raise `Warning` events
//!
//! ## Modules
//!
//! - [`informer`] - watch adapter, event bus and the [`informer::Projection`] trait
//! - [`context`] - reflector stores for every watched kind
//! - [`reconcilers`] - config hash rollouts and finalizers
//! - [`projections`] - topology, storage and network read models
//! - [`monitor`] - threshold monitors
//! - [`nodeagent`] - node-agent client and fan-out
//! - [`mesh`] - Linkerd integration
//! - [`api`] - read-only REST surface

pub mod alerts;
pub mod api;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod informer;
pub mod labels;
pub mod mesh;
pub mod metrics;
pub mod monitor;
pub mod nodeagent;
pub mod projections;
pub mod quantity;
pub mod reconcilers;
pub mod workload;
pub mod writer;
