// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read models built from the cluster event stream.

pub mod network;
pub mod storage;
pub mod topology;

pub use network::NetworkProjection;
pub use storage::StorageProjection;
pub use topology::ServiceTopology;
