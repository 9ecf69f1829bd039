// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster control-plane client for Tether trust bootstrapping.
//!
//! The control plane is consumed as an opaque collaborator through its CLIs.
//! [`ClusterClient`] is the seam; [`CommandClusterClient`] drives `kind` and
//! `kubectl`, [`MockClusterClient`] backs pipeline tests, and [`PortForward`]
//! is the scoped local tunnel used during session establishment.

pub mod client;
pub mod command;
pub mod error;
pub mod mock;
pub mod port_forward;

pub use client::{ClusterClient, ClusterFacts, ClusterHandle};
pub use command::CommandClusterClient;
pub use error::{ClusterError, ClusterResult};
pub use mock::MockClusterClient;
pub use port_forward::PortForward;
