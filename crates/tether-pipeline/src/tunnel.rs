// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Seam for the session-stage local tunnel.
//!
//! The tunnel handle is held by the pipeline for the remainder of the run
//! and dropped on exit, success or failure, which is what guarantees
//! termination of the forwarding child.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_cluster::PortForward;

use crate::error::PipelineResult;

/// Opens a local tunnel to a cluster service.
#[async_trait]
pub trait TunnelFactory: Send + Sync {
	/// Handle whose drop tears the tunnel down.
	type Handle: Send;

	async fn open(
		&self,
		namespace: &str,
		target: &str,
		local_port: u16,
		remote_port: u16,
	) -> PipelineResult<Self::Handle>;
}

/// Tunnel factory backed by `kubectl port-forward`.
pub struct KubectlTunnelFactory {
	context: String,
}

impl KubectlTunnelFactory {
	pub fn new(context: impl Into<String>) -> Self {
		Self {
			context: context.into(),
		}
	}
}

#[async_trait]
impl TunnelFactory for KubectlTunnelFactory {
	type Handle = PortForward;

	async fn open(
		&self,
		namespace: &str,
		target: &str,
		local_port: u16,
		remote_port: u16,
	) -> PipelineResult<PortForward> {
		let forward = PortForward::open(&self.context, namespace, target, local_port, remote_port).await?;
		Ok(forward)
	}
}

/// Recording tunnel factory for pipeline tests.
#[derive(Clone, Default)]
pub struct MockTunnelFactory {
	opens: Arc<Mutex<Vec<(String, String, u16, u16)>>>,
}

impl MockTunnelFactory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn opens(&self) -> Vec<(String, String, u16, u16)> {
		self.opens.lock().unwrap().clone()
	}
}

#[async_trait]
impl TunnelFactory for MockTunnelFactory {
	type Handle = ();

	async fn open(
		&self,
		namespace: &str,
		target: &str,
		local_port: u16,
		remote_port: u16,
	) -> PipelineResult<()> {
		self.opens.lock().unwrap().push((
			namespace.to_string(),
			target.to_string(),
			local_port,
			remote_port,
		));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: the mock records each open with its full target identity.
	#[tokio::test]
	async fn test_mock_records_opens() {
		let factory = MockTunnelFactory::new();
		factory.open("secrets", "svc/broker", 8443, 443).await.unwrap();
		assert_eq!(
			factory.opens(),
			vec![("secrets".to_string(), "svc/broker".to_string(), 8443, 443)]
		);
	}
}
