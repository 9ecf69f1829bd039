// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory release client for pipeline tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{ReleaseClient, ReleaseStatus};
use crate::error::ReleaseResult;

#[derive(Default)]
struct MockState {
	releases: Vec<ReleaseStatus>,
	installs: Vec<(String, Vec<(String, String)>)>,
	upgrades: Vec<(String, bool, Vec<(String, String)>)>,
	uninstalls: Vec<String>,
}

/// A mock release client backed by in-memory state.
#[derive(Clone, Default)]
pub struct MockReleaseClient {
	state: Arc<Mutex<MockState>>,
}

impl MockReleaseClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record of install calls: (release name, overrides).
	pub fn installs(&self) -> Vec<(String, Vec<(String, String)>)> {
		self.state.lock().unwrap().installs.clone()
	}

	/// Record of upgrade calls: (release name, reuse_values, overrides).
	pub fn upgrades(&self) -> Vec<(String, bool, Vec<(String, String)>)> {
		self.state.lock().unwrap().upgrades.clone()
	}

	pub fn uninstalls(&self) -> Vec<String> {
		self.state.lock().unwrap().uninstalls.clone()
	}
}

#[async_trait]
impl ReleaseClient for MockReleaseClient {
	async fn list(&self, namespace: &str) -> ReleaseResult<Vec<ReleaseStatus>> {
		Ok(self
			.state
			.lock()
			.unwrap()
			.releases
			.iter()
			.filter(|r| r.namespace == namespace)
			.cloned()
			.collect())
	}

	async fn install(
		&self,
		release: &str,
		chart: &str,
		namespace: &str,
		values: &[(String, String)],
	) -> ReleaseResult<()> {
		let mut state = self.state.lock().unwrap();
		state.releases.push(ReleaseStatus {
			name: release.to_string(),
			namespace: namespace.to_string(),
			chart: chart.to_string(),
			status: "deployed".to_string(),
		});
		state
			.installs
			.push((release.to_string(), values.to_vec()));
		Ok(())
	}

	async fn upgrade(
		&self,
		release: &str,
		_chart: &str,
		_namespace: &str,
		reuse_values: bool,
		values: &[(String, String)],
	) -> ReleaseResult<()> {
		self
			.state
			.lock()
			.unwrap()
			.upgrades
			.push((release.to_string(), reuse_values, values.to_vec()));
		Ok(())
	}

	async fn uninstall(&self, release: &str, namespace: &str) -> ReleaseResult<()> {
		let mut state = self.state.lock().unwrap();
		state
			.releases
			.retain(|r| !(r.name == release && r.namespace == namespace));
		state.uninstalls.push(release.to_string());
		Ok(())
	}
}
