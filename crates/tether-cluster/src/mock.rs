// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory cluster client for exercising the pipeline without a cluster.
//!
//! The mock records every mutation so tests can assert reconciliation
//! behavior (created once, reused thereafter) and allows configuring exec
//! output and readiness failures per selector.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tether_common_secret::SecretString;

use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};

#[derive(Default)]
struct MockState {
	clusters: Vec<String>,
	created_clusters: Vec<(String, String)>,
	namespaces: Vec<String>,
	applied: Vec<(String, String)>,
	deleted: Vec<(String, String, String)>,
	waits: Vec<(String, String)>,
	failing_waits: HashSet<String>,
	job_waits: Vec<(String, String)>,
	failing_jobs: HashSet<String>,
	exec_responses: HashMap<String, String>,
	exec_calls: Vec<String>,
	tokens_minted: Vec<(String, String, Option<String>)>,
	api_url: String,
	ca_cert: String,
}

/// A mock cluster client backed by in-memory state.
#[derive(Clone, Default)]
pub struct MockClusterClient {
	state: Arc<Mutex<MockState>>,
}

impl MockClusterClient {
	pub fn new() -> Self {
		let mock = Self::default();
		{
			let mut state = mock.state.lock().unwrap();
			state.api_url = "https://127.0.0.1:6443".to_string();
			state.ca_cert = "-----BEGIN CERTIFICATE-----\nMOCK\n-----END CERTIFICATE-----".to_string();
		}
		mock
	}

	/// Pre-seed an existing cluster, as if a prior run created it.
	pub fn with_cluster(self, name: &str) -> Self {
		self.state.lock().unwrap().clusters.push(name.to_string());
		self
	}

	/// Configure the stdout returned for an exec call.
	///
	/// The key is `"{target} {argv joined by spaces}"`. Unconfigured execs
	/// return empty output, which models a command that printed nothing.
	pub fn set_exec_response(&self, key: &str, stdout: &str) {
		self
			.state
			.lock()
			.unwrap()
			.exec_responses
			.insert(key.to_string(), stdout.to_string());
	}

	/// Make readiness waits for `selector` time out.
	pub fn fail_wait(&self, selector: &str) {
		self
			.state
			.lock()
			.unwrap()
			.failing_waits
			.insert(selector.to_string());
	}

	/// Make completion waits for `job` time out.
	pub fn fail_job(&self, job: &str) {
		self.state.lock().unwrap().failing_jobs.insert(job.to_string());
	}

	pub fn created_clusters(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().created_clusters.clone()
	}

	pub fn applied_manifests(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().applied.clone()
	}

	pub fn deleted_resources(&self) -> Vec<(String, String, String)> {
		self.state.lock().unwrap().deleted.clone()
	}

	pub fn exec_calls(&self) -> Vec<String> {
		self.state.lock().unwrap().exec_calls.clone()
	}

	pub fn minted_tokens(&self) -> Vec<(String, String, Option<String>)> {
		self.state.lock().unwrap().tokens_minted.clone()
	}

	pub fn waits(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().waits.clone()
	}

	pub fn job_waits(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().job_waits.clone()
	}
}

#[async_trait]
impl ClusterClient for MockClusterClient {
	async fn clusters(&self) -> ClusterResult<Vec<String>> {
		Ok(self.state.lock().unwrap().clusters.clone())
	}

	async fn create_cluster(&self, name: &str, node_image: &str) -> ClusterResult<()> {
		let mut state = self.state.lock().unwrap();
		state.clusters.push(name.to_string());
		state
			.created_clusters
			.push((name.to_string(), node_image.to_string()));
		Ok(())
	}

	async fn namespaces(&self) -> ClusterResult<Vec<String>> {
		Ok(self.state.lock().unwrap().namespaces.clone())
	}

	async fn create_namespace(&self, name: &str) -> ClusterResult<()> {
		self.state.lock().unwrap().namespaces.push(name.to_string());
		Ok(())
	}

	async fn apply(&self, namespace: &str, manifest: &str) -> ClusterResult<()> {
		self
			.state
			.lock()
			.unwrap()
			.applied
			.push((namespace.to_string(), manifest.to_string()));
		Ok(())
	}

	async fn delete(&self, namespace: &str, kind: &str, name: &str) -> ClusterResult<()> {
		self.state.lock().unwrap().deleted.push((
			namespace.to_string(),
			kind.to_string(),
			name.to_string(),
		));
		Ok(())
	}

	async fn wait_ready(&self, namespace: &str, selector: &str, timeout: Duration) -> ClusterResult<()> {
		let mut state = self.state.lock().unwrap();
		if state.failing_waits.contains(selector) {
			return Err(ClusterError::Timeout {
				what: format!("pods matching {selector} in {namespace}"),
				timeout,
			});
		}
		state
			.waits
			.push((namespace.to_string(), selector.to_string()));
		Ok(())
	}

	async fn wait_job_complete(&self, namespace: &str, job: &str, timeout: Duration) -> ClusterResult<()> {
		let mut state = self.state.lock().unwrap();
		if state.failing_jobs.contains(job) {
			return Err(ClusterError::Timeout {
				what: format!("job {job} in {namespace}"),
				timeout,
			});
		}
		state
			.job_waits
			.push((namespace.to_string(), job.to_string()));
		Ok(())
	}

	async fn exec(&self, namespace: &str, target: &str, argv: &[&str]) -> ClusterResult<String> {
		let _ = namespace;
		let key = format!("{target} {}", argv.join(" "));
		let mut state = self.state.lock().unwrap();
		state.exec_calls.push(key.clone());
		Ok(state.exec_responses.get(&key).cloned().unwrap_or_default())
	}

	async fn mint_token(
		&self,
		namespace: &str,
		service_account: &str,
		audience: Option<&str>,
	) -> ClusterResult<SecretString> {
		let mut state = self.state.lock().unwrap();
		state.tokens_minted.push((
			namespace.to_string(),
			service_account.to_string(),
			audience.map(str::to_string),
		));
		let n = state.tokens_minted.len();
		Ok(SecretString::new(format!("mock-sa-token-{n}")))
	}

	async fn api_server_url(&self) -> ClusterResult<String> {
		Ok(self.state.lock().unwrap().api_url.clone())
	}

	async fn ca_certificate(&self, _namespace: &str) -> ClusterResult<String> {
		Ok(self.state.lock().unwrap().ca_cert.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: create_cluster is visible to a subsequent clusters() query.
	///
	/// Why this test is important: the reconciler's create-or-reuse decision
	/// reads the cluster list; the mock must model the control plane's
	/// read-your-writes behavior or idempotence tests would pass vacuously.
	#[tokio::test]
	async fn test_created_cluster_is_listed() {
		let mock = MockClusterClient::new();
		assert!(mock.clusters().await.unwrap().is_empty());
		mock.create_cluster("demo", "node:v1.32.0").await.unwrap();
		assert_eq!(mock.clusters().await.unwrap(), vec!["demo".to_string()]);
		assert_eq!(mock.created_clusters().len(), 1);
	}

	/// Test: configured wait failures surface as Timeout.
	#[tokio::test]
	async fn test_fail_wait_times_out() {
		let mock = MockClusterClient::new();
		mock.fail_wait("app=broker");
		let err = mock
			.wait_ready("secrets", "app=broker", Duration::from_secs(120))
			.await
			.unwrap_err();
		assert!(matches!(err, ClusterError::Timeout { .. }));
	}

	/// Test: job completion waits are recorded, and configured failures
	/// surface as Timeout.
	#[tokio::test]
	async fn test_job_wait_recorded_and_failable() {
		let mock = MockClusterClient::new();
		mock
			.wait_job_complete("apps", "delivery", Duration::from_secs(120))
			.await
			.unwrap();
		assert_eq!(
			mock.job_waits(),
			vec![("apps".to_string(), "delivery".to_string())]
		);

		mock.fail_job("delivery");
		let err = mock
			.wait_job_complete("apps", "delivery", Duration::from_secs(120))
			.await
			.unwrap_err();
		assert!(matches!(err, ClusterError::Timeout { .. }));
	}

	/// Test: each minted token is unique.
	///
	/// Why this test is important: the identity binder must mint a fresh
	/// token per run; a mock returning a constant would mask a caching bug.
	#[tokio::test]
	async fn test_tokens_are_fresh_per_mint() {
		let mock = MockClusterClient::new();
		let a = mock.mint_token("ns", "sa", None).await.unwrap();
		let b = mock.mint_token("ns", "sa", Some("https://aud")).await.unwrap();
		assert_ne!(a, b);
		assert_eq!(mock.minted_tokens().len(), 2);
		assert_eq!(mock.minted_tokens()[1].2.as_deref(), Some("https://aud"));
	}
}
