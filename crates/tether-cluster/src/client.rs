// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use tether_common_secret::SecretString;

use crate::error::ClusterResult;

/// A provisioned (or reused) cluster.
///
/// Created once per environment and reused across pipeline runs; only an
/// explicit external teardown destroys it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterHandle {
	/// Environment name, e.g. "demo".
	pub name: String,
	/// Node image the cluster was requested with.
	pub node_image: String,
	/// Context identifier downstream kubectl calls are pinned to.
	pub context: String,
}

/// Connection facts an authenticator needs to validate workload logins.
#[derive(Clone, Debug)]
pub struct ClusterFacts {
	/// API server URL as seen from outside the cluster.
	pub api_url: String,
	/// PEM-encoded cluster CA certificate.
	pub ca_cert: String,
	/// Bearer token for the bound identity, minted fresh per run.
	pub sa_token: SecretString,
}

/// Trait abstracting the cluster control plane for testability.
///
/// The control plane is an opaque remote collaborator; implementations drive
/// it through its CLIs. Every operation is either naturally idempotent or
/// paired with a query so callers can reconcile instead of blindly mutating.
#[async_trait]
pub trait ClusterClient: Send + Sync {
	/// List the names of existing clusters.
	async fn clusters(&self) -> ClusterResult<Vec<String>>;

	/// Provision a new cluster, blocking until its control plane is ready.
	async fn create_cluster(&self, name: &str, node_image: &str) -> ClusterResult<()>;

	/// List the names of existing namespaces.
	async fn namespaces(&self) -> ClusterResult<Vec<String>>;

	/// Create a namespace. Callers check [`ClusterClient::namespaces`] first.
	async fn create_namespace(&self, name: &str) -> ClusterResult<()>;

	/// Apply a manifest into a namespace (server-side create-or-update).
	async fn apply(&self, namespace: &str, manifest: &str) -> ClusterResult<()>;

	/// Delete a namespaced resource, tolerating absence.
	async fn delete(&self, namespace: &str, kind: &str, name: &str) -> ClusterResult<()>;

	/// Block until pods matching `selector` report ready, or fail with a
	/// timeout-specific error after `timeout`.
	async fn wait_ready(&self, namespace: &str, selector: &str, timeout: Duration) -> ClusterResult<()>;

	/// Block until the named job reports complete, or fail with a
	/// timeout-specific error after `timeout`.
	///
	/// Jobs are run-to-completion primitives; readiness of their pods says
	/// nothing about whether the work finished.
	async fn wait_job_complete(&self, namespace: &str, job: &str, timeout: Duration) -> ClusterResult<()>;

	/// Run a command inside a workload and return its stdout.
	///
	/// `target` is a kubectl-style reference such as `deploy/broker` or a
	/// bare pod name.
	async fn exec(&self, namespace: &str, target: &str, argv: &[&str]) -> ClusterResult<String>;

	/// Mint a fresh bound-identity token for a service account.
	///
	/// `audience` scopes the token to the URL the authenticator will later be
	/// queried at; an audience mismatch fails validation in a way that is
	/// distinct from token expiry or corruption, so callers pass it
	/// explicitly rather than relying on the cluster default.
	async fn mint_token(
		&self,
		namespace: &str,
		service_account: &str,
		audience: Option<&str>,
	) -> ClusterResult<SecretString>;

	/// The API server URL of the current context.
	async fn api_server_url(&self) -> ClusterResult<String>;

	/// The cluster CA certificate, PEM-encoded.
	async fn ca_certificate(&self, namespace: &str) -> ClusterResult<String>;
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: ClusterHandle equality covers all identifying fields.
	///
	/// Why this test is important: the reconciler decides create-vs-reuse by
	/// comparing handles; a handle that ignored a field would make two
	/// different environments look identical.
	#[test]
	fn test_handle_identity() {
		let a = ClusterHandle {
			name: "demo".into(),
			node_image: "node:v1.32.0".into(),
			context: "kind-demo".into(),
		};
		let mut b = a.clone();
		assert_eq!(a, b);
		b.context = "kind-other".into();
		assert_ne!(a, b);
	}

	/// Test: ClusterFacts debug output never contains the token.
	///
	/// Why this test is important: facts are logged at debug level while
	/// binding identity; the bearer token must stay redacted.
	#[test]
	fn test_facts_debug_redacts_token() {
		let facts = ClusterFacts {
			api_url: "https://127.0.0.1:6443".into(),
			ca_cert: "-----BEGIN CERTIFICATE-----".into(),
			sa_token: SecretString::new("eyJhbGciOi"),
		};
		let rendered = format!("{facts:?}");
		assert!(!rendered.contains("eyJhbGciOi"));
	}
}
