// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The broker's administrative surface.
//!
//! Administrative commands run inside the broker's own workload, reached
//! through the cluster exec primitive. The surface is typed: account creation
//! returns a structured outcome instead of free-form text, so callers never
//! pattern-match command output themselves.

use async_trait::async_trait;
use rand::RngCore;
use tether_cluster::ClusterClient;
use tether_cluster::ClusterError;
use tether_common_secret::SecretString;
use tracing::{debug, warn};

use crate::error::{BrokerError, BrokerResult};

/// Textual marker preceding a freshly minted admin key in account-creation
/// output. Fixed by the broker's CLI.
const API_KEY_MARKER: &str = "API key for admin: ";

/// Outcome of an account-creation attempt.
#[derive(Debug)]
pub enum CreateAccountOutcome {
	/// The account was created and a fresh admin key minted.
	Created(SecretString),
	/// The account already existed; no key is returned, retrieve it instead.
	AlreadyExists,
}

/// Trait abstracting the broker's administrative surface for testability.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
	/// Attempt to create an account.
	///
	/// Exactly-once key issuance lives here: a brand-new account yields
	/// `Created`, a pre-existing one yields `AlreadyExists`. Callers fall
	/// back to [`BrokerAdmin::retrieve_admin_key`] on `AlreadyExists`;
	/// the reverse order would fail outright on a brand-new account.
	async fn create_account(&self, account: &str) -> BrokerResult<CreateAccountOutcome>;

	/// Retrieve the current admin key for an existing account.
	async fn retrieve_admin_key(&self, account: &str) -> BrokerResult<SecretString>;
}

/// Generate a fresh data-encryption key for a first-time broker install.
///
/// Generated exactly once per broker lifetime: regenerating invalidates all
/// previously encrypted data, so upgrades must reuse the installed value.
pub fn generate_data_key() -> SecretString {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	SecretString::new(hex::encode(bytes))
}

/// Administrative surface implementation that execs the broker CLI inside
/// the broker's workload.
pub struct ExecBrokerAdmin<C> {
	cluster: C,
	namespace: String,
	target: String,
}

impl<C: ClusterClient> ExecBrokerAdmin<C> {
	/// `target` is the exec reference to the broker workload, e.g.
	/// `deploy/tether-broker`.
	pub fn new(cluster: C, namespace: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			cluster,
			namespace: namespace.into(),
			target: target.into(),
		}
	}
}

#[async_trait]
impl<C: ClusterClient> BrokerAdmin for ExecBrokerAdmin<C> {
	async fn create_account(&self, account: &str) -> BrokerResult<CreateAccountOutcome> {
		let result = self
			.cluster
			.exec(
				&self.namespace,
				&self.target,
				&["conjurctl", "account", "create", account],
			)
			.await;

		match result {
			Ok(output) => match extract_api_key(&output) {
				Some(key) => {
					debug!(account = %account, "account created, admin key minted");
					Ok(CreateAccountOutcome::Created(key))
				}
				None => {
					debug!(account = %account, "account creation yielded no key, assuming it exists");
					Ok(CreateAccountOutcome::AlreadyExists)
				}
			},
			// The CLI exits non-zero when the account exists; surfacing that
			// as AlreadyExists lets the retrieval fallback decide. A genuine
			// broker fault will fail retrieval too and abort the bootstrap.
			Err(ClusterError::CommandFailed { stderr, .. }) => {
				warn!(account = %account, stderr = %stderr, "account creation refused, falling back to retrieval");
				Ok(CreateAccountOutcome::AlreadyExists)
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn retrieve_admin_key(&self, account: &str) -> BrokerResult<SecretString> {
		let role = format!("{account}:user:admin");
		let output = self
			.cluster
			.exec(
				&self.namespace,
				&self.target,
				&["conjurctl", "role", "retrieve-key", &role],
			)
			.await?;

		// The key is the final line; earlier lines are rails noise.
		let key = output.lines().rev().find(|l| !l.trim().is_empty());
		match key {
			Some(key) => Ok(SecretString::new(key.trim())),
			None => Err(BrokerError::EmptyCredential {
				account: account.to_string(),
			}),
		}
	}
}

/// Extract a minted admin key from account-creation output.
fn extract_api_key(output: &str) -> Option<SecretString> {
	output.lines().find_map(|line| {
		line
			.split_once(API_KEY_MARKER)
			.map(|(_, key)| SecretString::new(key.trim()))
			.filter(|key| !key.is_empty())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use tether_cluster::MockClusterClient;

	const CREATE_OUTPUT: &str = "\
Created new account 'demo'
Token-Signing Public Key: -----BEGIN PUBLIC KEY-----
API key for admin: 3f2xyqd1p6q0gz2a9sj
";

	/// Test: a fresh account yields Created with the marker-extracted key.
	///
	/// Why this test is important: this is the only moment the minted key is
	/// ever visible; failing to extract it here forces the retrieval path,
	/// and on some broker versions retrieval rotates the key.
	#[tokio::test]
	async fn test_create_account_extracts_key() {
		let cluster = MockClusterClient::new();
		cluster.set_exec_response("deploy/broker conjurctl account create demo", CREATE_OUTPUT);
		let admin = ExecBrokerAdmin::new(cluster, "secrets", "deploy/broker");

		match admin.create_account("demo").await.unwrap() {
			CreateAccountOutcome::Created(key) => {
				assert_eq!(key.expose(), "3f2xyqd1p6q0gz2a9sj");
			}
			CreateAccountOutcome::AlreadyExists => panic!("expected Created"),
		}
	}

	/// Test: markerless output means the account pre-exists.
	///
	/// Why this test is important: on a re-run, creation prints nothing
	/// useful; the typed AlreadyExists outcome is what routes the bootstrap
	/// to the retrieval fallback instead of failing the pipeline.
	#[tokio::test]
	async fn test_create_account_without_marker_is_already_exists() {
		let cluster = MockClusterClient::new();
		cluster.set_exec_response("deploy/broker conjurctl account create demo", "account exists");
		let admin = ExecBrokerAdmin::new(cluster, "secrets", "deploy/broker");

		assert!(matches!(
			admin.create_account("demo").await.unwrap(),
			CreateAccountOutcome::AlreadyExists
		));
	}

	/// Test: retrieval takes the final non-empty output line.
	#[tokio::test]
	async fn test_retrieve_admin_key_takes_last_line() {
		let cluster = MockClusterClient::new();
		cluster.set_exec_response(
			"deploy/broker conjurctl role retrieve-key demo:user:admin",
			"rake aborted? no\n1y8mppt3e0qk6vg20\n",
		);
		let admin = ExecBrokerAdmin::new(cluster, "secrets", "deploy/broker");

		let key = admin.retrieve_admin_key("demo").await.unwrap();
		assert_eq!(key.expose(), "1y8mppt3e0qk6vg20");
	}

	/// Test: empty retrieval output is an EmptyCredential error.
	#[tokio::test]
	async fn test_retrieve_admin_key_empty_is_error() {
		let cluster = MockClusterClient::new();
		let admin = ExecBrokerAdmin::new(cluster, "secrets", "deploy/broker");

		let err = admin.retrieve_admin_key("demo").await.unwrap_err();
		assert!(matches!(err, BrokerError::EmptyCredential { .. }));
	}

	/// Test: generated data keys are 64 hex characters and unique.
	#[test]
	fn test_generate_data_key_shape() {
		let a = generate_data_key();
		let b = generate_data_key();
		assert_eq!(a.expose().len(), 64);
		assert!(a.expose().chars().all(|c| c.is_ascii_hexdigit()));
		assert_ne!(a, b);
	}

	/// Test: marker extraction ignores surrounding noise and empty keys.
	#[test]
	fn test_extract_api_key() {
		assert!(extract_api_key("no marker here").is_none());
		assert!(extract_api_key("API key for admin: ").is_none());
		let key = extract_api_key("prefix\nAPI key for admin: abc123\nsuffix").unwrap();
		assert_eq!(key.expose(), "abc123");
	}
}
