// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ReleaseResult;

/// One installed release as reported by the registry query.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ReleaseStatus {
	pub name: String,
	pub namespace: String,
	pub chart: String,
	pub status: String,
}

impl ReleaseStatus {
	/// True if the release converged on its last mutation.
	pub fn is_deployed(&self) -> bool {
		self.status == "deployed"
	}
}

/// Trait abstracting the release manager for testability.
///
/// Install and upgrade are distinct operations on purpose: the installer
/// queries [`ReleaseClient::list`] to decide which applies, because an
/// upgrade-with-reused-values is the only safe mutation of a release whose
/// values include a never-to-be-regenerated encryption key.
#[async_trait]
pub trait ReleaseClient: Send + Sync {
	/// List installed releases in a namespace.
	async fn list(&self, namespace: &str) -> ReleaseResult<Vec<ReleaseStatus>>;

	/// Install a fresh release with the given `--set`-style overrides.
	async fn install(
		&self,
		release: &str,
		chart: &str,
		namespace: &str,
		values: &[(String, String)],
	) -> ReleaseResult<()>;

	/// Upgrade an existing release in place.
	///
	/// With `reuse_values`, prior values are carried over and `values` are
	/// applied on top as the only overrides.
	async fn upgrade(
		&self,
		release: &str,
		chart: &str,
		namespace: &str,
		reuse_values: bool,
		values: &[(String, String)],
	) -> ReleaseResult<()>;

	/// Remove a release. Used only by explicit teardown, never by the
	/// pipeline itself.
	async fn uninstall(&self, release: &str, namespace: &str) -> ReleaseResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: release list JSON from the registry deserializes.
	///
	/// Why this test is important: the install-vs-upgrade decision is made
	/// from this parse; a schema drift would silently force reinstall paths
	/// and regenerate the encryption key.
	#[test]
	fn test_release_status_parses_registry_json() {
		let json = r#"[{"name":"tether-broker","namespace":"secrets",
			"revision":"2","updated":"2026-08-01 10:00:00.0 +0000 UTC",
			"status":"deployed","chart":"conjur-oss-2.0.7","app_version":"1.21"}]"#;
		let releases: Vec<ReleaseStatus> = serde_json::from_str(json).unwrap();
		assert_eq!(releases.len(), 1);
		assert_eq!(releases[0].name, "tether-broker");
		assert!(releases[0].is_deployed());
	}

	/// Test: unknown fields in registry output are tolerated.
	#[test]
	fn test_release_status_ignores_extra_fields() {
		let json = r#"{"name":"r","namespace":"n","chart":"c","status":"failed","icon":"x"}"#;
		let release: ReleaseStatus = serde_json::from_str(json).unwrap();
		assert!(!release.is_deployed());
	}
}
