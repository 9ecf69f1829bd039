// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Run context and local-state exports.
//!
//! The context object is the single channel pipeline state flows through.
//! The credential and env files are exports for downstream tooling, written
//! at defined points; the pipeline never reads them back. Both are
//! single-writer, last-write-wins artifacts, so concurrent runs sharing one
//! export directory must be externally serialized.

use std::path::{Path, PathBuf};

use tether_broker::Session;
use tether_cluster::ClusterFacts;
use tether_common_secret::SecretString;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;

/// Filename of the exported admin credential.
pub const CREDENTIAL_FILE: &str = "admin.key";
/// Filename of the exported connection facts.
pub const ENV_FILE: &str = "tether.env";

/// Mutable state threaded through a single pipeline run.
#[derive(Debug, Default)]
pub struct PipelineContext {
	/// Admin credential bootstrapped in stage 3.
	pub admin_key: Option<SecretString>,
	/// Authenticated session established in stage 4.
	pub session: Option<Session>,
	/// Cluster connection facts extracted in stage 6.
	pub facts: Option<ClusterFacts>,
}

impl PipelineContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Export the admin credential to an operator-readable-only file.
	pub fn export_credential(&self, dir: &Path) -> PipelineResult<PathBuf> {
		let key = match &self.admin_key {
			Some(key) => key,
			None => return Err(crate::error::PipelineError::InvalidConfig {
				message: "no admin credential to export".to_string(),
			}),
		};

		std::fs::create_dir_all(dir)?;
		let path = dir.join(CREDENTIAL_FILE);
		std::fs::write(&path, key.expose())?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
		}

		info!(path = %path.display(), "exported admin credential");
		Ok(path)
	}

	/// Export connection facts as a KEY=value env file for downstream
	/// tooling.
	pub fn export_env(&self, dir: &Path, config: &PipelineConfig) -> PipelineResult<PathBuf> {
		std::fs::create_dir_all(dir)?;
		let path = dir.join(ENV_FILE);

		let mut body = String::new();
		body.push_str(&format!("TETHER_ACCOUNT={}\n", config.account));
		body.push_str(&format!("TETHER_NAMESPACE={}\n", config.broker_namespace));
		body.push_str(&format!("TETHER_RELEASE={}\n", config.release));
		body.push_str(&format!(
			"TETHER_AUTHENTICATOR_ID={}\n",
			config.authenticator_id
		));
		if let Some(key) = &self.admin_key {
			body.push_str(&format!("TETHER_ADMIN_API_KEY={}\n", key.expose()));
		}
		if let Some(facts) = &self.facts {
			body.push_str(&format!("TETHER_CLUSTER_API_URL={}\n", facts.api_url));
		}
		std::fs::write(&path, body)?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
		}

		info!(path = %path.display(), "exported environment file");
		Ok(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: the credential export is written operator-readable-only.
	///
	/// Why this test is important: the file holds a plaintext admin key;
	/// anything wider than 0600 leaks it to other local users.
	#[cfg(unix)]
	#[test]
	fn test_credential_export_is_0600() {
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::tempdir().unwrap();
		let mut ctx = PipelineContext::new();
		ctx.admin_key = Some(SecretString::new("key-123"));

		let path = ctx.export_credential(dir.path()).unwrap();
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "key-123");
		let mode = std::fs::metadata(&path).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	/// Test: exporting without a bootstrapped credential is an error.
	#[test]
	fn test_credential_export_requires_key() {
		let dir = tempfile::tempdir().unwrap();
		let ctx = PipelineContext::new();
		assert!(ctx.export_credential(dir.path()).is_err());
	}

	/// Test: the env file carries the named connection facts.
	///
	/// Why this test is important: downstream tooling sources this file by
	/// key name; renaming a key is a breaking interface change.
	#[test]
	fn test_env_export_keys() {
		let dir = tempfile::tempdir().unwrap();
		let mut ctx = PipelineContext::new();
		ctx.admin_key = Some(SecretString::new("key-123"));
		ctx.facts = Some(ClusterFacts {
			api_url: "https://127.0.0.1:6443".to_string(),
			ca_cert: "PEM".to_string(),
			sa_token: SecretString::new("t"),
		});

		let config = PipelineConfig::default();
		let path = ctx.export_env(dir.path(), &config).unwrap();
		let body = std::fs::read_to_string(&path).unwrap();

		assert!(body.contains("TETHER_ACCOUNT=demo\n"));
		assert!(body.contains("TETHER_NAMESPACE=tether-secrets\n"));
		assert!(body.contains("TETHER_RELEASE=tether-broker\n"));
		assert!(body.contains("TETHER_AUTHENTICATOR_ID=dev-cluster\n"));
		assert!(body.contains("TETHER_ADMIN_API_KEY=key-123\n"));
		assert!(body.contains("TETHER_CLUSTER_API_URL=https://127.0.0.1:6443\n"));
	}

	/// Test: repeated exports overwrite in place (last-write-wins).
	#[test]
	fn test_export_last_write_wins() {
		let dir = tempfile::tempdir().unwrap();
		let mut ctx = PipelineContext::new();

		ctx.admin_key = Some(SecretString::new("first"));
		ctx.export_credential(dir.path()).unwrap();
		ctx.admin_key = Some(SecretString::new("second"));
		let path = ctx.export_credential(dir.path()).unwrap();

		assert_eq!(std::fs::read_to_string(path).unwrap(), "second");
	}
}
