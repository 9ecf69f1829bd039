// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::client::{ReleaseClient, ReleaseStatus};
use crate::error::{ReleaseError, ReleaseResult};

/// Release client implementation using the `helm` CLI.
pub struct CommandReleaseClient {
	kube_context: String,
}

impl CommandReleaseClient {
	/// Create a client pinned to one kubectl context.
	pub fn new(kube_context: impl Into<String>) -> Self {
		Self {
			kube_context: kube_context.into(),
		}
	}

	async fn run(&self, args: &[&str]) -> ReleaseResult<String> {
		let mut cmd = Command::new("helm");
		cmd.args(["--kube-context", &self.kube_context]);
		cmd.args(args);

		trace!(cmd = %format!("helm {}", args.join(" ")), "running helm");

		let output = cmd.output().await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				warn!("helm not found in PATH");
				ReleaseError::ToolMissing { tool: "helm" }
			} else {
				ReleaseError::Io(e)
			}
		})?;

		if output.status.success() {
			Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
		} else {
			let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
			Err(ReleaseError::CommandFailed {
				tool: "helm",
				args: args.iter().map(|s| s.to_string()).collect(),
				stderr,
			})
		}
	}
}

fn set_flags(values: &[(String, String)]) -> Vec<String> {
	let mut flags = Vec::with_capacity(values.len() * 2);
	for (key, value) in values {
		flags.push("--set".to_string());
		flags.push(format!("{key}={value}"));
	}
	flags
}

#[async_trait]
impl ReleaseClient for CommandReleaseClient {
	async fn list(&self, namespace: &str) -> ReleaseResult<Vec<ReleaseStatus>> {
		let out = self.run(&["list", "-n", namespace, "-o", "json"]).await?;
		if out.is_empty() {
			return Ok(Vec::new());
		}
		let releases: Vec<ReleaseStatus> = serde_json::from_str(&out)?;
		Ok(releases)
	}

	async fn install(
		&self,
		release: &str,
		chart: &str,
		namespace: &str,
		values: &[(String, String)],
	) -> ReleaseResult<()> {
		let flags = set_flags(values);
		let mut args = vec!["install", release, chart, "-n", namespace];
		args.extend(flags.iter().map(String::as_str));
		self.run(&args).await?;
		debug!(release = %release, chart = %chart, namespace = %namespace, "installed release");
		Ok(())
	}

	async fn upgrade(
		&self,
		release: &str,
		chart: &str,
		namespace: &str,
		reuse_values: bool,
		values: &[(String, String)],
	) -> ReleaseResult<()> {
		let flags = set_flags(values);
		let mut args = vec!["upgrade", release, chart, "-n", namespace];
		if reuse_values {
			args.push("--reuse-values");
		}
		args.extend(flags.iter().map(String::as_str));
		self.run(&args).await?;
		debug!(release = %release, namespace = %namespace, reuse_values, "upgraded release");
		Ok(())
	}

	async fn uninstall(&self, release: &str, namespace: &str) -> ReleaseResult<()> {
		self.run(&["uninstall", release, "-n", namespace]).await?;
		debug!(release = %release, namespace = %namespace, "uninstalled release");
		Ok(())
	}
}
