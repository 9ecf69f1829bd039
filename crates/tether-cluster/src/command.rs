// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tether_common_secret::SecretString;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};

/// Cluster client implementation using the `kind` and `kubectl` CLIs.
pub struct CommandClusterClient {
	context: String,
}

impl CommandClusterClient {
	/// Create a client pinned to one kubectl context.
	pub fn new(context: impl Into<String>) -> Self {
		Self {
			context: context.into(),
		}
	}

	fn kubectl_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
		let mut full = vec!["--context", self.context.as_str()];
		full.extend_from_slice(args);
		full
	}
}

#[async_trait]
impl ClusterClient for CommandClusterClient {
	async fn clusters(&self) -> ClusterResult<Vec<String>> {
		// Prints nothing to stdout when no clusters exist.
		let out = run_tool("kind", &["get", "clusters"], None).await?;
		Ok(out.lines().map(str::to_string).collect())
	}

	async fn create_cluster(&self, name: &str, node_image: &str) -> ClusterResult<()> {
		run_tool(
			"kind",
			&[
				"create",
				"cluster",
				"--name",
				name,
				"--image",
				node_image,
				"--wait",
				"120s",
			],
			None,
		)
		.await?;
		debug!(cluster = %name, image = %node_image, "created cluster");
		Ok(())
	}

	async fn namespaces(&self) -> ClusterResult<Vec<String>> {
		let args = self.kubectl_args(&[
			"get",
			"namespaces",
			"-o",
			"jsonpath={.items[*].metadata.name}",
		]);
		let out = run_tool("kubectl", &args, None).await?;
		Ok(out.split_whitespace().map(str::to_string).collect())
	}

	async fn create_namespace(&self, name: &str) -> ClusterResult<()> {
		let args = self.kubectl_args(&["create", "namespace", name]);
		run_tool("kubectl", &args, None).await?;
		debug!(namespace = %name, "created namespace");
		Ok(())
	}

	async fn apply(&self, namespace: &str, manifest: &str) -> ClusterResult<()> {
		let args = self.kubectl_args(&["-n", namespace, "apply", "-f", "-"]);
		run_tool("kubectl", &args, Some(manifest)).await?;
		debug!(namespace = %namespace, bytes = manifest.len(), "applied manifest");
		Ok(())
	}

	async fn delete(&self, namespace: &str, kind: &str, name: &str) -> ClusterResult<()> {
		let args = self.kubectl_args(&["-n", namespace, "delete", kind, name, "--ignore-not-found"]);
		run_tool("kubectl", &args, None).await?;
		debug!(namespace = %namespace, kind = %kind, name = %name, "deleted resource");
		Ok(())
	}

	async fn wait_ready(&self, namespace: &str, selector: &str, timeout: Duration) -> ClusterResult<()> {
		let timeout_arg = format!("--timeout={}s", timeout.as_secs());
		let args = self.kubectl_args(&[
			"-n",
			namespace,
			"wait",
			"--for=condition=ready",
			"pod",
			"-l",
			selector,
			&timeout_arg,
		]);
		match run_tool("kubectl", &args, None).await {
			Ok(_) => Ok(()),
			Err(ClusterError::CommandFailed { stderr, .. }) if stderr.contains("timed out") => {
				Err(ClusterError::Timeout {
					what: format!("pods matching {selector} in {namespace}"),
					timeout,
				})
			}
			Err(e) => Err(e),
		}
	}

	async fn wait_job_complete(&self, namespace: &str, job: &str, timeout: Duration) -> ClusterResult<()> {
		let timeout_arg = format!("--timeout={}s", timeout.as_secs());
		let job_ref = format!("job/{job}");
		let args = self.kubectl_args(&[
			"-n",
			namespace,
			"wait",
			"--for=condition=complete",
			&job_ref,
			&timeout_arg,
		]);
		match run_tool("kubectl", &args, None).await {
			Ok(_) => Ok(()),
			Err(ClusterError::CommandFailed { stderr, .. }) if stderr.contains("timed out") => {
				Err(ClusterError::Timeout {
					what: format!("job {job} in {namespace}"),
					timeout,
				})
			}
			Err(e) => Err(e),
		}
	}

	async fn exec(&self, namespace: &str, target: &str, argv: &[&str]) -> ClusterResult<String> {
		let mut args = vec!["-n", namespace, "exec", target, "--"];
		args.extend_from_slice(argv);
		let args = self.kubectl_args(&args);
		run_tool("kubectl", &args, None).await
	}

	async fn mint_token(
		&self,
		namespace: &str,
		service_account: &str,
		audience: Option<&str>,
	) -> ClusterResult<SecretString> {
		let audience_arg = audience.map(|a| format!("--audience={a}"));
		let mut args = vec!["-n", namespace, "create", "token", service_account];
		if let Some(aud) = audience_arg.as_deref() {
			args.push(aud);
		}
		let args = self.kubectl_args(&args);
		let token = run_tool("kubectl", &args, None).await?;
		if token.is_empty() {
			return Err(ClusterError::UnexpectedOutput {
				tool: "kubectl",
				message: format!("empty token for service account {service_account}"),
			});
		}
		debug!(
				namespace = %namespace,
				service_account = %service_account,
				audience = audience.unwrap_or("<cluster default>"),
				"minted bound identity token"
		);
		Ok(SecretString::new(token))
	}

	async fn api_server_url(&self) -> ClusterResult<String> {
		let args = self.kubectl_args(&[
			"config",
			"view",
			"--minify",
			"-o",
			"jsonpath={.clusters[0].cluster.server}",
		]);
		let url = run_tool("kubectl", &args, None).await?;
		if url.is_empty() {
			return Err(ClusterError::UnexpectedOutput {
				tool: "kubectl",
				message: format!("no server URL in context {}", self.context),
			});
		}
		Ok(url)
	}

	async fn ca_certificate(&self, namespace: &str) -> ClusterResult<String> {
		// The root CA configmap is projected into every namespace.
		let args = self.kubectl_args(&[
			"-n",
			namespace,
			"get",
			"configmap",
			"kube-root-ca.crt",
			"-o",
			"jsonpath={.data.ca\\.crt}",
		]);
		let pem = run_tool("kubectl", &args, None).await?;
		if !pem.contains("BEGIN CERTIFICATE") {
			return Err(ClusterError::UnexpectedOutput {
				tool: "kubectl",
				message: "root CA configmap did not contain a PEM certificate".to_string(),
			});
		}
		Ok(pem)
	}
}

/// Runs a cluster tool and returns trimmed stdout on success.
///
/// Maps a missing binary to [`ClusterError::ToolMissing`] and a non-zero exit
/// to [`ClusterError::CommandFailed`] carrying stderr.
pub(crate) async fn run_tool(
	tool: &'static str,
	args: &[&str],
	stdin: Option<&str>,
) -> ClusterResult<String> {
	let mut cmd = Command::new(tool);
	cmd.args(args);

	trace!(cmd = %format!("{tool} {}", args.join(" ")), "running cluster tool");

	let output = if let Some(input) = stdin {
		cmd.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());
		let mut child = cmd.spawn().map_err(|e| map_spawn_error(tool, e))?;
		let mut handle = child.stdin.take().ok_or_else(|| ClusterError::UnexpectedOutput {
			tool,
			message: "child stdin unavailable".to_string(),
		})?;
		handle.write_all(input.as_bytes()).await?;
		drop(handle);
		child.wait_with_output().await?
	} else {
		cmd.output().await.map_err(|e| map_spawn_error(tool, e))?
	};

	if output.status.success() {
		Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
	} else {
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
		Err(ClusterError::CommandFailed {
			tool,
			args: args.iter().map(|s| s.to_string()).collect(),
			stderr,
		})
	}
}

fn map_spawn_error(tool: &'static str, e: std::io::Error) -> ClusterError {
	if e.kind() == std::io::ErrorKind::NotFound {
		warn!(tool = %tool, "tool not found in PATH");
		ClusterError::ToolMissing { tool }
	} else {
		ClusterError::Io(e)
	}
}
