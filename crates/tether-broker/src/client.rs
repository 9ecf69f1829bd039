// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tether_common_secret::SecretString;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{BrokerError, BrokerResult};
use crate::policy::PolicyDocument;

/// An authenticated client context bound to one endpoint and account.
///
/// Session identity includes the hostname: connecting to the same broker
/// under a different name is a different session and must be re-established.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
	pub host: String,
	pub account: String,
}

impl Session {
	pub fn new(host: impl Into<String>, account: impl Into<String>) -> Self {
		Self {
			host: host.into(),
			account: account.into(),
		}
	}

	/// True if this session already covers the given endpoint identity.
	pub fn covers(&self, host: &str, account: &str) -> bool {
		self.host == host && self.account == account
	}
}

/// Acknowledgement returned by a policy load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyAck {
	/// Policy version after the load.
	pub version: u64,
	/// Number of roles minted by this load; zero on an idempotent reload.
	pub created_roles: usize,
}

/// Reject endpoints that cannot match a SAN-bound broker certificate.
///
/// The broker certificate names specific hosts; an IP literal or `localhost`
/// will fail TLS verification at authentication time with a much less
/// actionable error, so it is refused up front. Mapping the certified name to
/// a reachable address is the caller's responsibility.
pub fn ensure_certified_host(host: &str) -> BrokerResult<()> {
	if host.eq_ignore_ascii_case("localhost") || host.parse::<IpAddr>().is_ok() {
		return Err(BrokerError::EndpointNotCertified {
			host: host.to_string(),
		});
	}
	Ok(())
}

/// Trait abstracting the broker's authenticated surface for testability.
#[async_trait]
pub trait BrokerClient: Send + Sync {
	/// Point the client at an endpoint and account, trusting the broker's
	/// out-of-band certificate.
	async fn init(&self, endpoint: &Url, account: &str) -> BrokerResult<()>;

	/// Authenticate as `login` with an API key.
	async fn login(&self, account: &str, login: &str, key: &SecretString) -> BrokerResult<()>;

	/// Submit a policy document under a base role.
	async fn load_policy(&self, base: &str, document: &PolicyDocument) -> BrokerResult<PolicyAck>;

	/// Write a variable value; last-write-wins, unversioned.
	async fn set_variable(&self, path: &str, value: &str) -> BrokerResult<()>;
}

/// Broker client implementation using the broker CLI.
pub struct CommandBrokerClient;

impl CommandBrokerClient {
	pub fn new() -> Self {
		Self
	}
}

impl Default for CommandBrokerClient {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Deserialize)]
struct LoadPolicyResponse {
	created_roles: HashMap<String, serde_json::Value>,
	version: u64,
}

#[async_trait]
impl BrokerClient for CommandBrokerClient {
	async fn init(&self, endpoint: &Url, account: &str) -> BrokerResult<()> {
		let host = endpoint.host_str().unwrap_or_default();
		ensure_certified_host(host)?;

		run_conjur(
			&[
				"init",
				"-u",
				endpoint.as_str(),
				"-a",
				account,
				"--self-signed",
				"--force",
			],
			None,
		)
		.await?;
		debug!(endpoint = %endpoint, account = %account, "initialized broker client");
		Ok(())
	}

	async fn login(&self, account: &str, login: &str, key: &SecretString) -> BrokerResult<()> {
		match run_conjur(&["login", "-i", login, "-p", key.expose()], None).await {
			Ok(_) => {
				debug!(account = %account, login = %login, "broker login succeeded");
				Ok(())
			}
			Err(BrokerError::CommandFailed { stderr, .. }) => Err(BrokerError::AuthenticationFailed {
				account: account.to_string(),
				login: login.to_string(),
				message: stderr,
			}),
			Err(e) => Err(e),
		}
	}

	async fn load_policy(&self, base: &str, document: &PolicyDocument) -> BrokerResult<PolicyAck> {
		let yaml = document.render();
		let out = match run_conjur(&["policy", "load", "-b", base, "-f", "-"], Some(&yaml)).await {
			Ok(out) => out,
			// Conflicting policy text is surfaced verbatim; this system does
			// not diagnose or repair it.
			Err(BrokerError::CommandFailed { stderr, .. }) => {
				return Err(BrokerError::PolicyRejected { message: stderr })
			}
			Err(e) => return Err(e),
		};

		let response: LoadPolicyResponse = serde_json::from_str(&out)?;
		debug!(
				base = %base,
				version = response.version,
				created_roles = response.created_roles.len(),
				"loaded policy"
		);
		Ok(PolicyAck {
			version: response.version,
			created_roles: response.created_roles.len(),
		})
	}

	async fn set_variable(&self, path: &str, value: &str) -> BrokerResult<()> {
		run_conjur(&["variable", "set", "-i", path, "-v", value], None).await?;
		debug!(path = %path, "set variable");
		Ok(())
	}
}

/// Runs the broker CLI and returns trimmed stdout on success.
async fn run_conjur(args: &[&str], stdin: Option<&str>) -> BrokerResult<String> {
	let mut cmd = Command::new("conjur");
	cmd.args(args);

	trace!(cmd = %format!("conjur {}", args.join(" ")), "running broker CLI");

	let output = if let Some(input) = stdin {
		cmd.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());
		let mut child = cmd.spawn().map_err(map_spawn_error)?;
		let mut handle = child
			.stdin
			.take()
			.ok_or_else(|| BrokerError::CommandFailed {
				tool: "conjur",
				args: args.iter().map(|s| s.to_string()).collect(),
				stderr: "child stdin unavailable".to_string(),
			})?;
		handle.write_all(input.as_bytes()).await?;
		drop(handle);
		child.wait_with_output().await?
	} else {
		cmd.output().await.map_err(map_spawn_error)?
	};

	if output.status.success() {
		Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
	} else {
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
		Err(BrokerError::CommandFailed {
			tool: "conjur",
			args: args.iter().map(|s| s.to_string()).collect(),
			stderr,
		})
	}
}

fn map_spawn_error(e: std::io::Error) -> BrokerError {
	if e.kind() == std::io::ErrorKind::NotFound {
		warn!("conjur CLI not found in PATH");
		BrokerError::ToolMissing { tool: "conjur" }
	} else {
		BrokerError::Io(e)
	}
}
