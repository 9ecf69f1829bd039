// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Scoped local port-forward into a cluster service.
//!
//! The forward is a detached child process that lives for the duration of a
//! pipeline run. It is a scoped resource: the child is spawned with
//! `kill_on_drop`, so the tunnel is torn down whether the pipeline succeeds,
//! fails, or panics. Stale forwards leaked by a previous crashed run are
//! terminated by pattern match before a new one is opened, to avoid a
//! port-binding race.

use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ClusterError, ClusterResult};

/// How long to wait for the forwarded local port to accept connections.
const LISTEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Initial interval between listen probes; doubles up to [`MAX_POLL_INTERVAL`].
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A running `kubectl port-forward` scoped to this handle's lifetime.
pub struct PortForward {
	child: tokio::process::Child,
	local_port: u16,
}

impl PortForward {
	/// Terminate stale forwards for `target`, spawn a new one, and wait for
	/// the local port to accept connections.
	pub async fn open(
		context: &str,
		namespace: &str,
		target: &str,
		local_port: u16,
		remote_port: u16,
	) -> ClusterResult<Self> {
		kill_stale(target).await;

		let ports = format!("{local_port}:{remote_port}");
		let mut cmd = Command::new("kubectl");
		cmd.args(["--context", context, "-n", namespace, "port-forward", target, &ports])
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true);

		let child = cmd.spawn().map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ClusterError::ToolMissing { tool: "kubectl" }
			} else {
				ClusterError::Io(e)
			}
		})?;

		let mut forward = Self { child, local_port };
		forward.wait_for_listen().await?;
		debug!(target = %target, local_port, remote_port, "port-forward established");
		Ok(forward)
	}

	/// The local port the forward listens on.
	pub fn local_port(&self) -> u16 {
		self.local_port
	}

	/// Tear the forward down explicitly. Dropping the handle has the same
	/// effect; this form lets callers await the child's exit.
	pub async fn shutdown(mut self) {
		if let Err(e) = self.child.kill().await {
			warn!(error = %e, "failed to kill port-forward child");
		}
	}

	/// Backoff-poll the local port until it accepts a TCP connection.
	///
	/// Replaces a fixed settle sleep: the forward has no readiness signal of
	/// its own, so connect attempts are the readiness predicate.
	async fn wait_for_listen(&mut self) -> ClusterResult<()> {
		let deadline = tokio::time::Instant::now() + LISTEN_TIMEOUT;
		let mut interval = INITIAL_POLL_INTERVAL;

		loop {
			if let Some(status) = self.child.try_wait()? {
				return Err(ClusterError::CommandFailed {
					tool: "kubectl",
					args: vec!["port-forward".to_string()],
					stderr: format!("port-forward exited early with {status}"),
				});
			}

			if TcpStream::connect(("127.0.0.1", self.local_port)).await.is_ok() {
				return Ok(());
			}

			if tokio::time::Instant::now() + interval > deadline {
				return Err(ClusterError::Timeout {
					what: format!("local forward on port {}", self.local_port),
					timeout: LISTEN_TIMEOUT,
				});
			}
			tokio::time::sleep(interval).await;
			interval = (interval * 2).min(MAX_POLL_INTERVAL);
		}
	}
}

/// Kill leftover forwards for `target` from a previous run.
///
/// Best-effort: a missing pkill or no matching process is not an error. The
/// real cleanup guarantee comes from `kill_on_drop` on the current child;
/// this only clears forwards orphaned by runs that died without dropping.
async fn kill_stale(target: &str) {
	let pattern = format!("kubectl.*port-forward.*{target}");
	match Command::new("pkill").args(["-f", &pattern]).status().await {
		Ok(status) if status.success() => {
			debug!(target = %target, "terminated stale port-forward");
		}
		Ok(_) => {} // no match
		Err(e) => warn!(error = %e, "pkill unavailable, skipping stale forward cleanup"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::net::TcpListener;

	/// Test: wait_for_listen succeeds once something listens on the port.
	///
	/// Why this test is important: session establishment proceeds to client
	/// init as soon as this returns; a false positive would race the broker
	/// connection against an unready tunnel.
	#[tokio::test]
	async fn test_wait_for_listen_succeeds_on_open_port() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		// A long-lived child standing in for kubectl port-forward.
		let child = Command::new("sleep")
			.arg("30")
			.kill_on_drop(true)
			.spawn()
			.unwrap();

		let mut forward = PortForward {
			child,
			local_port: port,
		};
		forward.wait_for_listen().await.unwrap();
		assert_eq!(forward.local_port(), port);
	}

	/// Test: an early child exit is reported as a command failure, not a
	/// timeout.
	///
	/// Why this test is important: kubectl exits immediately when the target
	/// service does not exist. Waiting out the full listen timeout in that
	/// case would hide the actual diagnostic for thirty seconds.
	#[tokio::test]
	async fn test_early_exit_is_command_failure() {
		let child = Command::new("true").kill_on_drop(true).spawn().unwrap();
		// Give the child a moment to exit.
		tokio::time::sleep(Duration::from_millis(50)).await;

		let mut forward = PortForward {
			child,
			// Port 1 is never listening in test environments.
			local_port: 1,
		};
		let err = forward.wait_for_listen().await.unwrap_err();
		assert!(matches!(err, ClusterError::CommandFailed { .. }));
	}

	/// Test: kill_stale tolerates no matching process.
	#[tokio::test]
	async fn test_kill_stale_no_match_is_ok() {
		kill_stale("no-such-forward-target-3b1c").await;
	}
}
