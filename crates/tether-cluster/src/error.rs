// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while driving the cluster control plane.
#[derive(Error, Debug)]
pub enum ClusterError {
	#[error("required tool not found in PATH: {tool}")]
	ToolMissing { tool: &'static str },

	#[error("{tool} {args:?} failed: {stderr}")]
	CommandFailed {
		tool: &'static str,
		args: Vec<String>,
		stderr: String,
	},

	#[error("timed out after {timeout:?} waiting for {what}")]
	Timeout { what: String, timeout: Duration },

	#[error("unexpected {tool} output: {message}")]
	UnexpectedOutput {
		tool: &'static str,
		message: String,
	},

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
