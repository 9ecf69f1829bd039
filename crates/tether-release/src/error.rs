// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for release-manager operations.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Errors that can occur while driving the release manager.
#[derive(Error, Debug)]
pub enum ReleaseError {
	#[error("required tool not found in PATH: {tool}")]
	ToolMissing { tool: &'static str },

	#[error("{tool} {args:?} failed: {stderr}")]
	CommandFailed {
		tool: &'static str,
		args: Vec<String>,
		stderr: String,
	},

	#[error("release not found: {name} in {namespace}")]
	ReleaseNotFound { name: String, namespace: String },

	#[error("failed to parse release list: {0}")]
	Json(#[from] serde_json::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
