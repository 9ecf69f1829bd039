// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur while talking to the secrets broker.
#[derive(Error, Debug)]
pub enum BrokerError {
	#[error("required tool not found in PATH: {tool}")]
	ToolMissing { tool: &'static str },

	#[error("{tool} {args:?} failed: {stderr}")]
	CommandFailed {
		tool: &'static str,
		args: Vec<String>,
		stderr: String,
	},

	#[error("login rejected for {login}@{account}: {message}")]
	AuthenticationFailed {
		account: String,
		login: String,
		message: String,
	},

	#[error("policy rejected by broker: {message}")]
	PolicyRejected { message: String },

	#[error("no admin credential could be obtained for account {account}")]
	EmptyCredential { account: String },

	#[error(
		"broker endpoint {host} is not a certificate-certified hostname; \
		 reach the broker through a name in its certificate SAN"
	)]
	EndpointNotCertified { host: String },

	#[error("failed to parse broker response: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Cluster(#[from] tether_cluster::ClusterError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
