// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use thiserror::Error;

/// The pipeline's stages, in execution order.
///
/// Control flow is strictly linear: each stage's postcondition is the next
/// stage's precondition, and every failure is fatal. Re-running the whole
/// pipeline is the recovery path; every stage is idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
	Environment,
	BrokerInstall,
	CredentialBootstrap,
	Session,
	PolicyLoad,
	IdentityBind,
	SecretProvision,
	DeliveryVerify,
}

impl Stage {
	pub fn name(&self) -> &'static str {
		match self {
			Stage::Environment => "environment",
			Stage::BrokerInstall => "broker-install",
			Stage::CredentialBootstrap => "credential-bootstrap",
			Stage::Session => "session",
			Stage::PolicyLoad => "policy-load",
			Stage::IdentityBind => "identity-bind",
			Stage::SecretProvision => "secret-provision",
			Stage::DeliveryVerify => "delivery-verify",
		}
	}
}

impl std::fmt::Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The pipeline failure taxonomy.
///
/// Client-level errors are folded into these categories at the stage
/// boundary so the operator-facing diagnostic names the failure class, not
/// the tool that happened to report it.
#[derive(Error, Debug)]
pub enum PipelineError {
	#[error("required tool not found in PATH: {tool}")]
	ToolMissing { tool: &'static str },

	#[error("remote never became ready: {what} (waited {timeout:?})")]
	RemoteUnready { what: String, timeout: Duration },

	#[error(
		"credential bootstrap failed for account {account}: \
		 neither creation nor retrieval yielded a key"
	)]
	CredentialBootstrap { account: String },

	#[error("authentication failed: {message}")]
	Authentication { message: String },

	#[error("policy conflict: {message}")]
	PolicyConflict { message: String },

	#[error("delivery mismatch at {path}: expected {expected:?}, observed {observed:?}")]
	DeliveryMismatch {
		path: String,
		expected: String,
		observed: String,
	},

	#[error("invalid pipeline configuration: {message}")]
	InvalidConfig { message: String },

	#[error(transparent)]
	Cluster(tether_cluster::ClusterError),

	#[error(transparent)]
	Release(tether_release::ReleaseError),

	#[error(transparent)]
	Broker(tether_broker::BrokerError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl From<tether_cluster::ClusterError> for PipelineError {
	fn from(err: tether_cluster::ClusterError) -> Self {
		use tether_cluster::ClusterError as E;
		match err {
			E::ToolMissing { tool } => PipelineError::ToolMissing { tool },
			E::Timeout { what, timeout } => PipelineError::RemoteUnready { what, timeout },
			other => PipelineError::Cluster(other),
		}
	}
}

impl From<tether_release::ReleaseError> for PipelineError {
	fn from(err: tether_release::ReleaseError) -> Self {
		use tether_release::ReleaseError as E;
		match err {
			E::ToolMissing { tool } => PipelineError::ToolMissing { tool },
			other => PipelineError::Release(other),
		}
	}
}

impl From<tether_broker::BrokerError> for PipelineError {
	fn from(err: tether_broker::BrokerError) -> Self {
		use tether_broker::BrokerError as E;
		match err {
			E::ToolMissing { tool } => PipelineError::ToolMissing { tool },
			E::AuthenticationFailed {
				account,
				login,
				message,
			} => PipelineError::Authentication {
				message: format!("{login}@{account}: {message}"),
			},
			E::PolicyRejected { message } => PipelineError::PolicyConflict { message },
			E::EmptyCredential { account } => PipelineError::CredentialBootstrap { account },
			E::Cluster(inner) => inner.into(),
			other => PipelineError::Broker(other),
		}
	}
}

/// A pipeline failure annotated with the stage it occurred in.
#[derive(Error, Debug)]
#[error("stage {stage} failed: {error}")]
pub struct StageFailure {
	pub stage: Stage,
	#[source]
	pub error: PipelineError,
}
