// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{PipelineError, PipelineResult};

/// Audience the bound-identity token is scoped to.
///
/// Observed authenticator deployments disagree on whether the audience must
/// match the full authenticator query URL (including the authenticator-id
/// path segment) or just the base host, so this is an explicit, validated
/// parameter instead of a hard-coded convention. A mismatch fails token
/// validation in a way distinct from expiry or corruption.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TokenAudience {
	/// Full authenticator query URL, e.g.
	/// `https://broker.example.com/authn-k8s/dev-cluster`.
	#[default]
	AuthenticatorUrl,
	/// Base broker URL without the authenticator path.
	BrokerHost,
	/// Caller-supplied audience string.
	Custom(String),
	/// Cluster-default audience (no `--audience` flag).
	ClusterDefault,
}

/// One secret to provision and deliver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretSpec {
	/// Broker variable path, e.g. `app/db/creds/url`.
	pub variable: String,
	/// Destination key the delivery mechanism renders the value under.
	pub destination: String,
	/// Value to provision; the verifier expects to observe exactly this.
	pub value: String,
}

/// Desired end state of one pipeline run.
///
/// All pipeline state flows through this object and the run context derived
/// from it; the credential and env files are exports, never read back as the
/// source of truth mid-run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
	/// Environment (cluster) name.
	pub cluster_name: String,
	/// Node image for fresh cluster provisioning.
	pub node_image: String,

	/// Namespace the broker release lives in.
	pub broker_namespace: String,
	/// Release name in the release registry.
	pub release: String,
	/// Chart reference for install/upgrade.
	pub chart: String,
	/// Label selector matching the broker's pods.
	pub broker_selector: String,
	/// Broker organization account.
	pub account: String,
	/// Authenticator id, e.g. `dev-cluster`.
	pub authenticator_id: String,

	/// Local port the session forward binds.
	pub local_port: u16,
	/// Broker service port behind the forward.
	pub remote_port: u16,

	/// Bound for every remote readiness wait.
	pub readiness_timeout: Duration,

	/// Namespace the demonstration workload runs in.
	pub workload_namespace: String,
	/// Service account the workload identity is bound to.
	pub workload_service_account: String,
	/// Workload deployment name.
	pub workload_app: String,
	/// Delivery job name; the job is recreated on every run.
	pub delivery_job: String,
	/// Directory inside the workload where secrets are rendered.
	pub delivery_dir: String,

	/// Secrets to provision and verify.
	pub secrets: Vec<SecretSpec>,

	/// Audience scoping for the bound-identity token.
	pub token_audience: TokenAudience,

	/// Where to export the credential and env files; None disables export.
	pub export_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			cluster_name: "demo".to_string(),
			node_image: "kindest/node:v1.32.0".to_string(),
			broker_namespace: "tether-secrets".to_string(),
			release: "tether-broker".to_string(),
			chart: "cyberark/conjur-oss".to_string(),
			broker_selector: "app=conjur-oss".to_string(),
			account: "demo".to_string(),
			authenticator_id: "dev-cluster".to_string(),
			local_port: 8443,
			remote_port: 443,
			readiness_timeout: Duration::from_secs(120),
			workload_namespace: "tether-apps".to_string(),
			workload_service_account: "app-sa".to_string(),
			workload_app: "demo-app".to_string(),
			delivery_job: "tether-delivery".to_string(),
			delivery_dir: "/run/tether/secrets".to_string(),
			secrets: vec![SecretSpec {
				variable: "app/db/creds/url".to_string(),
				destination: "db-url".to_string(),
				value: "postgres://localhost".to_string(),
			}],
			token_audience: TokenAudience::default(),
			export_dir: None,
		}
	}
}

impl PipelineConfig {
	/// Context identifier downstream cluster calls are pinned to.
	pub fn context(&self) -> String {
		format!("kind-{}", self.cluster_name)
	}

	/// Hostname the broker certificate is issued for.
	///
	/// Resolving this name to the forwarded local port is the operator's
	/// responsibility (hosts-file entry); the pipeline never substitutes an
	/// IP because the certificate SAN would not match it.
	pub fn broker_host(&self) -> String {
		format!("{}.{}.svc.cluster.local", self.release, self.broker_namespace)
	}

	/// Endpoint URL the session is established against.
	pub fn broker_endpoint(&self) -> PipelineResult<Url> {
		let raw = format!("https://{}:{}", self.broker_host(), self.local_port);
		Url::parse(&raw).map_err(|e| PipelineError::InvalidConfig {
			message: format!("broker endpoint {raw}: {e}"),
		})
	}

	/// URL workload logins are sent to for this authenticator.
	pub fn authenticator_url(&self) -> String {
		format!(
			"https://{}/authn-k8s/{}",
			self.broker_host(),
			self.authenticator_id
		)
	}

	/// Exec target for the broker's administrative surface.
	pub fn broker_exec_target(&self) -> String {
		format!("deploy/{}", self.release)
	}

	/// Policy namespace the authenticator's connection variables live under.
	pub fn authenticator_policy_id(&self) -> String {
		format!("conjur/authn-k8s/{}", self.authenticator_id)
	}

	/// Workload identity name: `<namespace>:<service-account>`.
	pub fn workload_identity(&self) -> String {
		format!(
			"{}:{}",
			self.workload_namespace, self.workload_service_account
		)
	}

	/// Resolve the configured audience to a concrete token parameter.
	pub fn resolved_audience(&self) -> Option<String> {
		match &self.token_audience {
			TokenAudience::AuthenticatorUrl => Some(self.authenticator_url()),
			TokenAudience::BrokerHost => Some(format!("https://{}", self.broker_host())),
			TokenAudience::Custom(audience) => Some(audience.clone()),
			TokenAudience::ClusterDefault => None,
		}
	}

	/// Validate cross-field invariants before the pipeline starts.
	pub fn validate(&self) -> PipelineResult<()> {
		if self.secrets.is_empty() {
			return Err(PipelineError::InvalidConfig {
				message: "at least one secret must be configured".to_string(),
			});
		}
		if let Some(audience) = self.resolved_audience() {
			if !audience.starts_with("https://") {
				return Err(PipelineError::InvalidConfig {
					message: format!("token audience must be an https URL, got {audience}"),
				});
			}
		}
		self.broker_endpoint().map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Test: defaults describe the demo end-to-end scenario.
	///
	/// Why this test is important: the documented scenario (environment
	/// `demo`, authenticator `dev-cluster`, `app/db/creds/url` =
	/// `postgres://localhost`) is the contract the verification suite runs
	/// against; a drifted default would silently test something else.
	#[test]
	fn test_defaults_match_demo_scenario() {
		let config = PipelineConfig::default();
		assert_eq!(config.cluster_name, "demo");
		assert_eq!(config.authenticator_id, "dev-cluster");
		assert_eq!(config.secrets[0].variable, "app/db/creds/url");
		assert_eq!(config.secrets[0].value, "postgres://localhost");
		config.validate().unwrap();
	}

	/// Test: derived names compose from their parts.
	#[test]
	fn test_derived_names() {
		let config = PipelineConfig::default();
		assert_eq!(config.context(), "kind-demo");
		assert_eq!(
			config.broker_host(),
			"tether-broker.tether-secrets.svc.cluster.local"
		);
		assert_eq!(
			config.authenticator_url(),
			"https://tether-broker.tether-secrets.svc.cluster.local/authn-k8s/dev-cluster"
		);
		assert_eq!(config.authenticator_policy_id(), "conjur/authn-k8s/dev-cluster");
		assert_eq!(config.workload_identity(), "tether-apps:app-sa");
		assert_eq!(config.broker_exec_target(), "deploy/tether-broker");
	}

	/// Test: audience resolution covers all variants.
	///
	/// Why this test is important: audience mismatch is a distinct failure
	/// mode from token expiry; the explicit parameter exists so deployments
	/// can pick the convention their authenticator validates.
	#[test]
	fn test_audience_resolution() {
		let mut config = PipelineConfig::default();
		assert_eq!(
			config.resolved_audience().unwrap(),
			config.authenticator_url()
		);

		config.token_audience = TokenAudience::BrokerHost;
		assert_eq!(
			config.resolved_audience().unwrap(),
			"https://tether-broker.tether-secrets.svc.cluster.local"
		);

		config.token_audience = TokenAudience::Custom("https://aud.example.com".to_string());
		assert_eq!(config.resolved_audience().unwrap(), "https://aud.example.com");

		config.token_audience = TokenAudience::ClusterDefault;
		assert!(config.resolved_audience().is_none());
	}

	/// Test: invalid configurations are rejected up front.
	#[test]
	fn test_validation_rejects_bad_config() {
		let mut config = PipelineConfig::default();
		config.secrets.clear();
		assert!(matches!(
			config.validate(),
			Err(PipelineError::InvalidConfig { .. })
		));

		let mut config = PipelineConfig::default();
		config.token_audience = TokenAudience::Custom("not-a-url".to_string());
		assert!(matches!(
			config.validate(),
			Err(PipelineError::InvalidConfig { .. })
		));
	}
}
