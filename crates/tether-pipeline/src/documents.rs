// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Policy documents derived from the pipeline configuration.
//!
//! Each builder is a pure function of the config, so repeated runs submit
//! byte-identical YAML and the broker converges without creating duplicate
//! roles or grants.

use tether_broker::policy::{PolicyDocument, Ref, Statement};

use crate::config::PipelineConfig;

/// Webservice declaration for the cluster authenticator, plus the variables
/// the identity binder fills with cluster connection facts.
pub fn authenticator_policy(config: &PipelineConfig) -> PolicyDocument {
	PolicyDocument::new().with(Statement::Policy {
		id: config.authenticator_policy_id(),
		body: vec![
			Statement::Webservice,
			Statement::Group {
				id: "admins".to_string(),
			},
			Statement::Permit {
				role: Ref::group("admins"),
				privileges: vec!["read".to_string(), "authenticate".to_string()],
				resource: Ref::webservice(),
			},
			Statement::Policy {
				id: "kubernetes".to_string(),
				body: vec![
					Statement::Variable {
						id: "api-url".to_string(),
					},
					Statement::Variable {
						id: "ca-cert".to_string(),
					},
					Statement::Variable {
						id: "service-account-token".to_string(),
					},
				],
			},
		],
	})
}

/// Variables for every configured secret, the workload host identity, and
/// the read/execute permits connecting them.
pub fn application_policy(config: &PipelineConfig) -> PolicyDocument {
	let identity = config.workload_identity();
	let mut doc = PolicyDocument::new();
	for secret in &config.secrets {
		doc = doc.with(Statement::Variable {
			id: secret.variable.clone(),
		});
	}
	doc = doc.with(Statement::Host {
		id: identity.clone(),
		annotations: vec![
			(
				"authn-k8s/namespace".to_string(),
				config.workload_namespace.clone(),
			),
			(
				"authn-k8s/service-account".to_string(),
				config.workload_service_account.clone(),
			),
			(
				"authn-k8s/authentication-container-name".to_string(),
				"delivery".to_string(),
			),
		],
	});
	for secret in &config.secrets {
		doc = doc.with(Statement::Permit {
			role: Ref::host(identity.clone()),
			privileges: vec!["read".to_string(), "execute".to_string()],
			resource: Ref::variable(secret.variable.clone()),
		});
	}
	doc
}

/// Grant admitting the workload host into the authenticator's admin group.
pub fn workload_grant(config: &PipelineConfig) -> PolicyDocument {
	PolicyDocument::new().with(Statement::Grant {
		role: Ref::group(format!("{}/admins", config.authenticator_policy_id())),
		member: Ref::host(config.workload_identity()),
	})
}
