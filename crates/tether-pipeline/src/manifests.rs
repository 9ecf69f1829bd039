// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Kubernetes manifests rendered from the pipeline configuration.
//!
//! The identity manifest carries the service account and the RBAC the
//! delivery job needs; it is applied before any token is minted. The
//! workload and job manifests are applied by the delivery stage.

use crate::config::PipelineConfig;

/// Name of the in-cluster secret the delivery job writes into.
pub fn delivered_secret_name(config: &PipelineConfig) -> String {
	format!("{}-delivered", config.workload_app)
}

/// Service account, delivered-secret placeholder, and the RBAC that lets the
/// delivery job update it. Must exist before a bound token is minted and
/// before the job runs.
pub fn identity_manifest(config: &PipelineConfig) -> String {
	let secret_name = delivered_secret_name(config);
	let conjur_map = config
		.secrets
		.iter()
		.map(|secret| format!("    {}: {}", secret.destination, secret.variable))
		.collect::<Vec<_>>()
		.join("\n");
	format!(
		r#"apiVersion: v1
kind: ServiceAccount
metadata:
  name: {sa}
  namespace: {ns}
---
apiVersion: v1
kind: Secret
metadata:
  name: {secret_name}
  namespace: {ns}
type: Opaque
stringData:
  conjur-map: |
{conjur_map}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: {secret_name}-writer
  namespace: {ns}
rules:
- apiGroups: [""]
  resources: ["secrets"]
  resourceNames: ["{secret_name}"]
  verbs: ["get", "update"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: {secret_name}-writer
  namespace: {ns}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: Role
  name: {secret_name}-writer
subjects:
- kind: ServiceAccount
  name: {sa}
  namespace: {ns}
"#,
		sa = config.workload_service_account,
		ns = config.workload_namespace,
		secret_name = secret_name,
		conjur_map = conjur_map,
	)
}

/// Workload deployment mounting the delivered secret at the delivery
/// directory.
pub fn workload_manifest(config: &PipelineConfig) -> String {
	format!(
		r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {app}
  namespace: {ns}
  labels:
    app: {app}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {app}
  template:
    metadata:
      labels:
        app: {app}
    spec:
      serviceAccountName: {sa}
      containers:
      - name: app
        image: alpine:3.20
        command: ["sleep", "infinity"]
        volumeMounts:
        - name: delivered
          mountPath: {delivery_dir}
          readOnly: true
      volumes:
      - name: delivered
        secret:
          secretName: {secret_name}
"#,
		app = config.workload_app,
		ns = config.workload_namespace,
		sa = config.workload_service_account,
		delivery_dir = config.delivery_dir,
		secret_name = delivered_secret_name(config),
	)
}

/// One-shot delivery job that authenticates as the workload host and writes
/// the mapped variables into the delivered secret.
pub fn delivery_job_manifest(config: &PipelineConfig) -> String {
	format!(
		r#"apiVersion: batch/v1
kind: Job
metadata:
  name: {job}
  namespace: {ns}
spec:
  backoffLimit: 2
  template:
    spec:
      serviceAccountName: {sa}
      restartPolicy: Never
      containers:
      - name: delivery
        image: cyberark/secrets-provider-for-k8s:1.7.0
        env:
        - name: CONJUR_APPLIANCE_URL
          value: "https://{broker_host}"
        - name: CONJUR_ACCOUNT
          value: "{account}"
        - name: CONJUR_AUTHN_URL
          value: "https://{broker_host}/authn-k8s/{authenticator_id}"
        - name: CONJUR_AUTHN_LOGIN
          value: "host/{identity}"
        - name: SECRETS_DESTINATION
          value: k8s_secrets
        - name: K8S_SECRETS
          value: "{secret_name}"
        - name: MY_POD_NAMESPACE
          valueFrom:
            fieldRef:
              fieldPath: metadata.namespace
"#,
		job = config.delivery_job,
		ns = config.workload_namespace,
		sa = config.workload_service_account,
		broker_host = config.broker_host(),
		account = config.account,
		authenticator_id = config.authenticator_id,
		identity = config.workload_identity(),
		secret_name = delivered_secret_name(config),
	)
}
