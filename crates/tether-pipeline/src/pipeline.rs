// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The provisioning pipeline.
//!
//! Eight stages run in order, each reconciling observed state toward the
//! configured state: environment, broker install, credential bootstrap,
//! session, policy load, identity bind, secret provision, delivery
//! verification. Every stage is safe to re-run; a second run against a
//! healthy environment changes nothing and still verifies delivery.

use tether_broker::{
	ensure_certified_host, BrokerAdmin, BrokerClient, CreateAccountOutcome, PolicyAck, Session,
};
use tether_cluster::{ClusterClient, ClusterFacts, ClusterHandle};
use tether_common_secret::SecretString;
use tether_release::ReleaseClient;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::documents;
use crate::error::{PipelineError, PipelineResult, Stage, StageFailure};
use crate::manifests;
use crate::tunnel::TunnelFactory;
use crate::wait;

/// Outcome of a completed run.
#[derive(Debug)]
pub struct PipelineReport {
	/// The environment the run converged on.
	pub cluster: ClusterHandle,
	/// Whether the broker release was upgraded in place rather than
	/// freshly installed.
	pub broker_upgraded: bool,
	/// Acks for every policy document submitted, in load order.
	pub policy_loads: Vec<PolicyAck>,
	/// Verified deliveries as (variable path, observed value).
	pub verified: Vec<(String, String)>,
}

fn at(stage: Stage) -> impl FnOnce(PipelineError) -> StageFailure {
	move |error| StageFailure { stage, error }
}

/// Stage orchestrator, generic over its collaborators.
pub struct Pipeline<C, R, A, B, T> {
	config: PipelineConfig,
	cluster: C,
	release: R,
	admin: A,
	broker: B,
	tunnel: T,
}

impl<C, R, A, B, T> Pipeline<C, R, A, B, T>
where
	C: ClusterClient,
	R: ReleaseClient,
	A: BrokerAdmin,
	B: BrokerClient,
	T: TunnelFactory,
{
	pub fn new(config: PipelineConfig, cluster: C, release: R, admin: A, broker: B, tunnel: T) -> Self {
		Self {
			config,
			cluster,
			release,
			admin,
			broker,
			tunnel,
		}
	}

	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	/// Run every stage in order with a fresh context.
	///
	/// The session tunnel stays open for the remainder of the run and is
	/// torn down when this function returns, on success or failure.
	pub async fn run(&self) -> Result<PipelineReport, StageFailure> {
		let mut ctx = PipelineContext::new();
		self.run_with_context(&mut ctx).await
	}

	/// Run every stage in order, carrying state in `ctx`.
	///
	/// A caller holding the context across invocations keeps the session: a
	/// run whose endpoint identity the existing session already covers skips
	/// re-establishment, while a changed hostname or account establishes a
	/// new session through a new tunnel.
	pub async fn run_with_context(&self, ctx: &mut PipelineContext) -> Result<PipelineReport, StageFailure> {
		self.config.validate().map_err(at(Stage::Environment))?;

		info!(stage = %Stage::Environment, cluster = %self.config.cluster_name, "reconciling environment");
		let cluster = self.ensure_cluster().await.map_err(at(Stage::Environment))?;

		info!(stage = %Stage::BrokerInstall, release = %self.config.release, "reconciling broker release");
		let broker_upgraded = self.ensure_broker().await.map_err(at(Stage::BrokerInstall))?;

		info!(stage = %Stage::CredentialBootstrap, account = %self.config.account, "bootstrapping admin credential");
		let admin_key = self
			.bootstrap_admin_key()
			.await
			.map_err(at(Stage::CredentialBootstrap))?;
		ctx.admin_key = Some(admin_key);
		if let Some(dir) = &self.config.export_dir {
			ctx.export_credential(dir).map_err(at(Stage::CredentialBootstrap))?;
		}

		info!(stage = %Stage::Session, host = %self.config.broker_host(), "establishing session");
		let _tunnel = self.establish_session(ctx).await.map_err(at(Stage::Session))?;

		info!(stage = %Stage::PolicyLoad, "loading policy documents");
		let mut policy_loads = self.load_policies().await.map_err(at(Stage::PolicyLoad))?;

		info!(stage = %Stage::IdentityBind, identity = %self.config.workload_identity(), "binding workload identity");
		let (facts, grant_ack) = self.bind_identity().await.map_err(at(Stage::IdentityBind))?;
		ctx.facts = Some(facts);
		policy_loads.push(grant_ack);

		info!(stage = %Stage::SecretProvision, count = self.config.secrets.len(), "provisioning secrets");
		self.provision_secrets().await.map_err(at(Stage::SecretProvision))?;

		info!(stage = %Stage::DeliveryVerify, "verifying delivery end to end");
		let verified = self.verify_delivery().await.map_err(at(Stage::DeliveryVerify))?;

		if let Some(dir) = &self.config.export_dir {
			ctx.export_env(dir, &self.config).map_err(at(Stage::DeliveryVerify))?;
		}

		Ok(PipelineReport {
			cluster,
			broker_upgraded,
			policy_loads,
			verified,
		})
	}

	/// Reuse the named cluster if it exists, create it otherwise.
	async fn ensure_cluster(&self) -> PipelineResult<ClusterHandle> {
		let name = &self.config.cluster_name;
		let existing = self.cluster.clusters().await?;
		if existing.iter().any(|cluster| cluster == name) {
			debug!(%name, "cluster already exists; reusing");
		} else {
			self.cluster.create_cluster(name, &self.config.node_image).await?;
			info!(%name, image = %self.config.node_image, "cluster created");
		}
		Ok(ClusterHandle {
			name: name.clone(),
			node_image: self.config.node_image.clone(),
			context: self.config.context(),
		})
	}

	/// Install the broker release or upgrade it in place, then wait for the
	/// registry to report it deployed and its pods to become ready.
	///
	/// Returns true when the release already existed and was upgraded. The
	/// data key is generated only on fresh install; an upgrade reuses prior
	/// values so the key that encrypted existing secrets is never replaced.
	async fn ensure_broker(&self) -> PipelineResult<bool> {
		let namespace = &self.config.broker_namespace;
		let release = &self.config.release;

		let namespaces = self.cluster.namespaces().await?;
		if !namespaces.iter().any(|ns| ns == namespace) {
			self.cluster.create_namespace(namespace).await?;
		}

		// The comma is escaped for the release manager's value parser.
		let authenticators = (
			"authenticators".to_string(),
			format!("authn\\,authn-k8s/{}", self.config.authenticator_id),
		);

		let installed = self.release.list(namespace).await?;
		let upgraded = if installed.iter().any(|status| &status.name == release) {
			debug!(%release, "release exists; upgrading with reused values");
			self.release
				.upgrade(release, &self.config.chart, namespace, true, &[authenticators])
				.await?;
			true
		} else {
			let data_key = tether_broker::generate_data_key();
			self.release
				.install(
					release,
					&self.config.chart,
					namespace,
					&[
						("dataKey".to_string(), data_key.expose().to_string()),
						("account.create".to_string(), "true".to_string()),
						authenticators,
					],
				)
				.await?;
			false
		};

		let timeout = self.config.readiness_timeout;
		let what = format!("release {release} deployed");
		wait::poll_until(&what, timeout, || {
			let registry = &self.release;
			async move {
				let releases = registry.list(namespace).await?;
				Ok(releases
					.iter()
					.any(|status| &status.name == release && status.is_deployed()))
			}
		})
		.await?;
		self.cluster
			.wait_ready(namespace, &self.config.broker_selector, timeout)
			.await?;
		Ok(upgraded)
	}

	/// Create-then-fetch credential bootstrap.
	///
	/// Creation of an already-existing account is not a failure; the key is
	/// then recovered through the administrative retrieval path. Only when
	/// neither path yields a non-empty key does the run abort, before
	/// anything downstream can observe a half-credentialed broker.
	async fn bootstrap_admin_key(&self) -> PipelineResult<SecretString> {
		let account = &self.config.account;
		let key = match self.admin.create_account(account).await? {
			CreateAccountOutcome::Created(key) => {
				info!(%account, "account created");
				key
			}
			CreateAccountOutcome::AlreadyExists => {
				debug!(%account, "account already exists; retrieving key");
				self.admin.retrieve_admin_key(account).await?
			}
		};
		if key.is_empty() {
			return Err(PipelineError::CredentialBootstrap {
				account: account.clone(),
			});
		}
		Ok(key)
	}

	/// Open a tunnel to the broker service and authenticate through the
	/// certified hostname.
	///
	/// Returns the tunnel handle so the caller can keep the session alive; a
	/// session that already covers the endpoint identity is reused without a
	/// new tunnel.
	async fn establish_session(&self, ctx: &mut PipelineContext) -> PipelineResult<Option<T::Handle>> {
		let host = self.config.broker_host();
		let account = &self.config.account;
		if let Some(session) = &ctx.session {
			if session.covers(&host, account) {
				debug!(%host, "session already covers endpoint; reusing");
				return Ok(None);
			}
		}
		ensure_certified_host(&host)?;

		let tunnel = self
			.tunnel
			.open(
				&self.config.broker_namespace,
				&format!("svc/{}", self.config.release),
				self.config.local_port,
				self.config.remote_port,
			)
			.await?;

		let key = ctx.admin_key.as_ref().ok_or_else(|| PipelineError::Authentication {
			message: "no bootstrapped admin credential in context".to_string(),
		})?;
		let endpoint = self.config.broker_endpoint()?;
		self.broker.init(&endpoint, account).await?;
		self.broker.login(account, "admin", key).await?;
		ctx.session = Some(Session::new(host, account.clone()));
		Ok(Some(tunnel))
	}

	/// Submit the authenticator and application documents under the root
	/// base role. Reloading identical documents converges without creating
	/// duplicate roles.
	async fn load_policies(&self) -> PipelineResult<Vec<PolicyAck>> {
		let authenticator = documents::authenticator_policy(&self.config);
		let application = documents::application_policy(&self.config);
		let first = self.broker.load_policy("root", &authenticator).await?;
		let second = self.broker.load_policy("root", &application).await?;
		debug!(
			created_roles = first.created_roles + second.created_roles,
			version = second.version,
			"policy documents loaded"
		);
		Ok(vec![first, second])
	}

	/// Teach the authenticator how to validate workload logins.
	///
	/// The identity manifest is applied before any token is minted so the
	/// service account exists; a fresh short-lived bound token is minted on
	/// every run.
	async fn bind_identity(&self) -> PipelineResult<(ClusterFacts, PolicyAck)> {
		let namespace = &self.config.workload_namespace;
		let namespaces = self.cluster.namespaces().await?;
		if !namespaces.iter().any(|ns| ns == namespace) {
			self.cluster.create_namespace(namespace).await?;
		}
		self.cluster
			.apply(namespace, &manifests::identity_manifest(&self.config))
			.await?;

		let audience = self.config.resolved_audience();
		let api_url = self.cluster.api_server_url().await?;
		let ca_cert = self.cluster.ca_certificate(namespace).await?;
		let token = self
			.cluster
			.mint_token(namespace, &self.config.workload_service_account, audience.as_deref())
			.await?;

		let prefix = format!("{}/kubernetes", self.config.authenticator_policy_id());
		self.broker.set_variable(&format!("{prefix}/api-url"), &api_url).await?;
		self.broker.set_variable(&format!("{prefix}/ca-cert"), &ca_cert).await?;
		self
			.broker
			.set_variable(&format!("{prefix}/service-account-token"), token.expose())
			.await?;

		let grant = documents::workload_grant(&self.config);
		let ack = self.broker.load_policy("root", &grant).await?;

		Ok((
			ClusterFacts {
				api_url,
				ca_cert,
				sa_token: token,
			},
			ack,
		))
	}

	/// Write every configured secret value. Last write wins; re-running with
	/// unchanged values is a no-op from the consumer's point of view.
	async fn provision_secrets(&self) -> PipelineResult<()> {
		for secret in &self.config.secrets {
			self.broker.set_variable(&secret.variable, &secret.value).await?;
		}
		Ok(())
	}

	/// Deploy the workload, re-run delivery, and read every secret back
	/// through the workload's own filesystem.
	///
	/// The delivery job is a run-to-completion primitive that cannot be
	/// updated in place, so it is deleted and recreated on every run.
	async fn verify_delivery(&self) -> PipelineResult<Vec<(String, String)>> {
		let namespace = &self.config.workload_namespace;
		self.cluster
			.apply(namespace, &manifests::workload_manifest(&self.config))
			.await?;
		self.cluster.delete(namespace, "job", &self.config.delivery_job).await?;
		self.cluster
			.apply(namespace, &manifests::delivery_job_manifest(&self.config))
			.await?;

		// The read-back races the job unless its completion is sequenced
		// first: the delivered secret starts out holding only the mapping
		// key, and the workload pods are ready long before delivery ran.
		self.cluster
			.wait_job_complete(namespace, &self.config.delivery_job, self.config.readiness_timeout)
			.await?;

		self.cluster
			.wait_ready(
				namespace,
				&format!("app={}", self.config.workload_app),
				self.config.readiness_timeout,
			)
			.await?;

		let target = format!("deploy/{}", self.config.workload_app);
		let mut verified = Vec::with_capacity(self.config.secrets.len());
		for secret in &self.config.secrets {
			let path = format!("{}/{}", self.config.delivery_dir, secret.destination);
			let observed = self.cluster.exec(namespace, &target, &["cat", &path]).await?;
			let observed = observed.trim();
			if observed != secret.value {
				warn!(%path, "delivered value does not match provisioned value");
				return Err(PipelineError::DeliveryMismatch {
					path,
					expected: secret.value.clone(),
					observed: observed.to_string(),
				});
			}
			verified.push((secret.variable.clone(), observed.to_string()));
		}
		Ok(verified)
	}
}
