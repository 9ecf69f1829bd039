// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory broker surfaces for pipeline tests.
//!
//! [`MockBrokerAdmin`] models exactly-once account creation;
//! [`MockBrokerClient`] models a SAN-checking endpoint, login validation,
//! convergent policy loads, and last-write-wins variables.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_common_secret::SecretString;
use url::Url;

use crate::admin::{BrokerAdmin, CreateAccountOutcome};
use crate::client::{BrokerClient, PolicyAck};
use crate::error::{BrokerError, BrokerResult};
use crate::policy::PolicyDocument;

#[derive(Default)]
struct AdminState {
	accounts: HashSet<String>,
	keys: HashMap<String, String>,
	created: u32,
}

/// A mock administrative surface with exactly-once key issuance.
#[derive(Clone, Default)]
pub struct MockBrokerAdmin {
	state: Arc<Mutex<AdminState>>,
}

impl MockBrokerAdmin {
	pub fn new() -> Self {
		Self::default()
	}

	/// Pre-seed an account whose key is known, as if bootstrapped earlier.
	pub fn with_account(self, account: &str, key: &str) -> Self {
		{
			let mut state = self.state.lock().unwrap();
			state.accounts.insert(account.to_string());
			state.keys.insert(account.to_string(), key.to_string());
		}
		self
	}

	/// Pre-seed an account with no retrievable key, modelling the
	/// both-paths-empty bootstrap failure.
	pub fn with_keyless_account(self, account: &str) -> Self {
		self.state.lock().unwrap().accounts.insert(account.to_string());
		self
	}

	/// Number of accounts ever created (not reused).
	pub fn created_count(&self) -> u32 {
		self.state.lock().unwrap().created
	}
}

#[async_trait]
impl BrokerAdmin for MockBrokerAdmin {
	async fn create_account(&self, account: &str) -> BrokerResult<CreateAccountOutcome> {
		let mut state = self.state.lock().unwrap();
		if state.accounts.contains(account) {
			return Ok(CreateAccountOutcome::AlreadyExists);
		}
		state.accounts.insert(account.to_string());
		state.created += 1;
		let key = format!("minted-key-{}-{}", account, state.created);
		state.keys.insert(account.to_string(), key.clone());
		Ok(CreateAccountOutcome::Created(SecretString::new(key)))
	}

	async fn retrieve_admin_key(&self, account: &str) -> BrokerResult<SecretString> {
		let state = self.state.lock().unwrap();
		state
			.keys
			.get(account)
			.map(|k| SecretString::new(k.clone()))
			.ok_or_else(|| BrokerError::EmptyCredential {
				account: account.to_string(),
			})
	}
}

#[derive(Default)]
struct ClientState {
	san_hosts: HashSet<String>,
	valid_keys: HashMap<String, String>,
	inits: Vec<(String, String)>,
	logins: Vec<(String, String)>,
	policies: Vec<(String, String)>,
	seen_documents: HashSet<String>,
	variables: HashMap<String, String>,
	policy_version: u64,
	reject_next_policy: Option<String>,
}

/// A mock authenticated broker surface.
#[derive(Clone, Default)]
pub struct MockBrokerClient {
	state: Arc<Mutex<ClientState>>,
}

impl MockBrokerClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Restrict init to hostnames present in the broker certificate SAN.
	/// With no SAN configured, any non-IP hostname is accepted.
	pub fn with_san(self, host: &str) -> Self {
		self.state.lock().unwrap().san_hosts.insert(host.to_string());
		self
	}

	/// Register the API key logins must present for `login`. With no keys
	/// registered, any credential is accepted.
	pub fn accept_key(&self, login: &str, key: &str) {
		self
			.state
			.lock()
			.unwrap()
			.valid_keys
			.insert(login.to_string(), key.to_string());
	}

	/// Make the next policy load fail with the given broker message.
	pub fn reject_next_policy(&self, message: &str) {
		self.state.lock().unwrap().reject_next_policy = Some(message.to_string());
	}

	pub fn inits(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().inits.clone()
	}

	pub fn logins(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().logins.clone()
	}

	/// Record of loaded policies: (base role, rendered document).
	pub fn policies(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().policies.clone()
	}

	pub fn variable(&self, path: &str) -> Option<String> {
		self.state.lock().unwrap().variables.get(path).cloned()
	}
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
	async fn init(&self, endpoint: &Url, account: &str) -> BrokerResult<()> {
		let host = endpoint.host_str().unwrap_or_default().to_string();
		crate::client::ensure_certified_host(&host)?;

		let mut state = self.state.lock().unwrap();
		if !state.san_hosts.is_empty() && !state.san_hosts.contains(&host) {
			return Err(BrokerError::EndpointNotCertified { host });
		}
		state.inits.push((host, account.to_string()));
		Ok(())
	}

	async fn login(&self, account: &str, login: &str, key: &SecretString) -> BrokerResult<()> {
		let mut state = self.state.lock().unwrap();
		let accepted = state.valid_keys.is_empty()
			|| state
				.valid_keys
				.get(login)
				.is_some_and(|expected| expected == key.expose());
		match accepted {
			true => {
				state.logins.push((account.to_string(), login.to_string()));
				Ok(())
			}
			false => Err(BrokerError::AuthenticationFailed {
				account: account.to_string(),
				login: login.to_string(),
				message: "invalid API key".to_string(),
			}),
		}
	}

	async fn load_policy(&self, base: &str, document: &PolicyDocument) -> BrokerResult<PolicyAck> {
		let mut state = self.state.lock().unwrap();
		if let Some(message) = state.reject_next_policy.take() {
			return Err(BrokerError::PolicyRejected { message });
		}

		let rendered = document.render();
		let fingerprint = format!("{base}\n{rendered}");
		state.policy_version += 1;
		// Convergence guarantee of the policy engine: an identical document
		// creates nothing new.
		let created_roles = if state.seen_documents.insert(fingerprint) {
			rendered.matches("- !host").count() + rendered.matches("- !group").count()
		} else {
			0
		};
		state.policies.push((base.to_string(), rendered));
		Ok(PolicyAck {
			version: state.policy_version,
			created_roles,
		})
	}

	async fn set_variable(&self, path: &str, value: &str) -> BrokerResult<()> {
		self
			.state
			.lock()
			.unwrap()
			.variables
			.insert(path.to_string(), value.to_string());
		Ok(())
	}
}
