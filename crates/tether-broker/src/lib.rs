// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secrets-broker clients and policy documents for Tether.
//!
//! Two surfaces with distinct trust levels:
//!
//! - [`BrokerAdmin`]: the administrative surface, reached by exec inside the
//!   broker's own workload; bootstraps accounts and keys.
//! - [`BrokerClient`]: the authenticated surface, reached over the network
//!   through a certified hostname; loads policy and writes variables.

pub mod admin;
pub mod client;
pub mod error;
pub mod mock;
pub mod policy;

pub use admin::{generate_data_key, BrokerAdmin, CreateAccountOutcome, ExecBrokerAdmin};
pub use client::{ensure_certified_host, BrokerClient, CommandBrokerClient, PolicyAck, Session};
pub use error::{BrokerError, BrokerResult};
pub use mock::{MockBrokerAdmin, MockBrokerClient};
pub use policy::{PolicyDocument, Ref, Statement};
