// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Release manager client for installing the Tether secrets broker.

pub mod client;
pub mod command;
pub mod error;
pub mod mock;

pub use client::{ReleaseClient, ReleaseStatus};
pub use command::CommandReleaseClient;
pub use error::{ReleaseError, ReleaseResult};
pub use mock::MockReleaseClient;
