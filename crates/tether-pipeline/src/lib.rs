// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent trust-bootstrapping pipeline between an ephemeral cluster and
//! a centralized secrets broker.
//!
//! [`Pipeline`] runs eight reconciling stages in order; [`PipelineConfig`]
//! is the single source of configured state and [`PipelineReport`] the
//! outcome. Re-running the pipeline is always safe and is the designated
//! recovery path for any failure.

pub mod config;
pub mod context;
pub mod documents;
pub mod error;
pub mod manifests;
pub mod pipeline;
pub mod tunnel;
pub mod wait;

pub use config::{PipelineConfig, SecretSpec, TokenAudience};
pub use context::PipelineContext;
pub use error::{PipelineError, PipelineResult, Stage, StageFailure};
pub use pipeline::{Pipeline, PipelineReport};
pub use tunnel::{KubectlTunnelFactory, MockTunnelFactory, TunnelFactory};
