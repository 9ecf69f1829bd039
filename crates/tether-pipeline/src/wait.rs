// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bounded backoff polling on explicit readiness predicates.
//!
//! Remote mutations propagate through eventually-consistent control planes.
//! Instead of fixed settle sleeps, every wait in the pipeline polls a
//! predicate with jittered exponential backoff and fails with a
//! timeout-specific error when the bound expires; nothing ever hangs.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

const INITIAL_INTERVAL: Duration = Duration::from_millis(250);
const MAX_INTERVAL: Duration = Duration::from_secs(5);

/// Poll `predicate` until it returns true or `timeout` expires.
///
/// `what` names the condition in the timeout diagnostic. Failures inside the
/// predicate propagate immediately; only a never-true predicate times out.
pub async fn poll_until<F, Fut>(what: &str, timeout: Duration, mut predicate: F) -> PipelineResult<()>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = PipelineResult<bool>>,
{
	let deadline = tokio::time::Instant::now() + timeout;
	let mut interval = INITIAL_INTERVAL;
	let mut attempts = 0u32;

	loop {
		attempts += 1;
		if predicate().await? {
			debug!(what = %what, attempts, "condition became ready");
			return Ok(());
		}

		if tokio::time::Instant::now() + interval > deadline {
			return Err(PipelineError::RemoteUnready {
				what: what.to_string(),
				timeout,
			});
		}

		tokio::time::sleep(jittered(interval)).await;
		interval = (interval * 2).min(MAX_INTERVAL);
	}
}

/// Apply +/-20% jitter so concurrent pollers against one control plane do
/// not synchronize.
fn jittered(interval: Duration) -> Duration {
	let factor = 0.8 + fastrand::f64() * 0.4;
	interval.mul_f64(factor)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	/// Test: an eventually-true predicate completes without error.
	#[tokio::test(start_paused = true)]
	async fn test_eventually_ready() {
		let calls = AtomicU32::new(0);
		poll_until("thing", Duration::from_secs(60), || async {
			Ok(calls.fetch_add(1, Ordering::SeqCst) >= 3)
		})
		.await
		.unwrap();
		assert!(calls.load(Ordering::SeqCst) >= 4);
	}

	/// Test: a never-true predicate produces RemoteUnready, never a hang.
	///
	/// Why this test is important: this is the readiness timeout enforcement
	/// property. The paused clock proves expiry is driven by the deadline
	/// arithmetic, not by wall-clock luck, and that the error names the
	/// condition and the configured bound.
	#[tokio::test(start_paused = true)]
	async fn test_never_ready_times_out() {
		let err = poll_until("broker pods", Duration::from_secs(120), || async { Ok(false) })
			.await
			.unwrap_err();
		match err {
			PipelineError::RemoteUnready { what, timeout } => {
				assert_eq!(what, "broker pods");
				assert_eq!(timeout, Duration::from_secs(120));
			}
			other => panic!("expected RemoteUnready, got {other:?}"),
		}
	}

	/// Test: predicate errors propagate immediately instead of retrying.
	#[tokio::test(start_paused = true)]
	async fn test_predicate_error_propagates() {
		let calls = AtomicU32::new(0);
		let err = poll_until("thing", Duration::from_secs(60), || {
			calls.fetch_add(1, Ordering::SeqCst);
			async {
				Err(PipelineError::Authentication {
					message: "boom".to_string(),
				})
			}
		})
		.await
		.unwrap_err();
		assert!(matches!(err, PipelineError::Authentication { .. }));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	/// Test: jitter stays within the 80-120% band.
	#[test]
	fn test_jitter_band() {
		let base = Duration::from_millis(1000);
		for _ in 0..100 {
			let j = jittered(base);
			assert!(j >= Duration::from_millis(800), "{j:?} below band");
			assert!(j <= Duration::from_millis(1200), "{j:?} above band");
		}
	}
}
