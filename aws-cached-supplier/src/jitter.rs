/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::{Duration, SystemTime};

/// Upper bound on how far past its prefetch time a background refresh may be delayed.
const MAX_PREFETCH_JITTER: Duration = Duration::from_secs(5 * 60);

/// Backoff bounds for refresh failures while a stale value is cached.
const STALE_FAILURE_BACKOFF_BASE: Duration = Duration::from_millis(100);
const STALE_FAILURE_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Extension applied to a freshly loaded value that was already stale.
pub(crate) const STALE_SUCCESS_MIN_EXTENSION: Duration = Duration::from_secs(60);
pub(crate) const STALE_SUCCESS_MAX_EXTENSION: Duration = Duration::from_secs(10 * 60);

/// Returns a uniformly random duration in `[min, max]`.
pub(crate) fn between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    min + Duration::from_millis(fastrand::u64(0..=span))
}

/// `now` pushed forward by a random duration in `[min, max]`.
pub(crate) fn jitter_time(now: SystemTime, min: Duration, max: Duration) -> SystemTime {
    now + between(min, max)
}

/// Maximum backoff after `failures` consecutive failed refreshes.
///
/// Doubles from 100ms and is capped at 10s.
pub(crate) fn max_failure_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    STALE_FAILURE_BACKOFF_BASE
        .saturating_mul(1 << shift)
        .min(STALE_FAILURE_BACKOFF_CAP)
}

/// Random delay added to a background wake so that many processes sharing a credential source
/// don't all refresh at the same instant. At most half the prefetch-to-stale window, capped.
pub(crate) fn prefetch_jitter(prefetch: SystemTime, stale: Option<SystemTime>) -> Duration {
    let window = match stale.and_then(|stale| stale.duration_since(prefetch).ok()) {
        Some(window) => window / 2,
        None => return Duration::ZERO,
    };
    between(Duration::ZERO, window.min(MAX_PREFETCH_JITTER))
}
