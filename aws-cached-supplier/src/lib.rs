/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A cache for values that are expensive to load and go stale over time.
//!
//! [`CachedSupplier`] wraps a refresh function returning a [`RefreshResult`]: the value plus the
//! instant it becomes stale and the instant a refresh should begin ahead of that. Concurrent
//! callers share a single in-flight refresh. Refreshing ahead of staleness can be done by the
//! first caller to notice ([`PrefetchStrategy::OneCallerBlocks`]) or by a background task
//! ([`PrefetchStrategy::NonBlocking`]).

#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

mod background;
mod jitter;
mod refresh_result;
pub mod sleep;
mod supplier;
pub mod time;

pub use refresh_result::{Builder as RefreshResultBuilder, RefreshResult};
pub use supplier::{Builder, CachedSupplier, PrefetchStrategy, StaleValueBehavior};

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;
