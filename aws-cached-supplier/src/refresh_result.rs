/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::SystemTime;

/// A value loaded by a refresh function, along with when it should be refreshed.
///
/// - `stale_time`: the value must not be served at or after this instant without a refresh.
///   `None` means the value never goes stale.
/// - `prefetch_time`: a refresh should begin at or after this instant. `None` disables
///   prefetching for this value.
///
/// `prefetch_time` is expected to be no later than `stale_time`.
#[derive(Clone, Debug)]
pub struct RefreshResult<T> {
    value: T,
    stale_time: Option<SystemTime>,
    prefetch_time: Option<SystemTime>,
}

impl<T> RefreshResult<T> {
    /// A value that never goes stale and is never prefetched.
    pub fn new(value: T) -> Self {
        Self {
            value,
            stale_time: None,
            prefetch_time: None,
        }
    }

    /// Returns a builder for a `RefreshResult` wrapping `value`.
    pub fn builder(value: T) -> Builder<T> {
        Builder {
            inner: Self::new(value),
        }
    }

    /// The loaded value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes this result and returns the value
    pub fn into_value(self) -> T {
        self.value
    }

    /// The instant at which the value becomes stale, if any
    pub fn stale_time(&self) -> Option<SystemTime> {
        self.stale_time
    }

    /// The instant at which a refresh should begin, if any
    pub fn prefetch_time(&self) -> Option<SystemTime> {
        self.prefetch_time
    }

    /// Moves the stale time to `stale_time`. A prefetch time, if any, moves with it so that the
    /// extended value is not refreshed before the extension lapses.
    pub(crate) fn extended_until(mut self, stale_time: SystemTime) -> Self {
        self.stale_time = Some(stale_time);
        self.prefetch_time = self.prefetch_time.map(|_| stale_time);
        self
    }

    pub(crate) fn is_stale_at(&self, now: SystemTime) -> bool {
        matches!(self.stale_time, Some(stale) if now >= stale)
    }

    pub(crate) fn should_prefetch_at(&self, now: SystemTime) -> bool {
        matches!(self.prefetch_time, Some(prefetch) if now >= prefetch)
    }
}

/// Builder for [`RefreshResult`]
#[derive(Debug)]
pub struct Builder<T> {
    inner: RefreshResult<T>,
}

impl<T> Builder<T> {
    /// Sets the instant at which the value becomes stale.
    pub fn stale_time(mut self, stale_time: SystemTime) -> Self {
        self.inner.stale_time = Some(stale_time);
        self
    }

    /// Sets the instant at which the value becomes stale. `None` means never.
    pub fn set_stale_time(&mut self, stale_time: Option<SystemTime>) -> &mut Self {
        self.inner.stale_time = stale_time;
        self
    }

    /// Sets the instant at which a refresh should begin.
    pub fn prefetch_time(mut self, prefetch_time: SystemTime) -> Self {
        self.inner.prefetch_time = Some(prefetch_time);
        self
    }

    /// Sets the instant at which a refresh should begin. `None` disables prefetching.
    pub fn set_prefetch_time(&mut self, prefetch_time: Option<SystemTime>) -> &mut Self {
        self.inner.prefetch_time = prefetch_time;
        self
    }

    /// Builds the `RefreshResult`
    pub fn build(self) -> RefreshResult<T> {
        self.inner
    }
}
