/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Clocks used to judge staleness and schedule refreshes.
//!
//! A cache asks its [`TimeSource`] for the time whenever it compares a value's stale time or
//! prefetch time against "now". Tests swap in a [`StaticTimeSource`] or the manual clock from
//! `test_util` so expiry can be driven without waiting.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::SystemTime;

/// Something that can tell the current wall-clock time
pub trait TimeSource: Debug + Send + Sync {
    /// The current time
    fn now(&self) -> SystemTime;
}

/// The system clock
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    /// The system clock
    pub fn new() -> Self {
        SystemTimeSource
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that is stopped at a fixed instant
#[derive(Clone, Copy, Debug)]
pub struct StaticTimeSource(SystemTime);

impl StaticTimeSource {
    /// A clock that always reads `time`
    pub fn new(time: SystemTime) -> Self {
        Self(time)
    }
}

impl TimeSource for StaticTimeSource {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Type-erased [`TimeSource`] shared between a cache and its background task
///
/// Defaults to [`SystemTimeSource`].
#[derive(Clone, Debug)]
pub struct SharedTimeSource(Arc<dyn TimeSource>);

impl Default for SharedTimeSource {
    fn default() -> Self {
        Self::new(SystemTimeSource)
    }
}

impl SharedTimeSource {
    /// Share `source`
    pub fn new(source: impl TimeSource + 'static) -> Self {
        Self(Arc::new(source))
    }

    /// The current time according to the wrapped source
    pub fn now(&self) -> SystemTime {
        self.0.now()
    }
}

impl TimeSource for SharedTimeSource {
    fn now(&self) -> SystemTime {
        self.0.now()
    }
}
