/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! How a cache waits between background refreshes.
//!
//! Caches never call `tokio::time::sleep` directly: the wait goes through [`AsyncSleep`] so tests
//! and non-Tokio hosts can substitute their own timer. [`TokioSleep`] is the default.

use crate::time::TimeSource;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

/// A timer that can produce a future completing after a delay
pub trait AsyncSleep: fmt::Debug + Send + Sync {
    /// A future that completes once `duration` has elapsed
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Boxed future returned by [`AsyncSleep::sleep`]
#[must_use = "a sleep does nothing unless awaited"]
pub struct Sleep {
    inner: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
}

impl Sleep {
    /// Box `future` as a sleep
    pub fn new(future: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep").finish_non_exhaustive()
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.as_mut().poll(cx)
    }
}

/// A cloneable, type-erased [`AsyncSleep`]
#[derive(Clone, Debug)]
pub struct SharedAsyncSleep(Arc<dyn AsyncSleep>);

impl SharedAsyncSleep {
    /// Wrap `sleep` so it can be shared between caches
    pub fn new(sleep: impl AsyncSleep + 'static) -> Self {
        Self(Arc::new(sleep))
    }

    /// Sleep until `deadline` as measured by `time_source`
    ///
    /// Completes immediately when the deadline has already passed.
    pub fn sleep_until(&self, time_source: &dyn TimeSource, deadline: SystemTime) -> Sleep {
        let delay = deadline
            .duration_since(time_source.now())
            .unwrap_or(Duration::ZERO);
        self.0.sleep(delay)
    }
}

/// Uses [`TokioSleep`]
impl Default for SharedAsyncSleep {
    fn default() -> Self {
        Self::new(TokioSleep)
    }
}

impl AsyncSleep for SharedAsyncSleep {
    fn sleep(&self, duration: Duration) -> Sleep {
        self.0.sleep(duration)
    }
}

/// [`AsyncSleep`] backed by the Tokio timer. Requires a Tokio runtime with time enabled.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct TokioSleep;

impl TokioSleep {
    /// The Tokio timer
    pub fn new() -> Self {
        TokioSleep
    }
}

impl AsyncSleep for TokioSleep {
    fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::StaticTimeSource;
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    #[derive(Debug, Default)]
    struct RecordingSleep {
        requested: Mutex<Vec<Duration>>,
    }

    impl AsyncSleep for Arc<RecordingSleep> {
        fn sleep(&self, duration: Duration) -> Sleep {
            self.requested.lock().unwrap().push(duration);
            Sleep::new(async {})
        }
    }

    #[tokio::test]
    async fn sleep_until_measures_from_the_time_source() {
        let recorder = Arc::new(RecordingSleep::default());
        let sleep = SharedAsyncSleep::new(recorder.clone());
        let now = StaticTimeSource::new(UNIX_EPOCH + Duration::from_secs(100));

        sleep
            .sleep_until(&now, UNIX_EPOCH + Duration::from_secs(130))
            .await;
        sleep
            .sleep_until(&now, UNIX_EPOCH + Duration::from_secs(50))
            .await;
        assert_eq!(
            vec![Duration::from_secs(30), Duration::ZERO],
            *recorder.requested.lock().unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleep_waits_for_the_timer() {
        let start = tokio::time::Instant::now();
        SharedAsyncSleep::default()
            .sleep(Duration::from_secs(5))
            .await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
