/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Lifecycle of the task that refreshes a cache ahead of staleness.
//!
//! There is at most one task per cache. It sleeps until the cached value's prefetch time and can
//! be woken early through a [`Notify`] to either refresh immediately or recompute its deadline.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct State {
    handle: Option<JoinHandle<()>>,
    closed: bool,
    no_runtime_logged: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Background {
    state: Mutex<State>,
    wake: Arc<Notify>,
    refresh_requested: AtomicBool,
}

impl Background {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the background task if it isn't running yet, otherwise asks it to recompute its
    /// deadline. Returns `false` when no task can run: the cache was closed or there is no
    /// Tokio runtime to spawn onto.
    pub(crate) fn start_or_reschedule<F>(&self, task: impl FnOnce(Arc<Notify>) -> F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state();
        if state.closed {
            return false;
        }
        if matches!(&state.handle, Some(handle) if !handle.is_finished()) {
            drop(state);
            self.wake.notify_one();
            return true;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                state.handle = Some(runtime.spawn(task(self.wake.clone())));
                true
            }
            Err(_) => {
                if !state.no_runtime_logged {
                    state.no_runtime_logged = true;
                    tracing::warn!(
                        "no Tokio runtime is available; values will be refreshed by callers instead of in the background"
                    );
                }
                false
            }
        }
    }

    /// Wakes the task and asks it to refresh now. Returns `false` if no task is running.
    pub(crate) fn request_refresh(&self) -> bool {
        let running = {
            let state = self.state();
            !state.closed && matches!(&state.handle, Some(handle) if !handle.is_finished())
        };
        if running {
            self.refresh_requested.store(true, Ordering::SeqCst);
            self.wake.notify_one();
        }
        running
    }

    pub(crate) fn take_refresh_request(&self) -> bool {
        self.refresh_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Stops the task. Safe to call any number of times from any thread.
    pub(crate) fn close(&self) {
        let handle = {
            let mut state = self.state();
            state.closed = true;
            state.handle.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod test {
    use super::Background;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn does_not_start_without_runtime() {
        let background = Background::default();
        assert!(!background.start_or_reschedule(|_| async {}));
        assert!(!background.request_refresh());
    }

    #[tokio::test]
    async fn starts_once_and_stops_on_close() {
        let background = Background::default();
        let starts = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let starts = starts.clone();
            assert!(background.start_or_reschedule(move |wake| async move {
                starts.fetch_add(1, Ordering::SeqCst);
                loop {
                    wake.notified().await;
                }
            }));
            tokio::task::yield_now().await;
        }
        assert_eq!(1, starts.load(Ordering::SeqCst));
        assert!(background.request_refresh());
        assert!(background.take_refresh_request());
        assert!(!background.take_refresh_request());

        background.close();
        background.close();
        assert!(background.is_closed());
        assert!(!background.start_or_reschedule(|_| async {}));
        assert!(!background.request_refresh());
    }
}
