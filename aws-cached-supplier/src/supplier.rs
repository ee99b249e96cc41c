/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::background::Background;
use crate::jitter;
use crate::refresh_result::RefreshResult;
use crate::sleep::{AsyncSleep, SharedAsyncSleep};
use crate::time::{SharedTimeSource, TimeSource};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tracing::Instrument;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type RefreshFn<T, E> = Box<dyn Fn() -> BoxFuture<Result<RefreshResult<T>, E>> + Send + Sync>;

/// With [`StaleValueBehavior::Strict`], how long an already-stale freshly loaded value is used
/// before the next refresh.
const STRICT_STALE_VALUE_GRACE: Duration = Duration::from_secs(1);

/// Floor on the background refresh interval when a refresh produces a value that is already
/// inside its prefetch window.
const MIN_BACKGROUND_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// How a cache refreshes a value that is inside its prefetch window but not yet stale.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[non_exhaustive]
pub enum PrefetchStrategy {
    /// The first caller to observe the prefetch window refreshes synchronously. Callers that
    /// arrive while that refresh is running return the current value without waiting.
    #[default]
    OneCallerBlocks,

    /// A background task refreshes at (or shortly after) the prefetch time. Callers never wait
    /// unless the value has gone stale. Failed background refreshes are retried with jittered
    /// backoff.
    ///
    /// Requires a Tokio runtime; without one the cache behaves like [`OneCallerBlocks`](Self::OneCallerBlocks).
    NonBlocking,
}

/// What a cache does when the only value it can serve is stale.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[non_exhaustive]
pub enum StaleValueBehavior {
    /// A refresh failure while the cached value is stale is returned to the caller.
    #[default]
    Strict,

    /// A refresh failure while the cached value is stale extends the stale value's lifetime by
    /// a short jittered backoff and serves it. A refresh that returns an already-stale value is
    /// served and not retried for a few minutes.
    Allow,
}

/// A cache around an expensive refresh function.
///
/// - [`get`](CachedSupplier::get) returns the cached value while it is fresh. When the cache is
///   empty or the value is stale it refreshes, and concurrent callers wait for that single
///   refresh instead of starting their own.
/// - When the value enters its prefetch window, the [`PrefetchStrategy`] decides who refreshes.
/// - [`close`](CachedSupplier::close) stops background refreshing. Dropping the last handle does
///   the same.
///
/// # Examples
///
/// ```no_run
/// use aws_cached_supplier::{Builder, PrefetchStrategy, RefreshResult};
/// use std::time::{Duration, SystemTime};
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let supplier = Builder::new()
///     .name("ExampleCache")
///     .prefetch_strategy(PrefetchStrategy::NonBlocking)
///     .build(|| async {
///         let value = String::from("expensive");
///         let now = SystemTime::now();
///         Ok::<_, std::io::Error>(
///             RefreshResult::builder(value)
///                 .prefetch_time(now + Duration::from_secs(240))
///                 .stale_time(now + Duration::from_secs(300))
///                 .build(),
///         )
///     });
/// let value = supplier.get().await?;
/// supplier.close();
/// # Ok(())
/// # }
/// ```
pub struct CachedSupplier<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for CachedSupplier<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for CachedSupplier<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedSupplier")
            .field("name", &self.inner.name)
            .field("prefetch_strategy", &self.inner.prefetch_strategy)
            .field("stale_value_behavior", &self.inner.stale_value_behavior)
            .finish()
    }
}

struct Cached<T> {
    result: RefreshResult<T>,
    generation: u64,
    background_wake: Option<SystemTime>,
}

struct Inner<T, E> {
    name: Cow<'static, str>,
    refresh: RefreshFn<T, E>,
    time_source: SharedTimeSource,
    sleep: SharedAsyncSleep,
    prefetch_strategy: PrefetchStrategy,
    stale_value_behavior: StaleValueBehavior,
    cached: RwLock<Option<Arc<Cached<T>>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    consecutive_failures: AtomicU32,
    retry_at: Mutex<Option<SystemTime>>,
    background: Background,
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        self.background.close();
    }
}

impl<T, E> CachedSupplier<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Returns the cached value, refreshing it first when the cache is empty or the value is
    /// stale.
    ///
    /// Refresh errors are returned only when there is no value that may be served instead.
    pub async fn get(&self) -> Result<T, E> {
        let now = self.inner.time_source.now();
        if let Some(cached) = self.inner.current() {
            if !cached.result.is_stale_at(now) {
                if cached.result.should_prefetch_at(now) {
                    if let Some(fresh) = self.inner.prefetch(cached.generation).await {
                        return Ok(fresh);
                    }
                }
                return Ok(cached.result.value().clone());
            }
        }
        self.inner.refresh_blocking().await
    }

    /// Returns the cached value and its freshness metadata without refreshing.
    pub fn peek(&self) -> Option<RefreshResult<T>> {
        self.inner.current().map(|cached| cached.result.clone())
    }

    /// Stops background refreshing.
    ///
    /// Idempotent. The cache remains usable afterwards, refreshing on demand.
    pub fn close(&self) {
        if !self.inner.background.is_closed() {
            tracing::debug!(cache = %self.inner.name, "closing cache");
        }
        self.inner.background.close();
    }
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    fn current(&self) -> Option<Arc<Cached<T>>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_generation(&self) -> u64 {
        self.current().map(|cached| cached.generation).unwrap_or(0)
    }

    fn store(self: &Arc<Self>, result: RefreshResult<T>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let background_wake = match (result.prefetch_time(), result.stale_time()) {
            (Some(prefetch), stale) => Some(prefetch + jitter::prefetch_jitter(prefetch, stale)),
            (None, stale) => stale,
        };
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Cached {
            result,
            generation,
            background_wake,
        }));
        if self.prefetch_strategy == PrefetchStrategy::NonBlocking {
            let weak = Arc::downgrade(self);
            self.background
                .start_or_reschedule(move |wake| background_loop(weak, wake));
        }
    }

    async fn refresh_blocking(self: &Arc<Self>) -> Result<T, E> {
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while this one waited for the lock.
        if let Some(cached) = self.current() {
            if !cached.result.is_stale_at(self.time_source.now()) {
                return Ok(cached.result.value().clone());
            }
        }
        self.load_locked().await
    }

    /// Returns the newest value if this caller refreshed it, `None` if the current value should
    /// be served.
    async fn prefetch(self: &Arc<Self>, seen_generation: u64) -> Option<T> {
        if self.prefetch_strategy == PrefetchStrategy::NonBlocking
            && self.background.request_refresh()
        {
            return None;
        }
        let _guard = self.refresh_lock.try_lock().ok()?;
        if self.current_generation() != seen_generation {
            return None;
        }
        self.load_locked().await.ok()
    }

    async fn refresh_in_background(self: &Arc<Self>) {
        let seen_generation = self.current_generation();
        let _guard = self.refresh_lock.lock().await;
        if self.current_generation() != seen_generation {
            tracing::debug!(cache = %self.name, "value was refreshed while waiting; skipping background refresh");
            return;
        }
        if self.load_locked().await.is_ok() {
            tracing::debug!(cache = %self.name, "background refresh complete");
        }
    }

    /// Calls the refresh function and stores its outcome. Must be called with `refresh_lock` held.
    async fn load_locked(self: &Arc<Self>) -> Result<T, E> {
        let span = tracing::debug_span!("refresh_cache", cache = %self.name);
        let outcome = (self.refresh)().instrument(span).await;
        let now = self.time_source.now();
        match outcome {
            Ok(fresh) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                *self.retry_at.lock().unwrap_or_else(PoisonError::into_inner) = None;
                let fresh = self.handle_fetched_success(fresh, now);
                let value = fresh.value().clone();
                self.store(fresh);
                Ok(value)
            }
            Err(err) => self.handle_fetch_failure(err, now),
        }
    }

    fn handle_fetched_success(&self, fresh: RefreshResult<T>, now: SystemTime) -> RefreshResult<T> {
        if !fresh.is_stale_at(now) {
            return fresh;
        }
        let stale_time = match self.stale_value_behavior {
            StaleValueBehavior::Strict => now + STRICT_STALE_VALUE_GRACE,
            StaleValueBehavior::Allow => jitter::jitter_time(
                now,
                jitter::STALE_SUCCESS_MIN_EXTENSION,
                jitter::STALE_SUCCESS_MAX_EXTENSION,
            ),
        };
        tracing::warn!(
            cache = %self.name,
            extended_until = ?stale_time,
            "refreshed value is already stale; serving it until the extended stale time"
        );
        fresh.extended_until(stale_time)
    }

    fn handle_fetch_failure(self: &Arc<Self>, err: E, now: SystemTime) -> Result<T, E> {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let backoff = jitter::between(Duration::from_millis(1), jitter::max_failure_backoff(failures));
        *self.retry_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(now + backoff);

        let current = match self.current() {
            Some(current) => current,
            None => {
                tracing::debug!(cache = %self.name, error = %err, "refresh failed and no value is cached");
                return Err(err);
            }
        };
        if !current.result.is_stale_at(now) {
            tracing::debug!(
                cache = %self.name,
                error = %err,
                "refresh failed; the cached value is still fresh and will be served"
            );
            return Ok(current.result.value().clone());
        }
        match self.stale_value_behavior {
            StaleValueBehavior::Strict => Err(err),
            StaleValueBehavior::Allow => {
                let extended = current.result.clone().extended_until(now + backoff);
                tracing::warn!(
                    cache = %self.name,
                    error = %err,
                    consecutive_failures = failures,
                    extended_until = ?(now + backoff),
                    "refresh failed; extending the lifetime of the stale cached value"
                );
                let value = extended.value().clone();
                self.store(extended);
                Ok(value)
            }
        }
    }

    fn next_background_wake(&self, just_refreshed: bool) -> Option<SystemTime> {
        let retry_at = *self.retry_at.lock().unwrap_or_else(PoisonError::into_inner);
        let target = retry_at.or_else(|| self.current().and_then(|cached| cached.background_wake))?;
        let now = self.time_source.now();
        if target <= now && just_refreshed && retry_at.is_none() {
            Some(now + MIN_BACKGROUND_REFRESH_INTERVAL)
        } else {
            Some(target)
        }
    }
}

async fn background_loop<T, E>(weak: Weak<Inner<T, E>>, wake: Arc<Notify>)
where
    T: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    let mut just_refreshed = false;
    loop {
        // Only hold a strong reference while working so that dropping the cache ends this task.
        let wait = match weak.upgrade() {
            Some(inner) if !inner.background.is_closed() => inner
                .next_background_wake(just_refreshed)
                .map(|deadline| inner.sleep.sleep_until(&inner.time_source, deadline)),
            _ => return,
        };
        let deadline_elapsed = match wait {
            Some(wait) => tokio::select! {
                _ = wait => true,
                _ = wake.notified() => false,
            },
            None => {
                wake.notified().await;
                false
            }
        };
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let requested = inner.background.take_refresh_request();
        // A plain wake (a new value was stored) only recomputes the deadline. The store made by
        // our own refresh also wakes us, so the flag must survive it to keep the interval floor.
        if deadline_elapsed || requested {
            inner.refresh_in_background().await;
            just_refreshed = true;
        }
    }
}

/// Builder for [`CachedSupplier`]
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<Cow<'static, str>>,
    prefetch_strategy: Option<PrefetchStrategy>,
    stale_value_behavior: Option<StaleValueBehavior>,
    time_source: Option<SharedTimeSource>,
    sleep: Option<SharedAsyncSleep>,
}

impl Builder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the cache, included in log output
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets how values inside their prefetch window are refreshed.
    ///
    /// Defaults to [`PrefetchStrategy::OneCallerBlocks`].
    pub fn prefetch_strategy(mut self, strategy: PrefetchStrategy) -> Self {
        self.prefetch_strategy = Some(strategy);
        self
    }

    /// Sets how values inside their prefetch window are refreshed.
    pub fn set_prefetch_strategy(&mut self, strategy: Option<PrefetchStrategy>) -> &mut Self {
        self.prefetch_strategy = strategy;
        self
    }

    /// Sets what happens when only a stale value is available.
    ///
    /// Defaults to [`StaleValueBehavior::Strict`].
    pub fn stale_value_behavior(mut self, behavior: StaleValueBehavior) -> Self {
        self.stale_value_behavior = Some(behavior);
        self
    }

    /// Sets what happens when only a stale value is available.
    pub fn set_stale_value_behavior(&mut self, behavior: Option<StaleValueBehavior>) -> &mut Self {
        self.stale_value_behavior = behavior;
        self
    }

    /// Override the time source used to decide staleness
    pub fn time_source(mut self, time_source: impl TimeSource + 'static) -> Self {
        self.time_source = Some(SharedTimeSource::new(time_source));
        self
    }

    /// Override the time source used to decide staleness
    pub fn set_time_source(&mut self, time_source: Option<SharedTimeSource>) -> &mut Self {
        self.time_source = time_source;
        self
    }

    /// Override the sleep implementation used by the background task
    pub fn sleep_impl(mut self, sleep: impl AsyncSleep + 'static) -> Self {
        self.sleep = Some(SharedAsyncSleep::new(sleep));
        self
    }

    /// Override the sleep implementation used by the background task
    pub fn set_sleep_impl(&mut self, sleep: Option<SharedAsyncSleep>) -> &mut Self {
        self.sleep = sleep;
        self
    }

    /// Builds the cache around `refresh`.
    ///
    /// Nothing is loaded until the first call to [`CachedSupplier::get`].
    pub fn build<T, E, F, Fut>(self, refresh: F) -> CachedSupplier<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RefreshResult<T>, E>> + Send + 'static,
    {
        CachedSupplier {
            inner: Arc::new(Inner {
                name: self.name.unwrap_or(Cow::Borrowed("CachedSupplier")),
                refresh: Box::new(move || Box::pin(refresh())),
                time_source: self.time_source.unwrap_or_default(),
                sleep: self.sleep.unwrap_or_default(),
                prefetch_strategy: self.prefetch_strategy.unwrap_or_default(),
                stale_value_behavior: self.stale_value_behavior.unwrap_or_default(),
                cached: RwLock::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                consecutive_failures: AtomicU32::new(0),
                retry_at: Mutex::new(None),
                background: Background::default(),
            }),
        }
    }
}
