/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credentials provider that tries a series of inner providers

use aws_credential_types::provider::error::{CloseError, CredentialsError, DisplayErrorContext};
use aws_credential_types::provider::{self, future, ProvideCredentials};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Instrument;

const NO_PROVIDER: usize = usize::MAX;

/// Credentials provider that checks a series of inner providers
///
/// Each provider will be checked in turn. The first provider that returns a successful credential
/// will be used. When every provider fails, the returned error lists each provider's name and
/// failure, in chain order.
///
/// ## Reusing the last provider
///
/// By default the chain remembers which provider last succeeded and asks only that provider on
/// later calls. If the remembered provider then fails, its error is returned as-is: the chain does
/// **not** fall back to scanning the other providers for that call. A transient failure of the
/// remembered provider therefore fails the whole chain. Disable reuse with
/// [`reuse_last_provider_enabled`](CredentialsProviderChain::reuse_last_provider_enabled) to scan
/// the full chain on every call.
///
/// ## Example
/// ```rust
/// use aws_credential_providers::chain::CredentialsProviderChain;
/// use aws_credential_providers::environment::EnvironmentVariableCredentialsProvider;
/// use aws_credential_types::Credentials;
///
/// let provider = CredentialsProviderChain::first_try("Environment", EnvironmentVariableCredentialsProvider::new())
///     .or_else("Static", Credentials::from_keys("someacceskeyid", "somesecret", None));
/// ```
pub struct CredentialsProviderChain {
    providers: Vec<(Cow<'static, str>, Box<dyn ProvideCredentials>)>,
    reuse_last_provider: bool,
    last_used: AtomicUsize,
}

impl fmt::Debug for CredentialsProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsProviderChain")
            .field(
                "providers",
                &self
                    .providers
                    .iter()
                    .map(|provider| &provider.0)
                    .collect::<Vec<&Cow<'static, str>>>(),
            )
            .field("reuse_last_provider", &self.reuse_last_provider)
            .finish()
    }
}

/// A provider chain was built without any providers
#[derive(Debug)]
#[non_exhaustive]
pub struct EmptyProviderChain;

impl fmt::Display for EmptyProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a credentials provider chain requires at least one provider")
    }
}

impl std::error::Error for EmptyProviderChain {}

impl CredentialsProviderChain {
    /// Create a `CredentialsProviderChain` that begins by evaluating this provider
    pub fn first_try(
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        CredentialsProviderChain {
            providers: vec![(name.into(), Box::new(provider))],
            reuse_last_provider: true,
            last_used: AtomicUsize::new(NO_PROVIDER),
        }
    }

    /// Add a fallback provider to the credentials provider chain
    pub fn or_else(
        mut self,
        name: impl Into<Cow<'static, str>>,
        provider: impl ProvideCredentials + 'static,
    ) -> Self {
        self.providers.push((name.into(), Box::new(provider)));
        self
    }

    /// Create a `CredentialsProviderChain` from an ordered list of named providers
    ///
    /// Fails when `providers` is empty.
    pub fn from_providers<N>(
        providers: impl IntoIterator<Item = (N, Box<dyn ProvideCredentials>)>,
    ) -> Result<Self, EmptyProviderChain>
    where
        N: Into<Cow<'static, str>>,
    {
        let providers: Vec<_> = providers
            .into_iter()
            .map(|(name, provider)| (name.into(), provider))
            .collect();
        if providers.is_empty() {
            return Err(EmptyProviderChain);
        }
        Ok(CredentialsProviderChain {
            providers,
            reuse_last_provider: true,
            last_used: AtomicUsize::new(NO_PROVIDER),
        })
    }

    /// Whether the chain should remember the last successful provider. Defaults to `true`.
    pub fn reuse_last_provider_enabled(mut self, enabled: bool) -> Self {
        self.reuse_last_provider = enabled;
        self
    }

    /// Names of the providers in this chain, in the order they are tried
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|(name, _)| name.as_ref())
    }

    async fn credentials(&self) -> provider::Result {
        if self.reuse_last_provider {
            let last_used = self.last_used.load(Ordering::Relaxed);
            if let Some((name, provider)) = self.providers.get(last_used) {
                let span = tracing::info_span!("load_credentials", provider = %name);
                return match provider.provide_credentials().instrument(span).await {
                    Ok(credentials) => Ok(credentials),
                    Err(err) => {
                        tracing::warn!(provider = %name, error = %DisplayErrorContext(&err), "previously successful provider failed to provide credentials");
                        Err(err)
                    }
                };
            }
        }

        let mut failures = Vec::with_capacity(self.providers.len());
        for (idx, (name, provider)) in self.providers.iter().enumerate() {
            let span = tracing::info_span!("load_credentials", provider = %name);
            match provider.provide_credentials().instrument(span).await {
                Ok(credentials) => {
                    tracing::info!(provider = %name, "loaded credentials");
                    if self.reuse_last_provider {
                        self.last_used.store(idx, Ordering::Relaxed);
                    }
                    return Ok(credentials);
                }
                Err(err) if err.is_not_loaded() => {
                    tracing::debug!(provider = %name, error = %DisplayErrorContext(&err), "provider in chain did not provide credentials");
                    failures.push((name.clone(), err));
                }
                Err(err) => {
                    tracing::info!(provider = %name, error = %DisplayErrorContext(&err), "provider in chain failed to provide credentials");
                    failures.push((name.clone(), err));
                }
            }
        }
        Err(CredentialsError::chain_exhausted(failures))
    }
}

impl ProvideCredentials for CredentialsProviderChain {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.credentials())
    }

    /// Closes every provider in the chain, even when some fail to close.
    fn close(&self) -> Result<(), CloseError> {
        let failures = self.providers.iter().filter_map(|(name, provider)| {
            provider.close().err().map(|err| {
                tracing::warn!(provider = %name, error = %err, "failed to close credentials provider");
                err
            })
        });
        match CloseError::combine(failures.collect::<Vec<_>>()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aws_credential_types::Credentials;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    #[derive(Debug, Clone)]
    struct TestProvider {
        outcome: Arc<Mutex<Result<Credentials, &'static str>>>,
        calls: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl TestProvider {
        fn succeeds(akid: &'static str) -> Self {
            Self::with_outcome(Ok(Credentials::from_keys(akid, "secret", None)))
        }

        fn fails(message: &'static str) -> Self {
            Self::with_outcome(Err(message))
        }

        fn with_outcome(outcome: Result<Credentials, &'static str>) -> Self {
            Self {
                outcome: Arc::new(Mutex::new(outcome)),
                calls: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
                fail_close: false,
            }
        }

        fn set_outcome(&self, outcome: Result<Credentials, &'static str>) {
            *self.outcome.lock().unwrap() = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProvideCredentials for TestProvider {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .outcome
                .lock()
                .unwrap()
                .clone()
                .map_err(CredentialsError::provider_error);
            future::ProvideCredentials::ready(result)
        }

        fn close(&self) -> Result<(), CloseError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(CloseError::new("test", "close failed"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn returns_first_success_in_order() {
        let (a, b, c) = (
            TestProvider::fails("a"),
            TestProvider::succeeds("b"),
            TestProvider::succeeds("c"),
        );
        let chain = CredentialsProviderChain::first_try("A", a.clone())
            .or_else("B", b.clone())
            .or_else("C", c.clone())
            .reuse_last_provider_enabled(false);
        let creds = chain.provide_credentials().await.expect("B succeeds");
        assert_eq!(Some("b"), creds.access_key_id());
        assert_eq!(0, c.calls());

        chain.provide_credentials().await.expect("B succeeds");
        assert_eq!(2, a.calls(), "without reuse, A is asked every time");
    }

    #[tokio::test]
    async fn remembers_last_successful_provider() {
        let (a, b, c) = (
            TestProvider::fails("a"),
            TestProvider::succeeds("b"),
            TestProvider::succeeds("c"),
        );
        let chain = CredentialsProviderChain::first_try("A", a.clone())
            .or_else("B", b.clone())
            .or_else("C", c.clone());
        chain.provide_credentials().await.expect("B succeeds");
        chain.provide_credentials().await.expect("B succeeds");
        assert_eq!(1, a.calls());
        assert_eq!(2, b.calls());
        assert_eq!(0, c.calls());
    }

    #[tokio::test]
    #[traced_test]
    async fn remembered_provider_failure_does_not_fall_back() {
        let (a, b) = (TestProvider::fails("a"), TestProvider::succeeds("b"));
        let c = TestProvider::succeeds("c");
        let chain = CredentialsProviderChain::first_try("A", a.clone())
            .or_else("B", b.clone())
            .or_else("C", c.clone());
        chain.provide_credentials().await.expect("B succeeds");

        b.set_outcome(Err("b is down"));
        let err = chain
            .provide_credentials()
            .await
            .expect_err("remembered provider failed");
        assert!(matches!(err, CredentialsError::ProviderError(_)), "{:?}", err);
        assert_eq!(1, a.calls());
        assert_eq!(0, c.calls());
        assert!(logs_contain("previously successful provider failed"));
    }

    #[tokio::test]
    async fn exhausted_chain_lists_every_failure() {
        let chain = CredentialsProviderChain::first_try("A", TestProvider::fails("first-failure"))
            .or_else("B", TestProvider::fails("second-failure"));
        let err = chain.provide_credentials().await.expect_err("all fail");
        let message = err.to_string();
        let first = message.find("A: ").expect("names A");
        let x = message.find("first-failure").expect("contains A's message");
        let y = message.find("second-failure").expect("contains B's message");
        assert!(first < x && x < y, "{}", message);
        match err {
            CredentialsError::ChainExhausted(details) => assert_eq!(2, details.failures().len()),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_scan_does_not_remember_anything() {
        let a = TestProvider::fails("a");
        let b = TestProvider::fails("b");
        let chain = CredentialsProviderChain::first_try("A", a.clone()).or_else("B", b.clone());
        chain.provide_credentials().await.expect_err("all fail");

        a.set_outcome(Ok(Credentials::from_keys("a", "secret", None)));
        let creds = chain.provide_credentials().await.expect("A recovered");
        assert_eq!(Some("a"), creds.access_key_id());
        assert_eq!(1, b.calls());
    }

    #[test]
    fn empty_chain_is_rejected() {
        let providers: Vec<(&'static str, Box<dyn ProvideCredentials>)> = Vec::new();
        assert!(CredentialsProviderChain::from_providers(providers).is_err());

        let chain = CredentialsProviderChain::from_providers(vec![(
            "Static",
            Box::new(Credentials::from_keys("a", "b", None)) as Box<dyn ProvideCredentials>,
        )])
        .expect("one provider");
        assert_eq!(vec!["Static"], chain.provider_names().collect::<Vec<_>>());
    }

    #[test]
    fn close_attempts_every_provider() {
        let mut failing = TestProvider::succeeds("a");
        failing.fail_close = true;
        let healthy = TestProvider::succeeds("b");
        let chain = CredentialsProviderChain::first_try("A", failing.clone())
            .or_else("B", healthy.clone());

        let err = chain.close().expect_err("A fails to close");
        assert_eq!(vec!["test"], err.names().collect::<Vec<_>>());
        assert_eq!(1, failing.closes.load(Ordering::SeqCst));
        assert_eq!(1, healthy.closes.load(Ordering::SeqCst));
    }
}
