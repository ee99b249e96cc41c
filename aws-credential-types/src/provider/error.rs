/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credentials provider errors

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::Duration;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Details for [`CredentialsError::CredentialsNotLoaded`]
#[derive(Debug)]
pub struct CredentialsNotLoaded {
    source: BoxError,
}

/// Details for [`CredentialsError::ProviderTimedOut`]
#[derive(Debug)]
pub struct ProviderTimedOut {
    timeout_duration: Duration,
}

impl ProviderTimedOut {
    /// Returns the maximum allowed timeout duration that was exceeded
    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }
}

/// Details for [`CredentialsError::InvalidConfiguration`]
#[derive(Debug)]
pub struct InvalidConfiguration {
    source: BoxError,
}

/// Details for [`CredentialsError::ProviderError`]
#[derive(Debug)]
pub struct ProviderError {
    source: BoxError,
}

/// Details for [`CredentialsError::Unhandled`]
#[derive(Debug)]
pub struct Unhandled {
    source: BoxError,
}

/// One entry of [`ChainExhausted`]: the provider's name and why it failed.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    name: Cow<'static, str>,
    message: String,
}

impl ProviderFailure {
    /// Name of the provider that failed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rendered error message, including the error's sources
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Details for [`CredentialsError::ChainExhausted`]
#[derive(Debug)]
pub struct ChainExhausted {
    failures: Vec<ProviderFailure>,
}

impl ChainExhausted {
    /// The failure of every provider in the chain, in the order they were tried
    pub fn failures(&self) -> &[ProviderFailure] {
        &self.failures
    }
}

/// Error returned when credentials failed to load.
#[derive(Debug)]
#[non_exhaustive]
pub enum CredentialsError {
    /// No credentials were available for this provider.
    ///
    /// The configuration this provider reads (environment variables, files, properties) was not
    /// present. Provider chains treat this as "try the next provider".
    CredentialsNotLoaded(CredentialsNotLoaded),

    /// Loading credentials from this provider exceeded the maximum allowed duration
    ProviderTimedOut(ProviderTimedOut),

    /// The provider was given an invalid configuration
    ///
    /// For example:
    /// - syntax error in ~/.aws/config
    /// - assume role profile that forms an infinite loop
    /// - a container credentials URI pointing at a host that is not allowed
    InvalidConfiguration(InvalidConfiguration),

    /// The provider experienced an error during credential resolution
    ///
    /// This covers both an unreachable source and a reachable source that returned a malformed
    /// response, such as JSON with the wrong shape or an unsupported `Version`.
    ProviderError(ProviderError),

    /// Every provider of a chain failed.
    ChainExhausted(ChainExhausted),

    /// An unexpected error occurred during credential resolution
    ///
    /// If the error is something that can occur during expected usage of a provider, `ProviderError`
    /// should be returned instead. Unhandled is reserved for exceptional cases, for example:
    /// - Returned data not UTF-8
    /// - A provider returns data that is missing required fields
    Unhandled(Unhandled),
}

impl CredentialsError {
    /// The credentials provider did not provide credentials
    ///
    /// This error indicates the credentials provider was not enable or no configuration was set.
    /// This contrasts with [`invalid_configuration`](CredentialsError::InvalidConfiguration), indicating
    /// that the provider was configured in some way, but certain settings were invalid.
    pub fn not_loaded(source: impl Into<BoxError>) -> Self {
        CredentialsError::CredentialsNotLoaded(CredentialsNotLoaded {
            source: source.into(),
        })
    }

    /// An unexpected error occurred loading credentials from this provider
    ///
    /// Unhandled errors should not occur during normal operation and should be reserved for exceptional
    /// cases, such as a JSON API returning an output that was not parseable as JSON.
    pub fn unhandled(source: impl Into<BoxError>) -> Self {
        Self::Unhandled(Unhandled {
            source: source.into(),
        })
    }

    /// The credentials provider returned an error
    pub fn provider_error(source: impl Into<BoxError>) -> Self {
        Self::ProviderError(ProviderError {
            source: source.into(),
        })
    }

    /// The provided configuration for a provider was invalid
    pub fn invalid_configuration(source: impl Into<BoxError>) -> Self {
        Self::InvalidConfiguration(InvalidConfiguration {
            source: source.into(),
        })
    }

    /// The credentials provider did not provide credentials within an allotted duration
    pub fn provider_timed_out(timeout_duration: Duration) -> Self {
        Self::ProviderTimedOut(ProviderTimedOut { timeout_duration })
    }

    /// Every provider of a chain failed. `failures` holds each provider's name and error, in
    /// the order the providers were tried.
    pub fn chain_exhausted<N>(failures: impl IntoIterator<Item = (N, CredentialsError)>) -> Self
    where
        N: Into<Cow<'static, str>>,
    {
        Self::ChainExhausted(ChainExhausted {
            failures: failures
                .into_iter()
                .map(|(name, err)| ProviderFailure {
                    name: name.into(),
                    message: DisplayErrorContext(&err).to_string(),
                })
                .collect(),
        })
    }

    /// True when the provider had no configuration to load from.
    pub fn is_not_loaded(&self) -> bool {
        matches!(self, CredentialsError::CredentialsNotLoaded(_))
    }
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsError::CredentialsNotLoaded(_) => {
                write!(f, "the credential provider was not enabled")
            }
            CredentialsError::ProviderTimedOut(details) => write!(
                f,
                "credentials provider timed out after {} seconds",
                details.timeout_duration.as_secs()
            ),
            CredentialsError::InvalidConfiguration(_) => {
                write!(f, "the credentials provider was not properly configured")
            }
            CredentialsError::ProviderError(_) => {
                write!(f, "an error occurred while loading credentials")
            }
            CredentialsError::ChainExhausted(details) => {
                write!(
                    f,
                    "Unable to load credentials from any of the providers in the chain: ["
                )?;
                for (idx, failure) in details.failures.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", failure.name, failure.message)?;
                }
                write!(f, "]")
            }
            CredentialsError::Unhandled(_) => write!(f, "unexpected credentials error"),
        }
    }
}

impl Error for CredentialsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CredentialsError::CredentialsNotLoaded(details) => Some(details.source.as_ref() as _),
            CredentialsError::ProviderTimedOut(_) => None,
            CredentialsError::InvalidConfiguration(details) => Some(details.source.as_ref() as _),
            CredentialsError::ProviderError(details) => Some(details.source.as_ref() as _),
            CredentialsError::ChainExhausted(_) => None,
            CredentialsError::Unhandled(details) => Some(details.source.as_ref() as _),
        }
    }
}

/// Error returned by [`ProvideCredentials::close`](super::ProvideCredentials::close).
#[derive(Debug)]
pub struct CloseError {
    failures: Vec<(Cow<'static, str>, BoxError)>,
}

impl CloseError {
    /// Creates a `CloseError` for a single resource that failed to shut down.
    pub fn new(name: impl Into<Cow<'static, str>>, source: impl Into<BoxError>) -> Self {
        Self {
            failures: vec![(name.into(), source.into())],
        }
    }

    /// Combines several close failures into one error. Returns `None` when there are none.
    pub fn combine(errors: impl IntoIterator<Item = CloseError>) -> Option<Self> {
        let failures: Vec<_> = errors.into_iter().flat_map(|e| e.failures).collect();
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    /// The names of the resources that failed to close
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_ref())
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to close")?;
        for (idx, (name, err)) in self.failures.iter().enumerate() {
            let sep = if idx == 0 { " " } else { ", " };
            write!(f, "{}{}: {}", sep, name, DisplayErrorContext(err.as_ref()))?;
        }
        Ok(())
    }
}

impl Error for CloseError {}

/// Provides a `Display` impl for an `Error` that outputs the full error context
///
/// The error's message is followed by the message of each of its sources, separated by `: `.
pub struct DisplayErrorContext<E>(pub E);

impl<E: Error> fmt::Display for DisplayErrorContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {}", err)?;
            source = err.source();
        }
        Ok(())
    }
}

impl<E: Error> fmt::Debug for DisplayErrorContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chain_exhausted_lists_every_provider_in_order() {
        let err = CredentialsError::chain_exhausted(vec![
            ("Environment", CredentialsError::not_loaded("x")),
            ("Profile", CredentialsError::provider_error("y")),
        ]);
        let message = err.to_string();
        assert_eq!(
            "Unable to load credentials from any of the providers in the chain: [\
             Environment: the credential provider was not enabled: x, \
             Profile: an error occurred while loading credentials: y]",
            message
        );
        match err {
            CredentialsError::ChainExhausted(details) => {
                let names: Vec<_> = details.failures().iter().map(|f| f.name()).collect();
                assert_eq!(vec!["Environment", "Profile"], names);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn display_error_context_walks_sources() {
        let err = CredentialsError::invalid_configuration(CredentialsError::unhandled("bad json"));
        assert_eq!(
            "the credentials provider was not properly configured: unexpected credentials error: bad json",
            DisplayErrorContext(&err).to_string()
        );
    }

    #[test]
    fn close_errors_combine() {
        assert!(CloseError::combine(Vec::new()).is_none());
        let combined = CloseError::combine(vec![
            CloseError::new("Imds", "join failed"),
            CloseError::new("Process", "still running"),
        ])
        .unwrap();
        assert_eq!(vec!["Imds", "Process"], combined.names().collect::<Vec<_>>());
        assert_eq!(
            "failed to close Imds: join failed, Process: still running",
            combined.to_string()
        );
    }
}
