/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Providers that always return the same credentials.

use aws_credential_types::provider::{self, future, ProvideCredentials};
use aws_credential_types::Credentials;

/// Returns a fixed set of credentials on every call.
///
/// [`Credentials`] implement [`ProvideCredentials`] directly; this wrapper exists so that a static
/// source has a name in a provider chain and in logs.
///
/// ```rust
/// use aws_credential_types::Credentials;
/// use aws_credential_providers::static_provider::StaticCredentialsProvider;
///
/// let provider = StaticCredentialsProvider::new(Credentials::from_keys("akid", "secret", None));
/// ```
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    /// Creates a provider that always returns `credentials`
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl ProvideCredentials for StaticCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::ready(Ok(self.credentials.clone()))
    }
}

/// Returns anonymous credentials. Requests made with them are not signed.
#[derive(Debug, Clone, Default)]
pub struct AnonymousCredentialsProvider;

impl AnonymousCredentialsProvider {
    /// Creates a new `AnonymousCredentialsProvider`
    pub fn new() -> Self {
        Self
    }

    fn credentials(&self) -> provider::Result {
        Ok(Credentials::anonymous())
    }
}

impl ProvideCredentials for AnonymousCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::ready(self.credentials())
    }
}
