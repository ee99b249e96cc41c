/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Configuration Options for Credential Providers

use crate::http_client::{default_http_client, HttpClient, SharedHttpClient};
use crate::os_shim_internal::{Env, Fs, Properties};
use aws_cached_supplier::sleep::{AsyncSleep, SharedAsyncSleep};
use aws_cached_supplier::time::{SharedTimeSource, TimeSource};
use std::borrow::Cow;
use std::fmt;

/// Configuration options for Credential Providers
///
/// Most credential providers builders offer a `configure` method which applies general provider configuration
/// options: where environment variables, system properties and files are read from, which HTTP
/// client is used, and which clock and sleep implementation drive caching.
///
/// # Example
/// ```rust
/// use aws_credential_providers::os_shim_internal::Env;
/// use aws_credential_providers::provider_config::ProviderConfig;
/// use aws_credential_providers::environment::EnvironmentVariableCredentialsProvider;
///
/// let conf = ProviderConfig::default().with_env(Env::from_slice(&[
///     ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
///     ("AWS_SECRET_ACCESS_KEY", "secret"),
/// ]));
/// let provider = EnvironmentVariableCredentialsProvider::builder().configure(&conf).build();
/// ```
#[derive(Clone)]
pub struct ProviderConfig {
    env: Env,
    fs: Fs,
    properties: Properties,
    http_client: Option<SharedHttpClient>,
    time_source: SharedTimeSource,
    sleep: SharedAsyncSleep,
    profile_name: Option<Cow<'static, str>>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("env", &self.env)
            .field("fs", &self.fs)
            .field("properties", &self.properties)
            .field("http_client", &self.http_client)
            .field("profile_name", &self.profile_name)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            env: Env::default(),
            fs: Fs::default(),
            properties: Properties::default(),
            http_client: default_http_client(),
            time_source: SharedTimeSource::default(),
            sleep: SharedAsyncSleep::default(),
            profile_name: None,
        }
    }
}

impl ProviderConfig {
    /// A provider config with everything empty: no environment, no properties, no files and no
    /// HTTP client. Useful as a starting point for tests.
    pub fn empty() -> Self {
        Self {
            env: Env::from_slice(&[]),
            fs: Fs::from_slice(&[]),
            properties: Properties::from_slice(&[]),
            http_client: None,
            time_source: SharedTimeSource::default(),
            sleep: SharedAsyncSleep::default(),
            profile_name: None,
        }
    }

    pub(crate) fn env(&self) -> Env {
        self.env.clone()
    }

    pub(crate) fn fs(&self) -> Fs {
        self.fs.clone()
    }

    pub(crate) fn properties(&self) -> Properties {
        self.properties.clone()
    }

    pub(crate) fn http_client(&self) -> Option<SharedHttpClient> {
        self.http_client.clone()
    }

    pub(crate) fn time_source(&self) -> SharedTimeSource {
        self.time_source.clone()
    }

    pub(crate) fn sleep(&self) -> SharedAsyncSleep {
        self.sleep.clone()
    }

    pub(crate) fn profile_name(&self) -> Option<&str> {
        self.profile_name.as_deref()
    }

    /// Override the process environment
    pub fn with_env(self, env: Env) -> Self {
        ProviderConfig { env, ..self }
    }

    /// Override the file system
    pub fn with_fs(self, fs: Fs) -> Self {
        ProviderConfig { fs, ..self }
    }

    /// Override the system properties
    pub fn with_properties(self, properties: Properties) -> Self {
        ProviderConfig { properties, ..self }
    }

    /// Override the HTTP client used by endpoint-backed providers
    pub fn with_http_client(self, http_client: impl HttpClient + 'static) -> Self {
        ProviderConfig {
            http_client: Some(SharedHttpClient::new(http_client)),
            ..self
        }
    }

    /// Override the time source used when deciding whether cached credentials are stale
    pub fn with_time_source(self, time_source: impl TimeSource + 'static) -> Self {
        ProviderConfig {
            time_source: SharedTimeSource::new(time_source),
            ..self
        }
    }

    /// Override the sleep implementation used by background refreshes
    pub fn with_sleep(self, sleep: impl AsyncSleep + 'static) -> Self {
        ProviderConfig {
            sleep: SharedAsyncSleep::new(sleep),
            ..self
        }
    }

    /// Select a profile other than the one named by `aws.profile` / `AWS_PROFILE`
    pub fn with_profile_name(self, profile_name: impl Into<Cow<'static, str>>) -> Self {
        ProviderConfig {
            profile_name: Some(profile_name.into()),
            ..self
        }
    }
}
