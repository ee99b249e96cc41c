/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Container credentials provider
//!
//! This provider loads credentials from the HTTP endpoint that container orchestrators (ECS,
//! EKS Pod Identity) expose to their workloads. The endpoint is configured with either:
//! - `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI`: a path appended to `http://169.254.170.2`
//! - `AWS_CONTAINER_CREDENTIALS_FULL_URI`: a complete URI. Plain-HTTP URIs must point at a
//!   loopback address or one of the container link-local addresses.
//!
//! When set, `AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE` (preferred) or
//! `AWS_CONTAINER_AUTHORIZATION_TOKEN` supply the `Authorization` header. The token file is read
//! on every refresh so that rotated tokens are picked up.

use crate::http_credential_provider::HttpCredentialProvider;
use crate::os_shim_internal::{Env, Fs, Properties};
use crate::provider_config::ProviderConfig;
use crate::setting::{
    AWS_CONTAINER_AUTHORIZATION_TOKEN, AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE,
    AWS_CONTAINER_CREDENTIALS_FULL_URI, AWS_CONTAINER_CREDENTIALS_RELATIVE_URI,
};
use aws_cached_supplier::time::SharedTimeSource;
use aws_cached_supplier::{CachedSupplier, PrefetchStrategy, RefreshResult};
use aws_credential_types::provider::error::{CloseError, CredentialsError};
use aws_credential_types::provider::{self, future, ProvideCredentials};
use aws_credential_types::Credentials;
use bytes::Bytes;
use http::Uri;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::Instrument;

const PROVIDER_NAME: &str = "ContainerCredentialsProvider";
const BASE_HOST: &str = "http://169.254.170.2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 3;
const STALE_MARGIN: Duration = Duration::from_secs(60);
const MAX_PREFETCH_MARGIN: Duration = Duration::from_secs(15 * 60);
const ALLOWED_HOSTS: &[&str] = &["localhost", "169.254.170.2", "169.254.170.23", "fd00:ec2::23"];

/// Why the container endpoint could not be determined. Stored at construction and raised when
/// credentials are requested.
#[derive(Debug, Clone)]
enum EndpointError {
    NotConfigured,
    InvalidUri { uri: String, message: String },
    DisallowedHost { uri: String },
    NoHttpClient,
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::NotConfigured => write!(
                f,
                "Cannot fetch credentials from container - neither {} or {} environment variables are set.",
                AWS_CONTAINER_CREDENTIALS_FULL_URI.environment_variable(),
                AWS_CONTAINER_CREDENTIALS_RELATIVE_URI.environment_variable()
            ),
            EndpointError::InvalidUri { uri, message } => {
                write!(f, "invalid container credentials URI `{}`: {}", uri, message)
            }
            EndpointError::DisallowedHost { uri } => write!(
                f,
                "The full URI ({}) contained within environment variable {} has an invalid host. \
                 Host should resolve to a loopback address or have the full URI be HTTPS.",
                uri,
                AWS_CONTAINER_CREDENTIALS_FULL_URI.environment_variable()
            ),
            EndpointError::NoHttpClient => {
                write!(f, "no HTTP client is configured for the container credentials provider")
            }
        }
    }
}

impl std::error::Error for EndpointError {}

impl From<EndpointError> for CredentialsError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::NotConfigured => CredentialsError::not_loaded(err),
            _ => CredentialsError::invalid_configuration(err),
        }
    }
}

fn is_allowed_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if ALLOWED_HOSTS.iter().any(|allowed| allowed.eq_ignore_ascii_case(host)) {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => {
            ip.is_loopback()
                || ALLOWED_HOSTS
                    .iter()
                    .filter_map(|allowed| allowed.parse::<IpAddr>().ok())
                    .any(|allowed| allowed == ip)
        }
        Err(_) => false,
    }
}

fn resolve_endpoint(properties: &Properties, env: &Env) -> Result<Uri, EndpointError> {
    if let Some(relative) = AWS_CONTAINER_CREDENTIALS_RELATIVE_URI.resolve(properties, env) {
        let uri = format!("{}{}", BASE_HOST, relative);
        return uri.parse::<Uri>().map_err(|err| EndpointError::InvalidUri {
            uri,
            message: err.to_string(),
        });
    }
    let full = AWS_CONTAINER_CREDENTIALS_FULL_URI
        .resolve(properties, env)
        .ok_or(EndpointError::NotConfigured)?;
    let uri = full.parse::<Uri>().map_err(|err| EndpointError::InvalidUri {
        uri: full.clone(),
        message: err.to_string(),
    })?;
    match (uri.scheme_str(), uri.host()) {
        (Some("https"), Some(_)) => Ok(uri),
        (Some("http"), Some(host)) if is_allowed_host(host) => Ok(uri),
        (Some("http"), Some(_)) => Err(EndpointError::DisallowedHost { uri: full }),
        _ => Err(EndpointError::InvalidUri {
            uri: full,
            message: "expected an http or https URI with a host".into(),
        }),
    }
}

/// Credentials provider for container credential endpoints
///
/// Credentials are cached. The cache refreshes ahead of expiry: 15 minutes before it, or half
/// the remaining lifetime when that is shorter. Credentials stop being served one minute before
/// they expire.
#[derive(Debug)]
pub struct ContainerCredentialsProvider {
    inner: Result<CachedSupplier<Credentials, CredentialsError>, EndpointError>,
}

impl ContainerCredentialsProvider {
    /// Builder for the container credentials provider
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn credentials(&self) -> provider::Result {
        match &self.inner {
            Ok(cache) => cache.get().await,
            Err(err) => Err(err.clone().into()),
        }
    }
}

impl ProvideCredentials for ContainerCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(
            self.credentials()
                .instrument(tracing::debug_span!("load_credentials", provider = PROVIDER_NAME)),
        )
    }

    fn close(&self) -> Result<(), CloseError> {
        if let Ok(cache) = &self.inner {
            cache.close();
        }
        Ok(())
    }
}

/// Builder for [`ContainerCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    async_credential_update_enabled: Option<bool>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Refresh credentials on a background task ahead of expiry instead of on the calling task.
    ///
    /// Defaults to `false`.
    pub fn async_credential_update_enabled(mut self, enabled: bool) -> Self {
        self.async_credential_update_enabled = Some(enabled);
        self
    }

    /// Sets whether credentials are refreshed on a background task.
    pub fn set_async_credential_update_enabled(&mut self, enabled: Option<bool>) -> &mut Self {
        self.async_credential_update_enabled = enabled;
        self
    }

    /// Builds the provider. Configuration problems are reported when credentials are requested.
    pub fn build(self) -> ContainerCredentialsProvider {
        let conf = self.provider_config.unwrap_or_default();
        let inner = resolve_endpoint(&conf.properties(), &conf.env()).and_then(|endpoint| {
            let client = conf.http_client().ok_or(EndpointError::NoHttpClient)?;
            let fetcher = Arc::new(Fetcher {
                endpoint,
                http: HttpCredentialProvider::new(
                    client,
                    PROVIDER_NAME,
                    DEFAULT_TIMEOUT,
                    MAX_ATTEMPTS,
                ),
                properties: conf.properties(),
                env: conf.env(),
                fs: conf.fs(),
                time_source: conf.time_source(),
            });
            let strategy = if self.async_credential_update_enabled.unwrap_or(false) {
                PrefetchStrategy::NonBlocking
            } else {
                PrefetchStrategy::OneCallerBlocks
            };
            let mut cache = aws_cached_supplier::Builder::new()
                .name(PROVIDER_NAME)
                .prefetch_strategy(strategy)
                .sleep_impl(conf.sleep());
            cache.set_time_source(Some(conf.time_source()));
            Ok(cache.build(move || {
                let fetcher = fetcher.clone();
                async move { fetcher.refresh().await }
            }))
        });
        ContainerCredentialsProvider { inner }
    }
}

#[derive(Debug)]
struct Fetcher {
    endpoint: Uri,
    http: HttpCredentialProvider,
    properties: Properties,
    env: Env,
    fs: Fs,
    time_source: SharedTimeSource,
}

impl Fetcher {
    fn authorization(&self) -> Result<Option<String>, CredentialsError> {
        if let Some(path) =
            AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE.resolve(&self.properties, &self.env)
        {
            let token = self.fs.read_to_end(&path).map_err(|err| {
                CredentialsError::invalid_configuration(format!(
                    "failed to read the container authorization token from `{}`: {}",
                    path, err
                ))
            })?;
            let token = String::from_utf8(token).map_err(CredentialsError::invalid_configuration)?;
            return Ok(Some(token.trim().to_owned()));
        }
        Ok(AWS_CONTAINER_AUTHORIZATION_TOKEN.resolve(&self.properties, &self.env))
    }

    fn request(&self) -> Result<http::Request<Bytes>, CredentialsError> {
        let mut builder = http::Request::builder()
            .method("GET")
            .uri(self.endpoint.clone())
            .header(http::header::ACCEPT, "application/json");
        if let Some(token) = self.authorization()? {
            if token.contains(['\r', '\n']) {
                return Err(CredentialsError::invalid_configuration(
                    "the container authorization token contains an invalid character",
                ));
            }
            builder = builder.header(http::header::AUTHORIZATION, token);
        }
        builder
            .body(Bytes::new())
            .map_err(CredentialsError::invalid_configuration)
    }

    async fn refresh(&self) -> Result<RefreshResult<Credentials>, CredentialsError> {
        let credentials = self.http.credentials(|| self.request()).await?;
        Ok(refresh_result(credentials, self.time_source.now()))
    }
}

fn refresh_result(credentials: Credentials, now: SystemTime) -> RefreshResult<Credentials> {
    match credentials.expiry() {
        Some(expiry) => {
            let remaining = expiry.duration_since(now).unwrap_or_default();
            let stale_time = expiry.checked_sub(STALE_MARGIN).unwrap_or(expiry);
            let prefetch_time = expiry
                .checked_sub(MAX_PREFETCH_MARGIN.min(remaining / 2))
                .unwrap_or(expiry)
                .min(stale_time);
            RefreshResult::builder(credentials)
                .stale_time(stale_time)
                .prefetch_time(prefetch_time)
                .build()
        }
        None => RefreshResult::new(credentials),
    }
}
