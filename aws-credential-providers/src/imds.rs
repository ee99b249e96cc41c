/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Instance Metadata Service (IMDS) Credentials Provider
//!
//! Credentials are loaded with an IMDSv2 session token. If the token request fails for any reason
//! other than a `400`, the provider falls back to unauthenticated (IMDSv1) metadata calls unless
//! `AWS_EC2_METADATA_V1_DISABLED` is `true`.
//!
//! Credentials are cached with an outage-tolerant policy: when the metadata service is unreachable
//! or returns credentials that have already expired, the last credentials are served for a short,
//! jittered period instead of failing.

use crate::http_client::{HttpClient, SharedHttpClient};
use crate::http_credential_provider::parse_response;
use crate::provider_config::ProviderConfig;
use crate::setting::{
    AWS_EC2_METADATA_DISABLED, AWS_EC2_METADATA_SERVICE_ENDPOINT, AWS_EC2_METADATA_V1_DISABLED,
};
use aws_cached_supplier::time::SharedTimeSource;
use aws_cached_supplier::{CachedSupplier, PrefetchStrategy, RefreshResult, StaleValueBehavior};
use aws_credential_types::provider::error::{CloseError, CredentialsError, DisplayErrorContext};
use aws_credential_types::provider::{self, future, ProvideCredentials};
use aws_credential_types::Credentials;
use bytes::Bytes;
use http::{StatusCode, Uri};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::Instrument;

const PROVIDER_NAME: &str = "InstanceProfileCredentialsProvider";
const TOKEN_PATH: &str = "/latest/api/token";
const SECURITY_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(21_600);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_PREFETCH_DELAY: Duration = Duration::from_secs(5 * 60);
const NO_EXPIRY_PREFETCH_DELAY: Duration = Duration::from_secs(60 * 60);
const STALE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
enum ImdsConfigError {
    Disabled,
    InvalidEndpoint { endpoint: String, message: String },
    NoHttpClient,
}

impl fmt::Display for ImdsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImdsConfigError::Disabled => write!(
                f,
                "IMDS credentials have been disabled by environment variable or system property."
            ),
            ImdsConfigError::InvalidEndpoint { endpoint, message } => {
                write!(f, "invalid IMDS endpoint `{}`: {}", endpoint, message)
            }
            ImdsConfigError::NoHttpClient => {
                write!(f, "no HTTP client is configured for the IMDS credentials provider")
            }
        }
    }
}

impl std::error::Error for ImdsConfigError {}

impl From<ImdsConfigError> for CredentialsError {
    fn from(err: ImdsConfigError) -> Self {
        match err {
            ImdsConfigError::Disabled => CredentialsError::not_loaded(err),
            _ => CredentialsError::invalid_configuration(err),
        }
    }
}

/// IMDSv2 Credentials Provider
///
/// Loads the credentials of the instance profile attached to the current EC2 instance.
#[derive(Debug)]
pub struct InstanceProfileCredentialsProvider {
    inner: Result<CachedSupplier<Credentials, CredentialsError>, ImdsConfigError>,
}

impl InstanceProfileCredentialsProvider {
    /// Builder for [`InstanceProfileCredentialsProvider`]
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

impl ProvideCredentials for InstanceProfileCredentialsProvider {
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

/// Builder for [`InstanceProfileCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    endpoint: Option<String>,
    token_ttl: Option<Duration>,
    async_credential_update_enabled: Option<bool>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Override the IMDS endpoint. Defaults to `AWS_EC2_METADATA_SERVICE_ENDPOINT`, then
    /// `http://169.254.169.254`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Lifetime requested for IMDS session tokens. Defaults to 6 hours.
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    /// Refresh credentials on a background task ahead of expiry instead of on the calling task.
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
    pub fn build(self) -> InstanceProfileCredentialsProvider {
        let conf = self.provider_config.unwrap_or_default();
        let (properties, env) = (conf.properties(), conf.env());
        let token_ttl = self.token_ttl.unwrap_or(DEFAULT_TOKEN_TTL);
        let async_update = self.async_credential_update_enabled.unwrap_or(false);
        let endpoint = self
            .endpoint
            .or_else(|| AWS_EC2_METADATA_SERVICE_ENDPOINT.resolve(&properties, &env));
        let inner = if AWS_EC2_METADATA_DISABLED.resolve_bool(&properties, &env) {
            Err(ImdsConfigError::Disabled)
        } else {
            endpoint_uri(endpoint.as_deref().unwrap_or_default()).and_then(|endpoint| {
                let client = conf.http_client().ok_or(ImdsConfigError::NoHttpClient)?;
                let fetcher = Arc::new(Fetcher {
                    endpoint,
                    client,
                    token_ttl,
                    v1_disabled: AWS_EC2_METADATA_V1_DISABLED.resolve_bool(&properties, &env),
                    time_source: conf.time_source(),
                });
                let mut cache = aws_cached_supplier::Builder::new()
                    .name(PROVIDER_NAME)
                    .prefetch_strategy(if async_update {
                        PrefetchStrategy::NonBlocking
                    } else {
                        PrefetchStrategy::OneCallerBlocks
                    })
                    .stale_value_behavior(StaleValueBehavior::Allow)
                    .sleep_impl(conf.sleep());
                cache.set_time_source(Some(conf.time_source()));
                Ok(cache.build(move || {
                    let fetcher = fetcher.clone();
                    async move { fetcher.refresh().await }
                }))
            })
        };
        InstanceProfileCredentialsProvider { inner }
    }
}

fn endpoint_uri(endpoint: &str) -> Result<Uri, ImdsConfigError> {
    let invalid = |message: String| ImdsConfigError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        message,
    };
    let uri = endpoint
        .trim_end_matches('/')
        .parse::<Uri>()
        .map_err(|err| invalid(err.to_string()))?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(invalid("expected an absolute URI".into()));
    }
    Ok(uri)
}

#[derive(Debug)]
struct Fetcher {
    endpoint: Uri,
    client: SharedHttpClient,
    token_ttl: Duration,
    v1_disabled: bool,
    time_source: SharedTimeSource,
}

impl Fetcher {
    fn uri(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.to_string().trim_end_matches('/'), path)
    }

    fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<http::Request<Bytes>, CredentialsError> {
        let mut builder = http::Request::builder().method(method).uri(self.uri(path));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder
            .body(Bytes::new())
            .map_err(CredentialsError::invalid_configuration)
    }

    /// Fetches a session token. `Ok(None)` means fall back to unauthenticated calls.
    async fn token(&self) -> Result<Option<String>, CredentialsError> {
        let ttl = self.token_ttl.as_secs().to_string();
        let request = self.request("PUT", TOKEN_PATH, &[(TOKEN_TTL_HEADER, &ttl)])?;
        let failure = match self.client.call(request, DEFAULT_TIMEOUT).await {
            Ok(response) if response.status().is_success() => {
                let token = std::str::from_utf8(response.body())
                    .map_err(CredentialsError::unhandled)?
                    .trim()
                    .to_owned();
                return Ok(Some(token));
            }
            Ok(response) if response.status() == StatusCode::BAD_REQUEST => {
                return Err(CredentialsError::provider_error(
                    "the IMDS session token request was rejected as invalid (400)",
                ));
            }
            Ok(response) => format!("token request returned {}", response.status()),
            Err(err) => DisplayErrorContext(&err).to_string(),
        };
        if self.v1_disabled {
            return Err(CredentialsError::provider_error(format!(
                "failed to load an IMDS session token and IMDSv1 fallback is disabled: {}",
                failure
            )));
        }
        tracing::debug!(reason = %failure, "falling back to IMDSv1");
        Ok(None)
    }

    async fn get(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<http::Response<Bytes>, CredentialsError> {
        let request = match token {
            Some(token) => self.request("GET", path, &[(TOKEN_HEADER, token)])?,
            None => self.request("GET", path, &[])?,
        };
        self.client
            .call(request, DEFAULT_TIMEOUT)
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CredentialsError::provider_timed_out(DEFAULT_TIMEOUT)
                } else {
                    CredentialsError::provider_error(err)
                }
            })
    }

    async fn role_name(&self, token: Option<&str>) -> Result<String, CredentialsError> {
        let response = self.get(SECURITY_CREDENTIALS_PATH, token).await?;
        if !response.status().is_success() {
            return Err(CredentialsError::provider_error(format!(
                "failed to load the instance profile name: IMDS returned {}",
                response.status()
            )));
        }
        let body = std::str::from_utf8(response.body()).map_err(CredentialsError::unhandled)?;
        body.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                CredentialsError::provider_error("no instance profile is attached to this instance")
            })
    }

    async fn refresh(&self) -> Result<RefreshResult<Credentials>, CredentialsError> {
        let token = self.token().await?;
        let role = self.role_name(token.as_deref()).await?;
        let path = format!("{}{}", SECURITY_CREDENTIALS_PATH, role);
        let response = self.get(&path, token.as_deref()).await?;
        let credentials = parse_response(&response, PROVIDER_NAME)?;
        tracing::debug!(role = %role, expiry = ?credentials.expiry(), "loaded credentials from IMDS");
        Ok(refresh_result(credentials, self.time_source.now()))
    }
}

fn refresh_result(credentials: Credentials, now: SystemTime) -> RefreshResult<Credentials> {
    match credentials.expiry() {
        Some(expiry) => {
            let stale_time = expiry.checked_sub(STALE_MARGIN).unwrap_or(expiry);
            let remaining = expiry.duration_since(now).unwrap_or_default();
            let prefetch_time = (now + MIN_PREFETCH_DELAY.max(remaining / 2)).min(stale_time);
            RefreshResult::builder(credentials)
                .stale_time(stale_time)
                .prefetch_time(prefetch_time)
                .build()
        }
        None => {
            let prefetch_time = now + NO_EXPIRY_PREFETCH_DELAY;
            RefreshResult::builder(credentials)
                .prefetch_time(prefetch_time)
                .build()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http_client::test_util::{request, response, ReplayEvent, ReplayingClient};
    use crate::os_shim_internal::Env;
    use aws_cached_supplier::test_util::ManualTimeSource;
    use std::time::UNIX_EPOCH;
    use tracing_test::traced_test;

    // 2021-09-18T03:31:56Z
    const EXPIRATION_SECS: u64 = 1631935916;
    const CREDS: &str = r#"{
        "Code" : "Success",
        "LastUpdated" : "2021-09-17T20:57:08Z",
        "Type" : "AWS-HMAC",
        "AccessKeyId" : "ASIARTEST",
        "SecretAccessKey" : "xjtest",
        "Token" : "IQote///test",
        "Expiration" : "2021-09-18T03:31:56Z"
    }"#;

    fn token_request() -> http::Request<Bytes> {
        request(
            "PUT",
            "http://169.254.169.254/latest/api/token",
            &[(TOKEN_TTL_HEADER, "21600")],
        )
    }

    fn role_request(token: Option<&str>) -> http::Request<Bytes> {
        match token {
            Some(token) => request(
                "GET",
                "http://169.254.169.254/latest/meta-data/iam/security-credentials/",
                &[(TOKEN_HEADER, token)],
            ),
            None => request(
                "GET",
                "http://169.254.169.254/latest/meta-data/iam/security-credentials/",
                &[],
            ),
        }
    }

    fn creds_request(token: Option<&str>) -> http::Request<Bytes> {
        let uri = "http://169.254.169.254/latest/meta-data/iam/security-credentials/my-role";
        match token {
            Some(token) => request("GET", uri, &[(TOKEN_HEADER, token)]),
            None => request("GET", uri, &[]),
        }
    }

    fn provider(
        env: &[(&str, &str)],
        client: &ReplayingClient,
        now: &ManualTimeSource,
    ) -> InstanceProfileCredentialsProvider {
        InstanceProfileCredentialsProvider::builder()
            .configure(
                &ProviderConfig::empty()
                    .with_env(Env::from_slice(env))
                    .with_http_client(client.clone())
                    .with_time_source(now.clone()),
            )
            .build()
    }

    fn epoch_secs(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn loads_credentials_with_a_session_token() {
        let client = ReplayingClient::new(vec![
            ReplayEvent::new(token_request(), response(200, "imds-token")),
            ReplayEvent::new(role_request(Some("imds-token")), response(200, "my-role\nother-role")),
            ReplayEvent::new(creds_request(Some("imds-token")), response(200, CREDS)),
        ]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        let provider = provider(&[], &client, &now);
        let creds = provider.provide_credentials().await.expect("valid creds");
        assert_eq!(Some("ASIARTEST"), creds.access_key_id());
        assert_eq!(Some(epoch_secs(EXPIRATION_SECS)), creds.expiry());
        assert_eq!(Some(PROVIDER_NAME), creds.provider_name());
        client.assert_requests_match();
    }

    #[tokio::test]
    async fn token_failure_falls_back_to_v1() {
        let client = ReplayingClient::new(vec![
            ReplayEvent::new(token_request(), response(403, "")),
            ReplayEvent::new(role_request(None), response(200, "my-role")),
            ReplayEvent::new(creds_request(None), response(200, CREDS)),
        ]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        provider(&[], &client, &now)
            .provide_credentials()
            .await
            .expect("v1 fallback");
        client.assert_requests_match();
        client.assert_header_absent(1, TOKEN_HEADER);
        client.assert_header_absent(2, TOKEN_HEADER);
    }

    #[tokio::test]
    async fn token_timeout_falls_back_to_v1() {
        let client = ReplayingClient::new(vec![
            ReplayEvent::timeout(token_request()),
            ReplayEvent::new(role_request(None), response(200, "my-role")),
            ReplayEvent::new(creds_request(None), response(200, CREDS)),
        ]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        provider(&[], &client, &now)
            .provide_credentials()
            .await
            .expect("v1 fallback");
        client.assert_requests_match();
    }

    #[tokio::test]
    async fn token_400_is_a_hard_failure() {
        let client = ReplayingClient::new(vec![ReplayEvent::new(token_request(), response(400, ""))]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        let err = provider(&[], &client, &now)
            .provide_credentials()
            .await
            .expect_err("400");
        assert!(matches!(err, CredentialsError::ProviderError(_)), "{:?}", err);
        assert_eq!(1, client.request_count());
    }

    #[tokio::test]
    async fn v1_fallback_can_be_disabled() {
        let client = ReplayingClient::new(vec![ReplayEvent::new(token_request(), response(403, ""))]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        let err = provider(&[("AWS_EC2_METADATA_V1_DISABLED", "true")], &client, &now)
            .provide_credentials()
            .await
            .expect_err("no fallback");
        assert!(
            DisplayErrorContext(&err).to_string().contains("IMDSv1 fallback is disabled"),
            "{}",
            DisplayErrorContext(&err)
        );
        assert_eq!(1, client.request_count());
    }

    #[tokio::test]
    async fn disabled_by_environment() {
        let client = ReplayingClient::new(vec![]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        let err = provider(&[("AWS_EC2_METADATA_DISABLED", "TRUE")], &client, &now)
            .provide_credentials()
            .await
            .expect_err("disabled");
        assert!(DisplayErrorContext(&err)
            .to_string()
            .contains("IMDS credentials have been disabled"));
        assert_eq!(0, client.request_count());
    }

    #[tokio::test]
    async fn endpoint_override() {
        let client = ReplayingClient::new(vec![
            ReplayEvent::new(
                request("PUT", "http://[fd00:ec2::254]/latest/api/token", &[]),
                response(200, "t"),
            ),
            ReplayEvent::new(
                request("GET", "http://[fd00:ec2::254]/latest/meta-data/iam/security-credentials/", &[]),
                response(200, "my-role"),
            ),
            ReplayEvent::new(
                request("GET", "http://[fd00:ec2::254]/latest/meta-data/iam/security-credentials/my-role", &[]),
                response(200, CREDS),
            ),
        ]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        provider(
            &[("AWS_EC2_METADATA_SERVICE_ENDPOINT", "http://[fd00:ec2::254]/")],
            &client,
            &now,
        )
        .provide_credentials()
        .await
        .expect("valid creds");
        client.assert_requests_match();
    }

    #[tokio::test]
    #[traced_test]
    async fn expired_credentials_are_served_during_an_outage() {
        let client = ReplayingClient::new(vec![
            ReplayEvent::new(token_request(), response(200, "imds-token")),
            ReplayEvent::new(role_request(Some("imds-token")), response(200, "my-role")),
            ReplayEvent::new(creds_request(Some("imds-token")), response(200, CREDS)),
            ReplayEvent::io_error(token_request()),
            ReplayEvent::io_error(role_request(None)),
        ]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS - 3600));
        let provider = provider(&[], &client, &now);
        let first = provider.provide_credentials().await.expect("valid creds");

        // an hour after expiry the metadata service is unreachable
        now.set_time(epoch_secs(EXPIRATION_SECS + 3600));
        let second = provider
            .provide_credentials()
            .await
            .expect("stale credentials are served");
        assert_eq!(first, second);
        assert_eq!(5, client.request_count());

        // the extension means IMDS is not called again right away
        let third = provider.provide_credentials().await.expect("still served");
        assert_eq!(first, third);
        assert_eq!(5, client.request_count());
    }

    #[tokio::test]
    async fn already_expired_credentials_are_accepted() {
        let client = ReplayingClient::new(vec![
            ReplayEvent::new(token_request(), response(200, "imds-token")),
            ReplayEvent::new(role_request(Some("imds-token")), response(200, "my-role")),
            ReplayEvent::new(creds_request(Some("imds-token")), response(200, CREDS)),
        ]);
        let now = ManualTimeSource::new(epoch_secs(EXPIRATION_SECS + 60));
        let provider = provider(&[], &client, &now);
        provider
            .provide_credentials()
            .await
            .expect("expired creds accepted");
        provider
            .provide_credentials()
            .await
            .expect("expired creds accepted");
        assert_eq!(3, client.request_count());
    }

    #[test]
    fn refresh_times() {
        let expiry = epoch_secs(EXPIRATION_SECS);
        let creds = Credentials::builder()
            .access_key_id("a")
            .secret_access_key("b")
            .expiry(expiry)
            .build()
            .unwrap();

        let now = expiry - Duration::from_secs(6 * 3600);
        let result = refresh_result(creds.clone(), now);
        assert_eq!(Some(expiry - Duration::from_secs(1)), result.stale_time());
        assert_eq!(Some(now + Duration::from_secs(3 * 3600)), result.prefetch_time());

        let now = expiry - Duration::from_secs(240);
        let result = refresh_result(creds, now);
        assert_eq!(Some(expiry - Duration::from_secs(1)), result.prefetch_time());

        let no_expiry = Credentials::from_keys("a", "b", None);
        let now = epoch_secs(0);
        let result = refresh_result(no_expiry, now);
        assert_eq!(None, result.stale_time());
        assert_eq!(Some(now + Duration::from_secs(3600)), result.prefetch_time());
    }
}
