/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials by exchanging a web identity token for a role session
//!
//! The provider is configured by:
//! - `AWS_WEB_IDENTITY_TOKEN_FILE` / `aws.webIdentityTokenFile`: path to the token file
//! - `AWS_ROLE_ARN` / `aws.roleArn`: the role to assume
//! - `AWS_ROLE_SESSION_NAME` / `aws.roleSessionName` (optional): a session name is generated
//!   when unset
//!
//! Exchanging the token requires a call to the security token service, which this crate does not
//! make itself. Register a [`WebIdentityCredentialsFactory`] that builds a provider for a given set
//! of [`WebIdentityTokenProperties`].

use crate::os_shim_internal::{Env, Properties};
use crate::provider_config::ProviderConfig;
use crate::setting::{AWS_ROLE_ARN, AWS_ROLE_SESSION_NAME, AWS_WEB_IDENTITY_TOKEN_FILE};
use aws_cached_supplier::time::SharedTimeSource;
use aws_credential_types::provider::error::{CloseError, CredentialsError};
use aws_credential_types::provider::{
    self, future, ProvideCredentials, SharedCredentialsProvider,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::Instrument;

const PROVIDER_NAME: &str = "WebIdentityTokenCredentialsProvider";

/// Everything needed to exchange a web identity token for role credentials
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WebIdentityTokenProperties {
    role_arn: String,
    role_session_name: String,
    web_identity_token_file: PathBuf,
    async_credential_update_enabled: bool,
}

impl WebIdentityTokenProperties {
    /// Creates a new set of web identity token properties
    pub fn new(
        role_arn: impl Into<String>,
        web_identity_token_file: impl Into<PathBuf>,
        role_session_name: impl Into<String>,
    ) -> Self {
        Self {
            role_arn: role_arn.into(),
            role_session_name: role_session_name.into(),
            web_identity_token_file: web_identity_token_file.into(),
            async_credential_update_enabled: false,
        }
    }

    /// Requests that the created provider refresh its credentials on a background task
    pub fn async_credential_update_enabled(mut self, enabled: bool) -> Self {
        self.async_credential_update_enabled = enabled;
        self
    }

    /// The role to assume
    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// The session name of the assumed role
    pub fn role_session_name(&self) -> &str {
        &self.role_session_name
    }

    /// The file containing the web identity token
    pub fn web_identity_token_file(&self) -> &Path {
        &self.web_identity_token_file
    }

    /// Whether the created provider should refresh credentials on a background task
    pub fn is_async_credential_update_enabled(&self) -> bool {
        self.async_credential_update_enabled
    }
}

/// Builds credentials providers that assume a role with a web identity token
pub trait WebIdentityCredentialsFactory: Send + Sync + fmt::Debug {
    /// Creates a provider for `properties`
    fn create(&self, properties: WebIdentityTokenProperties) -> SharedCredentialsProvider;
}

/// A [`WebIdentityCredentialsFactory`] that may be shared
#[derive(Clone, Debug)]
pub struct SharedWebIdentityCredentialsFactory(Arc<dyn WebIdentityCredentialsFactory>);

impl SharedWebIdentityCredentialsFactory {
    /// Wraps `factory` in an internal `Arc`
    pub fn new(factory: impl WebIdentityCredentialsFactory + 'static) -> Self {
        Self(Arc::new(factory))
    }
}

impl WebIdentityCredentialsFactory for SharedWebIdentityCredentialsFactory {
    fn create(&self, properties: WebIdentityTokenProperties) -> SharedCredentialsProvider {
        self.0.create(properties)
    }
}

/// Generates a session name from the current time, for when none was configured
pub(crate) fn default_session_name(time_source: &SharedTimeSource) -> String {
    let millis = time_source
        .now()
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_millis())
        .unwrap_or_default();
    format!("aws-sdk-rust-{}", millis)
}

/// The web identity provider could not be configured
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum WebIdentityConfigError {
    /// No token file was configured
    MissingTokenFile,
    /// No role was configured
    MissingRoleArn,
    /// The provider is configured but nothing can exchange the token
    NoFactory,
}

impl fmt::Display for WebIdentityConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebIdentityConfigError::MissingTokenFile => write!(
                f,
                "web identity token file was not configured: set {}",
                AWS_WEB_IDENTITY_TOKEN_FILE
            ),
            WebIdentityConfigError::MissingRoleArn => {
                write!(f, "role to assume was not configured: set {}", AWS_ROLE_ARN)
            }
            WebIdentityConfigError::NoFactory => write!(
                f,
                "web identity credentials are configured but no web identity credentials factory was registered"
            ),
        }
    }
}

impl std::error::Error for WebIdentityConfigError {}

impl From<WebIdentityConfigError> for CredentialsError {
    fn from(err: WebIdentityConfigError) -> Self {
        match err {
            WebIdentityConfigError::NoFactory => CredentialsError::invalid_configuration(err),
            _ => CredentialsError::not_loaded(err),
        }
    }
}

/// Credentials provider that assumes a role with a web identity token
///
/// ```rust
/// use aws_credential_providers::web_identity::WebIdentityTokenCredentialsProvider;
///
/// // Credential requests fail until a token file, a role and a factory are configured.
/// let provider = WebIdentityTokenCredentialsProvider::builder().build();
/// ```
#[derive(Debug)]
pub struct WebIdentityTokenCredentialsProvider {
    inner: Result<SharedCredentialsProvider, WebIdentityConfigError>,
}

impl WebIdentityTokenCredentialsProvider {
    /// Builder for this provider
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn credentials(&self) -> provider::Result {
        match &self.inner {
            Ok(provider) => provider.provide_credentials().await,
            Err(err) => Err(err.clone().into()),
        }
    }
}

impl ProvideCredentials for WebIdentityTokenCredentialsProvider {
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
        match &self.inner {
            Ok(provider) => provider.close(),
            Err(_) => Ok(()),
        }
    }
}

/// Builder for [`WebIdentityTokenCredentialsProvider`]
///
/// Values set on the builder take priority over system properties and environment variables.
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    factory: Option<SharedWebIdentityCredentialsFactory>,
    role_arn: Option<String>,
    role_session_name: Option<String>,
    web_identity_token_file: Option<PathBuf>,
    async_credential_update_enabled: Option<bool>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Factory used to build the provider that exchanges the token
    pub fn factory(mut self, factory: impl WebIdentityCredentialsFactory + 'static) -> Self {
        self.factory = Some(SharedWebIdentityCredentialsFactory::new(factory));
        self
    }

    /// Sets the factory used to build the provider that exchanges the token
    pub fn set_factory(
        &mut self,
        factory: Option<SharedWebIdentityCredentialsFactory>,
    ) -> &mut Self {
        self.factory = factory;
        self
    }

    /// The role to assume
    pub fn role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    /// The session name of the assumed role
    pub fn role_session_name(mut self, role_session_name: impl Into<String>) -> Self {
        self.role_session_name = Some(role_session_name.into());
        self
    }

    /// The file containing the web identity token
    pub fn web_identity_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.web_identity_token_file = Some(path.into());
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
    pub fn build(self) -> WebIdentityTokenCredentialsProvider {
        let conf = self.provider_config.unwrap_or_default();
        let (properties, env) = (conf.properties(), conf.env());
        let inner = resolve_properties(
            self.web_identity_token_file,
            self.role_arn,
            self.role_session_name,
            &properties,
            &env,
            &conf.time_source(),
        )
        .and_then(|token_properties| {
            let factory = self.factory.ok_or(WebIdentityConfigError::NoFactory)?;
            let token_properties = token_properties
                .async_credential_update_enabled(self.async_credential_update_enabled.unwrap_or(false));
            tracing::debug!(role_arn = %token_properties.role_arn(), "creating web identity provider");
            Ok(factory.create(token_properties))
        });
        WebIdentityTokenCredentialsProvider { inner }
    }
}

fn resolve_properties(
    web_identity_token_file: Option<PathBuf>,
    role_arn: Option<String>,
    role_session_name: Option<String>,
    properties: &Properties,
    env: &Env,
    time_source: &SharedTimeSource,
) -> Result<WebIdentityTokenProperties, WebIdentityConfigError> {
    let token_file = web_identity_token_file
        .or_else(|| AWS_WEB_IDENTITY_TOKEN_FILE.resolve(properties, env).map(PathBuf::from))
        .ok_or(WebIdentityConfigError::MissingTokenFile)?;
    let role_arn = role_arn
        .or_else(|| AWS_ROLE_ARN.resolve(properties, env))
        .ok_or(WebIdentityConfigError::MissingRoleArn)?;
    let session_name = role_session_name
        .or_else(|| AWS_ROLE_SESSION_NAME.resolve(properties, env))
        .unwrap_or_else(|| default_session_name(time_source));
    Ok(WebIdentityTokenProperties::new(
        role_arn,
        token_file,
        session_name,
    ))
}
