/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from environment variables or system properties.

use crate::os_shim_internal::{Env, Properties};
use crate::provider_config::ProviderConfig;
use crate::setting::{
    SystemSetting, AWS_ACCESS_KEY_ID, AWS_ACCOUNT_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN,
};
use aws_credential_types::provider::{self, error::CredentialsError, future, ProvideCredentials};
use aws_credential_types::Credentials;

const ENVIRONMENT_PROVIDER_NAME: &str = "EnvironmentVariableCredentialsProvider";
const SYSTEM_PROPERTY_PROVIDER_NAME: &str = "SystemPropertyCredentialsProvider";

/// Builds credentials from one settings source. Both the environment and system property
/// providers read the same settings, each from its own source.
fn load_from_settings(
    provider_name: &'static str,
    source: &str,
    read: impl Fn(&SystemSetting) -> Option<String>,
    setting_name: impl Fn(&SystemSetting) -> &'static str,
) -> provider::Result {
    let access_key_id = read(&AWS_ACCESS_KEY_ID).ok_or_else(|| {
        CredentialsError::not_loaded(format!(
            "Unable to load credentials from {}: `{}` was not set",
            source,
            setting_name(&AWS_ACCESS_KEY_ID)
        ))
    })?;
    let secret_access_key = read(&AWS_SECRET_ACCESS_KEY).ok_or_else(|| {
        CredentialsError::not_loaded(format!(
            "Unable to load credentials from {}: `{}` was not set",
            source,
            setting_name(&AWS_SECRET_ACCESS_KEY)
        ))
    })?;
    let mut builder = Credentials::builder()
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key)
        .provider_name(provider_name);
    builder.set_session_token(read(&AWS_SESSION_TOKEN));
    builder.set_account_id(read(&AWS_ACCOUNT_ID).map(Into::into));
    builder.build().map_err(CredentialsError::invalid_configuration)
}

/// Load Credentials from Environment Variables
///
/// `EnvironmentVariableCredentialsProvider` uses the following variables:
/// - `AWS_ACCESS_KEY_ID`
/// - `AWS_SECRET_ACCESS_KEY`
/// - `AWS_SESSION_TOKEN` (optional)
/// - `AWS_ACCOUNT_ID` (optional)
///
/// Empty or blank values are treated as unset. The environment is read on every call.
#[derive(Debug, Clone)]
pub struct EnvironmentVariableCredentialsProvider {
    env: Env,
}

impl EnvironmentVariableCredentialsProvider {
    /// Create a `EnvironmentVariableCredentialsProvider` reading from the process environment
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for `EnvironmentVariableCredentialsProvider`
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    fn credentials(&self) -> provider::Result {
        load_from_settings(
            ENVIRONMENT_PROVIDER_NAME,
            "environment variables",
            |setting| {
                self.env
                    .get(setting.environment_variable())
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            },
            SystemSetting::environment_variable,
        )
    }
}

impl Default for EnvironmentVariableCredentialsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvideCredentials for EnvironmentVariableCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::ready(self.credentials())
    }
}

/// Builder for [`EnvironmentVariableCredentialsProvider`]
#[derive(Debug, Default)]
pub struct EnvironmentBuilder {
    provider_config: Option<ProviderConfig>,
}

impl EnvironmentBuilder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Builds the provider
    pub fn build(self) -> EnvironmentVariableCredentialsProvider {
        EnvironmentVariableCredentialsProvider {
            env: self.provider_config.unwrap_or_default().env(),
        }
    }
}

/// Load Credentials from system properties
///
/// `SystemPropertyCredentialsProvider` uses the following properties, set with
/// [`set_system_property`](crate::os_shim_internal::set_system_property):
/// - `aws.accessKeyId`
/// - `aws.secretAccessKey`
/// - `aws.sessionToken` (optional)
/// - `aws.accountId` (optional)
///
/// Empty or blank values are treated as unset. Properties are read on every call.
#[derive(Debug, Clone)]
pub struct SystemPropertyCredentialsProvider {
    properties: Properties,
}

impl SystemPropertyCredentialsProvider {
    /// Create a `SystemPropertyCredentialsProvider` reading from the process-wide properties
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for `SystemPropertyCredentialsProvider`
    pub fn builder() -> SystemPropertyBuilder {
        SystemPropertyBuilder::default()
    }

    fn credentials(&self) -> provider::Result {
        load_from_settings(
            SYSTEM_PROPERTY_PROVIDER_NAME,
            "system properties",
            |setting| {
                self.properties
                    .get(setting.property())
                    .filter(|value| !value.trim().is_empty())
            },
            SystemSetting::property,
        )
    }
}

impl Default for SystemPropertyCredentialsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvideCredentials for SystemPropertyCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::ready(self.credentials())
    }
}

/// Builder for [`SystemPropertyCredentialsProvider`]
#[derive(Debug, Default)]
pub struct SystemPropertyBuilder {
    provider_config: Option<ProviderConfig>,
}

impl SystemPropertyBuilder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Builds the provider
    pub fn build(self) -> SystemPropertyCredentialsProvider {
        SystemPropertyCredentialsProvider {
            properties: self.provider_config.unwrap_or_default().properties(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn env_provider(vars: &[(&str, &str)]) -> EnvironmentVariableCredentialsProvider {
        EnvironmentVariableCredentialsProvider::builder()
            .configure(&ProviderConfig::empty().with_env(Env::from_slice(vars)))
            .build()
    }

    fn property_provider(props: &[(&str, &str)]) -> SystemPropertyCredentialsProvider {
        SystemPropertyCredentialsProvider::builder()
            .configure(&ProviderConfig::empty().with_properties(Properties::from_slice(props)))
            .build()
    }

    #[tokio::test]
    async fn valid_no_token() {
        let creds = env_provider(&[("AWS_ACCESS_KEY_ID", "access"), ("AWS_SECRET_ACCESS_KEY", "secret")])
            .provide_credentials()
            .await
            .expect("valid credentials");
        assert_eq!(Some("access"), creds.access_key_id());
        assert_eq!(Some("secret"), creds.secret_access_key());
        assert_eq!(None, creds.session_token());
        assert_eq!(Some(ENVIRONMENT_PROVIDER_NAME), creds.provider_name());
    }

    #[tokio::test]
    async fn valid_with_token_and_account() {
        let creds = env_provider(&[
            ("AWS_ACCESS_KEY_ID", "access"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", "token"),
            ("AWS_ACCOUNT_ID", "123456789012"),
        ])
        .provide_credentials()
        .await
        .expect("valid credentials");
        assert_eq!(Some("token"), creds.session_token());
        assert_eq!("123456789012", creds.account_id().unwrap().as_str());
        assert!(creds.is_session());
    }

    #[tokio::test]
    async fn empty_token_is_ignored() {
        let creds = env_provider(&[
            ("AWS_ACCESS_KEY_ID", "access"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", ""),
        ])
        .provide_credentials()
        .await
        .expect("valid credentials");
        assert_eq!(None, creds.session_token());
    }

    #[tokio::test]
    async fn missing_keys_are_not_loaded() {
        let err = env_provider(&[])
            .provide_credentials()
            .await
            .expect_err("no credentials defined");
        assert!(err.is_not_loaded(), "{:?}", err);

        let err = env_provider(&[("AWS_ACCESS_KEY_ID", "access"), ("AWS_SECRET_ACCESS_KEY", "  ")])
            .provide_credentials()
            .await
            .expect_err("blank secret");
        assert!(err.is_not_loaded(), "{:?}", err);
    }

    #[tokio::test]
    async fn system_properties_ignore_the_environment() {
        let provider = SystemPropertyCredentialsProvider::builder()
            .configure(
                &ProviderConfig::empty()
                    .with_env(Env::from_slice(&[
                        ("AWS_ACCESS_KEY_ID", "env-access"),
                        ("AWS_SECRET_ACCESS_KEY", "env-secret"),
                    ]))
                    .with_properties(Properties::from_slice(&[])),
            )
            .build();
        assert!(provider.provide_credentials().await.unwrap_err().is_not_loaded());

        let creds = property_provider(&[
            ("aws.accessKeyId", "prop-access"),
            ("aws.secretAccessKey", "prop-secret"),
            ("aws.sessionToken", "prop-token"),
        ])
        .provide_credentials()
        .await
        .expect("valid credentials");
        assert_eq!(Some("prop-access"), creds.access_key_id());
        assert_eq!(Some("prop-token"), creds.session_token());
        assert_eq!(Some(SYSTEM_PROPERTY_PROVIDER_NAME), creds.provider_name());
    }

    #[tokio::test]
    async fn error_names_the_missing_property() {
        let err = property_provider(&[("aws.accessKeyId", "prop-access")])
            .provide_credentials()
            .await
            .expect_err("missing secret");
        let message = format!(
            "{}",
            aws_credential_types::provider::error::DisplayErrorContext(&err)
        );
        assert!(message.contains("aws.secretAccessKey"), "{}", message);
    }
}
