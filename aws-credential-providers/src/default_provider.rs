/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Default credentials provider chain

use crate::chain::CredentialsProviderChain;
use crate::container::ContainerCredentialsProvider;
use crate::environment::{EnvironmentVariableCredentialsProvider, SystemPropertyCredentialsProvider};
use crate::imds::InstanceProfileCredentialsProvider;
use crate::profile::{self, AssumeRoleProviderFactory, SharedAssumeRoleProviderFactory};
use crate::provider_config::ProviderConfig;
use crate::web_identity::{self, SharedWebIdentityCredentialsFactory, WebIdentityCredentialsFactory};
use aws_credential_types::provider::error::CloseError;
use aws_credential_types::provider::{future, ProvideCredentials};

/// Default AWS Credential Provider Chain
///
/// Resolution order:
/// 1. System properties: [`SystemPropertyCredentialsProvider`]
/// 2. Environment variables: [`EnvironmentVariableCredentialsProvider`]
/// 3. Web identity token: [`WebIdentityTokenCredentialsProvider`](crate::web_identity::WebIdentityTokenCredentialsProvider)
/// 4. Shared config (`~/.aws/config`, `~/.aws/credentials`): [`ProfileCredentialsProvider`](crate::profile::ProfileCredentialsProvider)
/// 5. Container credentials: [`ContainerCredentialsProvider`]
/// 6. Instance metadata: [`InstanceProfileCredentialsProvider`]
///
/// Once a provider succeeds, later requests go straight to it.
///
/// ## Example:
/// Create a default chain with no overrides:
/// ```rust
/// let credentials_provider = aws_credential_providers::default_provider::default_provider();
/// ```
///
/// Create a default chain that refreshes credentials in the background:
/// ```rust
/// use aws_credential_providers::default_provider::DefaultCredentialsProvider;
/// let credentials_provider = DefaultCredentialsProvider::builder()
///     .async_credential_update_enabled(true)
///     .build();
/// ```
#[derive(Debug)]
pub struct DefaultCredentialsProvider(CredentialsProviderChain);

/// Builds the default chain with no overrides
pub fn default_provider() -> DefaultCredentialsProvider {
    DefaultCredentialsProvider::builder().build()
}

impl DefaultCredentialsProvider {
    /// Builder for the default chain
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl ProvideCredentials for DefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        self.0.provide_credentials()
    }

    fn close(&self) -> Result<(), CloseError> {
        self.0.close()
    }
}

/// Builder for [`DefaultCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    profile_name: Option<String>,
    assume_role_factory: Option<SharedAssumeRoleProviderFactory>,
    web_identity_factory: Option<SharedWebIdentityCredentialsFactory>,
    async_credential_update_enabled: Option<bool>,
    reuse_last_provider_enabled: Option<bool>,
}

impl Builder {
    /// Override the configuration used by every provider in the chain
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Load profile credentials from this profile instead of the one named by `AWS_PROFILE`
    pub fn profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = Some(profile_name.into());
        self
    }

    /// Factory used for profiles that assume a role
    pub fn assume_role_factory(mut self, factory: impl AssumeRoleProviderFactory + 'static) -> Self {
        self.assume_role_factory = Some(SharedAssumeRoleProviderFactory::new(factory));
        self
    }

    /// Factory used to exchange web identity tokens, both for `AWS_WEB_IDENTITY_TOKEN_FILE` and
    /// for profiles
    pub fn web_identity_factory(
        mut self,
        factory: impl WebIdentityCredentialsFactory + 'static,
    ) -> Self {
        self.web_identity_factory = Some(SharedWebIdentityCredentialsFactory::new(factory));
        self
    }

    /// Refresh credentials on a background task ahead of expiry for every caching provider in the
    /// chain.
    pub fn async_credential_update_enabled(mut self, enabled: bool) -> Self {
        self.async_credential_update_enabled = Some(enabled);
        self
    }

    /// Whether to go straight to the provider that last succeeded. Defaults to `true`.
    pub fn reuse_last_provider_enabled(mut self, enabled: bool) -> Self {
        self.reuse_last_provider_enabled = Some(enabled);
        self
    }

    /// Builds the chain
    pub fn build(self) -> DefaultCredentialsProvider {
        let conf = self.provider_config.unwrap_or_default();

        let system_properties = SystemPropertyCredentialsProvider::builder()
            .configure(&conf)
            .build();
        let environment = EnvironmentVariableCredentialsProvider::builder()
            .configure(&conf)
            .build();

        let mut web_identity = web_identity::WebIdentityTokenCredentialsProvider::builder()
            .configure(&conf);
        web_identity
            .set_factory(self.web_identity_factory.clone())
            .set_async_credential_update_enabled(self.async_credential_update_enabled);

        let mut profile = profile::ProfileCredentialsProvider::builder().configure(&conf);
        profile
            .set_profile_name(self.profile_name)
            .set_assume_role_factory(self.assume_role_factory)
            .set_web_identity_factory(self.web_identity_factory)
            .set_async_credential_update_enabled(self.async_credential_update_enabled);

        let mut container = ContainerCredentialsProvider::builder().configure(&conf);
        container.set_async_credential_update_enabled(self.async_credential_update_enabled);

        let mut imds = InstanceProfileCredentialsProvider::builder().configure(&conf);
        imds.set_async_credential_update_enabled(self.async_credential_update_enabled);

        let chain = CredentialsProviderChain::first_try("SystemProperty", system_properties)
            .or_else("Environment", environment)
            .or_else("WebIdentityToken", web_identity.build())
            .or_else("Profile", profile.build())
            .or_else("EcsContainer", container.build())
            .or_else("Ec2InstanceMetadata", imds.build())
            .reuse_last_provider_enabled(self.reuse_last_provider_enabled.unwrap_or(true));
        DefaultCredentialsProvider(chain)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os_shim_internal::{Env, Fs, Properties};
    use aws_credential_types::provider::error::CredentialsError;

    fn conf(env: &[(&str, &str)]) -> ProviderConfig {
        ProviderConfig::empty()
            .with_env(Env::from_slice(env))
            .with_fs(Fs::from_slice(&[(
                "/credentials",
                "[default]\naws_access_key_id = PROFILE\naws_secret_access_key = secret\n",
            )]))
    }

    #[tokio::test]
    async fn system_properties_come_first() {
        let conf = conf(&[
            ("AWS_ACCESS_KEY_ID", "ENV"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ])
        .with_properties(Properties::from_slice(&[
            ("aws.accessKeyId", "PROPERTY"),
            ("aws.secretAccessKey", "secret"),
        ]));
        let creds = DefaultCredentialsProvider::builder()
            .configure(&conf)
            .build()
            .provide_credentials()
            .await
            .expect("system properties");
        assert_eq!(Some("PROPERTY"), creds.access_key_id());
    }

    #[tokio::test]
    async fn environment_before_profile() {
        let conf = conf(&[
            ("AWS_ACCESS_KEY_ID", "ENV"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SHARED_CREDENTIALS_FILE", "/credentials"),
        ]);
        let creds = DefaultCredentialsProvider::builder()
            .configure(&conf)
            .build()
            .provide_credentials()
            .await
            .expect("environment");
        assert_eq!(Some("ENV"), creds.access_key_id());
    }

    #[tokio::test]
    async fn falls_back_to_profile() {
        let conf = conf(&[("AWS_SHARED_CREDENTIALS_FILE", "/credentials")]);
        let creds = default_chain(&conf)
            .provide_credentials()
            .await
            .expect("profile");
        assert_eq!(Some("PROFILE"), creds.access_key_id());
    }

    fn default_chain(conf: &ProviderConfig) -> DefaultCredentialsProvider {
        DefaultCredentialsProvider::builder().configure(conf).build()
    }

    #[tokio::test]
    async fn reports_every_provider_in_order() {
        let conf = conf(&[("AWS_EC2_METADATA_DISABLED", "true")]);
        let err = default_chain(&conf)
            .provide_credentials()
            .await
            .expect_err("nothing configured");
        match err {
            CredentialsError::ChainExhausted(details) => {
                let names: Vec<_> = details.failures().iter().map(|f| f.name()).collect();
                assert_eq!(
                    vec![
                        "SystemProperty",
                        "Environment",
                        "WebIdentityToken",
                        "Profile",
                        "EcsContainer",
                        "Ec2InstanceMetadata"
                    ],
                    names
                );
            }
            other => panic!("expected an exhausted chain, got {:?}", other),
        }
    }
}
