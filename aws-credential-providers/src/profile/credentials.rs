/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Profile file based credentials
//!
//! A profile resolves to exactly one source of credentials. The first of these that the profile
//! configures wins:
//! 1. `role_arn` and `web_identity_token_file`: a role assumed with a web identity token
//! 2. `role_arn` and either `source_profile` or `credential_source`: a role assumed with
//!    credentials from another profile or from a named provider
//! 3. `credential_process`: an external process
//! 4. `aws_session_token`: static session credentials
//! 5. `aws_access_key_id`: static credentials
//!
//! Assuming a role requires a call to the security token service, which this crate does not make
//! itself. Those steps are delegated to an [`AssumeRoleProviderFactory`] or a
//! [`WebIdentityCredentialsFactory`] registered on the [`Builder`].

use super::parser::ProfileParseError;
use super::source;
use super::{Profile, ProfileSet};
use crate::chain::CredentialsProviderChain;
use crate::container::ContainerCredentialsProvider;
use crate::environment::{EnvironmentVariableCredentialsProvider, SystemPropertyCredentialsProvider};
use crate::imds::InstanceProfileCredentialsProvider;
use crate::process::ProcessCredentialsProvider;
use crate::provider_config::ProviderConfig;
use crate::static_provider::StaticCredentialsProvider;
use crate::web_identity::{
    default_session_name, SharedWebIdentityCredentialsFactory, WebIdentityCredentialsFactory,
    WebIdentityTokenProperties,
};
use aws_credential_types::provider::error::{CloseError, CredentialsError};
use aws_credential_types::provider::{
    self, future, ProvideCredentials, SharedCredentialsProvider,
};
use aws_credential_types::Credentials;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

const PROVIDER_NAME: &str = "ProfileCredentialsProvider";

const ROLE_ARN: &str = "role_arn";
const ROLE_SESSION_NAME: &str = "role_session_name";
const WEB_IDENTITY_TOKEN_FILE: &str = "web_identity_token_file";
const SOURCE_PROFILE: &str = "source_profile";
const CREDENTIAL_SOURCE: &str = "credential_source";
const CREDENTIAL_PROCESS: &str = "credential_process";
const AWS_ACCESS_KEY_ID: &str = "aws_access_key_id";
const AWS_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const AWS_SESSION_TOKEN: &str = "aws_session_token";
const AWS_ACCOUNT_ID: &str = "aws_account_id";

/// Builds credentials providers that assume the role configured in a profile
pub trait AssumeRoleProviderFactory: Send + Sync + fmt::Debug {
    /// Creates a provider that assumes the role configured in `profile` (its `role_arn`,
    /// `role_session_name`, `external_id` and so on) with credentials from `source`.
    fn create(
        &self,
        source: SharedCredentialsProvider,
        profile: &Profile,
    ) -> SharedCredentialsProvider;
}

/// An [`AssumeRoleProviderFactory`] that may be shared
#[derive(Clone, Debug)]
pub struct SharedAssumeRoleProviderFactory(Arc<dyn AssumeRoleProviderFactory>);

impl SharedAssumeRoleProviderFactory {
    /// Wraps `factory` in an internal `Arc`
    pub fn new(factory: impl AssumeRoleProviderFactory + 'static) -> Self {
        Self(Arc::new(factory))
    }
}

impl AssumeRoleProviderFactory for SharedAssumeRoleProviderFactory {
    fn create(
        &self,
        source: SharedCredentialsProvider,
        profile: &Profile,
    ) -> SharedCredentialsProvider {
        self.0.create(source, profile)
    }
}

/// An error loading credentials from a profile
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ProfileFileError {
    /// A profile file could not be parsed
    CouldNotParseProfile(ProfileParseError),

    /// The selected profile does not exist or configures no credentials
    NoCredentials {
        /// The selected profile
        profile: String,
    },

    /// A property required by the profile's configuration is missing
    MissingProperty {
        /// The profile missing the property
        profile: String,
        /// The missing property
        property: &'static str,
    },

    /// A chain of `source_profile` references leads back to itself
    CredentialLoop {
        /// The profiles in the loop, in the order they were visited
        profiles: Vec<String>,
    },

    /// A profile sets both `source_profile` and `credential_source`
    SourceProfileAndCredentialSource {
        /// The offending profile
        profile: String,
    },

    /// The profile named by `source_profile` does not exist or configures no credentials
    MissingSourceCredentials {
        /// The profile that assumes a role
        profile: String,
        /// The profile it names as its source
        source_profile: String,
    },

    /// `credential_source` names an unknown provider
    UnsupportedCredentialSource {
        /// The offending profile
        profile: String,
        /// The configured source
        credential_source: String,
    },

    /// The profile's static credentials are invalid
    InvalidCredentials {
        /// The offending profile
        profile: String,
        /// Why the credentials were rejected
        message: String,
    },

    /// The profile assumes a role but no [`AssumeRoleProviderFactory`] is registered
    MissingAssumeRoleFactory {
        /// The offending profile
        profile: String,
    },

    /// The profile uses a web identity token but no [`WebIdentityCredentialsFactory`] is registered
    MissingWebIdentityFactory {
        /// The offending profile
        profile: String,
    },
}

impl fmt::Display for ProfileFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileFileError::CouldNotParseProfile(_) => write!(f, "could not parse profile file"),
            ProfileFileError::NoCredentials { profile } => {
                write!(f, "Profile file contained no credentials for profile '{}'", profile)
            }
            ProfileFileError::MissingProperty { profile, property } => write!(
                f,
                "Profile property '{}' was not configured for '{}'.",
                property, profile
            ),
            ProfileFileError::CredentialLoop { profiles } => write!(
                f,
                "Invalid profile file: Circular relationship detected with profiles [{}].",
                profiles.join(", ")
            ),
            ProfileFileError::SourceProfileAndCredentialSource { profile } => write!(
                f,
                "Invalid profile file: profile '{}' has both {} and {}.",
                profile, SOURCE_PROFILE, CREDENTIAL_SOURCE
            ),
            ProfileFileError::MissingSourceCredentials {
                profile,
                source_profile,
            } => write!(
                f,
                "The source profile of '{}' was configured to be '{}', but that source profile has no credentials configured.",
                profile, source_profile
            ),
            ProfileFileError::UnsupportedCredentialSource {
                profile,
                credential_source,
            } => write!(
                f,
                "Profile '{}' has an unsupported {} '{}'. Expected Environment, Ec2InstanceMetadata or EcsContainer.",
                profile, CREDENTIAL_SOURCE, credential_source
            ),
            ProfileFileError::InvalidCredentials { profile, message } => write!(
                f,
                "Profile '{}' contained invalid credentials: {}",
                profile, message
            ),
            ProfileFileError::MissingAssumeRoleFactory { profile } => write!(
                f,
                "To use assumed roles in the '{}' profile, an assume role provider factory must be registered.",
                profile
            ),
            ProfileFileError::MissingWebIdentityFactory { profile } => write!(
                f,
                "To use web identity tokens in the '{}' profile, a web identity credentials factory must be registered.",
                profile
            ),
        }
    }
}

impl Error for ProfileFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProfileFileError::CouldNotParseProfile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProfileFileError> for CredentialsError {
    fn from(err: ProfileFileError) -> Self {
        match err {
            ProfileFileError::NoCredentials { .. } => CredentialsError::not_loaded(err),
            _ => CredentialsError::invalid_configuration(err),
        }
    }
}

/// AWS Profile based credentials provider
///
/// This credentials provider will load credentials from `~/.aws/config` and `~/.aws/credentials`.
/// The locations of these files are configurable with `AWS_CONFIG_FILE` and
/// `AWS_SHARED_CREDENTIALS_FILE`, and the profile with `AWS_PROFILE`.
///
/// The files are read once, when the provider is built. Problems with them are reported when
/// credentials are requested. See
/// [`ReloadingProfileCredentialsProvider`](super::ReloadingProfileCredentialsProvider) to pick up
/// changes to the files.
///
/// ### Credentials defined explicitly within the file
/// ```ini
/// [default]
/// aws_access_key_id = 123
/// aws_secret_access_key = 456
/// ```
///
/// ### Assume Role Credentials loaded from a credential source
/// ```ini
/// [default]
/// role_arn = arn:aws:iam::123456789:role/RoleA
/// credential_source = Environment
/// ```
///
/// ### Assume role credentials from a source profile
/// ```ini
/// [default]
/// role_arn = arn:aws:iam::123456789:role/RoleA
/// source_profile = base
///
/// [profile base]
/// aws_access_key_id = 123
/// aws_secret_access_key = 456
/// ```
#[derive(Debug)]
pub struct ProfileCredentialsProvider {
    profile_name: String,
    inner: Result<SharedCredentialsProvider, ProfileFileError>,
}

impl ProfileCredentialsProvider {
    /// Builder for this provider
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The profile credentials are loaded from
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    async fn credentials(&self) -> provider::Result {
        match &self.inner {
            Ok(provider) => provider.provide_credentials().await,
            Err(err) => Err(err.clone().into()),
        }
    }
}

impl ProvideCredentials for ProfileCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.credentials().instrument(tracing::debug_span!(
            "load_credentials",
            provider = PROVIDER_NAME,
            profile = %self.profile_name
        )))
    }

    fn close(&self) -> Result<(), CloseError> {
        match &self.inner {
            Ok(provider) => provider.close(),
            Err(_) => Ok(()),
        }
    }
}

/// Builder for [`ProfileCredentialsProvider`]
#[derive(Debug, Default, Clone)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    profile_name: Option<String>,
    assume_role_factory: Option<SharedAssumeRoleProviderFactory>,
    web_identity_factory: Option<SharedWebIdentityCredentialsFactory>,
    async_credential_update_enabled: Option<bool>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Load credentials from this profile instead of the one named by `AWS_PROFILE`
    pub fn profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = Some(profile_name.into());
        self
    }

    /// Sets the profile credentials are loaded from
    pub fn set_profile_name(&mut self, profile_name: Option<String>) -> &mut Self {
        self.profile_name = profile_name;
        self
    }

    /// Factory used for profiles that assume a role
    pub fn assume_role_factory(mut self, factory: impl AssumeRoleProviderFactory + 'static) -> Self {
        self.assume_role_factory = Some(SharedAssumeRoleProviderFactory::new(factory));
        self
    }

    /// Sets the factory used for profiles that assume a role
    pub fn set_assume_role_factory(
        &mut self,
        factory: Option<SharedAssumeRoleProviderFactory>,
    ) -> &mut Self {
        self.assume_role_factory = factory;
        self
    }

    /// Factory used for profiles that assume a role with a web identity token
    pub fn web_identity_factory(
        mut self,
        factory: impl WebIdentityCredentialsFactory + 'static,
    ) -> Self {
        self.web_identity_factory = Some(SharedWebIdentityCredentialsFactory::new(factory));
        self
    }

    /// Sets the factory used for profiles that assume a role with a web identity token
    pub fn set_web_identity_factory(
        &mut self,
        factory: Option<SharedWebIdentityCredentialsFactory>,
    ) -> &mut Self {
        self.web_identity_factory = factory;
        self
    }

    /// Refresh credentials of cached sources (processes, instance metadata and containers) on a
    /// background task.
    pub fn async_credential_update_enabled(mut self, enabled: bool) -> Self {
        self.async_credential_update_enabled = Some(enabled);
        self
    }

    /// Sets whether cached sources refresh credentials on a background task.
    pub fn set_async_credential_update_enabled(&mut self, enabled: Option<bool>) -> &mut Self {
        self.async_credential_update_enabled = enabled;
        self
    }

    /// Reads the profile files and builds the provider
    pub fn build(self) -> ProfileCredentialsProvider {
        let conf = self.provider_config.clone().unwrap_or_default();
        let source = source::load(&conf, self.profile_name.as_deref());
        let profile_name = source.profile.to_string();
        let inner = ProfileSet::parse(source)
            .map_err(ProfileFileError::CouldNotParseProfile)
            .and_then(|profiles| {
                Resolver {
                    profiles: &profiles,
                    provider_config: &conf,
                    assume_role_factory: self.assume_role_factory.as_ref(),
                    web_identity_factory: self.web_identity_factory.as_ref(),
                    async_credential_update_enabled: self.async_credential_update_enabled,
                }
                .resolve(profiles.selected_profile())
            });
        if let Err(err) = &inner {
            tracing::debug!(profile = %profile_name, error = %err, "profile does not provide credentials");
        }
        ProfileCredentialsProvider {
            profile_name,
            inner,
        }
    }
}

struct Resolver<'a> {
    profiles: &'a ProfileSet,
    provider_config: &'a ProviderConfig,
    assume_role_factory: Option<&'a SharedAssumeRoleProviderFactory>,
    web_identity_factory: Option<&'a SharedWebIdentityCredentialsFactory>,
    async_credential_update_enabled: Option<bool>,
}

impl Resolver<'_> {
    fn resolve(&self, profile_name: &str) -> Result<SharedCredentialsProvider, ProfileFileError> {
        let no_credentials = || ProfileFileError::NoCredentials {
            profile: profile_name.to_owned(),
        };
        let profile = self
            .profiles
            .get_profile(profile_name)
            .ok_or_else(no_credentials)?;
        self.provider_for(profile, &mut Vec::new())?
            .ok_or_else(no_credentials)
    }

    /// `Ok(None)` when the profile configures no credentials at all
    fn provider_for(
        &self,
        profile: &Profile,
        children: &mut Vec<String>,
    ) -> Result<Option<SharedCredentialsProvider>, ProfileFileError> {
        let role_arn = profile.get(ROLE_ARN);
        if let (Some(role_arn), Some(token_file)) = (role_arn, profile.get(WEB_IDENTITY_TOKEN_FILE))
        {
            return self.web_identity(profile, role_arn, token_file).map(Some);
        }
        if role_arn.is_some() {
            let source = match (profile.get(SOURCE_PROFILE), profile.get(CREDENTIAL_SOURCE)) {
                (Some(_), Some(_)) => {
                    return Err(ProfileFileError::SourceProfileAndCredentialSource {
                        profile: profile.name().into(),
                    })
                }
                (Some(source_profile), None) => {
                    Some(self.source_profile(profile, source_profile, children)?)
                }
                (None, Some(credential_source)) => {
                    Some(self.credential_source(profile, credential_source)?)
                }
                (None, None) => None,
            };
            if let Some(source) = source {
                return self.assume_role(profile, source).map(Some);
            }
        }
        if profile.get(CREDENTIAL_PROCESS).is_some() {
            return self.process(profile).map(Some);
        }
        if profile.get(AWS_SESSION_TOKEN).is_some() {
            return self.static_credentials(profile, true).map(Some);
        }
        if profile.get(AWS_ACCESS_KEY_ID).is_some() {
            return self.static_credentials(profile, false).map(Some);
        }
        Ok(None)
    }

    fn web_identity(
        &self,
        profile: &Profile,
        role_arn: &str,
        token_file: &str,
    ) -> Result<SharedCredentialsProvider, ProfileFileError> {
        let factory =
            self.web_identity_factory
                .ok_or_else(|| ProfileFileError::MissingWebIdentityFactory {
                    profile: profile.name().into(),
                })?;
        let session_name = profile
            .get(ROLE_SESSION_NAME)
            .map(str::to_owned)
            .unwrap_or_else(|| default_session_name(&self.provider_config.time_source()));
        let properties = WebIdentityTokenProperties::new(role_arn, token_file, session_name)
            .async_credential_update_enabled(self.async_credential_update_enabled.unwrap_or(false));
        Ok(factory.create(properties))
    }

    fn source_profile(
        &self,
        profile: &Profile,
        source_profile: &str,
        children: &mut Vec<String>,
    ) -> Result<SharedCredentialsProvider, ProfileFileError> {
        if children.iter().any(|child| child == profile.name()) {
            let mut profiles = children.clone();
            profiles.push(profile.name().into());
            return Err(ProfileFileError::CredentialLoop { profiles });
        }
        children.push(profile.name().into());
        let missing = || ProfileFileError::MissingSourceCredentials {
            profile: profile.name().into(),
            source_profile: source_profile.into(),
        };
        let source = self
            .profiles
            .get_profile(source_profile)
            .ok_or_else(missing)?;
        self.provider_for(source, children)?.ok_or_else(missing)
    }

    fn credential_source(
        &self,
        profile: &Profile,
        credential_source: &str,
    ) -> Result<SharedCredentialsProvider, ProfileFileError> {
        let conf = self.provider_config;
        let provider = if credential_source.eq_ignore_ascii_case("Environment") {
            SharedCredentialsProvider::new(
                CredentialsProviderChain::first_try(
                    "SystemProperty",
                    SystemPropertyCredentialsProvider::builder()
                        .configure(conf)
                        .build(),
                )
                .or_else(
                    "Environment",
                    EnvironmentVariableCredentialsProvider::builder()
                        .configure(conf)
                        .build(),
                ),
            )
        } else if credential_source.eq_ignore_ascii_case("Ec2InstanceMetadata") {
            let mut builder = InstanceProfileCredentialsProvider::builder().configure(conf);
            builder.set_async_credential_update_enabled(self.async_credential_update_enabled);
            SharedCredentialsProvider::new(builder.build())
        } else if credential_source.eq_ignore_ascii_case("EcsContainer") {
            let mut builder = ContainerCredentialsProvider::builder().configure(conf);
            builder.set_async_credential_update_enabled(self.async_credential_update_enabled);
            SharedCredentialsProvider::new(builder.build())
        } else {
            return Err(ProfileFileError::UnsupportedCredentialSource {
                profile: profile.name().into(),
                credential_source: credential_source.into(),
            });
        };
        Ok(provider)
    }

    fn assume_role(
        &self,
        profile: &Profile,
        source: SharedCredentialsProvider,
    ) -> Result<SharedCredentialsProvider, ProfileFileError> {
        let factory =
            self.assume_role_factory
                .ok_or_else(|| ProfileFileError::MissingAssumeRoleFactory {
                    profile: profile.name().into(),
                })?;
        Ok(factory.create(source, profile))
    }

    fn process(&self, profile: &Profile) -> Result<SharedCredentialsProvider, ProfileFileError> {
        let mut builder = ProcessCredentialsProvider::builder()
            .command(require(profile, CREDENTIAL_PROCESS)?)
            .configure(self.provider_config);
        builder
            .set_static_account_id(profile.get(AWS_ACCOUNT_ID).map(str::to_owned))
            .set_async_credential_update_enabled(self.async_credential_update_enabled);
        Ok(SharedCredentialsProvider::new(builder.build()))
    }

    fn static_credentials(
        &self,
        profile: &Profile,
        with_session_token: bool,
    ) -> Result<SharedCredentialsProvider, ProfileFileError> {
        let mut builder = Credentials::builder()
            .access_key_id(require(profile, AWS_ACCESS_KEY_ID)?)
            .secret_access_key(require(profile, AWS_SECRET_ACCESS_KEY)?)
            .provider_name(PROVIDER_NAME);
        if with_session_token {
            builder = builder.session_token(require(profile, AWS_SESSION_TOKEN)?);
        }
        builder.set_account_id(profile.get(AWS_ACCOUNT_ID).map(Into::into));
        let credentials = builder
            .build()
            .map_err(|err| ProfileFileError::InvalidCredentials {
                profile: profile.name().into(),
                message: err.to_string(),
            })?;
        Ok(SharedCredentialsProvider::new(
            StaticCredentialsProvider::new(credentials),
        ))
    }
}

fn require<'a>(profile: &'a Profile, property: &'static str) -> Result<&'a str, ProfileFileError> {
    profile
        .get(property)
        .ok_or_else(|| ProfileFileError::MissingProperty {
            profile: profile.name().into(),
            property,
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os_shim_internal::{Env, Fs};
    use crate::web_identity::test::RecordingFactory;
    use aws_credential_types::provider::error::DisplayErrorContext;

    /// Assumes roles by prefixing the source's access key with the role
    #[derive(Debug)]
    struct TestAssumeRoleFactory;

    #[derive(Debug)]
    struct AssumedRole {
        source: SharedCredentialsProvider,
        role_arn: String,
    }

    impl ProvideCredentials for AssumedRole {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::new(async move {
                let source = self.source.provide_credentials().await?;
                Ok(Credentials::from_keys(
                    format!("{}<-{}", self.role_arn, source.access_key_id().unwrap_or_default()),
                    "assumed-secret",
                    None,
                ))
            })
        }
    }

    impl AssumeRoleProviderFactory for TestAssumeRoleFactory {
        fn create(
            &self,
            source: SharedCredentialsProvider,
            profile: &Profile,
        ) -> SharedCredentialsProvider {
            SharedCredentialsProvider::new(AssumedRole {
                source,
                role_arn: profile.get("role_arn").unwrap_or_default().to_owned(),
            })
        }
    }

    fn conf(config: &str, credentials: &str, env: &[(&str, &str)]) -> ProviderConfig {
        let mut vars = vec![
            ("AWS_CONFIG_FILE", "/config"),
            ("AWS_SHARED_CREDENTIALS_FILE", "/credentials"),
        ];
        vars.extend_from_slice(env);
        ProviderConfig::empty()
            .with_env(Env::from_slice(&vars))
            .with_fs(Fs::from_slice(&[
                ("/config", config),
                ("/credentials", credentials),
            ]))
    }

    fn provider(conf: &ProviderConfig) -> ProfileCredentialsProvider {
        ProfileCredentialsProvider::builder()
            .configure(conf)
            .assume_role_factory(TestAssumeRoleFactory)
            .build()
    }

    async fn error_message(provider: &ProfileCredentialsProvider) -> String {
        let err = provider
            .provide_credentials()
            .await
            .expect_err("expected a failure");
        format!("{}", DisplayErrorContext(&err))
    }

    #[tokio::test]
    async fn static_credentials_from_credentials_file() {
        let conf = conf(
            "",
            "[default]\naws_access_key_id = AKID\naws_secret_access_key = SECRET\naws_account_id = 123456789012\n",
            &[],
        );
        let creds = provider(&conf)
            .provide_credentials()
            .await
            .expect("valid profile");
        assert_eq!(Some("AKID"), creds.access_key_id());
        assert_eq!(Some("SECRET"), creds.secret_access_key());
        assert_eq!(None, creds.session_token());
        assert_eq!(Some("123456789012"), creds.account_id().map(|id| id.as_str()));
        assert_eq!(Some(PROVIDER_NAME), creds.provider_name());
    }

    #[tokio::test]
    async fn session_credentials_from_selected_profile() {
        let conf = conf(
            "[profile dev]\naws_access_key_id = AKID\naws_secret_access_key = SECRET\naws_session_token = TOKEN\n",
            "",
            &[("AWS_PROFILE", "dev")],
        );
        let provider = provider(&conf);
        assert_eq!("dev", provider.profile_name());
        let creds = provider.provide_credentials().await.expect("valid profile");
        assert_eq!(Some("TOKEN"), creds.session_token());
    }

    #[tokio::test]
    async fn builder_profile_name_wins() {
        let conf = conf(
            "",
            "[dev]\naws_access_key_id = DEV\naws_secret_access_key = S\n[prod]\naws_access_key_id = PROD\naws_secret_access_key = S\n",
            &[("AWS_PROFILE", "dev")],
        );
        let creds = ProfileCredentialsProvider::builder()
            .configure(&conf)
            .profile_name("prod")
            .build()
            .provide_credentials()
            .await
            .expect("valid profile");
        assert_eq!(Some("PROD"), creds.access_key_id());
    }

    #[tokio::test]
    async fn missing_property() {
        let conf = conf(
            "",
            "[default]\naws_access_key_id = AKID\naws_session_token = TOKEN\n",
            &[],
        );
        let message = error_message(&provider(&conf)).await;
        assert!(
            message.contains(
                "Profile property 'aws_secret_access_key' was not configured for 'default'."
            ),
            "{}",
            message
        );
    }

    #[tokio::test]
    async fn missing_profile_is_not_loaded() {
        let conf = conf("", "[other]\naws_access_key_id = A\naws_secret_access_key = S\n", &[]);
        let err = provider(&conf)
            .provide_credentials()
            .await
            .expect_err("no default profile");
        assert!(err.is_not_loaded(), "{:?}", err);
        assert!(format!("{}", DisplayErrorContext(&err))
            .contains("Profile file contained no credentials for profile 'default'"));
    }

    #[tokio::test]
    async fn parse_errors_are_deferred() {
        let conf = conf("[default\n", "", &[]);
        let provider = provider(&conf);
        let err = provider
            .provide_credentials()
            .await
            .expect_err("invalid file");
        assert!(
            matches!(err, CredentialsError::InvalidConfiguration(_)),
            "{:?}",
            err
        );
        let message = format!("{}", DisplayErrorContext(&err));
        assert!(message.contains("/config on line 1"), "{}", message);
    }

    #[tokio::test]
    async fn assume_role_through_source_profiles() {
        let conf = conf(
            "[default]\nrole_arn = role-a\nsource_profile = b\n[profile b]\nrole_arn = role-b\nsource_profile = c\n",
            "[c]\naws_access_key_id = BASE\naws_secret_access_key = S\n",
            &[],
        );
        let creds = provider(&conf)
            .provide_credentials()
            .await
            .expect("valid chain");
        assert_eq!(Some("role-a<-role-b<-BASE"), creds.access_key_id());
    }

    #[tokio::test]
    async fn circular_source_profiles() {
        let conf = conf(
            "[default]\nrole_arn = role-a\nsource_profile = b\n[profile b]\nrole_arn = role-b\nsource_profile = default\n",
            "",
            &[],
        );
        let message = error_message(&provider(&conf)).await;
        assert!(
            message.contains(
                "Invalid profile file: Circular relationship detected with profiles [default, b, default]."
            ),
            "{}",
            message
        );
    }

    #[tokio::test]
    async fn source_profile_without_credentials() {
        let conf = conf(
            "[default]\nrole_arn = role-a\nsource_profile = empty\n[profile empty]\nregion = us-east-1\n",
            "",
            &[],
        );
        let message = error_message(&provider(&conf)).await;
        assert!(
            message.contains("The source profile of 'default' was configured to be 'empty', but that source profile has no credentials configured."),
            "{}",
            message
        );
    }

    #[tokio::test]
    async fn source_profile_and_credential_source_conflict() {
        let conf = conf(
            "[default]\nrole_arn = role-a\nsource_profile = b\ncredential_source = Environment\n",
            "",
            &[],
        );
        let message = error_message(&provider(&conf)).await;
        assert!(
            message.contains("has both source_profile and credential_source"),
            "{}",
            message
        );
    }

    #[tokio::test]
    async fn environment_credential_source() {
        let conf = conf(
            "[default]\nrole_arn = role-a\ncredential_source = Environment\n",
            "",
            &[("AWS_ACCESS_KEY_ID", "ENV"), ("AWS_SECRET_ACCESS_KEY", "S")],
        );
        let creds = provider(&conf)
            .provide_credentials()
            .await
            .expect("environment source");
        assert_eq!(Some("role-a<-ENV"), creds.access_key_id());
    }

    #[tokio::test]
    async fn unsupported_credential_source() {
        let conf = conf(
            "[default]\nrole_arn = role-a\ncredential_source = Carrier Pigeon\n",
            "",
            &[],
        );
        let message = error_message(&provider(&conf)).await;
        assert!(message.contains("unsupported credential_source 'Carrier Pigeon'"), "{}", message);
    }

    #[tokio::test]
    async fn assume_role_requires_a_factory() {
        let conf = conf(
            "[default]\nrole_arn = role-a\ncredential_source = Environment\n",
            "",
            &[],
        );
        let provider = ProfileCredentialsProvider::builder()
            .configure(&conf)
            .build();
        let message = error_message(&provider).await;
        assert!(
            message.contains("an assume role provider factory must be registered"),
            "{}",
            message
        );
    }

    #[tokio::test]
    async fn web_identity_profile() {
        let conf = conf(
            "[default]\nrole_arn = role-web\nweb_identity_token_file = /token\nrole_session_name = session\nsource_profile = ignored\n",
            "",
            &[],
        );
        let factory = RecordingFactory::default();
        let creds = ProfileCredentialsProvider::builder()
            .configure(&conf)
            .web_identity_factory(factory.clone())
            .build()
            .provide_credentials()
            .await
            .expect("web identity");
        assert_eq!(Some("web:role-web"), creds.access_key_id());
        let created = factory.created.lock().unwrap();
        assert_eq!(
            vec![WebIdentityTokenProperties::new("role-web", "/token", "session")],
            *created
        );
    }

    #[tokio::test]
    async fn role_arn_without_source_falls_through() {
        let conf = conf(
            "",
            "[default]\nrole_arn = unused\naws_access_key_id = AKID\naws_secret_access_key = S\n",
            &[],
        );
        let creds = provider(&conf)
            .provide_credentials()
            .await
            .expect("static keys");
        assert_eq!(Some("AKID"), creds.access_key_id());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn credential_process_takes_priority_over_keys() {
        let conf = conf(
            "",
            "[default]\ncredential_process = echo '{\"Version\": 1, \"AccessKeyId\": \"PROC\", \"SecretAccessKey\": \"S\"}'\naws_access_key_id = AKID\naws_secret_access_key = S\naws_account_id = 123456789012\n",
            &[],
        );
        let creds = provider(&conf)
            .provide_credentials()
            .await
            .expect("process output");
        assert_eq!(Some("PROC"), creds.access_key_id());
        assert_eq!(Some("123456789012"), creds.account_id().map(|id| id.as_str()));
    }
}
