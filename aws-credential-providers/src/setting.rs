/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Settings that can be configured through a system property or an environment variable.

use crate::os_shim_internal::{Env, Properties};
use std::fmt;

/// A setting read from a system property, then an environment variable, then a default.
///
/// Blank values are treated as unset.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SystemSetting {
    property: &'static str,
    environment_variable: &'static str,
    default_value: Option<&'static str>,
}

impl SystemSetting {
    const fn new(property: &'static str, environment_variable: &'static str) -> Self {
        Self {
            property,
            environment_variable,
            default_value: None,
        }
    }

    const fn with_default(self, default_value: &'static str) -> Self {
        Self {
            default_value: Some(default_value),
            ..self
        }
    }

    /// Name of the system property
    pub fn property(&self) -> &'static str {
        self.property
    }

    /// Name of the environment variable
    pub fn environment_variable(&self) -> &'static str {
        self.environment_variable
    }

    /// Resolves the setting from system properties, then the environment, then the default.
    pub fn resolve(&self, properties: &Properties, env: &Env) -> Option<String> {
        properties
            .get(self.property)
            .and_then(non_blank)
            .or_else(|| env.get(self.environment_variable).ok().and_then(non_blank))
            .or_else(|| self.default_value.map(str::to_owned))
    }

    /// Resolves the setting as a boolean. Only `true` (in any case) is true.
    pub fn resolve_bool(&self, properties: &Properties, env: &Env) -> bool {
        self.resolve(properties, env)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

impl fmt::Display for SystemSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (system property `{}`)",
            self.environment_variable, self.property
        )
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_owned())
    }
}

/// Access key id
pub const AWS_ACCESS_KEY_ID: SystemSetting =
    SystemSetting::new("aws.accessKeyId", "AWS_ACCESS_KEY_ID");
/// Secret access key
pub const AWS_SECRET_ACCESS_KEY: SystemSetting =
    SystemSetting::new("aws.secretAccessKey", "AWS_SECRET_ACCESS_KEY");
/// Session token
pub const AWS_SESSION_TOKEN: SystemSetting =
    SystemSetting::new("aws.sessionToken", "AWS_SESSION_TOKEN");
/// Account id of the credentials
pub const AWS_ACCOUNT_ID: SystemSetting = SystemSetting::new("aws.accountId", "AWS_ACCOUNT_ID");
/// Container credentials path, relative to the container metadata host
pub const AWS_CONTAINER_CREDENTIALS_RELATIVE_URI: SystemSetting = SystemSetting::new(
    "aws.containerCredentialsPath",
    "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
);
/// Full container credentials URI
pub const AWS_CONTAINER_CREDENTIALS_FULL_URI: SystemSetting = SystemSetting::new(
    "aws.containerCredentialsFullUri",
    "AWS_CONTAINER_CREDENTIALS_FULL_URI",
);
/// `Authorization` header value for the container credentials endpoint
pub const AWS_CONTAINER_AUTHORIZATION_TOKEN: SystemSetting = SystemSetting::new(
    "aws.containerAuthorizationToken",
    "AWS_CONTAINER_AUTHORIZATION_TOKEN",
);
/// File holding the `Authorization` header value for the container credentials endpoint
pub const AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE: SystemSetting = SystemSetting::new(
    "aws.containerAuthorizationTokenFile",
    "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE",
);
/// Disables the instance metadata service
pub const AWS_EC2_METADATA_DISABLED: SystemSetting =
    SystemSetting::new("aws.disableEc2Metadata", "AWS_EC2_METADATA_DISABLED").with_default("false");
/// Instance metadata service endpoint
pub const AWS_EC2_METADATA_SERVICE_ENDPOINT: SystemSetting = SystemSetting::new(
    "aws.ec2MetadataServiceEndpoint",
    "AWS_EC2_METADATA_SERVICE_ENDPOINT",
)
.with_default("http://169.254.169.254");
/// Disables the unauthenticated (v1) instance metadata flow
pub const AWS_EC2_METADATA_V1_DISABLED: SystemSetting =
    SystemSetting::new("aws.disableEc2MetadataV1", "AWS_EC2_METADATA_V1_DISABLED")
        .with_default("false");
/// Web identity token file
pub const AWS_WEB_IDENTITY_TOKEN_FILE: SystemSetting =
    SystemSetting::new("aws.webIdentityTokenFile", "AWS_WEB_IDENTITY_TOKEN_FILE");
/// Role to assume
pub const AWS_ROLE_ARN: SystemSetting = SystemSetting::new("aws.roleArn", "AWS_ROLE_ARN");
/// Session name for the assumed role
pub const AWS_ROLE_SESSION_NAME: SystemSetting =
    SystemSetting::new("aws.roleSessionName", "AWS_ROLE_SESSION_NAME");
/// Selected profile
pub const AWS_PROFILE: SystemSetting =
    SystemSetting::new("aws.profile", "AWS_PROFILE").with_default("default");
/// Location of the shared config file
pub const AWS_CONFIG_FILE: SystemSetting = SystemSetting::new("aws.configFile", "AWS_CONFIG_FILE");
/// Location of the shared credentials file
pub const AWS_SHARED_CREDENTIALS_FILE: SystemSetting =
    SystemSetting::new("aws.sharedCredentialsFile", "AWS_SHARED_CREDENTIALS_FILE");

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn property_wins_over_environment() {
        let props = Properties::from_slice(&[("aws.accessKeyId", "from-property")]);
        let env = Env::from_slice(&[("AWS_ACCESS_KEY_ID", "from-env")]);
        assert_eq!(
            AWS_ACCESS_KEY_ID.resolve(&props, &env).as_deref(),
            Some("from-property")
        );
        assert_eq!(
            AWS_ACCESS_KEY_ID
                .resolve(&Properties::from_slice(&[]), &env)
                .as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn blank_values_fall_through() {
        let props = Properties::from_slice(&[("aws.profile", "   ")]);
        let env = Env::from_slice(&[("AWS_PROFILE", "")]);
        assert_eq!(AWS_PROFILE.resolve(&props, &env).as_deref(), Some("default"));
        assert_eq!(AWS_ROLE_ARN.resolve(&props, &env), None);
    }

    #[test]
    fn booleans() {
        let none = Properties::from_slice(&[]);
        assert!(!AWS_EC2_METADATA_DISABLED.resolve_bool(&none, &Env::from_slice(&[])));
        assert!(AWS_EC2_METADATA_DISABLED
            .resolve_bool(&none, &Env::from_slice(&[("AWS_EC2_METADATA_DISABLED", "TRUE")])));
        assert!(!AWS_EC2_METADATA_DISABLED
            .resolve_bool(&none, &Env::from_slice(&[("AWS_EC2_METADATA_DISABLED", "1")])));
    }
}
