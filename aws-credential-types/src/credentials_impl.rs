/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::attributes::AccountId;
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// AWS SDK Credentials
///
/// An opaque struct representing credentials that may be used in an AWS SDK, modeled on
/// the [CRT credentials implementation](https://github.com/awslabs/aws-c-auth/blob/main/source/credentials.c).
///
/// Credentials are either "real", in which case both the access key id and the secret access
/// key are present, or anonymous, in which case neither is. Anonymous credentials skip request
/// signing.
///
/// When `Credentials` is dropped, its contents are zeroed in memory. Credentials uses an interior
/// Arc to ensure that even when cloned, credentials don't exist in multiple memory locations.
///
/// Equality and hashing only consider the access key id, the secret access key, and the session
/// token.
#[derive(Clone)]
pub struct Credentials(Arc<Inner>);

#[derive(Clone)]
struct Inner {
    access_key_id: Option<Zeroizing<String>>,
    secret_access_key: Option<Zeroizing<String>>,
    session_token: Option<Zeroizing<String>>,
    account_id: Option<AccountId>,

    /// Credential Expiry
    ///
    /// A SystemTime at which the credentials should no longer be used because they have expired.
    /// The primary purpose of this value is to allow credentials to communicate to the caching
    /// provider when they need to be refreshed.
    ///
    /// If these credentials never expire, this value will be set to `None`
    expires_after: Option<SystemTime>,

    provider_name: Option<&'static str>,
}

const REDACTED: &str = "** redacted **";

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut creds = f.debug_struct("Credentials");
        creds
            .field("provider_name", &self.0.provider_name)
            .field("access_key_id", &self.access_key_id())
            .field(
                "secret_access_key",
                &self.0.secret_access_key.as_ref().map(|_| REDACTED),
            );
        if self.0.session_token.is_some() {
            creds.field("session_token", &REDACTED);
        }
        if let Some(account_id) = &self.0.account_id {
            creds.field("account_id", &account_id.as_str());
        }
        match self.0.expires_after {
            Some(expiry) => match expiry.duration_since(UNIX_EPOCH) {
                Ok(since_epoch) => creds.field(
                    "expires_after",
                    &format_args!("{} (seconds since epoch)", since_epoch.as_secs()),
                ),
                Err(_) => creds.field("expires_after", &expiry),
            },
            None => creds.field("expires_after", &"never"),
        };
        creds.finish()
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.access_key_id() == other.access_key_id()
            && self.secret_access_key() == other.secret_access_key()
            && self.session_token() == other.session_token()
    }
}

impl Eq for Credentials {}

impl Hash for Credentials {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.access_key_id().hash(state);
        self.secret_access_key().hash(state);
        self.session_token().hash(state);
    }
}

impl Credentials {
    /// Returns a builder for `Credentials`.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Creates `Credentials` from a key pair.
    ///
    /// This constructor does not validate its inputs. Use [`Credentials::builder`] when the
    /// values come from an untrusted source.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expires_after: Option<SystemTime>,
        provider_name: &'static str,
    ) -> Self {
        Credentials(Arc::new(Inner {
            access_key_id: Some(Zeroizing::new(access_key_id.into())),
            secret_access_key: Some(Zeroizing::new(secret_access_key.into())),
            session_token: session_token.map(Zeroizing::new),
            account_id: None,
            expires_after,
            provider_name: Some(provider_name),
        }))
    }

    /// Creates `Credentials` that never expire and carry a static provider name.
    pub fn from_keys(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self::new(
            access_key_id,
            secret_access_key,
            session_token,
            None,
            "Static",
        )
    }

    /// Creates anonymous credentials. Requests made with anonymous credentials are not signed.
    pub fn anonymous() -> Self {
        Credentials(Arc::new(Inner {
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            account_id: None,
            expires_after: None,
            provider_name: None,
        }))
    }

    /// Returns a builder that starts from the values held by these credentials.
    pub fn to_builder(&self) -> Builder {
        Builder {
            access_key_id: self.access_key_id().map(str::to_owned),
            secret_access_key: self.secret_access_key().map(str::to_owned),
            session_token: self.session_token().map(str::to_owned),
            account_id: self.0.account_id.clone(),
            expires_after: self.0.expires_after,
            provider_name: self.0.provider_name,
            validate_credentials: None,
        }
    }

    /// Returns the access key id, or `None` for anonymous credentials.
    pub fn access_key_id(&self) -> Option<&str> {
        self.0.access_key_id.as_deref().map(String::as_str)
    }

    /// Returns the secret access key, or `None` for anonymous credentials.
    pub fn secret_access_key(&self) -> Option<&str> {
        self.0.secret_access_key.as_deref().map(String::as_str)
    }

    /// Returns the session token, if any.
    pub fn session_token(&self) -> Option<&str> {
        self.0.session_token.as_deref().map(String::as_str)
    }

    /// Returns the account id these credentials belong to, if it is known.
    pub fn account_id(&self) -> Option<&AccountId> {
        self.0.account_id.as_ref()
    }

    /// Returns the time when the credentials will expire.
    pub fn expiry(&self) -> Option<SystemTime> {
        self.0.expires_after
    }

    /// Returns a mutable reference to the time when the credentials will expire.
    ///
    /// Credentials are shared, so this clones the inner value when another handle exists.
    pub fn expiry_mut(&mut self) -> &mut Option<SystemTime> {
        &mut Arc::make_mut(&mut self.0).expires_after
    }

    /// Returns the name of the provider that resolved these credentials.
    pub fn provider_name(&self) -> Option<&'static str> {
        self.0.provider_name
    }

    /// True when neither the access key id nor the secret access key are present.
    pub fn is_anonymous(&self) -> bool {
        self.0.access_key_id.is_none() && self.0.secret_access_key.is_none()
    }

    /// True when these are temporary credentials carrying a session token.
    pub fn is_session(&self) -> bool {
        self.0.session_token.is_some()
    }
}

/// Builder for [`Credentials`]
///
/// Blank strings are treated as if they were never set. With validation enabled (the default)
/// `build` rejects a half-present key pair and a session token without a key pair.
#[derive(Clone, Default)]
pub struct Builder {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    account_id: Option<AccountId>,
    expires_after: Option<SystemTime>,
    provider_name: Option<&'static str>,
    validate_credentials: Option<bool>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("access_key_id", &self.access_key_id)
            .field("provider_name", &self.provider_name)
            .finish()
    }
}

impl Builder {
    /// Sets the access key id.
    pub fn access_key_id(mut self, access_key_id: impl Into<String>) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self
    }

    /// Sets the access key id.
    pub fn set_access_key_id(&mut self, access_key_id: Option<String>) -> &mut Self {
        self.access_key_id = access_key_id;
        self
    }

    /// Sets the secret access key.
    pub fn secret_access_key(mut self, secret_access_key: impl Into<String>) -> Self {
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Sets the secret access key.
    pub fn set_secret_access_key(&mut self, secret_access_key: Option<String>) -> &mut Self {
        self.secret_access_key = secret_access_key;
        self
    }

    /// Sets the session token.
    pub fn session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(session_token.into());
        self
    }

    /// Sets the session token.
    pub fn set_session_token(&mut self, session_token: Option<String>) -> &mut Self {
        self.session_token = session_token;
        self
    }

    /// Sets the account id.
    pub fn account_id(mut self, account_id: impl Into<AccountId>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Sets the account id.
    pub fn set_account_id(&mut self, account_id: Option<AccountId>) -> &mut Self {
        self.account_id = account_id;
        self
    }

    /// Sets the time at which the credentials expire.
    pub fn expiry(mut self, expiry: SystemTime) -> Self {
        self.expires_after = Some(expiry);
        self
    }

    /// Sets the time at which the credentials expire.
    pub fn set_expiry(&mut self, expiry: Option<SystemTime>) -> &mut Self {
        self.expires_after = expiry;
        self
    }

    /// Sets the name of the provider that loaded these credentials.
    pub fn provider_name(mut self, provider_name: &'static str) -> Self {
        self.provider_name = Some(provider_name);
        self
    }

    /// Enables or disables validation of the key pair. Enabled by default.
    pub fn validate_credentials(mut self, validate: bool) -> Self {
        self.validate_credentials = Some(validate);
        self
    }

    /// Builds [`Credentials`].
    pub fn build(self) -> Result<Credentials, CredentialsBuildError> {
        let access_key_id = non_blank(self.access_key_id);
        let secret_access_key = non_blank(self.secret_access_key);
        let session_token = non_blank(self.session_token);
        if self.validate_credentials.unwrap_or(true) {
            match (&access_key_id, &secret_access_key) {
                (Some(_), None) => return Err(CredentialsBuildError::MissingSecretAccessKey),
                (None, Some(_)) => return Err(CredentialsBuildError::MissingAccessKeyId),
                (None, None) if session_token.is_some() => {
                    return Err(CredentialsBuildError::SessionTokenWithoutKeys)
                }
                _ => {}
            }
        }
        Ok(Credentials(Arc::new(Inner {
            access_key_id: access_key_id.map(Zeroizing::new),
            secret_access_key: secret_access_key.map(Zeroizing::new),
            session_token: session_token.map(Zeroizing::new),
            account_id: self.account_id,
            expires_after: self.expires_after,
            provider_name: self.provider_name,
        })))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_owned())
        }
    })
}

/// Error returned when [`Builder::build`] is given an inconsistent set of values.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum CredentialsBuildError {
    /// A secret access key was given without an access key id.
    MissingAccessKeyId,
    /// An access key id was given without a secret access key.
    MissingSecretAccessKey,
    /// A session token was given without a key pair.
    SessionTokenWithoutKeys,
}

impl fmt::Display for CredentialsBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsBuildError::MissingAccessKeyId => write!(f, "Access key ID cannot be blank."),
            CredentialsBuildError::MissingSecretAccessKey => {
                write!(f, "Secret access key cannot be blank.")
            }
            CredentialsBuildError::SessionTokenWithoutKeys => write!(
                f,
                "a session token requires both an access key ID and a secret access key"
            ),
        }
    }
}

impl Error for CredentialsBuildError {}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new(
            "akid",
            "very-secret",
            Some("token-secret".into()),
            Some(UNIX_EPOCH + Duration::from_secs(1234567890)),
            "debug tester",
        );
        let debugged = format!("{:?}", creds);
        assert!(debugged.contains("akid"));
        assert!(debugged.contains("1234567890"));
        assert!(!debugged.contains("very-secret"));
        assert!(!debugged.contains("token-secret"));
    }

    #[test]
    fn both_keys_missing_is_anonymous() {
        let creds = Credentials::builder().build().unwrap();
        assert!(creds.is_anonymous());
        assert!(Credentials::anonymous().is_anonymous());
        assert!(!Credentials::from_keys("a", "b", None).is_anonymous());
    }

    #[test]
    fn half_present_keys_fail_validation() {
        assert_eq!(
            Credentials::builder().access_key_id("a").build().unwrap_err(),
            CredentialsBuildError::MissingSecretAccessKey
        );
        assert_eq!(
            Credentials::builder()
                .secret_access_key("s")
                .access_key_id("   ")
                .build()
                .unwrap_err(),
            CredentialsBuildError::MissingAccessKeyId
        );
        assert_eq!(
            Credentials::builder().session_token("t").build().unwrap_err(),
            CredentialsBuildError::SessionTokenWithoutKeys
        );
    }

    #[test]
    fn validation_can_be_disabled() {
        let creds = Credentials::builder()
            .access_key_id("a")
            .validate_credentials(false)
            .build()
            .unwrap();
        assert_eq!(Some("a"), creds.access_key_id());
        assert_eq!(None, creds.secret_access_key());
        assert!(!creds.is_anonymous());
    }

    #[test]
    fn equality_ignores_metadata() {
        let a = Credentials::new("a", "s", Some("t".into()), None, "one");
        let b = Credentials::builder()
            .access_key_id("a")
            .secret_access_key("s")
            .session_token("t")
            .account_id("123456789012")
            .provider_name("two")
            .expiry(UNIX_EPOCH)
            .build()
            .unwrap();
        assert_eq!(a, b);
        let without_token = Credentials::new("a", "s", None, None, "one");
        assert_ne!(a, without_token);

        let set: HashSet<_> = vec![a.clone(), b, without_token].into_iter().collect();
        assert_eq!(2, set.len());
    }

    #[test]
    fn builder_trims_values() {
        let creds = Credentials::builder()
            .access_key_id(" akid ")
            .secret_access_key("secret\n")
            .build()
            .unwrap();
        assert_eq!(Some("akid"), creds.access_key_id());
        assert_eq!(Some("secret"), creds.secret_access_key());
    }

    #[test]
    fn to_builder_preserves_fields() {
        let creds = Credentials::builder()
            .access_key_id("a")
            .secret_access_key("s")
            .account_id("123")
            .provider_name("p")
            .build()
            .unwrap();
        let mut rebuilt = creds.to_builder().expiry(UNIX_EPOCH).build().unwrap();
        assert_eq!(Some("123"), rebuilt.account_id().map(|a| a.as_str()));
        assert_eq!(Some("p"), rebuilt.provider_name());
        assert_eq!(Some(UNIX_EPOCH), rebuilt.expiry());
        *rebuilt.expiry_mut() = None;
        assert_eq!(None, rebuilt.expiry());
        assert_eq!(creds, rebuilt);
    }
}
