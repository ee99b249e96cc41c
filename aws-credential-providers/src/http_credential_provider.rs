/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Generalized HTTP credential provider. This cannot be used directly and is only used via the
//! container and instance metadata providers.

use crate::http_client::{HttpClient, HttpError, SharedHttpClient};
use crate::json_credentials::{parse_json_credentials, JsonCredentials, RefreshableCredentials};
use aws_credential_types::provider::{self, error::CredentialsError};
use aws_credential_types::Credentials;
use bytes::Bytes;
use std::time::Duration;

/// Builds a [`Credentials`] from a parsed JSON credentials document.
pub(crate) fn into_credentials(
    credentials: RefreshableCredentials,
    provider_name: &'static str,
) -> provider::Result {
    let RefreshableCredentials {
        access_key_id,
        secret_access_key,
        session_token,
        expiration,
        account_id,
    } = credentials;
    let mut builder = Credentials::builder()
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key)
        .provider_name(provider_name);
    builder
        .set_session_token(session_token)
        .set_expiry(expiration)
        .set_account_id(account_id.map(Into::into));
    builder.build().map_err(CredentialsError::provider_error)
}

/// Parses a credentials response body. Malformed bodies are unhandled errors so that retry
/// classification can tell them apart from an explicit error document.
pub(crate) fn parse_response(
    response: &http::Response<Bytes>,
    provider_name: &'static str,
) -> provider::Result {
    if !response.status().is_success() {
        return Err(CredentialsError::provider_error(format!(
            "non-200 status from HTTP provider: {}",
            response.status()
        )));
    }
    let body = std::str::from_utf8(response.body().as_ref())
        .map_err(CredentialsError::unhandled)?;
    match parse_json_credentials(body).map_err(CredentialsError::unhandled)? {
        JsonCredentials::RefreshableCredentials(credentials) => {
            into_credentials(credentials, provider_name)
        }
        JsonCredentials::Error { code, message } => Err(CredentialsError::provider_error(
            format!("failed to load credentials [{}]: {}", code, message),
        )),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpCredentialProvider {
    client: SharedHttpClient,
    provider_name: &'static str,
    timeout: Duration,
    max_attempts: u32,
}

enum Attempt {
    Done(provider::Result),
    Retry(CredentialsError),
}

impl HttpCredentialProvider {
    pub(crate) fn new(
        client: SharedHttpClient,
        provider_name: &'static str,
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            client,
            provider_name,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sends the request produced by `request` until it succeeds, fails in a way that is not
    /// retryable, or runs out of attempts.
    pub(crate) async fn credentials(
        &self,
        request: impl Fn() -> Result<http::Request<Bytes>, CredentialsError>,
    ) -> provider::Result {
        let mut attempt = 1;
        loop {
            match self.attempt(request()?).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(err) if attempt < self.max_attempts => {
                    tracing::debug!(
                        provider = self.provider_name,
                        attempt,
                        error = %aws_credential_types::provider::error::DisplayErrorContext(&err),
                        "retrying credentials request"
                    );
                    attempt += 1;
                }
                Attempt::Retry(err) => return Err(err),
            }
        }
    }

    /* The following errors are retryable:
     *   - Socket errors
     *   - Networking timeouts
     *   - 5xx errors
     *   - Non-parseable 200 responses.
     */
    async fn attempt(&self, request: http::Request<Bytes>) -> Attempt {
        let response = match self.client.call(request, self.timeout).await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return Attempt::Retry(CredentialsError::provider_timed_out(self.timeout))
            }
            Err(err) if err.is_io() => return Attempt::Retry(dispatch_failure(err)),
            Err(err) => return Attempt::Done(Err(dispatch_failure(err))),
        };
        if response.status().is_server_error() {
            return Attempt::Retry(CredentialsError::provider_error(format!(
                "credentials endpoint returned {}",
                response.status()
            )));
        }
        match parse_response(&response, self.provider_name) {
            Err(err @ CredentialsError::Unhandled(_)) if response.status().is_success() => {
                Attempt::Retry(err)
            }
            result => Attempt::Done(result),
        }
    }
}

fn dispatch_failure(err: HttpError) -> CredentialsError {
    CredentialsError::provider_error(err)
}
