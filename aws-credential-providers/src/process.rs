/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credentials Provider for external process

use crate::http_credential_provider::into_credentials;
use crate::json_credentials::{
    get_field, get_string, parse_object, parse_timestamp, require_string, InvalidJsonCredentials,
    RefreshableCredentials,
};
use crate::provider_config::ProviderConfig;
use aws_cached_supplier::{CachedSupplier, PrefetchStrategy, RefreshResult};
use aws_credential_types::provider::error::{CloseError, CredentialsError};
use aws_credential_types::provider::{self, future, ProvideCredentials};
use aws_credential_types::Credentials;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::Instrument;

const PROVIDER_NAME: &str = "ProcessCredentialsProvider";
const DEFAULT_OUTPUT_LIMIT: u64 = 64_000;
const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(15);

/// Returns the given `command` string with arguments redacted if there were any
pub(crate) fn debug_fmt_command_string(command: &str) -> Cow<'_, str> {
    match command.find(char::is_whitespace) {
        Some(index) => Cow::Owned(format!("{} ** arguments redacted **", &command[0..index])),
        None => Cow::Borrowed(command),
    }
}

/// Credentials Provider for external process
///
/// The command is run through the platform shell (`sh -c` or `cmd.exe /C`) and must print a
/// JSON document to stdout:
/// ```json
/// {
///   "Version": 1,
///   "AccessKeyId": "ASIARTESTID",
///   "SecretAccessKey": "TESTSECRETKEY",
///   "SessionToken": "TESTSESSIONTOKEN",
///   "Expiration": "2022-05-02T18:36:00+00:00",
///   "AccountId": "123456789012"
/// }
/// ```
/// `SessionToken`, `Expiration` and `AccountId` are optional. Credentials without an
/// `Expiration` are cached forever. Otherwise they are refreshed `credential_refresh_threshold`
/// before they expire.
pub struct ProcessCredentialsProvider {
    command: Option<Arc<str>>,
    cache: Option<CachedSupplier<Credentials, CredentialsError>>,
}

impl fmt::Debug for ProcessCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Security: The arguments for command must be redacted since they can be sensitive
        f.debug_struct("ProcessCredentialsProvider")
            .field(
                "command",
                &self.command.as_deref().map(debug_fmt_command_string),
            )
            .finish()
    }
}

impl ProcessCredentialsProvider {
    /// Builder for [`ProcessCredentialsProvider`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Create a provider that runs `command` with default settings
    pub fn new(command: impl Into<String>) -> Self {
        Self::builder().command(command).build()
    }

    async fn credentials(&self) -> provider::Result {
        match &self.cache {
            Some(cache) => cache.get().await,
            None => Err(CredentialsError::invalid_configuration(
                "a command must be set for the process credentials provider",
            )),
        }
    }
}

impl ProvideCredentials for ProcessCredentialsProvider {
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
        if let Some(cache) = &self.cache {
            cache.close();
        }
        Ok(())
    }
}

/// Builder for [`ProcessCredentialsProvider`]
#[derive(Default)]
pub struct Builder {
    command: Option<String>,
    process_output_limit: Option<u64>,
    credential_refresh_threshold: Option<Duration>,
    static_account_id: Option<String>,
    async_credential_update_enabled: Option<bool>,
    provider_config: Option<ProviderConfig>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field(
                "command",
                &self.command.as_deref().map(debug_fmt_command_string),
            )
            .field("process_output_limit", &self.process_output_limit)
            .field(
                "credential_refresh_threshold",
                &self.credential_refresh_threshold,
            )
            .field("static_account_id", &self.static_account_id)
            .finish()
    }
}

impl Builder {
    /// The command to run. Required.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Maximum number of bytes read from the process' output. Defaults to 64,000.
    pub fn process_output_limit(mut self, limit: u64) -> Self {
        self.process_output_limit = Some(limit);
        self
    }

    /// How long before expiry credentials are refreshed. Defaults to 15 seconds.
    pub fn credential_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.credential_refresh_threshold = Some(threshold);
        self
    }

    /// Account id attached to the credentials when the process output does not include one
    pub fn static_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.static_account_id = Some(account_id.into());
        self
    }

    /// Sets the static account id
    pub fn set_static_account_id(&mut self, account_id: Option<String>) -> &mut Self {
        self.static_account_id = account_id;
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

    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// Builds the provider. A missing command is reported when credentials are requested.
    pub fn build(self) -> ProcessCredentialsProvider {
        let command: Option<Arc<str>> = self.command.map(Into::into);
        let conf = self.provider_config.unwrap_or_default();
        let cache = command.clone().map(|command| {
            let runner = Arc::new(CommandRunner {
                command,
                output_limit: self.process_output_limit.unwrap_or(DEFAULT_OUTPUT_LIMIT),
                refresh_threshold: self
                    .credential_refresh_threshold
                    .unwrap_or(DEFAULT_REFRESH_THRESHOLD),
                static_account_id: self.static_account_id,
            });
            let mut cache = aws_cached_supplier::Builder::new()
                .name(PROVIDER_NAME)
                .prefetch_strategy(
                    if self.async_credential_update_enabled.unwrap_or(false) {
                        PrefetchStrategy::NonBlocking
                    } else {
                        PrefetchStrategy::OneCallerBlocks
                    },
                )
                .sleep_impl(conf.sleep());
            cache.set_time_source(Some(conf.time_source()));
            cache.build(move || {
                let runner = runner.clone();
                async move { runner.refresh().await }
            })
        });
        ProcessCredentialsProvider { command, cache }
    }
}

struct CommandRunner {
    command: Arc<str>,
    output_limit: u64,
    refresh_threshold: Duration,
    static_account_id: Option<String>,
}

async fn read_limited(
    stream: Option<impl AsyncRead + Unpin>,
    limit: u64,
) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(stream) = stream {
        // one extra byte detects output that exceeds the limit
        stream.take(limit.saturating_add(1)).read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

impl CommandRunner {
    fn shell_command(&self) -> Command {
        let mut command = if cfg!(windows) {
            let mut command = Command::new("cmd.exe");
            command.args(["/C", &*self.command]);
            command
        } else {
            let mut command = Command::new("sh");
            command.args(["-c", &*self.command]);
            command
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self) -> Result<Vec<u8>, CredentialsError> {
        tracing::debug!(command = %debug_fmt_command_string(&self.command), "loading credentials from external process");
        let mut child = self.shell_command().spawn().map_err(|e| {
            CredentialsError::provider_error(format!(
                "Error retrieving credentials from external process: {}",
                e
            ))
        })?;
        let (stdout, stderr) = tokio::join!(
            read_limited(child.stdout.take(), self.output_limit),
            read_limited(child.stderr.take(), self.output_limit),
        );
        let stdout = stdout.map_err(|e| {
            CredentialsError::provider_error(format!(
                "Error reading output of external process: {}",
                e
            ))
        })?;
        if stdout.len() as u64 > self.output_limit {
            // `child` is killed when dropped
            return Err(CredentialsError::provider_error(format!(
                "Process output exceeded limit of {} bytes.",
                self.output_limit
            )));
        }
        let status = child.wait().await.map_err(|e| {
            CredentialsError::provider_error(format!(
                "Error waiting for external process: {}",
                e
            ))
        })?;

        // Security: command arguments can be logged at trace level, but must be redacted at debug level
        // since they can contain sensitive information.
        tracing::trace!(command = %self.command, status = ?status, "executed command (unredacted)");
        tracing::debug!(command = %debug_fmt_command_string(&self.command), status = ?status, "executed command");

        if !status.success() {
            let stderr = stderr.unwrap_or_default();
            let reason = std::str::from_utf8(&stderr).unwrap_or("could not decode stderr as UTF-8");
            return Err(CredentialsError::provider_error(format!(
                "Error retrieving credentials: external process exited with code {}. Stderr: {}",
                status,
                reason.trim()
            )));
        }
        Ok(stdout)
    }

    async fn refresh(&self) -> Result<RefreshResult<Credentials>, CredentialsError> {
        let output = self.run().await?;
        let output = std::str::from_utf8(&output).map_err(|e| {
            CredentialsError::provider_error(format!(
                "Error retrieving credentials from external process: could not decode output as UTF-8: {}",
                e
            ))
        })?;
        let mut parsed = parse_credential_process_json_credentials(output).map_err(|invalid| {
            CredentialsError::provider_error(format!(
                "Error retrieving credentials from external process, could not parse response: {}",
                invalid
            ))
        })?;
        if parsed.account_id.is_none() {
            parsed.account_id = self.static_account_id.clone();
        }
        let credentials = into_credentials(parsed, PROVIDER_NAME)?;
        Ok(refresh_result(credentials, self.refresh_threshold))
    }
}

fn refresh_result(credentials: Credentials, threshold: Duration) -> RefreshResult<Credentials> {
    match credentials.expiry() {
        Some(expiry) => RefreshResult::builder(credentials)
            .stale_time(expiry)
            .prefetch_time(expiry.checked_sub(threshold).unwrap_or(expiry))
            .build(),
        None => RefreshResult::new(credentials),
    }
}

/// Deserialize a credential_process response from a string
///
/// Returns an error if the response cannot be successfully parsed or is missing keys.
///
/// Keys are case insensitive.
pub(crate) fn parse_credential_process_json_credentials(
    credentials_response: &str,
) -> Result<RefreshableCredentials, InvalidJsonCredentials> {
    let object = parse_object(credentials_response)?;
    match get_field(&object, "Version") {
        Some(Value::Number(version)) if version.as_i64() == Some(1) => {}
        Some(Value::Number(version)) => {
            return Err(InvalidJsonCredentials::Other(
                format!("unsupported Version `{}`; only version 1 is supported", version).into(),
            ))
        }
        Some(_) => {
            return Err(InvalidJsonCredentials::InvalidField {
                field: "Version",
                err: "expected a number".into(),
            })
        }
        None => return Err(InvalidJsonCredentials::MissingField("Version")),
    }
    Ok(RefreshableCredentials {
        access_key_id: require_string(&object, "AccessKeyId")?,
        secret_access_key: require_string(&object, "SecretAccessKey")?,
        session_token: get_string(&object, "SessionToken")?,
        expiration: get_string(&object, "Expiration")?
            .map(|expiration| parse_timestamp("Expiration", &expiration))
            .transpose()?,
        account_id: get_string(&object, "AccountId")?,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    // 2022-05-02T18:36:00Z
    const EXPIRATION_SECS: u64 = 1651516560;

    #[test]
    fn parse_full_document() {
        let parsed = parse_credential_process_json_credentials(
            r#"{ "Version": 1, "AccessKeyId": "ASIARTESTID", "SecretAccessKey": "TESTSECRETKEY", "SessionToken": "TESTSESSIONTOKEN", "Expiration": "2022-05-02T18:36:00+00:00", "AccountId": "123456789012" }"#,
        )
        .expect("valid document");
        assert_eq!("ASIARTESTID", parsed.access_key_id);
        assert_eq!(Some("TESTSESSIONTOKEN".to_string()), parsed.session_token);
        assert_eq!(
            Some(UNIX_EPOCH + Duration::from_secs(EXPIRATION_SECS)),
            parsed.expiration
        );
        assert_eq!(Some("123456789012".to_string()), parsed.account_id);
    }

    #[test]
    fn version_is_required_and_must_be_one() {
        let missing = parse_credential_process_json_credentials(
            r#"{"AccessKeyId": "A", "SecretAccessKey": "S"}"#,
        )
        .expect_err("missing version");
        assert!(matches!(missing, InvalidJsonCredentials::MissingField("Version")));

        let wrong = parse_credential_process_json_credentials(
            r#"{"Version": 2, "AccessKeyId": "A", "SecretAccessKey": "S"}"#,
        )
        .expect_err("wrong version");
        assert!(wrong.to_string().contains("only version 1"), "{}", wrong);

        let string = parse_credential_process_json_credentials(
            r#"{"Version": "1", "AccessKeyId": "A", "SecretAccessKey": "S"}"#,
        )
        .expect_err("string version");
        assert!(matches!(
            string,
            InvalidJsonCredentials::InvalidField {
                field: "Version",
                ..
            }
        ));
    }

    #[test]
    fn refresh_times_use_the_threshold() {
        let expiry = UNIX_EPOCH + Duration::from_secs(EXPIRATION_SECS);
        let creds = Credentials::builder()
            .access_key_id("a")
            .secret_access_key("b")
            .expiry(expiry)
            .build()
            .unwrap();
        let result = refresh_result(creds, Duration::from_secs(15));
        assert_eq!(Some(expiry), result.stale_time());
        assert_eq!(Some(expiry - Duration::from_secs(15)), result.prefetch_time());

        let forever = refresh_result(Credentials::from_keys("a", "b", None), Duration::from_secs(15));
        assert_eq!(None, forever.stale_time());
        assert_eq!(None, forever.prefetch_time());
    }

    #[test]
    fn debug_redacts_arguments() {
        let provider = ProcessCredentialsProvider::new("my-creds --secret hunter2");
        let debug = format!("{:?}", provider);
        assert!(debug.contains("my-creds ** arguments redacted **"), "{}", debug);
        assert!(!debug.contains("hunter2"), "{}", debug);
        assert_eq!("single", debug_fmt_command_string("single"));
    }

    #[tokio::test]
    async fn missing_command_is_a_deferred_error() {
        let provider = ProcessCredentialsProvider::builder().build();
        let err = provider.provide_credentials().await.expect_err("no command");
        assert!(matches!(err, CredentialsError::InvalidConfiguration(_)), "{:?}", err);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use aws_credential_types::provider::error::DisplayErrorContext;

        #[tokio::test]
        async fn credential_process() {
            let provider = ProcessCredentialsProvider::new(
                r#"echo '{ "Version": 1, "AccessKeyId": "ASIARTESTID", "SecretAccessKey": "TESTSECRETKEY", "SessionToken": "TESTSESSIONTOKEN", "Expiration": "2099-05-02T18:36:00+00:00" }'"#,
            );
            let creds = provider.provide_credentials().await.expect("valid creds");
            assert_eq!(Some("ASIARTESTID"), creds.access_key_id());
            assert_eq!(Some("TESTSECRETKEY"), creds.secret_access_key());
            assert_eq!(Some("TESTSESSIONTOKEN"), creds.session_token());
            assert_eq!(Some(PROVIDER_NAME), creds.provider_name());
            assert!(creds.expiry().unwrap() > SystemTime::now());
        }

        #[tokio::test]
        async fn static_account_id_fills_in_missing_account() {
            let provider = ProcessCredentialsProvider::builder()
                .command(r#"echo '{"Version": 1, "AccessKeyId": "A", "SecretAccessKey": "S"}'"#)
                .static_account_id("111122223333")
                .build();
            let creds = provider.provide_credentials().await.expect("valid creds");
            assert_eq!("111122223333", creds.account_id().unwrap().as_str());
            assert_eq!(None, creds.session_token());
        }

        #[tokio::test]
        async fn failing_process_reports_stderr() {
            let provider = ProcessCredentialsProvider::new("echo 'no credentials for you' >&2; exit 3");
            let err = provider.provide_credentials().await.expect_err("exit 3");
            let message = DisplayErrorContext(&err).to_string();
            assert!(message.contains("no credentials for you"), "{}", message);
            assert!(message.contains('3'), "{}", message);
        }

        #[tokio::test]
        async fn output_limit_is_enforced() {
            let provider = ProcessCredentialsProvider::builder()
                .command(r#"echo '{"Version": 1, "AccessKeyId": "A", "SecretAccessKey": "S"}'"#)
                .process_output_limit(10)
                .build();
            let err = provider.provide_credentials().await.expect_err("too much output");
            assert!(
                DisplayErrorContext(&err).to_string().contains("exceeded limit of 10 bytes"),
                "{}",
                DisplayErrorContext(&err)
            );
        }

        #[tokio::test]
        async fn unbounded_output_limit() {
            let provider = ProcessCredentialsProvider::builder()
                .command(r#"echo '{"Version": 1, "AccessKeyId": "A", "SecretAccessKey": "S"}'"#)
                .process_output_limit(u64::MAX)
                .build();
            let creds = provider.provide_credentials().await.expect("valid creds");
            assert_eq!(Some("A"), creds.access_key_id());
        }

        #[tokio::test]
        async fn credentials_without_expiry_are_cached() {
            let dir = tempfile::tempdir().expect("temp dir");
            let counter = dir.path().join("invocations");
            let provider = ProcessCredentialsProvider::new(format!(
                r#"echo run >> '{}'; echo '{{"Version": 1, "AccessKeyId": "A", "SecretAccessKey": "S"}}'"#,
                counter.display()
            ));
            provider.provide_credentials().await.expect("valid creds");
            provider.provide_credentials().await.expect("valid creds");
            let runs = std::fs::read_to_string(&counter).expect("counter written");
            assert_eq!(1, runs.lines().count());
            provider.close().expect("close never fails");
        }

        #[tokio::test]
        async fn invalid_json_is_a_provider_error() {
            let provider = ProcessCredentialsProvider::new("echo not-json");
            let err = provider.provide_credentials().await.expect_err("bad json");
            assert!(matches!(err, CredentialsError::ProviderError(_)), "{:?}", err);
            assert!(DisplayErrorContext(&err).to_string().contains("could not parse response"));
        }
    }
}
