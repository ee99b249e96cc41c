/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Profile credentials that follow changes to the profile files

use super::credentials::{Builder as ProfileBuilder, SharedAssumeRoleProviderFactory};
use super::source::{self, Location};
use super::{AssumeRoleProviderFactory, ProfileCredentialsProvider};
use crate::os_shim_internal::Fs;
use crate::provider_config::ProviderConfig;
use crate::web_identity::{SharedWebIdentityCredentialsFactory, WebIdentityCredentialsFactory};
use aws_cached_supplier::time::SharedTimeSource;
use aws_credential_types::provider::error::{CloseError, DisplayErrorContext};
use aws_credential_types::provider::{self, future, ProvideCredentials};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::Instrument;

const PROVIDER_NAME: &str = "ReloadingProfileCredentialsProvider";

/// When to check the profile files for changes
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ReloadPolicy {
    /// Check modification times on every credentials request
    #[default]
    EveryCall,
    /// Check modification times at most once per interval
    Interval(Duration),
}

/// Profile credentials provider that rebuilds itself when the profile files change
///
/// Changes are detected by file modification time: the files are only re-read, and the inner
/// [`ProfileCredentialsProvider`] only rebuilt, when the modification time of the config or
/// credentials file differs from what was seen last. Creating or deleting a file counts as a
/// change.
///
/// ```rust
/// use aws_credential_providers::profile::{ReloadPolicy, ReloadingProfileCredentialsProvider};
/// use std::time::Duration;
///
/// let provider = ReloadingProfileCredentialsProvider::builder()
///     .reload_policy(ReloadPolicy::Interval(Duration::from_secs(30)))
///     .build();
/// ```
#[derive(Debug)]
pub struct ReloadingProfileCredentialsProvider {
    profile_builder: ProfileBuilder,
    fs: Fs,
    locations: Vec<Location>,
    policy: ReloadPolicy,
    time_source: SharedTimeSource,
    state: RwLock<State>,
}

#[derive(Debug)]
struct State {
    provider: Arc<ProfileCredentialsProvider>,
    modified: Vec<Option<SystemTime>>,
    last_checked: SystemTime,
}

impl ReloadingProfileCredentialsProvider {
    /// Builder for this provider
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn modification_times(&self) -> Vec<Option<SystemTime>> {
        modification_times(&self.fs, &self.locations)
    }

    fn should_check(&self, last_checked: SystemTime, now: SystemTime) -> bool {
        match self.policy {
            ReloadPolicy::EveryCall => true,
            ReloadPolicy::Interval(interval) => now
                .duration_since(last_checked)
                .map(|elapsed| elapsed >= interval)
                // the clock moved backwards
                .unwrap_or(true),
        }
    }

    /// Returns the provider for the current contents of the profile files
    fn current_provider(&self) -> Arc<ProfileCredentialsProvider> {
        let now = self.time_source.now();
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if !self.should_check(state.last_checked, now) {
                return state.provider.clone();
            }
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !self.should_check(state.last_checked, now) {
            return state.provider.clone();
        }
        // sampled under the write lock: `modified` must never go back to an older snapshot
        let modified = self.modification_times();
        state.last_checked = now;
        if state.modified != modified {
            tracing::info!("profile files changed, reloading profile credentials");
            let provider = Arc::new(self.profile_builder.clone().build());
            let previous = std::mem::replace(&mut state.provider, provider);
            state.modified = modified;
            if let Err(err) = previous.close() {
                tracing::warn!(error = %DisplayErrorContext(&err), "failed to close the previous profile provider");
            }
        }
        state.provider.clone()
    }

    async fn credentials(&self) -> provider::Result {
        let provider = self.current_provider();
        provider.provide_credentials().await
    }
}

impl ProvideCredentials for ReloadingProfileCredentialsProvider {
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
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .provider
            .close()
    }
}

fn modification_times(fs: &Fs, locations: &[Location]) -> Vec<Option<SystemTime>> {
    locations
        .iter()
        .map(|location| fs.modified(&location.path).ok())
        .collect()
}

/// Builder for [`ReloadingProfileCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    provider_config: Option<ProviderConfig>,
    profile_builder: ProfileBuilder,
    reload_policy: Option<ReloadPolicy>,
}

impl Builder {
    /// Override the configuration used for this provider
    pub fn configure(mut self, provider_config: &ProviderConfig) -> Self {
        self.provider_config = Some(provider_config.clone());
        self
    }

    /// When to check the profile files for changes. Defaults to [`ReloadPolicy::EveryCall`].
    pub fn reload_policy(mut self, reload_policy: ReloadPolicy) -> Self {
        self.reload_policy = Some(reload_policy);
        self
    }

    /// Load credentials from this profile instead of the one named by `AWS_PROFILE`
    pub fn profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_builder = self.profile_builder.profile_name(profile_name);
        self
    }

    /// Factory used for profiles that assume a role
    pub fn assume_role_factory(mut self, factory: impl AssumeRoleProviderFactory + 'static) -> Self {
        self.profile_builder
            .set_assume_role_factory(Some(SharedAssumeRoleProviderFactory::new(factory)));
        self
    }

    /// Factory used for profiles that assume a role with a web identity token
    pub fn web_identity_factory(
        mut self,
        factory: impl WebIdentityCredentialsFactory + 'static,
    ) -> Self {
        self.profile_builder
            .set_web_identity_factory(Some(SharedWebIdentityCredentialsFactory::new(factory)));
        self
    }

    /// Refresh credentials of cached sources on a background task
    pub fn async_credential_update_enabled(mut self, enabled: bool) -> Self {
        self.profile_builder
            .set_async_credential_update_enabled(Some(enabled));
        self
    }

    /// Builds the provider, reading the profile files for the first time
    pub fn build(self) -> ReloadingProfileCredentialsProvider {
        let conf = self.provider_config.unwrap_or_default();
        let profile_builder = self.profile_builder.configure(&conf);
        let fs = conf.fs();
        let locations = source::locations(&conf.properties(), &conf.env());
        let time_source = conf.time_source();
        let modified = modification_times(&fs, &locations);
        let state = State {
            provider: Arc::new(profile_builder.clone().build()),
            modified,
            last_checked: time_source.now(),
        };
        ReloadingProfileCredentialsProvider {
            profile_builder,
            fs,
            locations,
            policy: self.reload_policy.unwrap_or_default(),
            time_source,
            state: RwLock::new(state),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os_shim_internal::Env;
    use aws_cached_supplier::test_util::ManualTimeSource;
    use std::path::Path;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn write_credentials(path: &Path, access_key_id: &str, modified: SystemTime) {
        std::fs::write(
            path,
            format!(
                "[default]\naws_access_key_id = {}\naws_secret_access_key = secret\n",
                access_key_id
            ),
        )
        .unwrap();
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    struct TestFiles {
        _dir: TempDir,
        credentials: std::path::PathBuf,
        conf: ProviderConfig,
    }

    fn test_files(time_source: Option<ManualTimeSource>) -> TestFiles {
        let dir = tempfile::tempdir().unwrap();
        let credentials = dir.path().join("credentials");
        let config = dir.path().join("config");
        let env = Env::from_slice(&[
            ("AWS_SHARED_CREDENTIALS_FILE", credentials.to_str().unwrap()),
            ("AWS_CONFIG_FILE", config.to_str().unwrap()),
        ]);
        let mut conf = ProviderConfig::empty().with_env(env).with_fs(Fs::real());
        if let Some(time_source) = time_source {
            conf = conf.with_time_source(time_source);
        }
        TestFiles {
            _dir: dir,
            credentials,
            conf,
        }
    }

    async fn access_key_id(provider: &ReloadingProfileCredentialsProvider) -> String {
        provider
            .provide_credentials()
            .await
            .expect("credentials")
            .access_key_id()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn reloads_when_modified() {
        let files = test_files(None);
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000_000);
        write_credentials(&files.credentials, "FIRST", t0);
        let provider = ReloadingProfileCredentialsProvider::builder()
            .configure(&files.conf)
            .build();
        assert_eq!("FIRST", access_key_id(&provider).await);

        write_credentials(&files.credentials, "SECOND", t0 + Duration::from_secs(10));
        assert_eq!("SECOND", access_key_id(&provider).await);
    }

    #[tokio::test]
    async fn unchanged_modification_time_is_not_reloaded() {
        let files = test_files(None);
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000_000);
        write_credentials(&files.credentials, "FIRST", t0);
        let provider = ReloadingProfileCredentialsProvider::builder()
            .configure(&files.conf)
            .build();
        assert_eq!("FIRST", access_key_id(&provider).await);

        write_credentials(&files.credentials, "SECOND", t0);
        assert_eq!("FIRST", access_key_id(&provider).await);
    }

    #[tokio::test]
    async fn file_created_after_build() {
        let files = test_files(None);
        let provider = ReloadingProfileCredentialsProvider::builder()
            .configure(&files.conf)
            .build();
        let err = provider
            .provide_credentials()
            .await
            .expect_err("no files yet");
        assert!(err.is_not_loaded(), "{:?}", err);

        write_credentials(
            &files.credentials,
            "CREATED",
            UNIX_EPOCH + Duration::from_secs(1_000_000),
        );
        assert_eq!("CREATED", access_key_id(&provider).await);
    }

    #[test]
    fn concurrent_callers_observe_a_single_reload() {
        let time_source = ManualTimeSource::new(UNIX_EPOCH + Duration::from_secs(5_000_000));
        let files = test_files(Some(time_source.clone()));
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000_000);
        write_credentials(&files.credentials, "FIRST", t0);
        let provider = ReloadingProfileCredentialsProvider::builder()
            .configure(&files.conf)
            .reload_policy(ReloadPolicy::Interval(Duration::from_secs(60)))
            .build();
        let initial = provider.current_provider();

        write_credentials(&files.credentials, "SECOND", t0 + Duration::from_secs(10));
        time_source.advance(Duration::from_secs(60));
        let seen: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| provider.current_provider()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(seen.iter().all(|p| Arc::ptr_eq(p, &seen[0])));
        assert!(!Arc::ptr_eq(&initial, &seen[0]));
        assert!(Arc::ptr_eq(&seen[0], &provider.current_provider()));
    }

    #[tokio::test]
    async fn interval_policy_waits_before_checking() {
        let time_source = ManualTimeSource::new(UNIX_EPOCH + Duration::from_secs(5_000_000));
        let files = test_files(Some(time_source.clone()));
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000_000);
        write_credentials(&files.credentials, "FIRST", t0);
        let provider = ReloadingProfileCredentialsProvider::builder()
            .configure(&files.conf)
            .reload_policy(ReloadPolicy::Interval(Duration::from_secs(60)))
            .build();

        write_credentials(&files.credentials, "SECOND", t0 + Duration::from_secs(10));
        time_source.advance(Duration::from_secs(30));
        assert_eq!("FIRST", access_key_id(&provider).await);

        time_source.advance(Duration::from_secs(30));
        assert_eq!("SECOND", access_key_id(&provider).await);
    }
}
