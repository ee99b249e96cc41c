/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Locating and reading the shared config and credentials files

use crate::os_shim_internal::{Env, Fs, Properties};
use crate::provider_config::ProviderConfig;
use crate::setting::{SystemSetting, AWS_CONFIG_FILE, AWS_PROFILE, AWS_SHARED_CREDENTIALS_FILE};
use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "~/.aws/config";
const DEFAULT_CREDENTIALS_PATH: &str = "~/.aws/credentials";

/// Which of the two shared files a [`File`] came from
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum FileKind {
    Config,
    Credentials,
}

/// In-memory source of profile data
#[derive(Debug)]
pub(crate) struct Source {
    /// Files in merge order: config first, then credentials
    pub(crate) files: Vec<File>,

    /// Profile to use
    ///
    /// Overridden via `aws.profile` / `$AWS_PROFILE`, defaults to `default`
    pub(crate) profile: Cow<'static, str>,
}

/// In-memory configuration file
#[derive(Debug)]
pub(crate) struct File {
    pub(crate) kind: FileKind,
    pub(crate) path: String,
    pub(crate) contents: String,
}

/// Expanded on-disk location of one profile file
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Location {
    pub(crate) kind: FileKind,
    pub(crate) path: PathBuf,
    overridden_by: Option<SystemSetting>,
}

/// Resolves where the config and credentials files live, in merge order.
pub(crate) fn locations(properties: &Properties, env: &Env) -> Vec<Location> {
    [
        (FileKind::Config, DEFAULT_CONFIG_PATH, AWS_CONFIG_FILE),
        (
            FileKind::Credentials,
            DEFAULT_CREDENTIALS_PATH,
            AWS_SHARED_CREDENTIALS_FILE,
        ),
    ]
    .into_iter()
    .map(|(kind, default_path, setting)| {
        let overridden = setting.resolve(properties, env);
        let path = overridden.as_deref().unwrap_or(default_path);
        let expanded = expand_home(path, env, Os::real());
        tracing::debug!(before = ?path, after = ?expanded, "home directory expanded");
        Location {
            kind,
            path: expanded,
            overridden_by: overridden.map(|_| setting),
        }
    })
    .collect()
}

/// Resolves the name of the profile to use. An explicit override wins over the setting.
pub(crate) fn selected_profile(
    profile_override: Option<&str>,
    properties: &Properties,
    env: &Env,
) -> Cow<'static, str> {
    match profile_override {
        Some(name) => Cow::Owned(name.to_owned()),
        None => AWS_PROFILE
            .resolve(properties, env)
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed("default")),
    }
}

/// Load a [`Source`] as configured by `provider_config`.
pub(crate) fn load(provider_config: &ProviderConfig, profile_override: Option<&str>) -> Source {
    let env = provider_config.env();
    let properties = provider_config.properties();
    let fs = provider_config.fs();
    let files = locations(&properties, &env)
        .iter()
        .map(|location| {
            let span = match location.kind {
                FileKind::Config => tracing::debug_span!("load_config_file"),
                FileKind::Credentials => tracing::debug_span!("load_credentials_file"),
            };
            span.in_scope(|| read(&fs, location))
        })
        .collect();
    Source {
        files,
        profile: selected_profile(
            profile_override.or_else(|| provider_config.profile_name()),
            &properties,
            &env,
        ),
    }
}

/// Reads a profile file. Missing or unreadable files are treated as empty.
fn read(fs: &Fs, location: &Location) -> File {
    let path = location.path.to_string_lossy().into_owned();
    let data = match fs.read_to_end(&location.path) {
        Ok(data) => data,
        Err(e) => {
            match (e.kind(), location.overridden_by) {
                (ErrorKind::NotFound, None) => {
                    tracing::debug!(path = %path, "config file not found")
                }
                (ErrorKind::NotFound, Some(setting)) => {
                    tracing::warn!(path = %path, setting = %setting, "config file overridden by setting not found")
                }
                _other => tracing::warn!(path = %path, error = %e, "failed to read config file"),
            };
            Default::default()
        }
    };
    let contents = match String::from_utf8(data) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "config file did not contain utf-8 encoded data");
            Default::default()
        }
    };
    tracing::debug!(path = %path, size = ?contents.len(), "config file loaded");
    File {
        kind: location.kind,
        path,
        contents,
    }
}

fn expand_home(path: impl AsRef<Path>, env: &Env, os: Os) -> PathBuf {
    let path = path.as_ref();
    let mut components = path.components();
    match components.next() {
        None => path.into(),
        Some(Component::Normal(s)) if s == "~" => {
            let mut path = match home_dir(env, os) {
                Some(dir) => {
                    tracing::debug!(home = ?dir, "performing home directory substitution");
                    dir
                }
                None => {
                    tracing::warn!(
                        "could not determine home directory but home expansion was requested"
                    );
                    Default::default()
                }
            };
            // rewrite the path using system-specific path separators
            for component in components {
                path.push(component);
            }
            path
        }
        // paths that come from a setting already use the platform's separators
        _other => path.into(),
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Os {
    Windows,
    NotWindows,
}

impl Os {
    fn real() -> Self {
        match std::env::consts::OS {
            "windows" => Os::Windows,
            _ => Os::NotWindows,
        }
    }
}

/// Resolve a home directory given a set of environment variables
fn home_dir(env: &Env, os: Os) -> Option<PathBuf> {
    if let Ok(home) = env.get("HOME") {
        tracing::debug!(src = "HOME", "loaded home directory");
        return Some(PathBuf::from(home));
    }

    if os == Os::Windows {
        if let Ok(home) = env.get("USERPROFILE") {
            tracing::debug!(src = "USERPROFILE", "loaded home directory");
            return Some(PathBuf::from(home));
        }

        if let (Ok(mut drive), Ok(path)) = (env.get("HOMEDRIVE"), env.get("HOMEPATH")) {
            tracing::debug!(src = "HOMEDRIVE/HOMEPATH", "loaded home directory");
            drive.push_str(&path);
            return Some(drive.into());
        }
    }
    None
}
