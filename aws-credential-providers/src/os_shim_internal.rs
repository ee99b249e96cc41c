/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Seams between the providers and the operating system.
//!
//! Every provider reads environment variables, system properties and files through these types
//! rather than `std` directly, so tests can substitute fixed values without touching global
//! process state. Each type is either "real" or a fake built from a slice of pairs, and all of
//! them are cheap to clone.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env::VarError;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lookup shared by [`Env`] and [`Properties`]
#[derive(Debug)]
enum KeyValues {
    Real,
    Fake(HashMap<String, String>),
}

impl KeyValues {
    fn fake<'a>(pairs: &[(&'a str, &'a str)]) -> Self {
        KeyValues::Fake(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn get(&self, key: &str, real: impl FnOnce(&str) -> Option<String>) -> Option<String> {
        match self {
            KeyValues::Real => real(key),
            KeyValues::Fake(map) => map.get(key).cloned(),
        }
    }
}

/// Environment variables, read from the process or from a fixed map
///
/// ```rust
/// use aws_credential_providers::os_shim_internal::Env;
/// let env = Env::from_slice(&[("HOME", "/home/myname"), ("AWS_PROFILE", "dev")]);
/// assert_eq!(env.get("AWS_PROFILE").as_deref(), Ok("dev"));
/// ```
#[derive(Clone, Debug)]
pub struct Env(Arc<KeyValues>);

impl Default for Env {
    fn default() -> Self {
        Self::real()
    }
}

impl Env {
    /// The environment of the current process
    pub fn real() -> Self {
        Self(Arc::new(KeyValues::Real))
    }

    /// A fixed environment for tests
    pub fn from_slice<'a>(vars: &[(&'a str, &'a str)]) -> Self {
        Self(Arc::new(KeyValues::fake(vars)))
    }

    /// Value of the variable `key`
    pub fn get(&self, key: &str) -> Result<String, VarError> {
        self.0
            .get(key, |key| std::env::var(key).ok())
            .ok_or(VarError::NotPresent)
    }
}

impl From<HashMap<String, String>> for Env {
    fn from(vars: HashMap<String, String>) -> Self {
        Self(Arc::new(KeyValues::Fake(vars)))
    }
}

static SYSTEM_PROPERTIES: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Sets a process-wide system property such as `aws.accessKeyId`.
///
/// System properties take precedence over environment variables when resolving settings.
pub fn set_system_property(key: impl Into<String>, value: impl Into<String>) {
    SYSTEM_PROPERTIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.into(), value.into());
}

/// Removes a process-wide system property. Returns the previous value, if any.
pub fn clear_system_property(key: &str) -> Option<String> {
    SYSTEM_PROPERTIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key)
}

/// System properties: process-wide `aws.*` settings that mirror the `AWS_*` variables
///
/// The real registry is written with [`set_system_property`].
#[derive(Clone, Debug)]
pub struct Properties(Arc<KeyValues>);

impl Default for Properties {
    fn default() -> Self {
        Self::real()
    }
}

impl Properties {
    /// The process-wide registry
    pub fn real() -> Self {
        Self(Arc::new(KeyValues::Real))
    }

    /// Fixed properties for tests
    pub fn from_slice<'a>(props: &[(&'a str, &'a str)]) -> Self {
        Self(Arc::new(KeyValues::fake(props)))
    }

    /// Value of the property `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.get(key, |key| {
            SYSTEM_PROPERTIES
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned()
        })
    }
}

#[derive(Debug)]
enum Files {
    Real,
    Fake(HashMap<OsString, Vec<u8>>),
}

/// Read-only view of the file system
///
/// Profile files and token files are read through this. A fake file system holds its files in
/// memory and never changes.
///
/// ```rust
/// use aws_credential_providers::os_shim_internal::Fs;
/// let fs = Fs::from_slice(&[("/home/.aws/config", "[default]\nregion = us-east-1")]);
/// assert!(fs.read_to_end("/home/.aws/config").is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct Fs(Arc<Files>);

impl Default for Fs {
    fn default() -> Self {
        Fs::real()
    }
}

impl Fs {
    /// The real file system
    pub fn real() -> Self {
        Fs(Arc::new(Files::Real))
    }

    /// In-memory files from `(path, contents)` pairs
    pub fn from_slice<'a>(files: &[(&'a str, &'a str)]) -> Self {
        let files = files
            .iter()
            .map(|(path, contents)| (OsString::from(path), contents.as_bytes().to_vec()))
            .collect();
        Fs(Arc::new(Files::Fake(files)))
    }

    /// Contents of the file at `path`
    pub fn read_to_end(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        let path = path.as_ref();
        match self.0.as_ref() {
            Files::Real => std::fs::read(path),
            Files::Fake(files) => files
                .get(path.as_os_str())
                .cloned()
                .ok_or_else(|| io::ErrorKind::NotFound.into()),
        }
    }

    /// Last modification time of the file at `path`
    ///
    /// In-memory files all report the Unix epoch.
    pub fn modified(&self, path: impl AsRef<Path>) -> io::Result<SystemTime> {
        let path = path.as_ref();
        match self.0.as_ref() {
            Files::Real => std::fs::metadata(path)?.modified(),
            Files::Fake(files) if files.contains_key(path.as_os_str()) => Ok(UNIX_EPOCH),
            Files::Fake(_) => Err(io::ErrorKind::NotFound.into()),
        }
    }
}
