/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Load credentials from the shared config (`~/.aws/config`) and credentials
//! (`~/.aws/credentials`) files.
//!
//! - [`ProfileCredentialsProvider`] reads the files once, when it is built.
//! - [`ReloadingProfileCredentialsProvider`] rebuilds its inner provider whenever a file's
//!   modification time changes.

use std::borrow::Cow;
use std::collections::HashMap;

mod credentials;
mod normalize;
mod parser;
pub mod reloading;
mod source;

pub use credentials::{
    AssumeRoleProviderFactory, Builder, ProfileCredentialsProvider, ProfileFileError,
    SharedAssumeRoleProviderFactory,
};
pub use parser::ProfileParseError;
pub use reloading::{ReloadPolicy, ReloadingProfileCredentialsProvider};

/// An individual configuration profile
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Profile {
    name: String,
    properties: HashMap<String, String>,
}

impl Profile {
    /// Create a new profile
    pub fn new(name: impl Into<String>, properties: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
        }
    }

    /// The name of this profile
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of the property named `name`. Property names are case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn insert(&mut self, name: &str, value: String) {
        self.properties.insert(name.to_ascii_lowercase(), value);
    }
}

/// The profiles of the config and credentials files, merged
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProfileSet {
    profiles: HashMap<String, Profile>,
    selected_profile: Cow<'static, str>,
}

impl ProfileSet {
    pub(crate) fn empty() -> Self {
        Self {
            profiles: Default::default(),
            selected_profile: Cow::Borrowed("default"),
        }
    }

    /// Parses and merges the files of `source`
    pub(crate) fn parse(source: source::Source) -> Result<Self, ProfileParseError> {
        let mut base = ProfileSet::empty();
        base.selected_profile = source.profile;
        for file in &source.files {
            normalize::merge_in(&mut base, parser::parse_profile_file(file)?, file.kind);
        }
        Ok(base)
    }

    /// Retrieves a named profile
    pub fn get_profile(&self, profile_name: &str) -> Option<&Profile> {
        self.profiles.get(profile_name)
    }

    /// The name of the profile credentials are loaded from
    pub fn selected_profile(&self) -> &str {
        &self.selected_profile
    }

    /// True if neither file defined any profile
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Names of all profiles in this set
    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::source::{File, FileKind, Source};
    use super::*;

    fn source(config: &str, credentials: &str) -> Source {
        Source {
            files: vec![
                File {
                    kind: FileKind::Config,
                    path: "~/.aws/config".into(),
                    contents: config.into(),
                },
                File {
                    kind: FileKind::Credentials,
                    path: "~/.aws/credentials".into(),
                    contents: credentials.into(),
                },
            ],
            profile: "dev".into(),
        }
    }

    #[test]
    fn merges_both_files() {
        let set = ProfileSet::parse(source(
            "[profile dev]\nregion = us-east-1\nAWS_ACCESS_KEY_ID = from-config\n",
            "[dev]\naws_access_key_id = from-credentials\n[other]\n",
        ))
        .expect("valid");
        assert_eq!("dev", set.selected_profile());
        let dev = set.get_profile("dev").expect("dev exists");
        assert_eq!("dev", dev.name());
        assert_eq!(Some("us-east-1"), dev.get("REGION"));
        assert_eq!(Some("from-credentials"), dev.get("aws_access_key_id"));
        let mut names: Vec<_> = set.profiles().collect();
        names.sort_unstable();
        assert_eq!(vec!["dev", "other"], names);
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = ProfileSet::parse(source("", "aws_access_key_id = no-profile\n"))
            .expect_err("property outside profile");
        assert!(err.to_string().contains("~/.aws/credentials"), "{}", err);
    }

    #[test]
    fn empty_files() {
        assert!(ProfileSet::parse(source("", "")).expect("valid").is_empty());
    }
}
