/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use super::parser::RawProfileSet;
use super::source::FileKind;
use super::{Profile, ProfileSet};

/// Normalize the raw profiles of one file and merge them into `base`
///
/// - In the config file, `profile` is stripped from section names (`profile foo` => `foo`) and
///   sections other than `default` without that prefix are ignored.
/// - In the config file, `[profile default]` takes priority over `[default]`.
/// - Credentials files perform no name normalization.
/// - Profile and property names are validated (see `validate_identifier`); invalid ones are
///   ignored with a warning.
/// - Property names are case-insensitive.
/// - Profiles with identical names are merged. Properties from later files replace earlier ones.
pub(super) fn merge_in(base: &mut ProfileSet, raw_profile_set: RawProfileSet<'_>, kind: FileKind) {
    let mut default_profile_has_profile_prefix = false;
    // `[profile default]` must win regardless of which section appears first
    let mut raw_profiles: Vec<_> = raw_profile_set.into_iter().collect();
    raw_profiles.sort_by_key(|(name, _)| *name == "default");

    for (profile_name, raw_profile) in raw_profiles {
        let normalized_profile_name = match (profile_name, kind) {
            (any, FileKind::Credentials) => any,
            ("default", FileKind::Config) if default_profile_has_profile_prefix => {
                tracing::warn!("profile `default` ignored because `[profile default]` was found which takes priority");
                continue;
            }
            ("default", FileKind::Config) => "default",
            (other, FileKind::Config) => match other.strip_prefix("profile") {
                Some(rest) if rest.starts_with(char::is_whitespace) => {
                    let name = rest.trim();
                    if name == "default" {
                        default_profile_has_profile_prefix = true;
                    }
                    name
                }
                _ => {
                    tracing::warn!(profile = %other, "profile ignored: in config files, profiles MUST start with `profile `");
                    continue;
                }
            },
        };
        let normalized_name = match validate_identifier(normalized_profile_name) {
            Some(name) => name,
            None => {
                tracing::warn!(name = ?normalized_profile_name, "profile ignored because `{}` was not a valid identifier", normalized_profile_name);
                continue;
            }
        };
        let profile = base
            .profiles
            .entry(normalized_name.to_owned())
            .or_insert_with(|| Profile::new(normalized_name, Default::default()));
        for (k, v) in raw_profile {
            match validate_identifier(k) {
                Some(k) => profile.insert(k, v.into_owned()),
                None => {
                    tracing::warn!(profile = %normalized_name, key = ?k, "key ignored because `{}` was not a valid identifier", k);
                }
            }
        }
    }
}

/// Validate that a string is a valid identifier
///
/// Identifiers must match `[A-Za-z0-9_\-/.%@:+]+`
fn validate_identifier(input: &str) -> Option<&str> {
    (!input.is_empty()
        && input.chars().all(|ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '/' | '.' | '%' | '@' | ':' | '+')
        }))
    .then_some(input)
}
