/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Profile file parsing
//!
//! A profile file is made of lines of four kinds:
//! - profile definitions: `[profile name]` in the config file, `[name]` in the credentials file
//! - property definitions: `key = value`
//! - continuations: an indented line extends the value of the previous property
//! - comments and blank lines. Comments start with `#` or `;`.

use super::source::File;
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// A set of profiles exactly as they appeared in a single file
pub(super) type RawProfileSet<'a> = HashMap<&'a str, HashMap<&'a str, Cow<'a, str>>>;

/// An error encountered while parsing a profile file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileParseError {
    location: Location,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    line_number: usize,
    path: String,
}

impl Display for ProfileParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error parsing {} on line {}:\n  {}",
            self.location.path, self.location.line_number, self.message
        )
    }
}

impl Error for ProfileParseError {}

enum State<'a> {
    Starting,
    ReadingProfile {
        profile: &'a str,
        property: Option<&'a str>,
    },
}

struct Parser<'a> {
    data: RawProfileSet<'a>,
    state: State<'a>,
    location: Location,
}

/// Parses `file` into its profiles. Profile and property names are not validated here.
pub(super) fn parse_profile_file(file: &File) -> Result<RawProfileSet<'_>, ProfileParseError> {
    let mut parser = Parser {
        data: HashMap::new(),
        state: State::Starting,
        location: Location {
            line_number: 0,
            path: file.path.clone(),
        },
    };
    parser.parse(&file.contents)?;
    Ok(parser.data)
}

impl<'a> Parser<'a> {
    fn parse(&mut self, contents: &'a str) -> Result<(), ProfileParseError> {
        for (idx, line) in contents.lines().enumerate() {
            self.location.line_number = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || is_comment(trimmed) {
                continue;
            }
            if starts_with_whitespace(line) {
                self.read_continuation(trimmed)?;
            } else if trimmed.starts_with('[') {
                self.read_profile_line(trimmed)?;
            } else {
                self.read_property_line(trimmed)?;
            }
        }
        Ok(())
    }

    fn read_profile_line(&mut self, line: &'a str) -> Result<(), ProfileParseError> {
        let line = strip_comment(line, false).trim_end();
        let name = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| self.make_error("Profile definition must end with ']'"))?
            .trim();
        if name.is_empty() {
            return Err(self.make_error("Profile name must not be empty"));
        }
        self.data.entry(name).or_default();
        self.state = State::ReadingProfile {
            profile: name,
            property: None,
        };
        Ok(())
    }

    fn read_property_line(&mut self, line: &'a str) -> Result<(), ProfileParseError> {
        let profile = match &self.state {
            State::Starting => return Err(self.make_error("Expected a profile definition")),
            State::ReadingProfile { profile, .. } => *profile,
        };
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| self.make_error("Expected an '=' sign defining a property"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(self.make_error("Property did not have a name"));
        }
        let value = strip_comment(value, true).trim();
        self.data
            .entry(profile)
            .or_default()
            .insert(key, Cow::Borrowed(value));
        self.state = State::ReadingProfile {
            profile,
            property: Some(key),
        };
        Ok(())
    }

    fn read_continuation(&mut self, line: &'a str) -> Result<(), ProfileParseError> {
        let (profile, property) = match &self.state {
            State::ReadingProfile {
                profile,
                property: Some(property),
            } => (*profile, *property),
            _ => {
                return Err(self.make_error(
                    "Expected a profile or property definition, found a continuation line",
                ))
            }
        };
        let value = self
            .data
            .entry(profile)
            .or_default()
            .entry(property)
            .or_default();
        if value.is_empty() {
            *value = Cow::Borrowed(line);
        } else {
            let value = value.to_mut();
            value.push('\n');
            value.push_str(line);
        }
        Ok(())
    }

    fn make_error(&self, message: &str) -> ProfileParseError {
        ProfileParseError {
            location: self.location.clone(),
            message: message.into(),
        }
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

fn starts_with_whitespace(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

/// Strips a trailing comment. In property values a comment must be preceded by whitespace so that
/// values such as `secret#123` survive intact.
fn strip_comment(line: &str, require_whitespace: bool) -> &str {
    let mut prev_is_whitespace = !require_whitespace;
    for (idx, ch) in line.char_indices() {
        if (ch == '#' || ch == ';') && prev_is_whitespace {
            return &line[..idx];
        }
        prev_is_whitespace = !require_whitespace || ch.is_whitespace();
    }
    line
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::profile::source::FileKind;

    fn file(contents: &str) -> File {
        File {
            kind: FileKind::Config,
            path: "~/.aws/config".into(),
            contents: contents.into(),
        }
    }

    #[test]
    fn profiles_and_properties() {
        let file = file(
            "[default]\nregion = us-east-1\n\n[profile dev]\naws_access_key_id=AKID\naws_secret_access_key = secret # comment\n",
        );
        let parsed = parse_profile_file(&file).expect("valid");
        assert_eq!(parsed["default"]["region"], "us-east-1");
        assert_eq!(parsed["profile dev"]["aws_access_key_id"], "AKID");
        assert_eq!(parsed["profile dev"]["aws_secret_access_key"], "secret");
    }

    #[test]
    fn comments_are_ignored() {
        let file = file("# leading\n; also leading\n[default] # trailing\nkey = value;not-a-comment\n");
        let parsed = parse_profile_file(&file).expect("valid");
        assert_eq!(parsed["default"]["key"], "value;not-a-comment");
    }

    #[test]
    fn continuation_lines_extend_the_previous_property() {
        let file = file("[default]\ns3 =\n  max_concurrent_requests = 20\nkey = first\n  second\n");
        let parsed = parse_profile_file(&file).expect("valid");
        assert_eq!(parsed["default"]["s3"], "max_concurrent_requests = 20");
        assert_eq!(parsed["default"]["key"], "first\nsecond");
    }

    #[test]
    fn repeated_profiles_are_merged() {
        let file = file("[default]\na = 1\n[default]\nb = 2\na = 3\n");
        let parsed = parse_profile_file(&file).expect("valid");
        assert_eq!(parsed["default"]["a"], "3");
        assert_eq!(parsed["default"]["b"], "2");
    }

    #[test]
    fn property_outside_profile_is_an_error() {
        let err = parse_profile_file(&file("key = value\n")).expect_err("no profile");
        assert_eq!(
            "error parsing ~/.aws/config on line 1:\n  Expected a profile definition",
            err.to_string()
        );
    }

    #[test]
    fn malformed_lines() {
        let err = parse_profile_file(&file("[default\n")).expect_err("unterminated");
        assert!(err.to_string().contains("must end with ']'"), "{}", err);

        let err = parse_profile_file(&file("[default]\nnot a property\n")).expect_err("no =");
        assert!(err.to_string().contains("line 2"), "{}", err);

        let err = parse_profile_file(&file("[default]\n= value\n")).expect_err("no name");
        assert!(err.to_string().contains("did not have a name"), "{}", err);

        let err = parse_profile_file(&file("[default]\n  orphan\n")).expect_err("orphan");
        assert!(err.to_string().contains("continuation"), "{}", err);
    }
}
