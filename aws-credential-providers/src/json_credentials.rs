/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug)]
pub(crate) enum InvalidJsonCredentials {
    /// The response did not contain valid JSON
    JsonError(BoxError),
    /// The response was valid JSON but not a JSON object
    NotAnObject,
    /// The response was missing a required field
    MissingField(&'static str),
    /// A field was present but had the wrong type or could not be parsed
    InvalidField {
        field: &'static str,
        err: Box<dyn Error + Send + Sync>,
    },
    Other(Cow<'static, str>),
}

impl Display for InvalidJsonCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidJsonCredentials::JsonError(json) => {
                write!(f, "invalid JSON in response: {}", json)
            }
            InvalidJsonCredentials::NotAnObject => {
                write!(f, "expected a JSON object in the response")
            }
            InvalidJsonCredentials::MissingField(field) => write!(
                f,
                "Expected field `{}` in response but it was missing",
                field
            ),
            InvalidJsonCredentials::Other(msg) => write!(f, "{}", msg),
            InvalidJsonCredentials::InvalidField { field, err } => {
                write!(f, "Invalid field in response: `{}`. {}", field, err)
            }
        }
    }
}

impl Error for InvalidJsonCredentials {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InvalidJsonCredentials::JsonError(err) => Some(err.as_ref() as _),
            InvalidJsonCredentials::InvalidField { err, .. } => Some(err.as_ref() as _),
            _ => None,
        }
    }
}

#[derive(PartialEq, Eq)]
pub(crate) struct RefreshableCredentials {
    pub(crate) access_key_id: String,
    pub(crate) secret_access_key: String,
    pub(crate) session_token: Option<String>,
    pub(crate) expiration: Option<SystemTime>,
    pub(crate) account_id: Option<String>,
}

impl std::fmt::Debug for RefreshableCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshableCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .field("account_id", &self.account_id)
            .finish()
    }
}

#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub(crate) enum JsonCredentials {
    RefreshableCredentials(RefreshableCredentials),
    Error { code: String, message: String },
}

/// Parses the body of a JSON object, returning it as a map.
pub(crate) fn parse_object(
    response: &str,
) -> Result<Map<String, Value>, InvalidJsonCredentials> {
    match serde_json::from_str(response) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(InvalidJsonCredentials::NotAnObject),
        Err(err) => Err(InvalidJsonCredentials::JsonError(err.into())),
    }
}

/// Looks up `key` ignoring ASCII case.
pub(crate) fn get_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .get(key)
        .or_else(|| {
            object
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .filter(|value| !value.is_null())
}

/// Looks up a string field ignoring ASCII case.
pub(crate) fn get_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, InvalidJsonCredentials> {
    match get_field(object, field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(InvalidJsonCredentials::InvalidField {
            field,
            err: format!("expected a string but found `{}`", other).into(),
        }),
    }
}

pub(crate) fn require_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<String, InvalidJsonCredentials> {
    get_string(object, field)?.ok_or(InvalidJsonCredentials::MissingField(field))
}

/// Parses an RFC 3339 timestamp field such as `Expiration`.
pub(crate) fn parse_timestamp(
    field: &'static str,
    value: &str,
) -> Result<SystemTime, InvalidJsonCredentials> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(SystemTime::from)
        .map_err(|err| InvalidJsonCredentials::InvalidField {
            field,
            err: err.into(),
        })
}

/// Deserialize a credentials response from a container or instance metadata endpoint
///
/// Returns an error if the response cannot be successfully parsed or is missing keys.
///
/// Keys are case insensitive.
pub(crate) fn parse_json_credentials(
    credentials_response: &str,
) -> Result<JsonCredentials, InvalidJsonCredentials> {
    /*
      {
        "Code" : "Success",
        "LastUpdated" : "2021-09-17T20:57:08Z",
        "Type" : "AWS-HMAC",
        "AccessKeyId" : "ASIARTEST",
        "SecretAccessKey" : "xjtest",
        "Token" : "IQote///test",
        "Expiration" : "2021-09-18T03:31:56Z",
        "AccountId" : "123456789012"
      }
    */
    let object = parse_object(credentials_response)?;
    let code = get_string(&object, "Code")?;
    match code.as_deref() {
        // container endpoints omit `Code`
        None | Some("Success") => {
            let access_key_id = require_string(&object, "AccessKeyId")?;
            let secret_access_key = require_string(&object, "SecretAccessKey")?;
            let session_token = get_string(&object, "Token")?;
            let expiration = get_string(&object, "Expiration")?
                .map(|expiration| parse_timestamp("Expiration", &expiration))
                .transpose()?;
            let account_id = get_string(&object, "AccountId")?;
            Ok(JsonCredentials::RefreshableCredentials(
                RefreshableCredentials {
                    access_key_id,
                    secret_access_key,
                    session_token,
                    expiration,
                    account_id,
                },
            ))
        }
        Some(other) => Ok(JsonCredentials::Error {
            code: other.to_string(),
            message: get_string(&object, "Message")?.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn json_credentials_success_response() {
        let response = r#"
        {
          "Code" : "Success",
          "LastUpdated" : "2021-09-17T20:57:08Z",
          "Type" : "AWS-HMAC",
          "AccessKeyId" : "ASIARTEST",
          "SecretAccessKey" : "xjtest",
          "Token" : "IQote///test",
          "Expiration" : "2021-09-18T03:31:56Z"
        }"#;
        let parsed = parse_json_credentials(response).expect("valid JSON");
        assert_eq!(
            parsed,
            JsonCredentials::RefreshableCredentials(RefreshableCredentials {
                access_key_id: "ASIARTEST".into(),
                secret_access_key: "xjtest".into(),
                session_token: Some("IQote///test".into()),
                expiration: Some(UNIX_EPOCH + Duration::from_secs(1631935916)),
                account_id: None,
            })
        )
    }

    #[test]
    fn keys_are_case_insensitive() {
        let response = r#"{"accesskeyid": "A", "SECRETACCESSKEY": "S", "accountId": "123456789012"}"#;
        match parse_json_credentials(response).expect("valid JSON") {
            JsonCredentials::RefreshableCredentials(creds) => {
                assert_eq!("A", creds.access_key_id);
                assert_eq!("S", creds.secret_access_key);
                assert_eq!(None, creds.session_token);
                assert_eq!(None, creds.expiration);
                assert_eq!(Some("123456789012".to_string()), creds.account_id);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn json_credentials_invalid_json() {
        let error = parse_json_credentials("404: not found").expect_err("no json");
        assert!(matches!(error, InvalidJsonCredentials::JsonError(_)));
        let error = parse_json_credentials("[]").expect_err("not an object");
        assert!(matches!(error, InvalidJsonCredentials::NotAnObject));
    }

    #[test]
    fn json_credentials_not_success() {
        let response = r#"{"Code": "AssumeRoleUnauthorizedAccess", "Message": "EC2 cannot assume the role"}"#;
        assert_eq!(
            parse_json_credentials(response).expect("valid JSON"),
            JsonCredentials::Error {
                code: "AssumeRoleUnauthorizedAccess".into(),
                message: "EC2 cannot assume the role".into(),
            }
        );
    }

    #[test]
    fn json_credentials_missing_and_invalid_fields() {
        let error = parse_json_credentials(r#"{"AccessKeyId": "A"}"#).expect_err("missing secret");
        assert!(matches!(
            error,
            InvalidJsonCredentials::MissingField("SecretAccessKey")
        ));

        let error = parse_json_credentials(
            r#"{"AccessKeyId": "A", "SecretAccessKey": "S", "Expiration": "tomorrow"}"#,
        )
        .expect_err("invalid date");
        assert!(matches!(
            error,
            InvalidJsonCredentials::InvalidField {
                field: "Expiration",
                ..
            }
        ));

        let error = parse_json_credentials(r#"{"AccessKeyId": 5, "SecretAccessKey": "S"}"#)
            .expect_err("wrong type");
        assert!(format!("{}", error).contains("AccessKeyId"));
    }
}
