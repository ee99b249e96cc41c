/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Values that accompany a key pair inside [`Credentials`](crate::Credentials)

use std::fmt;
use zeroize::Zeroizing;

/// The twelve digit identifier of the AWS account that owns a set of credentials.
///
/// Zeroed in memory when dropped.
#[derive(Clone, Eq, PartialEq)]
pub struct AccountId {
    inner: Zeroizing<String>,
}

impl AccountId {
    /// Returns the account id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountId").field(&self.as_str()).finish()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> From<T> for AccountId
where
    T: Into<String>,
{
    fn from(value: T) -> Self {
        Self {
            inner: Zeroizing::new(value.into()),
        }
    }
}
