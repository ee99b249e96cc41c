/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Convenience `ProvideCredentials` struct that implements the `ProvideCredentials` trait.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

enum Inner<'a> {
    Now(Option<super::Result>),
    Later(BoxFuture<'a, super::Result>),
}

/// Future new-type that `ProvideCredentials::provide_credentials` must return.
///
/// Already-resolved values skip the allocation of a boxed future.
pub struct ProvideCredentials<'a>(Inner<'a>);

impl<'a> ProvideCredentials<'a> {
    /// Creates a `ProvideCredentials` struct from a future.
    pub fn new(future: impl Future<Output = super::Result> + Send + 'a) -> Self {
        ProvideCredentials(Inner::Later(Box::pin(future)))
    }

    /// Creates a `ProvideCredentials` struct from a resolved credentials value.
    pub fn ready(credentials: super::Result) -> Self {
        ProvideCredentials(Inner::Now(Some(credentials)))
    }
}

impl fmt::Debug for ProvideCredentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Inner::Now(value) => f.debug_tuple("Now").field(value).finish(),
            Inner::Later(_) => f.debug_tuple("Later").field(&"<future>").finish(),
        }
    }
}

impl Future for ProvideCredentials<'_> {
    type Output = super::Result;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.0 {
            Inner::Now(value) => Poll::Ready(
                value
                    .take()
                    .expect("ProvideCredentials future polled after completion"),
            ),
            Inner::Later(future) => future.as_mut().poll(cx),
        }
    }
}
