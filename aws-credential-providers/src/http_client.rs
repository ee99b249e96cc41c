/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The HTTP client seam used by the container and instance metadata providers.
//!
//! Credential endpoints are small, local and latency sensitive, so the seam is deliberately
//! narrow: a whole request in, a whole response out, bounded by a timeout.

use bytes::Bytes;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Future returned by [`HttpClient::call`]
pub type HttpFuture<'a> =
    Pin<Box<dyn Future<Output = Result<http::Response<Bytes>, HttpError>> + Send + 'a>>;

/// A minimal HTTP client
pub trait HttpClient: Send + Sync + fmt::Debug {
    /// Sends `request` and buffers the response body. The whole exchange must finish within
    /// `timeout`.
    fn call(&self, request: http::Request<Bytes>, timeout: Duration) -> HttpFuture<'_>;
}

/// Cheaply cloneable [`HttpClient`]
#[derive(Clone, Debug)]
pub struct SharedHttpClient(Arc<dyn HttpClient>);

impl SharedHttpClient {
    /// Wraps `client` in a `SharedHttpClient`
    pub fn new(client: impl HttpClient + 'static) -> Self {
        Self(Arc::new(client))
    }
}

impl HttpClient for SharedHttpClient {
    fn call(&self, request: http::Request<Bytes>, timeout: Duration) -> HttpFuture<'_> {
        self.0.call(request, timeout)
    }
}

#[derive(Debug)]
enum HttpErrorKind {
    Timeout(Duration),
    Io,
    Other,
}

/// A request that did not produce a response
#[derive(Debug)]
pub struct HttpError {
    kind: HttpErrorKind,
    source: Option<BoxError>,
}

impl HttpError {
    /// The request did not complete within `after`
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: HttpErrorKind::Timeout(after),
            source: None,
        }
    }

    /// A socket or connection level failure
    pub fn io(source: impl Into<BoxError>) -> Self {
        Self {
            kind: HttpErrorKind::Io,
            source: Some(source.into()),
        }
    }

    /// Any other failure
    pub fn other(source: impl Into<BoxError>) -> Self {
        Self {
            kind: HttpErrorKind::Other,
            source: Some(source.into()),
        }
    }

    /// True if the request timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, HttpErrorKind::Timeout(_))
    }

    /// True if the request failed at the connection level
    pub fn is_io(&self) -> bool {
        matches!(self.kind, HttpErrorKind::Io)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HttpErrorKind::Timeout(after) => {
                write!(f, "HTTP request timed out after {:?}", after)
            }
            HttpErrorKind::Io => write!(f, "HTTP request failed to connect"),
            HttpErrorKind::Other => write!(f, "HTTP request failed"),
        }
    }
}

impl Error for HttpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

/// Returns the default HTTP client, if one was compiled in.
pub fn default_http_client() -> Option<SharedHttpClient> {
    #[cfg(feature = "client-hyper")]
    {
        Some(SharedHttpClient::new(hyper_client::HyperClient::new()))
    }
    #[cfg(not(feature = "client-hyper"))]
    {
        tracing::debug!("no default HTTP client is available; the `client-hyper` feature is disabled");
        None
    }
}

#[cfg(feature = "client-hyper")]
mod hyper_client {
    use super::{HttpClient, HttpError, HttpFuture};
    use bytes::Bytes;
    use hyper::client::HttpConnector;
    use hyper_tls::HttpsConnector;
    use std::fmt;
    use std::time::Duration;

    pub(super) struct HyperClient {
        client: hyper::Client<HttpsConnector<HttpConnector>, hyper::Body>,
    }

    impl HyperClient {
        pub(super) fn new() -> Self {
            Self {
                client: hyper::Client::builder().build(HttpsConnector::new()),
            }
        }
    }

    impl fmt::Debug for HyperClient {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("HyperClient").finish()
        }
    }

    fn classify(err: hyper::Error) -> HttpError {
        if err.is_connect() || err.is_incomplete_message() || err.is_closed() {
            HttpError::io(err)
        } else {
            HttpError::other(err)
        }
    }

    impl HttpClient for HyperClient {
        fn call(&self, request: http::Request<Bytes>, timeout: Duration) -> HttpFuture<'_> {
            let response = self.client.request(request.map(hyper::Body::from));
            Box::pin(async move {
                let exchange = async move {
                    let response = response.await.map_err(classify)?;
                    let (parts, body) = response.into_parts();
                    let body = hyper::body::to_bytes(body).await.map_err(classify)?;
                    Ok(http::Response::from_parts(parts, body))
                };
                match tokio::time::timeout(timeout, exchange).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(HttpError::timeout(timeout)),
                }
            })
        }
    }
}

/// Test utilities for code that makes HTTP calls through [`HttpClient`]
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::{HttpClient, HttpError, HttpFuture};
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    #[derive(Debug)]
    enum Outcome {
        Response(http::Response<Bytes>),
        Timeout,
        Io,
    }

    /// One expected request and the canned outcome returned for it
    #[derive(Debug)]
    pub struct ReplayEvent {
        request: http::Request<Bytes>,
        outcome: Outcome,
    }

    impl ReplayEvent {
        /// Respond to `request` with `response`
        pub fn new(request: http::Request<Bytes>, response: http::Response<Bytes>) -> Self {
            Self {
                request,
                outcome: Outcome::Response(response),
            }
        }

        /// Fail `request` with a timeout
        pub fn timeout(request: http::Request<Bytes>) -> Self {
            Self {
                request,
                outcome: Outcome::Timeout,
            }
        }

        /// Fail `request` with a connection error
        pub fn io_error(request: http::Request<Bytes>) -> Self {
            Self {
                request,
                outcome: Outcome::Io,
            }
        }
    }

    /// Builds a request for use in a [`ReplayEvent`]
    pub fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> http::Request<Bytes> {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).expect("valid test request")
    }

    /// Builds a response for use in a [`ReplayEvent`]
    pub fn response(status: u16, body: &'static str) -> http::Response<Bytes> {
        http::Response::builder()
            .status(status)
            .body(Bytes::from_static(body.as_bytes()))
            .expect("valid test response")
    }

    #[derive(Debug)]
    struct RecordedRequest {
        method: http::Method,
        uri: http::Uri,
        headers: http::HeaderMap,
    }

    #[derive(Debug)]
    struct ReplayState {
        events: Mutex<VecDeque<ReplayEvent>>,
        expected: Mutex<Vec<RecordedRequest>>,
        actual: Mutex<Vec<RecordedRequest>>,
    }

    /// An [`HttpClient`] that returns canned outcomes in order and records the requests it saw
    ///
    /// Clones share their state, so a test can hand one clone to a provider and keep another
    /// for assertions.
    #[derive(Clone, Debug)]
    pub struct ReplayingClient {
        state: Arc<ReplayState>,
    }

    impl ReplayingClient {
        /// Creates a client that replays `events` in order
        pub fn new(events: Vec<ReplayEvent>) -> Self {
            Self {
                state: Arc::new(ReplayState {
                    events: Mutex::new(events.into()),
                    expected: Mutex::new(Vec::new()),
                    actual: Mutex::new(Vec::new()),
                }),
            }
        }

        /// Number of requests the client has received
        pub fn request_count(&self) -> usize {
            self.state.actual.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Asserts that every request received matched its event: same method, same URI, and
        /// every expected header present with the expected value.
        pub fn assert_requests_match(&self) {
            let expected = self.state.expected.lock().unwrap_or_else(PoisonError::into_inner);
            let actual = self.state.actual.lock().unwrap_or_else(PoisonError::into_inner);
            assert_eq!(expected.len(), actual.len());
            for (idx, (expected, actual)) in expected.iter().zip(actual.iter()).enumerate() {
                assert_eq!(expected.method, actual.method, "request {} method", idx);
                assert_eq!(expected.uri, actual.uri, "request {} uri", idx);
                for (name, value) in expected.headers.iter() {
                    assert_eq!(
                        Some(value),
                        actual.headers.get(name),
                        "request {} header `{}`",
                        idx,
                        name
                    );
                }
            }
        }

        /// Asserts that the named header was absent from request `idx`
        pub fn assert_header_absent(&self, idx: usize, name: &str) {
            let actual = self.state.actual.lock().unwrap_or_else(PoisonError::into_inner);
            assert!(
                actual[idx].headers.get(name).is_none(),
                "request {} unexpectedly had header `{}`",
                idx,
                name
            );
        }
    }

    fn record(request: &http::Request<Bytes>) -> RecordedRequest {
        RecordedRequest {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        }
    }

    impl HttpClient for ReplayingClient {
        fn call(&self, request: http::Request<Bytes>, timeout: Duration) -> HttpFuture<'_> {
            self.state
                .actual
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record(&request));
            let event = self
                .state
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let result = match event {
                Some(event) => {
                    self.state
                        .expected
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(record(&event.request));
                    match event.outcome {
                        Outcome::Response(response) => Ok(response),
                        Outcome::Timeout => Err(HttpError::timeout(timeout)),
                        Outcome::Io => Err(HttpError::io("connection refused")),
                    }
                }
                None => Err(HttpError::other(format!(
                    "no replay event for request to {}",
                    request.uri()
                ))),
            };
            Box::pin(async move { result })
        }
    }
}
