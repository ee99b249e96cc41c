/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::BodyError;
use crate::file::{FileBodyBuilder, FileSource};
use crate::sender::{self, BodySender};
use crate::size_hint::SizeHint;
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

type BoxStream = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send + 'static>>;
type MapStream = Arc<dyn Fn(BodyStream) -> BodyStream + Send + Sync>;

/// A stream of bytes produced by subscribing to an [`AsyncBody`]
///
/// Items are only produced when the stream is polled, so a slow consumer holds back the
/// producer. Dropping the stream cancels the subscription and releases whatever the producer
/// held open.
pub struct BodyStream {
    inner: BoxStream,
}

impl BodyStream {
    /// Wrap a stream of byte chunks
    pub fn new(stream: impl Stream<Item = Result<Bytes, BodyError>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream that fails immediately with `err`
    pub(crate) fn failed(err: BodyError) -> Self {
        Self::new(futures_util::stream::once(async move { Err(err) }))
    }

    /// Returns the next chunk, or `None` once the body is complete
    pub async fn next(&mut self) -> Option<Result<Bytes, BodyError>> {
        StreamExt::next(self).await
    }

    /// Reads the rest of the stream into memory
    pub async fn collect(mut self) -> Result<Bytes, BodyError> {
        let mut output = BytesMut::new();
        while let Some(chunk) = self.next().await {
            output.extend_from_slice(&chunk?);
        }
        Ok(output.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream").finish_non_exhaustive()
    }
}

enum Source {
    Bytes(Bytes),
    Once(Mutex<Option<BodyStream>>),
    File(FileSource),
    Mapped {
        upstream: Box<AsyncBody>,
        map: MapStream,
    },
}

/// A body that can be subscribed to as a stream of bytes
///
/// In-memory and file bodies can be subscribed to any number of times, and every subscription
/// starts from the beginning. Bodies backed by a one-shot stream (see [`AsyncBody::channel`] and
/// [`AsyncBody::from_stream`]) allow only one subscription: any later subscriber receives
/// [`BodyError::AlreadySubscribed`] instead of data. Transformed bodies inherit this from the
/// body they wrap.
///
/// ```rust
/// # async fn docs() -> Result<(), aws_async_body::BodyError> {
/// use aws_async_body::AsyncBody;
///
/// let body = AsyncBody::from("hello world");
/// assert_eq!(Some(11), body.size_hint().exact_len());
/// assert_eq!("hello world", body.collect().await?);
/// # Ok(())
/// # }
/// ```
pub struct AsyncBody {
    source: Source,
    size_hint: SizeHint,
}

impl AsyncBody {
    /// An empty body
    pub fn empty() -> Self {
        Self::from(Bytes::new())
    }

    /// A body that produces `stream` to its first subscriber
    pub fn from_stream(
        stream: impl Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
        size_hint: SizeHint,
    ) -> Self {
        Self {
            source: Source::Once(Mutex::new(Some(BodyStream::new(stream)))),
            size_hint,
        }
    }

    /// A body fed by a [`BodySender`]
    ///
    /// Each `send` completes only once the subscriber has asked for more data. Until the body is
    /// subscribed to, the first `send` waits.
    pub fn channel(size_hint: SizeHint) -> (BodySender, AsyncBody) {
        let (sender, stream) = sender::channel();
        (sender, AsyncBody::from_stream(stream, size_hint))
    }

    /// Build a body that reads from a file
    pub fn read_from() -> FileBodyBuilder {
        FileBodyBuilder::new()
    }

    pub(crate) fn from_file(source: FileSource) -> Self {
        let size_hint = SizeHint::exact(source.length());
        Self {
            source: Source::File(source),
            size_hint,
        }
    }

    /// Bounds on the number of bytes this body produces
    pub fn size_hint(&self) -> SizeHint {
        self.size_hint
    }

    /// True if every subscription replays the body from the start
    pub fn is_replayable(&self) -> bool {
        match &self.source {
            Source::Bytes(_) | Source::File(_) => true,
            Source::Once(_) => false,
            Source::Mapped { upstream, .. } => upstream.is_replayable(),
        }
    }

    /// Start streaming this body
    ///
    /// For a one-shot body, every subscription after the first yields a single
    /// [`BodyError::AlreadySubscribed`].
    pub fn subscribe(&self) -> BodyStream {
        match &self.source {
            Source::Bytes(bytes) => {
                let bytes = bytes.clone();
                BodyStream::new(futures_util::stream::iter(
                    (!bytes.is_empty()).then_some(Ok(bytes)),
                ))
            }
            Source::Once(stream) => {
                let stream = stream
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match stream {
                    Some(stream) => stream,
                    None => {
                        tracing::debug!("rejecting a second subscription to a one-shot body");
                        BodyStream::failed(BodyError::AlreadySubscribed)
                    }
                }
            }
            Source::File(file) => file.open(),
            Source::Mapped { upstream, map } => map(upstream.subscribe()),
        }
    }

    /// Subscribe and read the whole body into memory
    pub async fn collect(&self) -> Result<Bytes, BodyError> {
        self.subscribe().collect().await
    }

    /// Wrap this body so that every subscription passes through `map`
    pub(crate) fn map_stream(
        self,
        size_hint: SizeHint,
        map: impl Fn(BodyStream) -> BodyStream + Send + Sync + 'static,
    ) -> AsyncBody {
        AsyncBody {
            source: Source::Mapped {
                upstream: Box::new(self),
                map: Arc::new(map),
            },
            size_hint,
        }
    }
}

impl fmt::Debug for AsyncBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Bytes(_) => "Bytes",
            Source::Once(_) => "Once",
            Source::File(_) => "File",
            Source::Mapped { .. } => "Mapped",
        };
        f.debug_struct("AsyncBody")
            .field("source", &source)
            .field("size_hint", &self.size_hint)
            .finish()
    }
}

impl Default for AsyncBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for AsyncBody {
    fn from(bytes: Bytes) -> Self {
        let size_hint = SizeHint::exact(bytes.len() as u64);
        Self {
            source: Source::Bytes(bytes),
            size_hint,
        }
    }
}

impl From<Vec<u8>> for AsyncBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<String> for AsyncBody {
    fn from(s: String) -> Self {
        Self::from(Bytes::from(s))
    }
}

impl From<&'static [u8]> for AsyncBody {
    fn from(slice: &'static [u8]) -> Self {
        Self::from(Bytes::from_static(slice))
    }
}

impl From<&'static str> for AsyncBody {
    fn from(s: &'static str) -> Self {
        Self::from(Bytes::from_static(s.as_bytes()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn bytes_bodies_replay() {
        let body = AsyncBody::from("data");
        assert!(body.is_replayable());
        assert_eq!("data", body.collect().await.unwrap());
        assert_eq!("data", body.collect().await.unwrap());
    }

    #[tokio::test]
    async fn empty_body_produces_no_chunks() {
        let mut stream = AsyncBody::empty().subscribe();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn second_subscriber_gets_an_error() {
        let body = AsyncBody::from_stream(
            futures_util::stream::iter(vec![Ok(Bytes::from_static(b"once"))]),
            SizeHint::exact(4),
        );
        assert!(!body.is_replayable());
        let first = body.subscribe();

        let mut second = body.subscribe();
        match second.next().await {
            Some(Err(BodyError::AlreadySubscribed)) => {}
            other => panic!("expected AlreadySubscribed, got {:?}", other),
        }
        assert!(second.next().await.is_none());

        assert_eq!("once", first.collect().await.unwrap());
    }

    #[tokio::test]
    async fn mapped_bodies_follow_their_source() {
        let upper = |stream: BodyStream| {
            BodyStream::new(stream.map(|chunk| chunk.map(|b| Bytes::from(b.to_ascii_uppercase()))))
        };
        let replayable = AsyncBody::from("abc").map_stream(SizeHint::exact(3), upper);
        assert!(replayable.is_replayable());
        assert_eq!("ABC", replayable.collect().await.unwrap());
        assert_eq!("ABC", replayable.collect().await.unwrap());

        let once = AsyncBody::from_stream(
            futures_util::stream::iter(vec![Ok(Bytes::from_static(b"abc"))]),
            SizeHint::exact(3),
        )
        .map_stream(SizeHint::exact(3), upper);
        assert_eq!("ABC", once.collect().await.unwrap());
        assert!(matches!(
            once.collect().await,
            Err(BodyError::AlreadySubscribed)
        ));
    }
}
