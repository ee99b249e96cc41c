/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error::BodyError;
use crate::rendezvous;
use crate::BoxError;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

type Item = Result<Bytes, BodyError>;

pub(crate) fn channel() -> (BodySender, ChannelStream) {
    let (tx, rx) = rendezvous::channel();
    (BodySender { tx }, ChannelStream { rx })
}

/// Producer side of a body created with [`AsyncBody::channel`](crate::AsyncBody::channel)
///
/// `send` only completes once the subscriber has asked for more data, so a producer can never
/// get ahead of its consumer. Dropping the sender, or calling [`complete`](BodySender::complete),
/// ends the body. [`error`](BodySender::error) ends it with a failure. Because both take the
/// sender by value, a body is terminated exactly once.
///
/// ```rust
/// # async fn docs() -> Result<(), aws_async_body::BodyError> {
/// use aws_async_body::{AsyncBody, SizeHint};
///
/// let (sender, body) = AsyncBody::channel(SizeHint::exact(10));
/// tokio::spawn(async move {
///     sender.send("hello").await?;
///     sender.send("world").await?;
///     sender.complete();
///     Ok::<_, aws_async_body::BodyError>(())
/// });
/// assert_eq!("helloworld", body.collect().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BodySender {
    tx: rendezvous::Sender<Item>,
}

impl BodySender {
    /// Send a chunk, waiting until the subscriber wants more data
    ///
    /// Fails with [`BodyError::Cancelled`] once the subscriber has gone away.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), BodyError> {
        self.tx.send(Ok(data.into())).await.map_err(|_| {
            tracing::debug!("body subscriber went away, cancelling the producer");
            BodyError::Cancelled
        })
    }

    /// End the body successfully
    pub fn complete(self) {}

    /// End the body with an error
    pub async fn error(self, err: impl Into<BoxError>) -> Result<(), BodyError> {
        self.tx
            .send(Err(BodyError::Upstream(err.into())))
            .await
            .map_err(|_| BodyError::Cancelled)
    }
}

#[derive(Debug)]
pub(crate) struct ChannelStream {
    rx: rendezvous::Receiver<Item>,
}

impl Stream for ChannelStream {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
