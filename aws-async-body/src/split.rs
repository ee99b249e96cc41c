/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Splitting a body into fixed-size chunks

use crate::body::{AsyncBody, BodyStream};
use crate::error::BodyError;
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Regroup `upstream` into chunks of exactly `chunk_size` bytes, except for a shorter last chunk
///
/// At most `chunk_size` bytes plus one upstream item are buffered. Never yields an empty chunk.
pub(crate) fn rechunk(upstream: BodyStream, chunk_size: usize) -> BodyStream {
    debug_assert!(chunk_size > 0);
    BodyStream::new(futures_util::stream::try_unfold(
        (upstream, BytesMut::new(), false),
        move |(mut upstream, mut buffer, mut upstream_done)| async move {
            while !upstream_done && buffer.len() < chunk_size {
                match upstream.next().await {
                    Some(data) => buffer.extend_from_slice(&data?),
                    None => upstream_done = true,
                }
            }
            if buffer.is_empty() {
                return Ok::<_, BodyError>(None);
            }
            let chunk = buffer.split_to(chunk_size.min(buffer.len())).freeze();
            Ok(Some((chunk, (upstream, buffer, upstream_done))))
        },
    ))
}

/// Number of chunks a body of `length` bytes splits into
pub fn chunk_count(length: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    length.div_ceil(chunk_size)
}

impl AsyncBody {
    /// Split this body into chunks of `chunk_size` bytes
    ///
    /// Every chunk but the last holds exactly `chunk_size` bytes. Each chunk is an independent,
    /// replayable body that reports its exact length. Only one chunk is held in memory at a time:
    /// the next one is read from this body when the [`SplitBody`] is polled again.
    ///
    /// ```rust
    /// # async fn docs() -> Result<(), aws_async_body::BodyError> {
    /// use aws_async_body::AsyncBody;
    /// use futures_util::TryStreamExt;
    ///
    /// let chunks: Vec<AsyncBody> = AsyncBody::from("0123456789a")
    ///     .split(5)?
    ///     .try_collect()
    ///     .await?;
    /// let lengths: Vec<_> = chunks.iter().map(|c| c.size_hint().exact_len()).collect();
    /// assert_eq!(vec![Some(5), Some(5), Some(1)], lengths);
    /// # Ok(())
    /// # }
    /// ```
    pub fn split(&self, chunk_size: usize) -> Result<SplitBody, BodyError> {
        if chunk_size == 0 {
            return Err(BodyError::InvalidChunkSize);
        }
        let expected_chunks = self
            .size_hint()
            .exact_len()
            .map(|len| chunk_count(len, chunk_size as u64));
        Ok(SplitBody {
            chunks: rechunk(self.subscribe(), chunk_size),
            expected_chunks,
        })
    }
}

/// Stream of chunk bodies returned by [`AsyncBody::split`]
#[derive(Debug)]
pub struct SplitBody {
    chunks: BodyStream,
    expected_chunks: Option<u64>,
}

impl SplitBody {
    /// How many chunks will be produced, when the size of the body is known
    pub fn expected_chunks(&self) -> Option<u64> {
        self.expected_chunks
    }
}

impl Stream for SplitBody {
    type Item = Result<AsyncBody, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.chunks)
            .poll_next(cx)
            .map(|chunk| chunk.map(|chunk| chunk.map(AsyncBody::from)))
    }
}
