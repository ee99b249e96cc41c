/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! `aws-chunked` content encoding with an optional checksum trailer
//!
//! Each chunk is framed as `<hex length>\r\n<data>\r\n`. The body ends with a zero-length chunk
//! `0\r\n`, the trailer lines, and a final `\r\n`.

use crate::body::{AsyncBody, BodyStream};
use crate::checksum::{Checksum, ChecksumAlgorithm};
use crate::error::BodyError;
use crate::size_hint::SizeHint;
use crate::split::rechunk;
use bytes::{BufMut, Bytes, BytesMut};
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

const CRLF: &str = "\r\n";
const CHUNK_TERMINATOR: &str = "0\r\n";
const TRAILER_SEPARATOR: &str = ":";

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Content encoding header value constants
pub mod header_value {
    /// Header value denoting "aws-chunked" encoding
    pub const AWS_CHUNKED: &str = "aws-chunked";
}

/// Header names that accompany an `aws-chunked` body
pub mod header {
    /// Names the trailers that follow the body
    pub const X_AMZ_TRAILER: &str = "x-amz-trailer";
    /// Length of the body before encoding
    pub const X_AMZ_DECODED_CONTENT_LENGTH: &str = "x-amz-decoded-content-length";
}

/// Options used when encoding a body with [`AsyncBody::aws_chunked`]
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct AwsChunkedOptions {
    chunk_size: Option<usize>,
    checksum: Option<ChecksumAlgorithm>,
}

impl AwsChunkedOptions {
    /// Options with the default 64 KiB chunks and no trailer
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of each encoded chunk, except possibly the last
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Append a checksum of the body as a trailer
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    /// The chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// The checksum trailer, if any
    pub fn checksum(&self) -> Option<ChecksumAlgorithm> {
        self.checksum
    }

    fn trailer_length(&self) -> u64 {
        match self.checksum {
            Some(algorithm) => {
                algorithm.header_name().len() as u64
                    + TRAILER_SEPARATOR.len() as u64
                    + algorithm.encoded_size()
                    + CRLF.len() as u64
            }
            None => 0,
        }
    }

    /// Length of the encoded body for an input of `content_length` bytes
    pub fn encoded_length(&self, content_length: u64) -> u64 {
        let chunk_size = self.chunk_size() as u64;
        let number_of_data_chunks = content_length / chunk_size;
        let remaining_data_chunk = content_length % chunk_size;

        let mut length = number_of_data_chunks * chunk_length(chunk_size)
            + if remaining_data_chunk > 0 {
                chunk_length(remaining_data_chunk)
            } else {
                0
            };

        // End chunk
        length += CHUNK_TERMINATOR.len() as u64;
        length += self.trailer_length();
        // Encoding terminator
        length += CRLF.len() as u64;
        length
    }
}

fn chunk_length(data_length: u64) -> u64 {
    int_log16(data_length) + CRLF.len() as u64 + data_length + CRLF.len() as u64
}

// number of hex digits needed to write `i`
fn int_log16(mut i: u64) -> u64 {
    if i == 0 {
        return 1;
    }
    let mut len = 0;
    while i > 0 {
        i /= 16;
        len += 1;
    }
    len
}

impl AsyncBody {
    /// Encode this body with `aws-chunked` framing
    ///
    /// When the size of this body is known, the encoded body reports its exact encoded length.
    ///
    /// ```rust
    /// # async fn docs() -> Result<(), aws_async_body::BodyError> {
    /// use aws_async_body::aws_chunked::AwsChunkedOptions;
    /// use aws_async_body::checksum::ChecksumAlgorithm;
    /// use aws_async_body::AsyncBody;
    ///
    /// let body = AsyncBody::from("Hello world").aws_chunked(
    ///     AwsChunkedOptions::new().with_checksum(ChecksumAlgorithm::Crc32),
    /// )?;
    /// assert_eq!(
    ///     "B\r\nHello world\r\n0\r\nx-amz-checksum-crc32:i9aeUg==\r\n\r\n",
    ///     body.collect().await?
    /// );
    /// # Ok(())
    /// # }
    /// ```
    pub fn aws_chunked(self, options: AwsChunkedOptions) -> Result<AsyncBody, BodyError> {
        let chunk_size = options.chunk_size();
        if chunk_size == 0 {
            return Err(BodyError::InvalidChunkSize);
        }
        let size_hint = match self.size_hint().exact_len() {
            Some(len) => SizeHint::exact(options.encoded_length(len)),
            None => SizeHint::unknown().with_lower(options.encoded_length(0)),
        };
        let checksum = options.checksum();
        Ok(self.map_stream(size_hint, move |upstream| {
            BodyStream::new(AwsChunkedStream {
                chunks: rechunk(upstream, chunk_size),
                checksum: checksum.map(ChecksumAlgorithm::into_impl),
                done: false,
            })
        }))
    }
}

pin_project! {
    struct AwsChunkedStream<S> {
        #[pin]
        chunks: S,
        checksum: Option<Box<dyn Checksum>>,
        done: bool,
    }
}

impl<S> Stream for AwsChunkedStream<S>
where
    S: Stream<Item = Result<Bytes, BodyError>>,
{
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match ready!(this.chunks.poll_next(cx)) {
            Some(Ok(data)) => {
                if let Some(checksum) = this.checksum.as_mut() {
                    checksum.update(&data);
                }
                Poll::Ready(Some(Ok(encode_chunk(&data))))
            }
            Some(Err(err)) => {
                *this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            None => {
                *this.done = true;
                Poll::Ready(Some(Ok(encode_trailers(this.checksum.as_deref()))))
            }
        }
    }
}

fn encode_chunk(data: &[u8]) -> Bytes {
    let chunk_size = format!("{:X}{CRLF}", data.len());
    let mut encoded = BytesMut::with_capacity(chunk_size.len() + data.len() + CRLF.len());
    encoded.put_slice(chunk_size.as_bytes());
    encoded.put_slice(data);
    encoded.put_slice(CRLF.as_bytes());
    encoded.freeze()
}

fn encode_trailers(checksum: Option<&dyn Checksum>) -> Bytes {
    let mut encoded = BytesMut::new();
    encoded.put_slice(CHUNK_TERMINATOR.as_bytes());
    if let Some(checksum) = checksum {
        encoded.put_slice(checksum.trailer().as_bytes());
        encoded.put_slice(CRLF.as_bytes());
    }
    encoded.put_slice(CRLF.as_bytes());
    encoded.freeze()
}
