/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Per-chunk gzip compression
//!
//! The body is cut into fixed-size chunks and each chunk is compressed as its own gzip member.
//! Concatenated members form a valid gzip stream, so the whole body can be decompressed in one
//! pass while only one chunk is held in memory during compression.

use crate::body::{AsyncBody, BodyStream};
use crate::error::BodyError;
use crate::size_hint::SizeHint;
use crate::split::rechunk;
use bytes::Bytes;
use flate2::write::GzEncoder;
use futures_util::StreamExt;
use std::io::Write;

const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;
const DEFAULT_LEVEL: u32 = 6;

/// Options for [`AsyncBody::gzip`]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub struct CompressionOptions {
    level: u32,
    chunk_size: usize,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl CompressionOptions {
    /// Level 6 and 128 KiB chunks
    pub fn new() -> Self {
        Self::default()
    }

    /// Compression level, from 0 (none) to 9 (best). Values above 9 are treated as 9.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Number of input bytes compressed into each gzip member
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// The compression level
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The input chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

fn compress_chunk(data: &[u8], level: flate2::Compression) -> Result<Bytes, BodyError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data).map_err(BodyError::Compression)?;
    let compressed = encoder.finish().map_err(BodyError::Compression)?;
    Ok(Bytes::from(compressed))
}

impl AsyncBody {
    /// Compress this body with gzip, one member per chunk
    ///
    /// The compressed size is not known ahead of time, so the result reports an unknown size.
    pub fn gzip(self, options: CompressionOptions) -> Result<AsyncBody, BodyError> {
        let chunk_size = options.chunk_size();
        if chunk_size == 0 {
            return Err(BodyError::InvalidChunkSize);
        }
        let level = flate2::Compression::new(options.level());
        Ok(self.map_stream(SizeHint::unknown(), move |upstream| {
            BodyStream::new(
                rechunk(upstream, chunk_size)
                    .map(move |chunk| chunk.and_then(|chunk| compress_chunk(&chunk, level))),
            )
        }))
    }
}
