/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Errors produced while streaming a body

use crate::BoxError;

/// An error produced by an [`AsyncBody`](crate::AsyncBody) or one of its transforms
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BodyError {
    /// The body was already subscribed to and cannot be replayed
    #[error("Only one subscription may be active at a time. Retrying this body is not supported.")]
    AlreadySubscribed,

    /// The consumer stopped reading before the body was complete
    #[error("the consumer of the body cancelled its subscription")]
    Cancelled,

    /// A chunk size of zero was requested
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// A file body was asked to start past the end of the file
    #[error("offset {offset} must be less than or equal to the file size ({file_size} bytes)")]
    OffsetGreaterThanFileSize {
        /// The requested offset
        offset: u64,
        /// The size of the file
        file_size: u64,
    },

    /// A file body was built without a path
    #[error("a path must be set to build a file body")]
    MissingPath,

    /// Reading the body failed
    #[error("I/O error while reading the body")]
    Io(#[from] std::io::Error),

    /// Compressing a chunk failed
    #[error("failed to compress the body")]
    Compression(#[source] std::io::Error),

    /// The producer of the body reported an error
    #[error("the producer of the body failed")]
    Upstream(#[source] BoxError),
}

/// A checksum algorithm name was not recognized
#[derive(Debug, thiserror::Error)]
#[error(r#"unknown checksum algorithm "{algorithm}", expected one of "crc32", "crc32c" or "sha256""#)]
pub struct UnknownChecksumAlgorithmError {
    algorithm: String,
}

impl UnknownChecksumAlgorithmError {
    pub(crate) fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
        }
    }

    /// The algorithm name that was not recognized
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }
}
