/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Checksums calculated while a body streams

use crate::body::AsyncBody;
use crate::error::{BodyError, UnknownChecksumAlgorithmError};
use bytes::Bytes;
use sha2::Digest;
use std::fmt;
use std::str::FromStr;

/// Name of the CRC32 algorithm
pub const CRC_32_NAME: &str = "crc32";
/// Name of the CRC32C algorithm
pub const CRC_32_C_NAME: &str = "crc32c";
/// Name of the SHA-256 algorithm
pub const SHA_256_NAME: &str = "sha256";

const CRC_32_HEADER_NAME: &str = "x-amz-checksum-crc32";
const CRC_32_C_HEADER_NAME: &str = "x-amz-checksum-crc32c";
const SHA_256_HEADER_NAME: &str = "x-amz-checksum-sha256";

/// A checksum algorithm supported for body trailers
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ChecksumAlgorithm {
    /// CRC32 (IEEE)
    Crc32,
    /// CRC32C (Castagnoli)
    Crc32c,
    /// SHA-256
    Sha256,
}

impl ChecksumAlgorithm {
    /// Lowercase name of this algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => CRC_32_NAME,
            ChecksumAlgorithm::Crc32c => CRC_32_C_NAME,
            ChecksumAlgorithm::Sha256 => SHA_256_NAME,
        }
    }

    /// Name of the header or trailer that carries this checksum
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => CRC_32_HEADER_NAME,
            ChecksumAlgorithm::Crc32c => CRC_32_C_HEADER_NAME,
            ChecksumAlgorithm::Sha256 => SHA_256_HEADER_NAME,
        }
    }

    /// Size of the raw checksum in bytes
    pub fn size(&self) -> u64 {
        match self {
            ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::Crc32c => 4,
            ChecksumAlgorithm::Sha256 => 32,
        }
    }

    /// Length of the base64-encoded checksum
    pub fn encoded_size(&self) -> u64 {
        self.size().div_ceil(3) * 4
    }

    /// A fresh calculator for this algorithm
    pub fn into_impl(self) -> Box<dyn Checksum> {
        match self {
            ChecksumAlgorithm::Crc32 => Box::<Crc32>::default(),
            ChecksumAlgorithm::Crc32c => Box::<Crc32c>::default(),
            ChecksumAlgorithm::Sha256 => Box::<Sha256>::default(),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = UnknownChecksumAlgorithmError;

    fn from_str(checksum_algorithm: &str) -> Result<Self, Self::Err> {
        if checksum_algorithm.eq_ignore_ascii_case(CRC_32_NAME) {
            Ok(Self::Crc32)
        } else if checksum_algorithm.eq_ignore_ascii_case(CRC_32_C_NAME) {
            Ok(Self::Crc32c)
        } else if checksum_algorithm.eq_ignore_ascii_case(SHA_256_NAME) {
            Ok(Self::Sha256)
        } else {
            Err(UnknownChecksumAlgorithmError::new(checksum_algorithm))
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running checksum calculation
pub trait Checksum: Send + Sync {
    /// Given a slice of bytes, update this checksum's internal state.
    fn update(&mut self, bytes: &[u8]);

    /// The checksum of everything passed to `update` so far
    ///
    /// The running state is cloned first, so more data can still be added afterwards.
    fn finalize(&self) -> Bytes;

    /// Which algorithm this is
    fn algorithm(&self) -> ChecksumAlgorithm;

    /// The checksum, base64 encoded
    fn encoded(&self) -> String {
        base64_simd::STANDARD.encode_to_string(self.finalize())
    }

    /// The trailer line carrying this checksum, without the trailing CRLF
    fn trailer(&self) -> String {
        format!("{}:{}", self.algorithm().header_name(), self.encoded())
    }
}

#[derive(Debug, Default)]
struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Checksum for Crc32 {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn finalize(&self) -> Bytes {
        Bytes::copy_from_slice(&self.hasher.clone().finalize().to_be_bytes())
    }

    fn algorithm(&self) -> ChecksumAlgorithm {
        ChecksumAlgorithm::Crc32
    }
}

#[derive(Debug, Default)]
struct Crc32c {
    state: Option<u32>,
}

impl Checksum for Crc32c {
    fn update(&mut self, bytes: &[u8]) {
        self.state = match self.state {
            Some(crc) => Some(crc32c::crc32c_append(crc, bytes)),
            None => Some(crc32c::crc32c(bytes)),
        };
    }

    fn finalize(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.unwrap_or_default().to_be_bytes())
    }

    fn algorithm(&self) -> ChecksumAlgorithm {
        ChecksumAlgorithm::Crc32c
    }
}

#[derive(Debug, Default)]
struct Sha256 {
    hasher: sha2::Sha256,
}

impl Checksum for Sha256 {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn finalize(&self) -> Bytes {
        Bytes::copy_from_slice(self.hasher.clone().finalize().as_slice())
    }

    fn algorithm(&self) -> ChecksumAlgorithm {
        ChecksumAlgorithm::Sha256
    }
}

/// Stream `body` through `algorithm`, returning the base64-encoded checksum
pub async fn calculate(
    body: &AsyncBody,
    algorithm: ChecksumAlgorithm,
) -> Result<String, BodyError> {
    let mut checksum = algorithm.into_impl();
    let mut stream = body.subscribe();
    while let Some(data) = stream.next().await {
        checksum.update(&data?);
    }
    Ok(checksum.encoded())
}
