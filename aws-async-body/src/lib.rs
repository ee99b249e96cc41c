/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Byte streams that respect backpressure.
//!
//! An [`AsyncBody`] is a source of bytes that is read by subscribing to it. Nothing is produced
//! until the subscriber polls for it, so a slow consumer holds back the producer instead of
//! forcing data to pile up in memory. Bodies can be built from memory, from a file, from a
//! stream, or fed by hand through a [`BodySender`].
//!
//! Transforms wrap a body without reading it up front:
//! - [`AsyncBody::split`] cuts a body into fixed-size chunk bodies;
//! - [`buffer::ByteBufferStore`] reads ahead up to a bound;
//! - [`checksum`] computes CRC32, CRC32C or SHA-256 checksums;
//! - [`AsyncBody::gzip`] compresses per chunk;
//! - [`AsyncBody::aws_chunked`] applies `aws-chunked` framing with an optional checksum trailer.

#![allow(clippy::derive_partial_eq_without_eq)]
#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

pub mod aws_chunked;
mod body;
pub mod buffer;
pub mod checksum;
mod error;
pub mod file;
pub mod gzip;
mod rendezvous;
mod sender;
mod size_hint;
pub mod split;

pub use body::{AsyncBody, BodyStream};
pub use error::{BodyError, UnknownChecksumAlgorithmError};
pub use sender::BodySender;
pub use size_hint::SizeHint;
pub use split::SplitBody;

/// A boxed error that is `Send` and `Sync`
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
