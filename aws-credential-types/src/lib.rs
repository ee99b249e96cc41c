/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! AWS SDK Credentials
//!
//! This crate contains the credential identity, [`Credentials`], and the
//! [`ProvideCredentials`](provider::ProvideCredentials) capability that every credential
//! source implements.
//!
//! Credential sources, caching, and the provider chain live in other crates; this crate only
//! defines the vocabulary they share.

#![allow(clippy::derive_partial_eq_without_eq)]
#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

pub mod attributes;
pub mod credential_fn;
mod credentials_impl;
pub mod provider;

pub use credentials_impl::{Builder, Credentials, CredentialsBuildError};
