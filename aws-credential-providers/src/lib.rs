/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credential providers for AWS SDKs.
//!
//! Each module implements one source of [`Credentials`](aws_credential_types::Credentials):
//! static keys, environment variables and system properties, the shared profile files, an
//! external process, a web identity token, the container credentials endpoint and the EC2
//! instance metadata service. [`chain::CredentialsProviderChain`] tries several providers in
//! order, and [`default_provider::DefaultCredentialsProvider`] is the chain most applications
//! want.
//!
//! Every provider is configured through [`provider_config::ProviderConfig`], which decides where
//! the environment, system properties and files are read from and which HTTP client, clock and
//! sleep implementation are used.
//!
//! ```no_run
//! use aws_credential_providers::default_provider::default_provider;
//! use aws_credential_types::provider::ProvideCredentials;
//!
//! # async fn docs() {
//! let provider = default_provider();
//! let credentials = provider.provide_credentials().await;
//! # }
//! ```

#![allow(clippy::derive_partial_eq_without_eq)]
#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

pub mod chain;
pub mod container;
pub mod default_provider;
pub mod environment;
pub mod http_client;
mod http_credential_provider;
pub mod imds;
mod json_credentials;
pub mod os_shim_internal;
pub mod process;
pub mod profile;
pub mod provider_config;
pub mod setting;
pub mod static_provider;
pub mod web_identity;
