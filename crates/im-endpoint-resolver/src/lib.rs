// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dynamic endpoint discovery for the IM server HTTP API.
//!
//! Directory (LBS) hosts tell the SDK which API endpoint to call and which
//! backups to fall back to. [`EndpointResolver`] fetches that list, health
//! checks it, caches it for the server-declared TTL and keeps it fresh in
//! the background.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod provider;
pub mod resolver;

pub use config::{Region, ResolverConfig, ResolverEnv};
pub use endpoints::{effective_ttl, EndpointSet};
pub use error::EndpointResolutionError;
pub use http::build_http_client;
pub use provider::EndpointProvider;
pub use resolver::{AttemptOutcome, EndpointResolver, ResolverSnapshot};
