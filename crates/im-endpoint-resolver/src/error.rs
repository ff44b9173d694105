// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while resolving the IM API endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointResolutionError {
    /// Directory host answered with something other than HTTP 200.
    #[error("directory host returned http status {0}")]
    Status(u16),

    /// Transport-level issue (DNS, TLS, socket, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Directory body could not be decoded as JSON.
    #[error("failed to decode directory response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No endpoint set could be obtained during initialization.
    #[error("no endpoints resolved after {passes} passes over {hosts} directory hosts")]
    Exhausted { passes: usize, hosts: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client (or its TLS setup) could not be built.
    #[error("failed to build http client: {0}")]
    ClientBuild(String),

    #[error("resolver already initialized")]
    AlreadyInitialized,

    #[error("resolver has been shut down")]
    Shutdown,
}
