// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
#[cfg(feature = "fips")]
use tracing::debug;

use crate::config::SDK_VERSION;
use crate::error::EndpointResolutionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds the client shared by directory fetches and health checks.
///
/// Every request is bounded by `timeout`; connection establishment is further
/// capped at two seconds (or `timeout`, when shorter).
pub fn build_http_client(timeout: Duration) -> Result<Client, EndpointResolutionError> {
    create_reqwest_client_builder()
        .map_err(|e| EndpointResolutionError::ClientBuild(e.to_string()))?
        .user_agent(format!("im-server-sdk-rust/{SDK_VERSION}"))
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| EndpointResolutionError::ClientBuild(e.to_string()))
}

#[cfg(not(feature = "fips"))]
fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(Client::builder().use_rustls_tls())
}

/// FIPS variant: native roots on top of the process-wide FIPS crypto provider.
#[cfg(feature = "fips")]
fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    // The embedding application installs the provider, e.g. via
    // rustls::crypto::default_fips_provider().install_default()
    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;
    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    let mut valid_count = 0;
    for cert in native_certs.certs {
        match root_cert_store.add(cert) {
            Ok(()) => valid_count += 1,
            Err(err) => debug!("skipping unparsable native certificate: {:?}", err),
        }
    }
    if valid_count == 0 {
        return Err("No valid certificates found in native root store".into());
    }

    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(rustls::ALL_VERSIONS)
        .map_err(|_| "Failed to set protocol versions")?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("endpoint resolver http client configured with FIPS TLS");

    Ok(Client::builder().use_preconfigured_tls(config))
}

#[cfg(all(test, not(feature = "fips")))]
mod tests {
    use super::*;

    #[test]
    fn builds_client_with_timeout() {
        assert!(build_http_client(Duration::from_millis(500)).is_ok());
    }
}
