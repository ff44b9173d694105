// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::sync::Arc;

use crate::endpoints::EndpointSet;
use crate::error::EndpointResolutionError;
use crate::resolver::EndpointResolver;

/// Source of API endpoints handed to the request-issuing layers of the SDK.
#[derive(Clone)]
pub enum EndpointProvider {
    /// Fixed endpoints, never refreshed.
    Static(Arc<EndpointSet>),
    /// Endpoints discovered and refreshed through the directory hosts.
    Dynamic(Arc<EndpointResolver>),
}

impl EndpointProvider {
    pub fn new_static(primary: &str, backups: &[&str]) -> Self {
        Self::Static(Arc::new(EndpointSet::new(
            primary,
            backups.iter().map(|b| b.to_string()).collect(),
        )))
    }

    pub fn new_dynamic(resolver: Arc<EndpointResolver>) -> Self {
        Self::Dynamic(resolver)
    }

    /// Initializes the underlying resolver; a no-op for static endpoints.
    pub async fn initialize(&self) -> Result<(), EndpointResolutionError> {
        match self {
            Self::Static(_) => Ok(()),
            Self::Dynamic(resolver) => resolver.initialize().await,
        }
    }

    /// Current endpoint set, or `None` while a dynamic resolver has none yet.
    pub fn endpoints(&self) -> Option<Arc<EndpointSet>> {
        match self {
            Self::Static(endpoints) => Some(Arc::clone(endpoints)),
            Self::Dynamic(resolver) => resolver.current_endpoints(),
        }
    }
}

impl Debug for EndpointProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(endpoints) => write!(f, "EndpointProvider::Static({})", endpoints.primary()),
            Self::Dynamic(_) => write!(f, "EndpointProvider::Dynamic"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn new_from_static_endpoints() {
        let provider = EndpointProvider::new_static("https://e1", &["https://e2"]);
        provider.initialize().await.expect("static init never fails");
        let endpoints = provider.endpoints().expect("static endpoints");
        assert_eq!(endpoints.primary(), "https://e1");
        assert_eq!(endpoints.backups(), &["https://e2".to_string()]);
        assert_eq!(
            format!("{provider:?}"),
            "EndpointProvider::Static(https://e1)"
        );
    }

    #[tokio::test]
    async fn new_from_uninitialized_resolver() {
        let config = ResolverConfig::with_hosts(
            "appkey",
            vec!["http://127.0.0.1:1/lbs".into()],
            Duration::from_secs(30),
        );
        let resolver = Arc::new(EndpointResolver::new(config).expect("resolver should build"));
        let provider = EndpointProvider::new_dynamic(resolver);
        assert!(provider.endpoints().is_none());
    }
}
