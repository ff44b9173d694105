// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static configuration for the endpoint resolver.
//!
//! A [`ResolverConfig`] carries the application key, the ordered list of
//! directory (LBS) hosts, and the refresh policy. [`ResolverEnv`] derives the
//! same settings from the process environment for embedders that prefer
//! env-driven setup.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::EndpointResolutionError;

/// Global directory host, tried first when no region is pinned.
pub const DEFAULT_LBS: &str = "https://lbs.yunxinapi.com/lbs/serverSdkConf";
/// Directory host serving the CN region.
pub const CN_LBS: &str = "https://lbs-cn.yunxinapi.com/lbs/serverSdkConf";
/// Directory host serving the SG region.
pub const SG_LBS: &str = "https://lbs-sg.yunxinapi.com/lbs/serverSdkConf";

/// Path appended to an endpoint to check its health.
pub const HEALTH_CHECK_PATH: &str = "/health/check";
/// Cadence of the background refresh worker.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Cache lifetime applied when the directory omits or garbles `ttl`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Upper bound accepted for a directory-provided `ttl`, in seconds.
pub const MAX_TTL_SECONDS: i64 = 86_400;
/// Number of full passes over the directory hosts during initialization.
pub const INIT_PASSES: usize = 3;
/// Request timeout applied to directory fetches and health checks.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
/// SDK version reported to the directory as `sv`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const ENV_APPKEY: &str = "IM_APPKEY";
const ENV_REGION: &str = "IM_REGION";
/// Comma separated directory hosts; overrides `IM_REGION` when set.
const ENV_LBS_HOSTS: &str = "IM_LBS_HOSTS";
const ENV_REFRESH_SECONDS: &str = "IM_ENDPOINT_REFRESH_SECONDS";
const ENV_HTTP_TIMEOUT_SECONDS: &str = "IM_HTTP_TIMEOUT_SECONDS";
const ENV_LOG_LEVEL: &str = "IM_LOG_LEVEL";

/// Region selector deciding which directory hosts are queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    Cn,
    Sg,
    /// Global host first, then the CN and SG hosts as fallback.
    #[default]
    Global,
}

impl Region {
    /// Ordered directory hosts for this region.
    pub fn lbs_hosts(&self) -> Vec<String> {
        match self {
            Region::Cn => vec![CN_LBS.to_string()],
            Region::Sg => vec![SG_LBS.to_string()],
            Region::Global => vec![
                DEFAULT_LBS.to_string(),
                CN_LBS.to_string(),
                SG_LBS.to_string(),
            ],
        }
    }
}

impl FromStr for Region {
    type Err = std::convert::Infallible;

    /// Unknown spellings select [`Region::Global`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "cn" => Region::Cn,
            "sg" => Region::Sg,
            _ => Region::Global,
        })
    }
}

/// Configuration values that control one endpoint resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Application key sent to the directory as `k`.
    pub app_key: String,
    /// Directory hosts in the order they are tried.
    pub lbs_hosts: Vec<String>,
    /// Cadence of the background refresh worker.
    pub refresh_interval: Duration,
    /// SDK version sent to the directory as `sv`.
    pub sdk_version: String,
    /// Timeout applied to each outbound HTTP call.
    pub http_timeout: Duration,
    /// When false, endpoint health checks are skipped and every endpoint is accepted.
    pub verify_endpoints: bool,
    /// Full passes over `lbs_hosts` attempted by `initialize`.
    pub init_passes: usize,
}

impl ResolverConfig {
    /// Configuration using the global directory host with regional fallback.
    pub fn new(app_key: impl Into<String>) -> Self {
        Self::for_region(app_key, Region::Global)
    }

    pub fn for_region(app_key: impl Into<String>, region: Region) -> Self {
        Self {
            app_key: app_key.into(),
            lbs_hosts: region.lbs_hosts(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            sdk_version: SDK_VERSION.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            verify_endpoints: true,
            init_passes: INIT_PASSES,
        }
    }

    /// Configuration with an explicit directory list and refresh cadence.
    pub fn with_hosts(
        app_key: impl Into<String>,
        lbs_hosts: Vec<String>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            lbs_hosts,
            refresh_interval,
            ..Self::new(app_key)
        }
    }

    /// Rejects settings the resolver cannot run with.
    pub fn validate(&self) -> Result<(), EndpointResolutionError> {
        if self.app_key.trim().is_empty() {
            return Err(EndpointResolutionError::InvalidConfig(
                "app key must not be empty".into(),
            ));
        }
        if self.lbs_hosts.is_empty() {
            return Err(EndpointResolutionError::InvalidConfig(
                "at least one directory host is required".into(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(EndpointResolutionError::InvalidConfig(
                "refresh interval must be greater than zero".into(),
            ));
        }
        if self.init_passes == 0 {
            return Err(EndpointResolutionError::InvalidConfig(
                "init passes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Environment-derived options used to build a [`ResolverConfig`].
#[derive(Debug, Clone)]
pub struct ResolverEnv {
    pub app_key: Option<String>,
    pub region: Region,
    /// Explicit directory hosts; when present the region is ignored.
    pub lbs_hosts: Option<Vec<String>>,
    pub refresh_interval: Duration,
    pub http_timeout: Duration,
    /// Log filter directive for binaries embedding the resolver.
    pub log_level: String,
}

impl ResolverEnv {
    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let app_key = map.get(ENV_APPKEY).and_then(|v| sanitize_non_empty(v));
        let region = map
            .get(ENV_REGION)
            .and_then(|v| v.parse::<Region>().ok())
            .unwrap_or_default();
        let lbs_hosts = map.get(ENV_LBS_HOSTS).and_then(|v| {
            let hosts: Vec<String> = v.split(',').filter_map(sanitize_non_empty).collect();
            (!hosts.is_empty()).then_some(hosts)
        });
        let refresh_interval =
            parse_seconds(map.get(ENV_REFRESH_SECONDS), DEFAULT_REFRESH_INTERVAL);
        let http_timeout = parse_seconds(map.get(ENV_HTTP_TIMEOUT_SECONDS), DEFAULT_HTTP_TIMEOUT);
        let log_level = map
            .get(ENV_LOG_LEVEL)
            .and_then(|v| sanitize_non_empty(v))
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        Self {
            app_key,
            region,
            lbs_hosts,
            refresh_interval,
            http_timeout,
            log_level,
        }
    }

    /// Converts the captured settings into a validated [`ResolverConfig`].
    pub fn to_config(&self) -> Result<ResolverConfig, EndpointResolutionError> {
        let app_key = self.app_key.clone().ok_or_else(|| {
            EndpointResolutionError::InvalidConfig(format!("{ENV_APPKEY} is not set"))
        })?;
        let mut config = ResolverConfig::for_region(app_key, self.region);
        if let Some(hosts) = &self.lbs_hosts {
            config.lbs_hosts = hosts.clone();
        }
        config.refresh_interval = self.refresh_interval;
        config.http_timeout = self.http_timeout;
        config.validate()?;
        Ok(config)
    }
}

fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a positive number of seconds, falling back to `default`.
fn parse_seconds(value: Option<&String>, default: Duration) -> Duration {
    match value.map(|v| v.trim().parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        Some(_) => {
            warn!("ignoring invalid duration setting, using default {:?}", default);
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_selects_directory_hosts() {
        assert_eq!(Region::Cn.lbs_hosts(), vec![CN_LBS.to_string()]);
        assert_eq!(Region::Sg.lbs_hosts(), vec![SG_LBS.to_string()]);
        assert_eq!(
            Region::Global.lbs_hosts(),
            vec![
                DEFAULT_LBS.to_string(),
                CN_LBS.to_string(),
                SG_LBS.to_string()
            ]
        );
    }

    #[test]
    fn region_parsing_is_lenient() {
        assert_eq!("CN".parse::<Region>().ok(), Some(Region::Cn));
        assert_eq!(" sg ".parse::<Region>().ok(), Some(Region::Sg));
        assert_eq!("eu".parse::<Region>().ok(), Some(Region::Global));
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let mut config = ResolverConfig::new("appkey");
        assert!(config.validate().is_ok());

        config.app_key = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(EndpointResolutionError::InvalidConfig(_))
        ));

        let config = ResolverConfig::with_hosts("appkey", vec![], DEFAULT_REFRESH_INTERVAL);
        assert!(config.validate().is_err());

        let config = ResolverConfig::with_hosts(
            "appkey",
            vec!["http://lbs".into()],
            Duration::from_secs(0),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_defaults() {
        let env = ResolverEnv::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert!(env.app_key.is_none());
        assert_eq!(env.region, Region::Global);
        assert_eq!(env.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(env.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(env.log_level, "info");
        assert!(matches!(
            env.to_config(),
            Err(EndpointResolutionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn env_hosts_override_region() {
        let env = ResolverEnv::from_env_iter(vec![
            (ENV_APPKEY, " key "),
            (ENV_REGION, "sg"),
            (ENV_LBS_HOSTS, "http://a/lbs, ,http://b/lbs"),
            (ENV_REFRESH_SECONDS, "45"),
            (ENV_HTTP_TIMEOUT_SECONDS, "not-a-number"),
            (ENV_LOG_LEVEL, "DEBUG"),
        ]);
        assert_eq!(env.region, Region::Sg);
        assert_eq!(env.log_level, "debug");

        let config = env.to_config().expect("config should build");
        assert_eq!(config.app_key, "key");
        assert_eq!(config.lbs_hosts, vec!["http://a/lbs", "http://b/lbs"]);
        assert_eq!(config.refresh_interval, Duration::from_secs(45));
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn env_region_without_hosts() {
        let env = ResolverEnv::from_env_iter(vec![(ENV_APPKEY, "key"), (ENV_REGION, "cn")]);
        let config = env.to_config().expect("config should build");
        assert_eq!(config.lbs_hosts, vec![CN_LBS.to_string()]);
    }
}
