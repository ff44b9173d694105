// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Directory-driven endpoint resolution.
//!
//! The resolver asks one of several directory (LBS) hosts for the current
//! primary API endpoint and its ordered backups, health-checks them, and
//! publishes the result as an immutable [`EndpointSet`]. Readers get the
//! latest set lock-free through [`EndpointResolver::current_endpoints`];
//! a background worker keeps it fresh until shutdown.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ResolverConfig, HEALTH_CHECK_PATH};
use crate::endpoints::{DirectoryResponse, EndpointSet, CODE_NOT_MODIFIED, CODE_OK};
use crate::error::EndpointResolutionError;
use crate::http::build_http_client;

/// Result of one fetch-and-validate cycle against a single directory host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The cached set is still inside its TTL; no request was made.
    StillFresh,
    /// The directory confirmed the cached fingerprint (`code == 304`).
    NotModified,
    /// A new set was validated and published.
    Updated,
    /// The response was unusable; the cache was left untouched.
    Skipped,
}

impl AttemptOutcome {
    /// Returns `true` when no further directory host needs to be asked.
    pub fn is_settled(&self) -> bool {
        !matches!(self, AttemptOutcome::Skipped)
    }
}

/// Point-in-time view of the resolver state.
#[derive(Debug, Clone)]
pub struct ResolverSnapshot {
    pub endpoints: Option<Arc<EndpointSet>>,
    /// Fingerprint sent as `md5` on the next directory fetch.
    pub fingerprint: Option<String>,
    /// Remaining cache lifetime; `None` once a fetch is allowed again.
    pub fresh_for: Option<Duration>,
}

#[derive(Debug, Default)]
struct RefreshState {
    fingerprint: Option<String>,
    next_fetch_at: Option<Instant>,
}

impl RefreshState {
    fn is_fresh(&self, now: Instant) -> bool {
        self.next_fetch_at.is_some_and(|deadline| now < deadline)
    }
}

/// State shared between API callers and the refresh worker.
struct ResolverShared {
    config: ResolverConfig,
    client: Client,
    /// Published snapshot, swapped atomically on every accepted update.
    endpoints: ArcSwapOption<EndpointSet>,
    /// Guards fingerprint and deadline and serializes refresh cycles.
    state: Mutex<RefreshState>,
}

impl std::fmt::Debug for ResolverShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverShared")
            .field("lbs_hosts", &self.config.lbs_hosts)
            .field("refresh_interval", &self.config.refresh_interval)
            .finish()
    }
}

impl ResolverShared {
    /// Asks each directory host in order until one settles the endpoint set.
    async fn refresh_pass(&self) -> bool {
        for lbs in &self.config.lbs_hosts {
            match self.attempt_refresh(lbs).await {
                Ok(outcome) if outcome.is_settled() => {
                    debug!(lbs = %lbs, ?outcome, "endpoint refresh settled");
                    return true;
                }
                Ok(outcome) => {
                    debug!(lbs = %lbs, ?outcome, "directory host gave no usable endpoints");
                }
                Err(err) => {
                    error!(lbs = %lbs, error = %err, "fetch endpoints error");
                }
            }
        }
        false
    }

    async fn attempt_refresh(&self, lbs: &str) -> Result<AttemptOutcome, EndpointResolutionError> {
        let mut state = self.state.lock().await;
        if state.is_fresh(Instant::now()) {
            return Ok(AttemptOutcome::StillFresh);
        }

        let mut query = vec![
            ("k", self.config.app_key.as_str()),
            ("sv", self.config.sdk_version.as_str()),
        ];
        if let Some(md5) = state.fingerprint.as_deref() {
            query.push(("md5", md5));
        }
        let response = self.client.get(lbs).query(&query).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            error!(lbs = %lbs, status = %status, "fetch endpoints error");
            return Err(EndpointResolutionError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        let body_str = String::from_utf8_lossy(&body);
        debug!(lbs = %lbs, response = %body_str, "fetched endpoints");

        let parsed = DirectoryResponse::parse(&body)?;
        let data = match parsed.code() {
            None => {
                error!(response = %body_str, "illegal endpoints response, missing code");
                return Ok(AttemptOutcome::Skipped);
            }
            Some(CODE_NOT_MODIFIED) => return Ok(AttemptOutcome::NotModified),
            Some(CODE_OK) => parsed.data()?,
            Some(code) => {
                error!(code, response = %body_str, "fetch endpoints error");
                return Ok(AttemptOutcome::Skipped);
            }
        };
        let Some(data) = data else {
            error!(response = %body_str, "illegal endpoints response, missing data");
            return Ok(AttemptOutcome::Skipped);
        };
        let Some(primary) = data.default_endpoint() else {
            error!(response = %body_str, "illegal endpoints response, missing default endpoint");
            return Ok(AttemptOutcome::Skipped);
        };
        if !self.check(&primary).await {
            error!(endpoint = %primary, "default endpoint check error, skip update");
            return Ok(AttemptOutcome::Skipped);
        }

        let mut backups = Vec::new();
        let mut dropped_backup = false;
        for backup in data.backup_endpoints() {
            if self.check(&backup).await {
                backups.push(backup);
            } else {
                error!(endpoint = %backup, "backup endpoint check error, skip");
                dropped_backup = true;
            }
        }

        // Everything below is synchronous so a cancelled cycle never leaves a
        // half-applied update behind.
        let next = Arc::new(EndpointSet::new(primary, backups));
        let ttl = data.ttl();
        info!(
            old = %describe(self.endpoints.load().as_deref()),
            new = %describe(Some(next.as_ref())),
            ttl_secs = ttl.as_secs(),
            "endpoints update"
        );
        state.next_fetch_at = Some(Instant::now() + ttl);
        // A partially rejected payload must be fetched in full next time.
        if !dropped_backup {
            state.fingerprint = data.md5();
        }
        self.endpoints.store(Some(next));
        Ok(AttemptOutcome::Updated)
    }

    /// Health-checks `endpoint`; transport failures count as unhealthy.
    async fn check(&self, endpoint: &str) -> bool {
        if !self.config.verify_endpoints {
            return true;
        }
        let url = format!("{endpoint}{HEALTH_CHECK_PATH}");
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(endpoint = %endpoint, path = HEALTH_CHECK_PATH, status = %status, "check");
                status == StatusCode::OK
            }
            Err(err) => {
                debug!(endpoint = %endpoint, path = HEALTH_CHECK_PATH, error = %err, "check error");
                false
            }
        }
    }

    async fn snapshot(&self) -> ResolverSnapshot {
        let state = self.state.lock().await;
        let now = Instant::now();
        ResolverSnapshot {
            endpoints: self.endpoints.load_full(),
            fingerprint: state.fingerprint.clone(),
            fresh_for: state
                .next_fetch_at
                .filter(|deadline| now < *deadline)
                .map(|deadline| deadline - now),
        }
    }

    /// Refreshes on a fixed cadence until `cancel` fires.
    async fn run_refresh_worker(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = refresh_ticker(self.config.refresh_interval);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("endpoint refresh worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("endpoint refresh worker cancelled mid-refresh");
                            break;
                        }
                        settled = self.refresh_pass() => {
                            if !settled {
                                warn!("no directory host settled the endpoint set; keeping previous endpoints");
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Fixed-rate ticker: a slow pass does not push later ticks back.
fn refresh_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    ticker
}

fn describe(set: Option<&EndpointSet>) -> String {
    serde_json::to_string(&set).unwrap_or_default()
}

/// Resolves and caches the IM API endpoints for one application key.
///
/// Construct it, call [`initialize`](Self::initialize) once, then read
/// [`current_endpoints`](Self::current_endpoints) from anywhere. The refresh
/// worker stops on [`shutdown`](Self::shutdown) or when the resolver is dropped.
#[derive(Debug)]
pub struct EndpointResolver {
    shared: Arc<ResolverShared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EndpointResolver {
    /// Builds a resolver with its own HTTP client bounded by `config.http_timeout`.
    pub fn new(config: ResolverConfig) -> Result<Self, EndpointResolutionError> {
        let client = build_http_client(config.http_timeout)?;
        Self::with_client(config, client)
    }

    /// Builds a resolver around a caller-provided HTTP client.
    pub fn with_client(
        config: ResolverConfig,
        client: Client,
    ) -> Result<Self, EndpointResolutionError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(ResolverShared {
                config,
                client,
                endpoints: ArcSwapOption::empty(),
                state: Mutex::new(RefreshState::default()),
            }),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.shared.config
    }

    /// Resolves the first endpoint set and starts the background refresh worker.
    ///
    /// Makes up to `init_passes` ordered passes over the directory hosts and
    /// fails with [`EndpointResolutionError::Exhausted`] when none of them
    /// produced a set.
    pub async fn initialize(&self) -> Result<(), EndpointResolutionError> {
        let mut worker = self.worker.lock().await;
        if self.cancel.is_cancelled() {
            return Err(EndpointResolutionError::Shutdown);
        }
        if worker.is_some() {
            return Err(EndpointResolutionError::AlreadyInitialized);
        }

        let passes = self.shared.config.init_passes;
        let hosts = self.shared.config.lbs_hosts.len();
        for pass in 1..=passes {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(pass, "endpoint resolver shut down during initialization");
                    return Err(EndpointResolutionError::Shutdown);
                }
                _ = self.shared.refresh_pass() => {}
            }
            if self.current_endpoints().is_some() {
                break;
            }
            warn!(pass, passes, "no endpoints resolved yet");
        }
        let Some(endpoints) = self.current_endpoints() else {
            error!(passes, hosts, "init endpoints error");
            return Err(EndpointResolutionError::Exhausted { passes, hosts });
        };

        if self.cancel.is_cancelled() {
            return Err(EndpointResolutionError::Shutdown);
        }

        info!(
            primary = %endpoints.primary(),
            backups = endpoints.backups().len(),
            refresh_interval_secs = self.shared.config.refresh_interval.as_secs(),
            "endpoint resolver initialized"
        );
        let shared = Arc::clone(&self.shared);
        *worker = Some(tokio::spawn(shared.run_refresh_worker(self.cancel.clone())));
        Ok(())
    }

    /// Latest published endpoint set, or `None` before the first successful fetch.
    pub fn current_endpoints(&self) -> Option<Arc<EndpointSet>> {
        self.shared.endpoints.load_full()
    }

    /// Runs one fetch-and-validate cycle against a single directory host.
    pub async fn attempt_refresh(
        &self,
        lbs: &str,
    ) -> Result<AttemptOutcome, EndpointResolutionError> {
        self.shared.attempt_refresh(lbs).await
    }

    /// Runs one ordered pass over every directory host; `true` when one settled.
    pub async fn refresh_pass(&self) -> bool {
        self.shared.refresh_pass().await
    }

    /// Returns whether `endpoint` passes its health check.
    pub async fn check(&self, endpoint: &str) -> bool {
        self.shared.check(endpoint).await
    }

    pub async fn snapshot(&self) -> ResolverSnapshot {
        self.shared.snapshot().await
    }

    /// Returns `true` while the background refresh worker is alive.
    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the refresh worker and waits for it to exit.
    ///
    /// The last published endpoint set stays readable afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "endpoint refresh worker did not shut down cleanly");
            }
        }
    }
}

impl Drop for EndpointResolver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
