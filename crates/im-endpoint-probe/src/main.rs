// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use im_endpoint_resolver::{EndpointResolver, ResolverEnv};

#[tokio::main]
pub async fn main() -> ExitCode {
    let env = ResolverEnv::from_os_env();

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", env.log_level);
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match env.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating endpoint resolver config: {e}");
            return ExitCode::FAILURE;
        }
    };
    let report_interval = config.refresh_interval;

    let resolver = match EndpointResolver::new(config) {
        Ok(resolver) => resolver,
        Err(e) => {
            error!("Error creating endpoint resolver: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = resolver.initialize().await {
        error!("Unable to resolve endpoints, shutting down: {e}");
        return ExitCode::FAILURE;
    }

    let mut report = interval(report_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping endpoint resolver");
                break;
            }
            _ = report.tick() => {
                let snapshot = resolver.snapshot().await;
                match snapshot.endpoints {
                    Some(endpoints) => info!(
                        primary = %endpoints.primary(),
                        backups = ?endpoints.backups(),
                        fingerprint = ?snapshot.fingerprint,
                        fresh_for_secs = snapshot.fresh_for.map(|d| d.as_secs()),
                        "current endpoints"
                    ),
                    None => warn!("no endpoints available"),
                }
            }
        }
    }

    resolver.shutdown().await;
    ExitCode::SUCCESS
}
