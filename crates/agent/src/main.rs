// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::{error, info};

use wakeloop::config::{Commands, Config};
use wakeloop::driver::{self, TickOutcome};
use wakeloop::health;
use wakeloop::state::StateStore;

/// Initialize tracing from `--log-format`/`--log-level`. Uses `try_init`
/// so running it twice (e.g. across test processes) is harmless.
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing(&config);

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    match config.subcommand {
        Some(Commands::HealthMonitor { once, interval_secs, probe_timeout_secs, log_max_lines }) => {
            let store = StateStore::new(&config.state_dir);
            let probe_timeout = std::time::Duration::from_secs(probe_timeout_secs);
            let result = if once {
                health::run_once(&store, probe_timeout, log_max_lines).await
            } else {
                let shutdown = tokio_util::sync::CancellationToken::new();
                let interval = std::time::Duration::from_secs(interval_secs);
                tokio::select! {
                    _ = health::run_loop(store.clone(), interval, probe_timeout, log_max_lines, shutdown.clone()) => Ok(()),
                    _ = tokio::signal::ctrl_c() => {
                        shutdown.cancel();
                        Ok(())
                    }
                }
            };
            if let Err(e) = result {
                error!("health monitor failed: {e:#}");
                std::process::exit(1);
            }
        }
        None => match driver::run_tick(&config).await {
            Ok(TickOutcome::Ran { session_number, mode, outcome }) => {
                info!(session = session_number, mode = mode.as_str(), outcome = ?outcome, "tick complete");
                std::process::exit(0);
            }
            Ok(TickOutcome::Skipped { reason }) => {
                info!(reason, "tick skipped");
                std::process::exit(0);
            }
            Ok(TickOutcome::DryRun { prompt }) => {
                println!("{prompt}");
                std::process::exit(0);
            }
            Err(e) => {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        },
    }
}
