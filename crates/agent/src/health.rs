// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Out-of-band platform health monitor (C10). Runs on its own clock,
//! independent of the session driver: it reads the account manifest and
//! writes only its own append-only log. The probe-and-count shape is the
//! teacher's `upstream::health::spawn_health_checker`, generalized from a
//! session-eviction loop to an endpoint-uptime log; the HTTP client is the
//! teacher's own `upstream::client::UpstreamClient`, built the same way
//! (a single `reqwest::Client` with a fixed per-request timeout).

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::accounts::{AccountManifest, AuthScheme};
use crate::state::StateStore;

const LOG_NAME: &str = "health.log";

fn now_epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointResult {
    pub ok: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HealthLogEntry {
    ts: u64,
    results: BTreeMap<String, EndpointResult>,
}

/// Probe one account's test endpoint. Never returns `Err`: network and
/// status failures are folded into `EndpointResult::ok = false` so one bad
/// platform never stops the round.
async fn probe_one(client: &reqwest::Client, account: &crate::accounts::Account) -> EndpointResult {
    let started = std::time::Instant::now();
    let endpoint = &account.test_endpoint;

    let mut request = match endpoint.method.to_ascii_uppercase().as_str() {
        "POST" => client.post(&endpoint.url),
        _ => client.get(&endpoint.url),
    };
    request = match endpoint.auth_scheme {
        AuthScheme::Bearer => {
            match std::fs::read_to_string(&account.credential_file) {
                Ok(token) => request.bearer_auth(token.trim()),
                Err(e) => {
                    return EndpointResult {
                        ok: false,
                        status_code: None,
                        latency_ms: started.elapsed().as_millis() as u64,
                        error: Some(format!("credential read failed: {e}")),
                    }
                }
            }
        }
        AuthScheme::ApiKey | AuthScheme::Basic | AuthScheme::None => request,
    };

    match request.send().await {
        Ok(resp) => {
            let status = resp.status();
            EndpointResult {
                ok: status.is_success(),
                status_code: Some(status.as_u16()),
                latency_ms: started.elapsed().as_millis() as u64,
                error: if status.is_success() { None } else { Some(format!("status {status}")) },
            }
        }
        Err(e) => EndpointResult {
            ok: false,
            status_code: None,
            latency_ms: started.elapsed().as_millis() as u64,
            error: Some(e.to_string()),
        },
    }
}

/// Probe every account in the manifest once and append one JSONL line
/// keyed by account id.
pub async fn probe_round(
    store: &StateStore,
    client: &reqwest::Client,
    log_max_lines: usize,
) -> anyhow::Result<BTreeMap<String, EndpointResult>> {
    let accounts = AccountManifest::new(store).read()?;
    let mut results = BTreeMap::new();
    for account in &accounts {
        results.insert(account.id.clone(), probe_one(client, account).await);
    }

    let entry = HealthLogEntry { ts: now_epoch_ms(), results: results.clone() };
    let line = serde_json::to_string(&entry)?;
    store.append_line(LOG_NAME, &line, Some(log_max_lines))?;
    Ok(results)
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// Run one probe round and return immediately. Used by `--once`.
pub async fn run_once(store: &StateStore, probe_timeout: Duration, log_max_lines: usize) -> anyhow::Result<()> {
    let client = build_client(probe_timeout);
    let results = probe_round(store, &client, log_max_lines).await?;
    for (id, result) in &results {
        if !result.ok {
            warn!(platform = %id, error = ?result.error, "health probe failed");
        }
    }
    Ok(())
}

/// Run probe rounds on `interval` until `shutdown` is cancelled.
pub async fn run_loop(
    store: StateStore,
    interval: Duration,
    probe_timeout: Duration,
    log_max_lines: usize,
    shutdown: CancellationToken,
) {
    let client = build_client(probe_timeout);
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {}
        }

        match probe_round(&store, &client, log_max_lines).await {
            Ok(results) => {
                for (id, result) in &results {
                    if !result.ok {
                        warn!(platform = %id, error = ?result.error, "health probe failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "health probe round failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct EndpointSummary {
    pub samples: u64,
    pub uptime_pct: f64,
    pub avg_latency_ms: f64,
    pub top_errors: Vec<(String, u64)>,
}

/// Summarize one platform's probe history from the log: uptime
/// percentage, average latency over successful probes, and the most
/// common error strings among failures.
pub fn summarize(store: &StateStore, platform_id: &str) -> anyhow::Result<Option<EndpointSummary>> {
    let lines = store.read_lines(LOG_NAME)?;
    let mut samples = 0u64;
    let mut successes = 0u64;
    let mut latency_total = 0u64;
    let mut error_counts: BTreeMap<String, u64> = BTreeMap::new();

    for line in &lines {
        let Ok(entry) = serde_json::from_str::<HealthLogEntry>(line) else { continue };
        let Some(result) = entry.results.get(platform_id) else { continue };
        samples += 1;
        if result.ok {
            successes += 1;
            latency_total += result.latency_ms;
        } else if let Some(error) = &result.error {
            *error_counts.entry(error.clone()).or_insert(0) += 1;
        }
    }

    if samples == 0 {
        return Ok(None);
    }

    let mut top_errors: Vec<(String, u64)> = error_counts.into_iter().collect();
    top_errors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    top_errors.truncate(5);

    Ok(Some(EndpointSummary {
        samples,
        uptime_pct: (successes as f64 / samples as f64) * 100.0,
        avg_latency_ms: if successes > 0 { latency_total as f64 / successes as f64 } else { 0.0 },
        top_errors,
    }))
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
