// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-platform failure tracking with Closed/Open/Half-Open/Defunct states
//! (§4.4). Status is a derived view over counters and the wall clock, not
//! stored directly — mirrors the teacher's own health-checker pattern of
//! deriving eviction from a consecutive-failure counter plus a clock.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::state::StateStore;

const DOC_NAME: &str = "circuits.json";

pub fn now_epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Closed,
    Open,
    HalfOpen,
    Defunct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub platform_id: String,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub total_successes: u64,
    pub last_failure: Option<u64>,
    pub last_success: Option<u64>,
    /// `None` means Closed (the implicit default status, per §3).
    pub opened_at: Option<u64>,
    #[serde(default)]
    pub half_open_probe_sent: bool,
    pub defunct_reason: Option<String>,
}

impl CircuitRecord {
    fn fresh(platform_id: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_failure: None,
            last_success: None,
            opened_at: None,
            half_open_probe_sent: false,
            defunct_reason: None,
        }
    }

    /// Derive the current status from counters, clock, and params. Does
    /// not mutate the record; callers needing a side-effecting transition
    /// go through [`CircuitRegistry::record_outcome`].
    pub fn status(&self, params: &Params, now_ms: u64) -> Status {
        if self.defunct_reason.is_some() {
            return Status::Defunct;
        }
        match self.opened_at {
            None => Status::Closed,
            Some(opened_at) => {
                if now_ms.saturating_sub(opened_at) >= params.cooldown_ms {
                    Status::HalfOpen
                } else {
                    Status::Open
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub defunct_consecutive_failures: u32,
    pub defunct_open_ms: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 24 * 60 * 60 * 1000,
            defunct_consecutive_failures: 10,
            defunct_open_ms: 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    records: BTreeMap<String, CircuitRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub allowed: Vec<String>,
    pub half_open_probe: Vec<String>,
    pub blocked: Vec<String>,
    pub defunct: Vec<String>,
}

pub struct CircuitRegistry<'a> {
    store: &'a StateStore,
    params: Params,
}

impl<'a> CircuitRegistry<'a> {
    pub fn new(store: &'a StateStore, params: Params) -> Self {
        Self { store, params }
    }

    fn load(&self) -> anyhow::Result<Document> {
        Ok(self.store.read::<Document>(DOC_NAME)?.unwrap_or_default())
    }

    fn save(&self, doc: &Document) -> anyhow::Result<()> {
        self.store.write(DOC_NAME, doc)
    }

    pub fn get(&self, platform_id: &str) -> anyhow::Result<CircuitRecord> {
        let doc = self.load()?;
        Ok(doc.records.get(platform_id).cloned().unwrap_or_else(|| CircuitRecord::fresh(platform_id)))
    }

    /// Apply one outcome per the §4.4 transition table and persist it.
    pub fn record_outcome(&self, platform_id: &str, success: bool) -> anyhow::Result<CircuitRecord> {
        let mut doc = self.load()?;
        let now = now_epoch_ms();
        let mut record =
            doc.records.remove(platform_id).unwrap_or_else(|| CircuitRecord::fresh(platform_id));

        if record.defunct_reason.is_some() {
            doc.records.insert(platform_id.to_string(), record.clone());
            self.save(&doc)?;
            return Ok(record);
        }

        let status_before = record.status(&self.params, now);

        if success {
            record.consecutive_failures = 0;
            record.total_successes += 1;
            record.last_success = Some(now);
            // Closed success: stays Closed. Half-Open success: closes.
            record.opened_at = None;
            record.half_open_probe_sent = false;
        } else {
            record.consecutive_failures += 1;
            record.total_failures += 1;
            record.last_failure = Some(now);

            let should_open = match status_before {
                Status::Closed => record.consecutive_failures >= self.params.failure_threshold,
                Status::HalfOpen => true,
                Status::Open | Status::Defunct => false,
            };
            if should_open {
                record.opened_at = Some(now);
                record.half_open_probe_sent = false;
            }

            if record.consecutive_failures >= self.params.defunct_consecutive_failures {
                if let Some(opened_at) = record.opened_at {
                    if now.saturating_sub(opened_at) >= self.params.defunct_open_ms {
                        record.defunct_reason = Some(format!(
                            "{} consecutive failures, open since {}",
                            record.consecutive_failures, opened_at
                        ));
                    }
                }
            }
        }

        doc.records.insert(platform_id.to_string(), record.clone());
        self.save(&doc)?;
        Ok(record)
    }

    pub fn mark_defunct(&self, platform_id: &str, reason: impl Into<String>) -> anyhow::Result<()> {
        let mut doc = self.load()?;
        let mut record =
            doc.records.remove(platform_id).unwrap_or_else(|| CircuitRecord::fresh(platform_id));
        record.defunct_reason = Some(reason.into());
        doc.records.insert(platform_id.to_string(), record);
        self.save(&doc)
    }

    /// Split `platform_list` into allowed / blocked / defunct. Exactly one
    /// Half-Open platform (the first encountered, by input order) is
    /// admitted as a probe per call even when several are due.
    pub fn filter_allowed(&self, platform_list: &[String]) -> anyhow::Result<FilterResult> {
        let mut doc = self.load()?;
        let now = now_epoch_ms();
        let mut result = FilterResult::default();
        let mut probe_used = false;

        for platform_id in platform_list {
            let mut record = doc
                .records
                .get(platform_id)
                .cloned()
                .unwrap_or_else(|| CircuitRecord::fresh(platform_id));
            let status = record.status(&self.params, now);

            match status {
                Status::Closed => result.allowed.push(platform_id.clone()),
                Status::Defunct => result.defunct.push(platform_id.clone()),
                Status::Open => result.blocked.push(platform_id.clone()),
                Status::HalfOpen => {
                    let already_probed_this_window = record.half_open_probe_sent;
                    if !probe_used && !already_probed_this_window {
                        record.half_open_probe_sent = true;
                        doc.records.insert(platform_id.clone(), record);
                        result.allowed.push(platform_id.clone());
                        result.half_open_probe.push(platform_id.clone());
                        probe_used = true;
                    } else {
                        result.blocked.push(platform_id.clone());
                    }
                }
            }
        }

        self.save(&doc)?;
        Ok(result)
    }

    pub fn all_ids(&self) -> anyhow::Result<BTreeSet<String>> {
        Ok(self.load()?.records.keys().cloned().collect())
    }
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
