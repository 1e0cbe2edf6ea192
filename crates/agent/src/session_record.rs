// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only session record (§3) and the history log it lives in.

use serde::{Deserialize, Serialize};

use crate::rotation::Mode;
use crate::state::StateStore;

const HISTORY_LOG: &str = "history.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_number: u64,
    pub mode: Mode,
    pub started_at: u64,
    pub ended_at: u64,
    pub exit_code: Option<i32>,
    pub outcome: SessionOutcome,
    pub duration_seconds: u64,
    pub cost_micros: u64,
    pub tool_calls: u32,
    pub files_changed: Vec<String>,
    pub note: String,
}

/// Read every session record from the history log, in append order.
/// Malformed lines are skipped rather than failing the whole read — the
/// log is append-only and older formats may carry forward.
pub fn read_history(store: &StateStore) -> anyhow::Result<Vec<SessionRecord>> {
    let lines = store.read_lines(HISTORY_LOG)?;
    Ok(lines.iter().filter_map(|line| serde_json::from_str(line).ok()).collect())
}

/// Append one record. Callers are responsible for ensuring
/// `session_number` is strictly increasing (the rotation machine's
/// counter is the source of truth).
pub fn append_history(store: &StateStore, record: &SessionRecord) -> anyhow::Result<()> {
    let line = serde_json::to_string(record)?;
    store.append_line(HISTORY_LOG, &line, None)
}

/// Count recorded sessions per mode, for the rotation section's
/// "per-type counter".
pub fn counts_by_mode(history: &[SessionRecord]) -> std::collections::HashMap<Mode, u64> {
    let mut counts = std::collections::HashMap::new();
    for record in history {
        *counts.entry(record.mode).or_insert(0) += 1;
    }
    counts
}
