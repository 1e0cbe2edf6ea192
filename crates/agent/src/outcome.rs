// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses the LLM child's streamed JSONL output, appends a session
//! record, and updates the circuit registry from per-tool-call outcomes
//! (§4.9). The "match on `type`, look at `message.content[].type`" shape
//! generalizes the teacher's own Claude JSONL classifier
//! (`driver/claude/parse.rs`) from single-state classification to
//! tool-call counting, cost extraction, and note extraction.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use crate::child::ChildOutcome;
use crate::circuit::CircuitRegistry;
use crate::rotation::Mode;
use crate::session_record::{append_history, SessionOutcome, SessionRecord};
use crate::state::StateStore;

/// Aggregate extracted from one child's line-delimited JSON stream.
#[derive(Debug, Clone, Default)]
pub struct ParsedRun {
    pub tool_calls: u32,
    pub cost_micros: u64,
    pub duration_seconds: u64,
    pub note: String,
    pub tool_platform_outcomes: Vec<(String, bool)>,
}

fn note_pattern(mode: Mode, session_number: u64) -> Option<Regex> {
    let pattern = format!(r"Session {}#{} complete\.\s*(.*)", regex_escape(mode_display(mode)), session_number);
    Regex::new(&pattern).ok()
}

fn mode_display(mode: Mode) -> &'static str {
    match mode {
        Mode::Build => "Build",
        Mode::Engage => "Engage",
        Mode::Reflect => "Reflect",
        Mode::Audit => "Audit",
    }
}

fn regex_escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| if "\\.+*?()|[]{}^$#".contains(c) { vec!['\\', c] } else { vec![c] })
        .collect()
}

/// Known platform ids a `tool_use` name maps to, so tool-call outcomes
/// can update the right circuit record. `None` when the tool isn't a
/// platform client call (e.g. a filesystem or search tool).
fn tool_name_to_platform(tool_name: &str, known_platforms: &HashSet<String>) -> Option<String> {
    known_platforms.iter().find(|p| tool_name.eq_ignore_ascii_case(p) || tool_name.contains(p.as_str())).cloned()
}

/// Parse a child's full stdout line stream per the §6 child-output
/// contract. Unknown lines are ignored; malformed JSON lines are
/// ignored rather than aborting the parse.
pub fn parse_stream(lines: &[String], known_platforms: &HashSet<String>, mode: Mode, session_number: u64) -> ParsedRun {
    let mut parsed = ParsedRun::default();
    let note_re = note_pattern(mode, session_number);
    let mut last_nonempty_line: Option<String> = None;
    let mut fallback_note: Option<String> = None;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        last_nonempty_line = Some(trimmed.to_string());

        let Ok(json) = serde_json::from_str::<Value>(trimmed) else { continue };
        let Some(kind) = json.get("type").and_then(Value::as_str) else { continue };

        match kind {
            "assistant" => {
                if let Some(content) = json.get("message").and_then(|m| m.get("content")).and_then(Value::as_array) {
                    for block in content {
                        if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                            parsed.tool_calls += 1;
                            if let Some(tool_name) = block.get("name").and_then(Value::as_str) {
                                if let Some(platform) = tool_name_to_platform(tool_name, known_platforms) {
                                    parsed.tool_platform_outcomes.push((platform, true));
                                }
                            }
                        }
                        if block.get("type").and_then(Value::as_str) == Some("text") {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                if let Some(captures) = note_re.as_ref().and_then(|re| re.captures(text)) {
                                    fallback_note =
                                        Some(captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default());
                                }
                            }
                        }
                    }
                }
            }
            "user" => {
                if let Some(content) = json.get("message").and_then(|m| m.get("content")).and_then(Value::as_array) {
                    for block in content {
                        if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                            continue;
                        }
                        let is_error = block.get("is_error").and_then(Value::as_bool).unwrap_or(false);
                        if let Some((_, last)) = parsed.tool_platform_outcomes.last_mut().map(|(p, s)| (p.clone(), s)) {
                            *last = !is_error;
                        }
                    }
                }
            }
            "result" => {
                if let Some(cost) = json.get("cost_micros").and_then(Value::as_u64) {
                    parsed.cost_micros = cost;
                } else if let Some(cost_usd) = json.get("total_cost_usd").and_then(Value::as_f64) {
                    parsed.cost_micros = (cost_usd * 1_000_000.0).round() as u64;
                }
                if let Some(duration_ms) = json.get("duration_ms").and_then(Value::as_u64) {
                    parsed.duration_seconds = duration_ms / 1000;
                } else if let Some(duration_s) = json.get("duration_seconds").and_then(Value::as_u64) {
                    parsed.duration_seconds = duration_s;
                }
            }
            _ => {}
        }
    }

    parsed.note = fallback_note.unwrap_or_else(|| last_nonempty_line.unwrap_or_default());
    parsed
}

pub fn child_outcome_to_session_outcome(outcome: ChildOutcome) -> SessionOutcome {
    match outcome {
        ChildOutcome::Success => SessionOutcome::Success,
        ChildOutcome::Timeout => SessionOutcome::Timeout,
        ChildOutcome::Error => SessionOutcome::Error,
    }
}

/// Record one tick's outcome: append the session record, feed every
/// platform-attributed tool call to the circuit registry, and write the
/// `.summary` sibling file next to the raw log.
pub fn record(
    store: &StateStore,
    circuits: &CircuitRegistry<'_>,
    record: SessionRecord,
    raw_log_name: &str,
    parsed: &ParsedRun,
) -> anyhow::Result<()> {
    for (platform, success) in &parsed.tool_platform_outcomes {
        circuits.record_outcome(platform, *success)?;
    }

    append_history(store, &record)?;

    let summary = format!(
        "session {} mode={} outcome={:?} tool_calls={} cost_micros={} note={}\n",
        record.session_number, record.mode.as_str(), record.outcome, record.tool_calls, record.cost_micros, record.note
    );
    store.append_line(&format!("{raw_log_name}.summary"), summary.trim_end(), None)
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
