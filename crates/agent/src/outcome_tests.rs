// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

use tempfile::tempdir;

use super::*;
use crate::circuit::{CircuitRegistry, Params};
use crate::rotation::Mode;
use crate::session_record::{read_history, SessionOutcome, SessionRecord};
use crate::state::StateStore;

fn known_platforms() -> HashSet<String> {
    ["mastodon".to_string(), "bluesky".to_string()].into_iter().collect()
}

#[test]
fn parse_stream_counts_tool_calls_and_tracks_success() {
    let lines = vec![
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"mastodon_post","input":{}}]}}"#
            .to_string(),
        r#"{"type":"user","message":{"content":[{"type":"tool_result","is_error":false}]}}"#.to_string(),
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"bluesky_post","input":{}}]}}"#
            .to_string(),
        r#"{"type":"user","message":{"content":[{"type":"tool_result","is_error":true}]}}"#.to_string(),
        r#"{"type":"result","cost_micros":1500,"duration_ms":4000}"#.to_string(),
    ];

    let parsed = parse_stream(&lines, &known_platforms(), Mode::Build, 7);
    assert_eq!(parsed.tool_calls, 2);
    assert_eq!(parsed.cost_micros, 1500);
    assert_eq!(parsed.duration_seconds, 4);
    assert_eq!(
        parsed.tool_platform_outcomes,
        vec![("mastodon".to_string(), true), ("bluesky".to_string(), false)]
    );
}

#[test]
fn parse_stream_extracts_note_from_completion_text() {
    let lines = vec![
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Session Build#3 complete. shipped the retry fix"}]}}"#
            .to_string(),
    ];
    let parsed = parse_stream(&lines, &known_platforms(), Mode::Build, 3);
    assert_eq!(parsed.note, "shipped the retry fix");
}

#[test]
fn parse_stream_falls_back_to_last_nonempty_line() {
    let lines = vec!["not json at all".to_string(), "".to_string()];
    let parsed = parse_stream(&lines, &known_platforms(), Mode::Build, 1);
    assert_eq!(parsed.note, "not json at all");
}

#[test]
fn record_updates_circuits_and_appends_history_and_summary() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let circuits = CircuitRegistry::new(&store, Params::default());

    let session_record_value = SessionRecord {
        session_number: 1,
        mode: Mode::Build,
        started_at: 0,
        ended_at: 10,
        exit_code: Some(0),
        outcome: SessionOutcome::Success,
        duration_seconds: 10,
        cost_micros: 1000,
        tool_calls: 1,
        files_changed: Vec::new(),
        note: "ok".to_string(),
    };
    let parsed = ParsedRun {
        tool_calls: 1,
        cost_micros: 1000,
        duration_seconds: 10,
        note: "ok".to_string(),
        tool_platform_outcomes: vec![("mastodon".to_string(), false)],
    };

    record(&store, &circuits, session_record_value, "session-1.log", &parsed)?;

    let history = read_history(&store)?;
    assert_eq!(history.len(), 1);

    let mastodon = circuits.get("mastodon")?;
    assert_eq!(mastodon.consecutive_failures, 1);

    let summary = store.read_lines("session-1.log.summary")?;
    assert_eq!(summary.len(), 1);
    assert!(summary[0].contains("session 1"));
    Ok(())
}

#[test]
fn child_outcome_maps_to_session_outcome() {
    assert_eq!(child_outcome_to_session_outcome(ChildOutcome::Success), SessionOutcome::Success);
    assert_eq!(child_outcome_to_session_outcome(ChildOutcome::Timeout), SessionOutcome::Timeout);
    assert_eq!(child_outcome_to_session_outcome(ChildOutcome::Error), SessionOutcome::Error);
}
