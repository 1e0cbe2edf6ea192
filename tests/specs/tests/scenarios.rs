// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box end-to-end scenarios (spec §8) driven against the real
//! compiled `wakeloop` binary, one tick per process spawn.

use tempfile::tempdir;
use wakeloop_specs::{hanging_stub, quiet_success_stub, read_json, read_lines, run_tick};

/// Scenario 1: fresh rotation over pattern "BBBRE" produces modes
/// B,B,B,R,E across five ticks with session_numbers 1..5.
#[test]
fn fresh_rotation_follows_pattern() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let state_dir = dir.path().join("state");
    std::fs::create_dir_all(&state_dir)?;
    let llm = quiet_success_stub(dir.path());

    let expected_modes = ["Build", "Build", "Build", "Reflect", "Engage"];
    for (i, expected_mode) in expected_modes.iter().enumerate() {
        let out = run_tick(&state_dir, &llm, &["--pattern", "BBBRE"])?;
        assert!(out.status.success(), "tick {} stderr: {}", i + 1, String::from_utf8_lossy(&out.stderr));

        let rotation = read_json(&state_dir, "rotation.json")?;
        assert_eq!(rotation["session_counter"], (i as u64 + 1));

        let history = read_lines(&state_dir, "history.log")?;
        assert_eq!(history.len(), i + 1);
        let record: serde_json::Value = serde_json::from_str(&history[i])?;
        assert_eq!(record["session_number"], (i as u64 + 1));
        assert_eq!(record["mode"], *expected_mode);
        assert_eq!(record["outcome"], "success");
    }
    Ok(())
}

/// Scenario 2: a timed-out tick is retried on the same mode once before
/// the rotation advances.
#[test]
fn timeout_retries_same_mode_then_advances() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let state_dir = dir.path().join("state");
    std::fs::create_dir_all(&state_dir)?;
    let hang = hanging_stub(dir.path());
    let success = quiet_success_stub(dir.path());

    // Tick 1: the child hangs past a deliberately tiny deadline, so the
    // outcome is `timeout`.
    let out = run_tick(
        &state_dir,
        &hang,
        &["--pattern", "BBBRE", "--session-timeout-secs", "1", "--kill-grace-secs", "1"],
    )?;
    assert!(out.status.success());
    let rotation = read_json(&state_dir, "rotation.json")?;
    assert_eq!(rotation["rotation_index"], 0);
    assert_eq!(rotation["retry_count"], 1);
    assert_eq!(rotation["last_outcome"], "timeout");

    let history = read_lines(&state_dir, "history.log")?;
    assert_eq!(history.len(), 1);
    let first: serde_json::Value = serde_json::from_str(&history[0])?;
    assert_eq!(first["mode"], "Build");
    assert_eq!(first["outcome"], "timeout");

    // Tick 2: retry_count < max_retries (default 1), so the same mode
    // (Build) is selected again.
    let out = run_tick(&state_dir, &success, &["--pattern", "BBBRE"])?;
    assert!(out.status.success());
    let history = read_lines(&state_dir, "history.log")?;
    assert_eq!(history.len(), 2);
    let second: serde_json::Value = serde_json::from_str(&history[1])?;
    assert_eq!(second["session_number"], 2);
    assert_eq!(second["mode"], "Build");
    assert_eq!(second["outcome"], "success");

    // Tick 3: the prior outcome was success, so rotation advances to
    // the next pattern letter.
    let out = run_tick(&state_dir, &success, &["--pattern", "BBBRE"])?;
    assert!(out.status.success());
    let history = read_lines(&state_dir, "history.log")?;
    assert_eq!(history.len(), 3);
    let third: serde_json::Value = serde_json::from_str(&history[2])?;
    assert_eq!(third["session_number"], 3);
    assert_eq!(third["mode"], "Build");

    let rotation = read_json(&state_dir, "rotation.json")?;
    assert_eq!(rotation["retry_count"], 0);

    Ok(())
}

/// `--dry-run` renders the prompt and writes nothing to the history log.
#[test]
fn dry_run_does_not_append_history() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let state_dir = dir.path().join("state");
    std::fs::create_dir_all(&state_dir)?;
    let llm = quiet_success_stub(dir.path());

    let out = run_tick(&state_dir, &llm, &["--pattern", "BBBRE", "--dry-run"])?;
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Build mode"));

    let history = read_lines(&state_dir, "history.log")?;
    assert!(history.is_empty());
    Ok(())
}

/// A second tick against a held lock is skipped, not a fatal error, and
/// the session counter does not move.
#[test]
fn concurrent_tick_is_skipped_not_fatal() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let state_dir = dir.path().join("state");
    std::fs::create_dir_all(&state_dir)?;
    let llm = quiet_success_stub(dir.path());

    // Pre-seed a lock file held by this test process so the binary's
    // non-blocking try-lock observes contention.
    let lock_path = state_dir.join("tick.lock");
    let lock_file = std::fs::File::create(&lock_path)?;
    fs2::FileExt::lock_exclusive(&lock_file)?;

    let out = run_tick(&state_dir, &llm, &["--pattern", "BBBRE"])?;
    assert!(out.status.success());

    let history = read_lines(&state_dir, "history.log")?;
    assert!(history.is_empty());

    let skip_log = read_lines(&state_dir, "skip.log")?;
    assert_eq!(skip_log.len(), 1);
    assert!(skip_log[0].contains("lock_busy"));

    fs2::FileExt::unlock(&lock_file)?;
    Ok(())
}

/// An invalid pattern is rejected before any state I/O, with exit code 2.
#[test]
fn invalid_pattern_exits_two_without_touching_state() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let state_dir = dir.path().join("state");
    std::fs::create_dir_all(&state_dir)?;
    let llm = quiet_success_stub(dir.path());

    let out = run_tick(&state_dir, &llm, &["--pattern", "XYZ"])?;
    assert_eq!(out.status.code(), Some(2));
    assert!(!state_dir.join("rotation.json").exists());
    Ok(())
}
