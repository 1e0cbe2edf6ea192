// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box harness for end-to-end `wakeloop` scenarios.
//!
//! Spawns the real compiled `wakeloop` binary as a subprocess, the way
//! the teacher's own `tests/specs` spawns the real `coop` binary, with
//! one difference in shape: `wakeloop` is a one-shot tick rather than a
//! long-lived server, so each scenario step is a single process spawn
//! that runs to completion instead of a server to poll.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Resolve the path to the compiled `wakeloop` binary.
pub fn wakeloop_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("wakeloop")
}

/// Write an executable shell script standing in for the opaque LLM CLI.
pub fn write_llm_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write llm stub");
    let mut perms = std::fs::metadata(&path).expect("stat llm stub").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod llm stub");
    path
}

/// A stub that emits one `result` event reporting success and exits 0.
pub fn quiet_success_stub(dir: &Path) -> PathBuf {
    write_llm_stub(
        dir,
        "llm-success.sh",
        "#!/bin/sh\ncat >/dev/null\necho '{\"type\":\"result\",\"cost_micros\":100}'\nexit 0\n",
    )
}

/// A stub that sleeps past any reasonable session deadline.
pub fn hanging_stub(dir: &Path) -> PathBuf {
    write_llm_stub(dir, "llm-hang.sh", "#!/bin/sh\ncat >/dev/null\nsleep 600\n")
}

/// Run exactly one `wakeloop` tick against `state_dir`/`llm_bin`, with
/// `extra_args` appended after the required flags. Blocks until the
/// process exits; the caller is responsible for keeping scenarios fast
/// (a hung child is bounded by `--session-timeout-secs` inside the
/// binary itself, not by this harness).
pub fn run_tick(state_dir: &Path, llm_bin: &Path, extra_args: &[&str]) -> anyhow::Result<Output> {
    let binary = wakeloop_binary();
    anyhow::ensure!(binary.exists(), "wakeloop binary not found at {}; run `cargo build` first", binary.display());

    let mut args: Vec<String> = vec![
        "--state-dir".into(),
        state_dir.to_string_lossy().into_owned(),
        "--llm-bin".into(),
        llm_bin.to_string_lossy().into_owned(),
        "--log-format".into(),
        "text".into(),
        "--log-level".into(),
        "warn".into(),
    ];
    args.extend(extra_args.iter().map(|s| s.to_string()));

    let output = Command::new(&binary).args(&args).output()?;
    Ok(output)
}

/// Read a named JSON document from the state directory.
pub fn read_json(state_dir: &Path, name: &str) -> anyhow::Result<serde_json::Value> {
    let path = state_dir.join(name);
    let contents = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Read a named append-only log from the state directory as lines.
pub fn read_lines(state_dir: &Path, name: &str) -> anyhow::Result<Vec<String>> {
    let path = state_dir.join(name);
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(std::fs::read_to_string(&path)?.lines().map(str::to_owned).collect())
}
