// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawns the opaque LLM CLI child process: prompt on stdin, a budget
//! cap, a wall-clock deadline with SIGTERM→SIGKILL grace (§4.8 step 8,
//! §5). Liveness checks and the PID-file staleness handling mirror the
//! teacher's own `driver::process::is_process_alive` and the PTY
//! backend's shutdown grace period.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::rotation::Mode;

pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid_i32), None).is_ok()
}

/// If `pid_file` exists: remove it if the recorded PID is dead, or send
/// it SIGTERM then (after `grace`) SIGKILL if still alive. Called once
/// at the top of every tick (§4.8 step 2).
pub async fn reap_stale_child(pid_file: &Path, grace: Duration) -> anyhow::Result<()> {
    let Ok(contents) = std::fs::read_to_string(pid_file) else {
        return Ok(());
    };
    let Ok(pid) = contents.trim().parse::<u32>() else {
        let _ = std::fs::remove_file(pid_file);
        return Ok(());
    };

    if !is_process_alive(pid) {
        let _ = std::fs::remove_file(pid_file);
        return Ok(());
    }

    warn!(pid, "killing stale LLM child from a previous tick");
    let pid_raw = Pid::from_raw(pid as i32);
    let _ = signal::kill(pid_raw, Signal::SIGTERM);
    tokio::time::sleep(grace).await;
    if is_process_alive(pid) {
        let _ = signal::kill(pid_raw, Signal::SIGKILL);
    }
    let _ = std::fs::remove_file(pid_file);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOutcome {
    Success,
    Timeout,
    Error,
}

#[derive(Debug, Clone)]
pub struct ChildRunResult {
    pub outcome: ChildOutcome,
    pub exit_code: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub duration: Duration,
}

pub struct ChildSpawnConfig {
    pub llm_bin: PathBuf,
    pub mcp_config_path: Option<PathBuf>,
    pub session_timeout: Duration,
    pub kill_grace: Duration,
    pub budget_cap_micros: u64,
    pub pid_file: PathBuf,
}

/// Spawn the LLM child, feed it `prompt` on stdin, and wait up to
/// `session_timeout`. On deadline expiry: SIGTERM, wait `kill_grace`,
/// then SIGKILL; outcome is `Timeout` regardless of how the process
/// eventually exits.
pub async fn spawn_and_wait(
    config: &ChildSpawnConfig,
    prompt: &str,
    mode: Mode,
    session_number: u64,
) -> anyhow::Result<ChildRunResult> {
    let started = std::time::Instant::now();

    let mut command = Command::new(&config.llm_bin);
    command
        .env("WAKELOOP_SESSION_TYPE", mode.as_str())
        .env("WAKELOOP_SESSION_NUMBER", session_number.to_string())
        .env("WAKELOOP_BUDGET_CAP_MICROS", config.budget_cap_micros.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    if let Some(mcp_path) = &config.mcp_config_path {
        command.env("WAKELOOP_MCP_CONFIG", mcp_path.to_string_lossy().to_string());
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to spawn LLM child");
            return Ok(ChildRunResult {
                outcome: ChildOutcome::Error,
                exit_code: None,
                stdout_lines: Vec::new(),
                duration: started.elapsed(),
            });
        }
    };

    if let Some(pid) = child.id() {
        let _ = std::fs::write(&config.pid_file, pid.to_string());
    }

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(prompt.as_bytes()).await;
        drop(stdin);
    }

    let stdout = child.stdout.take();
    let wait_future = async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = Vec::new();
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                lines.push(line);
            }
        }
        let status = child.wait().await;
        (status, lines)
    };

    let result = tokio::time::timeout(config.session_timeout, wait_future).await;

    match result {
        Ok((status, lines)) => {
            let _ = std::fs::remove_file(&config.pid_file);
            let exit_code = status.ok().and_then(|s| s.code());
            let outcome = if exit_code == Some(0) { ChildOutcome::Success } else { ChildOutcome::Error };
            Ok(ChildRunResult { outcome, exit_code, stdout_lines: lines, duration: started.elapsed() })
        }
        Err(_) => {
            info!("LLM child exceeded session timeout; sending SIGTERM");
            if let Ok(contents) = std::fs::read_to_string(&config.pid_file) {
                if let Ok(pid) = contents.trim().parse::<u32>() {
                    let pid = Pid::from_raw(pid as i32);
                    let _ = signal::kill(pid, Signal::SIGTERM);
                    tokio::time::sleep(config.kill_grace).await;
                    if is_process_alive(pid.as_raw() as u32) {
                        let _ = signal::kill(pid, Signal::SIGKILL);
                    }
                }
            }
            let _ = std::fs::remove_file(&config.pid_file);
            Ok(ChildRunResult {
                outcome: ChildOutcome::Timeout,
                exit_code: None,
                stdout_lines: Vec::new(),
                duration: started.elapsed(),
            })
        }
    }
}

#[cfg(test)]
#[path = "child_tests.rs"]
mod tests;
