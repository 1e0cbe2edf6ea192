// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs pre-/post-session hook scripts under a budget (§4.7). A hook is a
//! file named `NN-name[_X].sh`: `NN` orders it, the optional `_X` suffix
//! restricts it to mode `X`.

pub mod manifest;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::rotation::Mode;
use manifest::{read_manifest, HookManifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookClass {
    Success,
    Warn,
    Fatal,
    BudgetExceeded,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HookResult {
    pub name: String,
    pub exit: Option<i32>,
    pub duration_ms: u64,
    pub class: HookClass,
}

#[derive(Debug, Clone)]
struct DiscoveredHook {
    path: PathBuf,
    name: String,
    manifest: HookManifest,
}

#[derive(Debug, Clone, Copy)]
pub struct HookBudget {
    pub per_hook_timeout: Duration,
    pub global_budget: Duration,
    pub max_parallel: usize,
}

impl HookBudget {
    pub fn pre_session() -> Self {
        Self { per_hook_timeout: Duration::from_secs(30), global_budget: Duration::from_secs(90), max_parallel: 4 }
    }

    pub fn post_session() -> Self {
        Self { per_hook_timeout: Duration::from_secs(60), global_budget: Duration::from_secs(120), max_parallel: 4 }
    }
}

pub struct HookRunner {
    hooks_dir: PathBuf,
    budget: HookBudget,
}

/// Environment handed to every hook subprocess (§4.7: "session number,
/// mode, counter, log file path").
#[derive(Debug, Clone)]
pub struct HookEnv {
    pub session_number: u64,
    pub mode: Mode,
    pub counter: u64,
    pub log_file: PathBuf,
}

impl HookRunner {
    pub fn new(hooks_dir: impl Into<PathBuf>, budget: HookBudget) -> Self {
        Self { hooks_dir: hooks_dir.into(), budget }
    }

    fn file_stem_suffix(name: &str) -> Option<char> {
        let stem = name.strip_suffix(".sh")?;
        let underscore = stem.rfind('_')?;
        let suffix = &stem[underscore + 1..];
        if suffix.len() == 1 {
            suffix.chars().next()
        } else {
            None
        }
    }

    fn discover(&self, mode: Mode) -> anyhow::Result<Vec<DiscoveredHook>> {
        if !self.hooks_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.hooks_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sh"))
            .collect();
        entries.sort();

        let mut hooks = Vec::new();
        for path in entries {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
            if let Some(suffix) = Self::file_stem_suffix(&name) {
                if Mode::from_letter(suffix.to_ascii_uppercase()).ok() != Some(mode) {
                    continue;
                }
            }
            let manifest = read_manifest(&path);
            hooks.push(DiscoveredHook { path, name, manifest });
        }
        Ok(hooks)
    }

    /// Run every hook applicable to `mode`, respecting the per-hook and
    /// global budgets. Parallel-safe hooks run concurrently (capped at
    /// `max_parallel`); hooks declaring a write target always run
    /// serially relative to every other hook that writes.
    pub async fn run(&self, mode: Mode, env: &HookEnv) -> anyhow::Result<Vec<HookResult>> {
        let hooks = self.discover(mode)?;
        let deadline = tokio::time::Instant::now() + self.budget.global_budget;

        let mut results = Vec::new();
        let mut remaining = hooks;

        while !remaining.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                for hook in remaining {
                    results.push(HookResult { name: hook.name, exit: None, duration_ms: 0, class: HookClass::BudgetExceeded });
                }
                break;
            }

            let writer_idx = remaining.iter().position(|h| !h.manifest.write_targets.is_empty());
            let batch_end = match writer_idx {
                Some(0) => 1,
                Some(idx) => idx,
                None => remaining.len().min(self.budget.max_parallel),
            };
            let batch: Vec<DiscoveredHook> = remaining.drain(..batch_end.max(1)).collect();

            let per_hook_timeout = self.budget.per_hook_timeout;
            let futures = batch.into_iter().map(|hook| {
                let env = env.clone();
                async move { run_one(&hook, &env, per_hook_timeout).await }
            });
            let batch_results = futures_util::future::join_all(futures).await;
            results.extend(batch_results);
        }

        Ok(results)
    }
}

async fn run_one(hook: &DiscoveredHook, env: &HookEnv, timeout: Duration) -> HookResult {
    let started = std::time::Instant::now();

    let mut command = Command::new(&hook.path);
    command
        .env("WAKELOOP_SESSION_NUMBER", env.session_number.to_string())
        .env("WAKELOOP_MODE", env.mode.as_str())
        .env("WAKELOOP_COUNTER", env.counter.to_string())
        .env("WAKELOOP_LOG_FILE", env.log_file.to_string_lossy().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let spawn_result = command.spawn();
    let exit = match spawn_result {
        Ok(mut child) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                warn!(hook = %hook.name, error = %e, "hook wait failed");
                None
            }
            Err(_) => {
                let _ = child.start_kill();
                None
            }
        },
        Err(e) => {
            warn!(hook = %hook.name, error = %e, "hook spawn failed");
            None
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let class = match exit {
        Some(0) => HookClass::Success,
        Some(_) if hook.manifest.fatal_on_nonzero => HookClass::Fatal,
        Some(_) => HookClass::Warn,
        None => HookClass::Warn,
    };

    HookResult { name: hook.name.clone(), exit, duration_ms, class }
}

pub fn write_targets_of(path: &Path) -> Vec<String> {
    read_manifest(path).write_targets
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
