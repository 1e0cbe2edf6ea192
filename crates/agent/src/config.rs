// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI surface (§6) and the knobs it feeds into the rest of the crate.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::circuit::Params as CircuitParams;
use crate::context::Knobs;
use crate::rotation::Mode;
use crate::work_queue::BudgetHint;

/// Autonomous session orchestrator: one invocation runs exactly one tick.
#[derive(Debug, Parser)]
#[command(name = "wakeloop", version, about)]
pub struct Config {
    /// Render the assembled prompt and exit without spawning the LLM child.
    #[arg(long, env = "WAKELOOP_DRY_RUN")]
    pub dry_run: bool,

    /// Force a specific mode for this tick, bypassing the rotation pattern.
    #[arg(long, env = "WAKELOOP_MODE", value_parser = parse_mode)]
    pub mode: Option<Mode>,

    /// Skip non-essential init stages (auto-promotion, queue grooming).
    #[arg(long, env = "WAKELOOP_SAFE_MODE")]
    pub safe_mode: bool,

    /// Fixed Build session with rotation and context assembly skipped.
    #[arg(long, env = "WAKELOOP_EMERGENCY")]
    pub emergency: bool,

    /// Directory holding every orchestrator document and log.
    #[arg(long, env = "WAKELOOP_STATE_DIR")]
    pub state_dir: PathBuf,

    /// Path to the opaque LLM CLI binary invoked as the session child.
    #[arg(long, env = "WAKELOOP_LLM_BIN")]
    pub llm_bin: PathBuf,

    /// Directory of pre-/post-session hook scripts.
    #[arg(long, env = "WAKELOOP_HOOKS_DIR", default_value = "hooks")]
    pub hooks_dir: PathBuf,

    /// MCP config path passed through to the LLM child's environment.
    #[arg(long, env = "WAKELOOP_MCP_CONFIG")]
    pub mcp_config: Option<PathBuf>,

    /// Mode rotation pattern, e.g. "BBBRE".
    #[arg(long, env = "WAKELOOP_PATTERN", default_value = "BBBRE")]
    pub pattern: String,

    /// Retries of the same mode on a Timeout outcome before advancing.
    #[arg(long, env = "WAKELOOP_MAX_RETRIES", default_value = "1")]
    pub max_retries: u32,

    /// Wall-clock deadline for the LLM child, in seconds.
    #[arg(long, env = "WAKELOOP_SESSION_TIMEOUT_SECS", default_value = "1800")]
    pub session_timeout_secs: u64,

    /// Grace period between SIGTERM and SIGKILL, in seconds.
    #[arg(long, env = "WAKELOOP_KILL_GRACE_SECS", default_value = "10")]
    pub kill_grace_secs: u64,

    /// Budget cap (micros) advertised to the LLM child via environment.
    #[arg(long, env = "WAKELOOP_BUDGET_CAP_MICROS", default_value = "5000000")]
    pub budget_cap_micros: u64,

    /// Treat the queue as budget-constrained: gate out large items.
    #[arg(long, env = "WAKELOOP_TIGHT_BUDGET")]
    pub tight_budget: bool,

    /// Cap on history.log lines retained (unbounded if unset).
    #[arg(long, env = "WAKELOOP_HISTORY_MAX_LINES")]
    pub history_max_lines: Option<usize>,

    /// Cap on init-errors.log lines retained.
    #[arg(long, env = "WAKELOOP_INIT_ERRORS_MAX_LINES", default_value = "500")]
    pub init_errors_max_lines: usize,

    /// Cap on skip.log lines retained.
    #[arg(long, env = "WAKELOOP_SKIP_LOG_MAX_LINES", default_value = "500")]
    pub skip_log_max_lines: usize,

    /// Max idea-pool items auto-promoted into the queue in one tick.
    #[arg(long, env = "WAKELOOP_AUTO_PROMOTE_MAX", default_value = "1")]
    pub auto_promote_max: usize,

    /// Idea-pool buffer left unpromoted while the queue is non-empty.
    #[arg(long, env = "WAKELOOP_AUTO_PROMOTE_BUFFER", default_value = "2")]
    pub auto_promote_buffer: usize,

    /// Words of a title's normalized prefix used for dedup matching.
    #[arg(long, env = "WAKELOOP_DEDUP_WORDS", default_value = "6")]
    pub dedup_words: usize,

    /// Platform ids given a flat ROI score boost.
    #[arg(long, env = "WAKELOOP_PRIORITY_TARGET")]
    pub priority_target: Vec<String>,

    /// Flat ROI score boost applied to each priority target.
    #[arg(long, env = "WAKELOOP_PRIORITY_BOOST", default_value = "0.0")]
    pub priority_boost: f64,

    /// Weight applied to the median-engagement exploration bonus.
    #[arg(long, env = "WAKELOOP_EXPLORATION_WEIGHT", default_value = "0.0")]
    pub exploration_weight: f64,

    /// Consecutive failures before a Closed circuit opens.
    #[arg(long, env = "WAKELOOP_FAILURE_THRESHOLD", default_value = "3")]
    pub failure_threshold: u32,

    /// Cooldown before an Open circuit becomes Half-Open, in seconds.
    #[arg(long, env = "WAKELOOP_COOLDOWN_SECS", default_value = "86400")]
    pub cooldown_secs: u64,

    /// Consecutive failures after which a circuit is a candidate for Defunct.
    #[arg(long, env = "WAKELOOP_DEFUNCT_CONSECUTIVE_FAILURES", default_value = "10")]
    pub defunct_consecutive_failures: u32,

    /// Minimum time a circuit must stay continuously Open before it can be
    /// marked Defunct, in seconds.
    #[arg(long, env = "WAKELOOP_DEFUNCT_OPEN_SECS", default_value = "86400")]
    pub defunct_open_secs: u64,

    /// Log format: "json" or "text".
    #[arg(long, env = "WAKELOOP_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "WAKELOOP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub subcommand: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the out-of-band platform health monitor instead of a tick.
    HealthMonitor {
        /// Probe every account's test endpoint once and exit.
        #[arg(long)]
        once: bool,

        /// Seconds between probe rounds when not run with `--once`.
        #[arg(long, default_value = "300")]
        interval_secs: u64,

        /// Per-endpoint probe timeout, in seconds.
        #[arg(long, default_value = "10")]
        probe_timeout_secs: u64,

        /// Cap on health.log lines retained.
        #[arg(long, default_value = "2000")]
        log_max_lines: usize,
    },
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    let upper = raw.to_ascii_uppercase();
    let letter = upper.chars().next().ok_or_else(|| "empty mode".to_string())?;
    Mode::from_letter(letter).map_err(|e| e.to_string())
}

impl Config {
    /// Validate cross-field constraints not expressible through clap alone.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pattern.is_empty() {
            anyhow::bail!("--pattern must not be empty");
        }
        if self.pattern.chars().any(|c| Mode::from_letter(c.to_ascii_uppercase()).is_err()) {
            anyhow::bail!("--pattern '{}' contains a letter that is not one of B/E/R/A", self.pattern);
        }
        if self.emergency && self.mode.is_some() {
            anyhow::bail!("--emergency and --mode are mutually exclusive");
        }
        if self.session_timeout_secs == 0 {
            anyhow::bail!("--session-timeout-secs must be greater than zero");
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn circuit_params(&self) -> CircuitParams {
        CircuitParams {
            failure_threshold: self.failure_threshold,
            cooldown_ms: self.cooldown_secs * 1000,
            defunct_consecutive_failures: self.defunct_consecutive_failures,
            defunct_open_ms: self.defunct_open_secs * 1000,
        }
    }

    pub fn budget_hint(&self) -> BudgetHint {
        if self.tight_budget {
            BudgetHint::Tight
        } else {
            BudgetHint::Normal
        }
    }

    /// Build the context-assembly knobs from the parsed CLI surface.
    /// `--safe-mode` zeroes auto-promotion: maintenance stages stay off
    /// regardless of mode.
    pub fn knobs(&self) -> Knobs {
        Knobs {
            budget_hint: self.budget_hint(),
            auto_promote_max: if self.safe_mode { 0 } else { self.auto_promote_max },
            auto_promote_buffer: self.auto_promote_buffer,
            dedup_words: self.dedup_words,
            circuit_params: self.circuit_params(),
            priority_targets: self.priority_target.clone(),
            priority_boost: self.priority_boost,
            exploration_weight: self.exploration_weight,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
