// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session driver (C8): one call to [`run_tick`] is one tick (§4.8).
//! Ties together rotation, context assembly, hooks, the LLM child, and
//! outcome recording. Mirrors the teacher's own `run::run` in shape —
//! acquire state, assemble what the child needs, spawn it, record what
//! happened — generalized from a long-lived PTY session to a single
//! bounded child invocation.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::child::{self, ChildSpawnConfig};
use crate::circuit::{now_epoch_ms, CircuitRegistry};
use crate::config::Config;
use crate::context::{Context, ContextBuilder};
use crate::error::TaggedError;
use crate::hooks::{HookBudget, HookEnv, HookResult, HookRunner};
use crate::outcome;
use crate::rotation::{Advanced, Mode, Outcome as RotationOutcome, RotationMachine, RotationState};
use crate::session_record::{self, SessionOutcome, SessionRecord};
use crate::state::StateStore;
use crate::work_queue::{DedupReport, IngestReport, WorkQueue};

const BASE_IDENTITY: &str = "You are an autonomous agent operating this repository across unattended sessions. \
Leave a one-line completion note in the form \"Session <Mode>#<n> complete. <note>\".";

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Ran { session_number: u64, mode: Mode, outcome: SessionOutcome },
    Skipped { reason: String },
    DryRun { prompt: String },
}

fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<TaggedError>().map(|t| t.kind.is_fatal_to_tick()).unwrap_or(false)
}

fn json_escape(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "'")))
}

/// Run exactly one tick against `config`. Any error returned here already
/// has an `init-errors.log` entry appended; the only errors that
/// propagate at all are those tagged `ConfigInvalid`, per §7.
pub async fn run_tick(config: &Config) -> anyhow::Result<TickOutcome> {
    let tick_id = uuid::Uuid::new_v4().to_string();
    let _span = tracing::info_span!("tick", tick_id = %tick_id).entered();

    let store = StateStore::new(&config.state_dir);

    let lock = match store.with_lock("tick") {
        Ok(guard) => guard,
        Err(_) => {
            let _ = store.append_line(
                "skip.log",
                &format!(r#"{{"ts":{},"tick_id":"{}","reason":"lock_busy"}}"#, now_epoch_ms(), tick_id),
                Some(config.skip_log_max_lines),
            );
            return Ok(TickOutcome::Skipped { reason: "lock_busy".to_string() });
        }
    };

    let pid_file = config.state_dir.join("current-llm-child.pid");
    child::reap_stale_child(&pid_file, config.kill_grace()).await?;

    let result = if config.emergency {
        run_emergency_tick(&store, config, &pid_file).await
    } else {
        run_ordinary_tick(&store, config, &pid_file).await
    };

    drop(lock);

    if let Err(e) = &result {
        let _ = store.append_line(
            "init-errors.log",
            &format!(
                r#"{{"ts":{},"tick_id":"{}","error":{}}}"#,
                now_epoch_ms(),
                tick_id,
                json_escape(&e.to_string())
            ),
            Some(config.init_errors_max_lines),
        );
    }
    result
}

/// Best-effort mode selection when persisting the rotation advance
/// itself failed (a `StateIOError`, not `ConfigInvalid`). The chosen mode
/// is never written back; the next tick re-derives from the last
/// successfully persisted document.
fn provisional_advance(prior: &RotationState, override_mode: Option<Mode>) -> Advanced {
    let mode = override_mode.unwrap_or_else(|| {
        let letters: Vec<char> = prior.pattern.chars().collect();
        if letters.is_empty() {
            Mode::Build
        } else {
            let idx = (prior.rotation_index + 1) % letters.len();
            Mode::from_letter(letters[idx]).unwrap_or(Mode::Build)
        }
    });
    Advanced {
        mode,
        session_counter: prior.session_counter + 1,
        retry_count: 0,
        overridden: override_mode.is_some(),
    }
}

async fn run_ordinary_tick(store: &StateStore, config: &Config, pid_file: &Path) -> anyhow::Result<TickOutcome> {
    let mut warnings = Vec::new();

    let rotation_machine = RotationMachine::new(store, config.max_retries);
    let prior = match rotation_machine.read(&config.pattern) {
        Ok(state) => state,
        Err(e) if is_fatal(&e) => return Err(e),
        Err(e) => {
            warnings.push(format!("rotation read failed, starting fresh: {e}"));
            RotationState::fresh(config.pattern.as_str())
        }
    };
    let previous_outcome = prior.last_outcome;

    let advanced = match rotation_machine.advance(prior.clone(), previous_outcome, config.mode) {
        Ok((_, advanced)) => advanced,
        Err(e) if is_fatal(&e) => return Err(e),
        Err(e) => {
            warnings.push(format!("rotation advance failed, using provisional mode: {e}"));
            provisional_advance(&prior, config.mode)
        }
    };

    let mut mode = advanced.mode;
    let session_number = advanced.session_counter;

    let history = session_record::read_history(store).unwrap_or_else(|e| {
        warnings.push(format!("history read failed: {e}"));
        Vec::new()
    });
    let history_counts = session_record::counts_by_mode(&history);

    let builder = ContextBuilder::new(store, config.knobs());
    let (dedup_report, todo_ingested) = if mode == Mode::Reflect && !config.safe_mode {
        run_reflect_maintenance(store, config, session_number, &mut warnings)
    } else {
        (None, None)
    };

    let mut context = builder.build(mode, session_number, history_counts.clone(), dedup_report, todo_ingested);
    warnings.extend(context.warnings.clone());

    if let Some((new_mode, transform_name)) = apply_mode_transforms(mode, &context) {
        info!(from = mode.as_str(), to = new_mode.as_str(), transform = transform_name, "mode transform applied");
        mode = new_mode;
        context = builder.build(
            mode,
            session_number,
            history_counts,
            context.dedup_report.clone(),
            context.todo_ingested.clone(),
        );
        warnings.extend(context.warnings.clone());
    }

    persist_context(store, &context, mode, session_number)?;

    let prompt = render_prompt(mode, &context, &warnings);

    if config.dry_run {
        return Ok(TickOutcome::DryRun { prompt });
    }

    let hook_env = HookEnv {
        session_number,
        mode,
        counter: session_number,
        log_file: store.root().join(format!("session-{session_number}.log")),
    };
    let pre_runner = HookRunner::new(&config.hooks_dir, HookBudget::pre_session());
    let pre_results = pre_runner.run(mode, &hook_env).await.unwrap_or_else(|e| {
        warnings.push(format!("pre-session hooks failed: {e}"));
        Vec::new()
    });

    let known_platforms: HashSet<String> = context.capability_summary.live_platforms.iter().cloned().collect();
    let run_outcome =
        run_child_and_record(store, config, pid_file, mode, session_number, &prompt, &known_platforms).await?;

    let post_runner = HookRunner::new(&config.hooks_dir, HookBudget::post_session());
    let post_results = post_runner.run(mode, &hook_env).await.unwrap_or_else(|e| {
        warnings.push(format!("post-session hooks failed: {e}"));
        Vec::new()
    });

    store.write("hook-results.json", &HookResultsDoc { session_number, pre: pre_results, post: post_results })?;

    if !warnings.is_empty() {
        let _ = store.append_line(
            "init-errors.log",
            &format!(
                r#"{{"ts":{},"session":{},"warnings":{}}}"#,
                now_epoch_ms(),
                session_number,
                serde_json::to_string(&warnings).unwrap_or_default()
            ),
            Some(config.init_errors_max_lines),
        );
    }

    Ok(TickOutcome::Ran { session_number, mode, outcome: run_outcome })
}

/// Fixed-Build session with rotation and context assembly skipped
/// entirely (§6). Still bumps the session counter so history numbering
/// stays monotonic across emergency and ordinary ticks.
async fn run_emergency_tick(store: &StateStore, config: &Config, pid_file: &Path) -> anyhow::Result<TickOutcome> {
    let mode = Mode::Build;
    let rotation_machine = RotationMachine::new(store, config.max_retries);
    let prior = rotation_machine.read(&config.pattern).unwrap_or_else(|_| RotationState::fresh(config.pattern.as_str()));
    let (_, advanced) = rotation_machine.advance(prior, None, Some(mode))?;
    let session_number = advanced.session_counter;

    let prompt =
        format!("{BASE_IDENTITY}\n\n[EMERGENCY] rotation and context assembly were skipped for this session.");

    if config.dry_run {
        return Ok(TickOutcome::DryRun { prompt });
    }

    let run_outcome =
        run_child_and_record(store, config, pid_file, mode, session_number, &prompt, &HashSet::new()).await?;
    Ok(TickOutcome::Ran { session_number, mode, outcome: run_outcome })
}

/// Spawn the LLM child, write its raw transcript, parse its output, and
/// hand the result to [`outcome::record`] (§4.8 steps 8-9).
async fn run_child_and_record(
    store: &StateStore,
    config: &Config,
    pid_file: &Path,
    mode: Mode,
    session_number: u64,
    prompt: &str,
    known_platforms: &HashSet<String>,
) -> anyhow::Result<SessionOutcome> {
    let child_config = ChildSpawnConfig {
        llm_bin: config.llm_bin.clone(),
        mcp_config_path: config.mcp_config.clone(),
        session_timeout: config.session_timeout(),
        kill_grace: config.kill_grace(),
        budget_cap_micros: config.budget_cap_micros,
        pid_file: pid_file.to_path_buf(),
    };

    let started_at = now_epoch_ms();
    let run_result = child::spawn_and_wait(&child_config, prompt, mode, session_number).await?;
    let ended_at = now_epoch_ms();

    let raw_log_name = format!("session-{session_number}.log");
    store.write_raw(&raw_log_name, &run_result.stdout_lines.join("\n"))?;

    let parsed = outcome::parse_stream(&run_result.stdout_lines, known_platforms, mode, session_number);
    let session_outcome = outcome::child_outcome_to_session_outcome(run_result.outcome);

    let rotation_machine = RotationMachine::new(store, config.max_retries);
    if let Ok(mut rotation_state) = rotation_machine.read(&config.pattern) {
        let rotation_outcome = to_rotation_outcome(session_outcome);
        let _ = rotation_machine.set_outcome(&mut rotation_state, rotation_outcome);
    }

    let record = SessionRecord {
        session_number,
        mode,
        started_at,
        ended_at,
        exit_code: run_result.exit_code,
        outcome: session_outcome,
        duration_seconds: run_result.duration.as_secs(),
        cost_micros: parsed.cost_micros,
        tool_calls: parsed.tool_calls,
        files_changed: Vec::new(),
        note: parsed.note.clone(),
    };

    let circuits = CircuitRegistry::new(store, config.circuit_params());
    outcome::record(store, &circuits, record, &raw_log_name, &parsed)?;

    Ok(session_outcome)
}

fn to_rotation_outcome(outcome: SessionOutcome) -> RotationOutcome {
    match outcome {
        SessionOutcome::Success => RotationOutcome::Success,
        SessionOutcome::Timeout => RotationOutcome::Timeout,
        SessionOutcome::Error => RotationOutcome::Error,
    }
}

/// Reflect-mode maintenance: dedup the queue and fold a scratch todo file
/// in, before context assembly reads the queue for rendering.
fn run_reflect_maintenance(
    store: &StateStore,
    config: &Config,
    session_number: u64,
    warnings: &mut Vec<String>,
) -> (Option<DedupReport>, Option<IngestReport>) {
    let work_queue = WorkQueue::new(store);
    let dedup_report = match work_queue.dedup(config.dedup_words) {
        Ok(report) => Some(report),
        Err(e) => {
            warnings.push(format!("dedup failed: {e}"));
            None
        }
    };

    let todo_lines = store.read_lines("scratch-todo.md").unwrap_or_default();
    let todo_ingested = if todo_lines.is_empty() {
        None
    } else {
        match work_queue.ingest_todos(&todo_lines, session_number) {
            Ok(report) => Some(report),
            Err(e) => {
                warnings.push(format!("todo ingest failed: {e}"));
                None
            }
        }
    };

    (dedup_report, todo_ingested)
}

type ModeTransform = fn(Mode, &Context) -> Option<Mode>;

fn demote_build_to_engage_when_queue_empty(mode: Mode, context: &Context) -> Option<Mode> {
    if mode == Mode::Build && context.assigned_task.is_none() && !context.platform_plan.allowed.is_empty() {
        Some(Mode::Engage)
    } else {
        None
    }
}

fn demote_engage_to_reflect_when_no_platforms_allowed(mode: Mode, context: &Context) -> Option<Mode> {
    if mode == Mode::Engage && context.platform_plan.allowed.is_empty() {
        Some(Mode::Reflect)
    } else {
        None
    }
}

const MODE_TRANSFORMS: &[(&str, ModeTransform)] = &[
    ("build_to_engage_on_empty_queue", demote_build_to_engage_when_queue_empty),
    ("engage_to_reflect_on_no_platforms", demote_engage_to_reflect_when_no_platforms_allowed),
];

/// Apply the first accepting mode transform, if any (§4.8 step 5).
fn apply_mode_transforms(mode: Mode, context: &Context) -> Option<(Mode, &'static str)> {
    MODE_TRANSFORMS.iter().find_map(|(name, f)| f(mode, context).map(|m| (m, *name)))
}

fn persist_context(store: &StateStore, context: &Context, mode: Mode, session_number: u64) -> anyhow::Result<()> {
    store.write("context.json", context)?;
    let env = format!(
        "WAKELOOP_MODE={}\nWAKELOOP_SESSION_NUMBER={}\nWAKELOOP_ASSIGNED_TASK_ID={}\nWAKELOOP_DEGRADED={}\n",
        mode.as_str(),
        session_number,
        context.assigned_task.as_ref().map(|t| t.id.as_str()).unwrap_or(""),
        !context.warnings.is_empty(),
    );
    store.write_raw("context.env", &env)
}

fn mode_template(mode: Mode) -> &'static str {
    match mode {
        Mode::Build => "Build mode: advance the assigned work item, or groom the queue if none is ready.",
        Mode::Engage => "Engage mode: act on the allowed platforms in ROI order; record intel worth remembering.",
        Mode::Reflect => "Reflect mode: review recent history, groom the work queue, fold intel into ideas.",
        Mode::Audit => "Audit mode: review circuit and directive state; flag anything needing operator attention.",
    }
}

fn render_injected_blocks(context: &Context) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Rotation: mode={} counter={}", context.rotation.mode.as_str(), context.rotation.counter));

    if !context.directives_active.is_empty() {
        let text: Vec<String> = context.directives_active.iter().map(|d| format!("- {}", d.content)).collect();
        lines.push(format!("Active directives:\n{}", text.join("\n")));
    }
    if !context.capability_summary.missing_credentials.is_empty() {
        lines.push(format!("Missing credentials: {}", context.capability_summary.missing_credentials.join(", ")));
    }
    if context.platform_plan.degraded {
        lines.push("Platform plan is running in degraded (alphabetical) fallback mode.".to_string());
    }
    lines.join("\n")
}

fn render_prompt(mode: Mode, context: &Context, warnings: &[String]) -> String {
    let mut sections = vec![
        BASE_IDENTITY.to_string(),
        mode_template(mode).to_string(),
        context.mode_specific_block.clone(),
        render_injected_blocks(context),
    ];
    if !warnings.is_empty() {
        sections.push(format!(
            "[DEGRADED] {} initialization stage(s) used a fallback this session: {}; \
do not attempt to repair the orchestrator.",
            warnings.len(),
            warnings.join("; ")
        ));
    }
    sections.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n\n")
}

#[derive(Debug, Clone, serde::Serialize)]
struct HookResultsDoc {
    session_number: u64,
    pre: Vec<HookResult>,
    post: Vec<HookResult>,
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
