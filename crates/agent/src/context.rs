// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the single structured context object consumed by the prompt
//! renderer (§4.6). `build` is deterministic given the same state inputs
//! and knobs, save for the one documented side effect: auto-promotion of
//! idea-pool items into the work queue on Build/Reflect sessions.

use serde::Serialize;

use crate::accounts::AccountManifest;
use crate::circuit::{CircuitRegistry, Params as CircuitParams};
use crate::directive::{Directive, DirectiveStore};
use crate::engagement::{EngagementOrchestrator, SessionPlan};
use crate::intel::IntelStore;
use crate::rotation::Mode;
use crate::state::StateStore;
use crate::work_queue::{BudgetHint, DedupReport, IngestReport, WorkItem, WorkQueue};

#[derive(Debug, Clone)]
pub struct Knobs {
    pub budget_hint: BudgetHint,
    pub auto_promote_max: usize,
    pub auto_promote_buffer: usize,
    pub dedup_words: usize,
    pub circuit_params: CircuitParams,
    pub priority_targets: Vec<String>,
    pub priority_boost: f64,
    pub exploration_weight: f64,
}

impl Default for Knobs {
    fn default() -> Self {
        Self {
            budget_hint: BudgetHint::Normal,
            auto_promote_max: 1,
            auto_promote_buffer: 2,
            dedup_words: 6,
            circuit_params: CircuitParams::default(),
            priority_targets: Vec::new(),
            priority_boost: 0.0,
            exploration_weight: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RotationSection {
    pub mode: Mode,
    pub counter: u64,
    pub per_type_counter: std::collections::BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySummary {
    pub live_platforms: Vec<String>,
    pub missing_credentials: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub rotation: RotationSection,
    pub assigned_task: Option<WorkItem>,
    pub brainstorming_seeded: Vec<String>,
    pub dedup_report: Option<DedupReport>,
    pub todo_ingested: Option<IngestReport>,
    pub platform_plan: SessionPlan,
    pub directives_active: Vec<Directive>,
    pub capability_summary: CapabilitySummary,
    pub mode_specific_block: String,
    pub warnings: Vec<String>,
}

pub struct ContextBuilder<'a> {
    store: &'a StateStore,
    knobs: Knobs,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(store: &'a StateStore, knobs: Knobs) -> Self {
        Self { store, knobs }
    }

    /// Build the context for `mode` at rotation `counter`. `dedup_report`
    /// and `todo_ingested` carry the results of driver-level pre-steps
    /// that already ran (and already mutated the queue) earlier in the
    /// tick; this function's own only mutation is auto-promotion.
    pub fn build(
        &self,
        mode: Mode,
        counter: u64,
        history_counts: std::collections::HashMap<Mode, u64>,
        dedup_report: Option<DedupReport>,
        todo_ingested: Option<IngestReport>,
    ) -> Context {
        let mut warnings = Vec::new();
        let work_queue = WorkQueue::new(self.store);
        let circuits = CircuitRegistry::new(self.store, self.knobs.circuit_params);
        let accounts_manifest = AccountManifest::new(self.store);
        let engagement = EngagementOrchestrator::new(
            self.store,
            self.knobs.priority_targets.clone(),
            self.knobs.priority_boost,
            self.knobs.exploration_weight,
        );
        let directives = DirectiveStore::new(self.store);

        let per_type_counter = history_counts
            .into_iter()
            .map(|(mode, count)| (mode.as_str().to_string(), count))
            .collect();
        let rotation = RotationSection { mode, counter, per_type_counter };

        let brainstorming_seeded = if matches!(mode, Mode::Build | Mode::Reflect) {
            match self.auto_promote(&work_queue, counter, &mut warnings) {
                Ok(ids) => ids,
                Err(e) => {
                    warnings.push(format!("auto_promote failed: {e}"));
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let assigned_task = if mode == Mode::Build {
            match work_queue.select_next(self.knobs.budget_hint) {
                Ok(item) => item,
                Err(e) => {
                    warnings.push(format!("select_next failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let accounts = match accounts_manifest.read() {
            Ok(accounts) => accounts,
            Err(e) => {
                warnings.push(format!("account manifest read failed: {e}"));
                Vec::new()
            }
        };
        let platform_ids: Vec<String> = accounts.iter().map(|a| a.id.clone()).collect();

        let circuit_filter = match circuits.filter_allowed(&platform_ids) {
            Ok(filter) => filter,
            Err(e) => {
                warnings.push(format!("circuit filter failed: {e}"));
                crate::circuit::FilterResult::default()
            }
        };

        let platform_plan = match engagement.build_plan(&accounts, &circuit_filter, counter) {
            Ok(plan) => plan,
            Err(e) => {
                warnings.push(format!("engagement scoring failed, using degraded fallback: {e}"));
                engagement
                    .degraded_plan(&accounts, &circuit_filter, counter)
                    .unwrap_or_else(|_| crate::engagement::SessionPlan {
                        allowed: Vec::new(),
                        blocked: Vec::new(),
                        half_open: Vec::new(),
                        defunct: Vec::new(),
                        roi_scores: Vec::new(),
                        degraded: true,
                        eval_target: None,
                    })
            }
        };

        let missing_credentials = accounts_manifest.missing_credentials(&accounts);
        let capability_summary = CapabilitySummary { live_platforms: platform_ids, missing_credentials };

        let directives_active = directives.active().unwrap_or_else(|e| {
            warnings.push(format!("directive read failed: {e}"));
            Vec::new()
        });

        let mode_specific_block = self.render_mode_block(mode, &assigned_task, &platform_plan);

        Context {
            rotation,
            assigned_task,
            brainstorming_seeded,
            dedup_report,
            todo_ingested,
            platform_plan,
            directives_active,
            capability_summary,
            mode_specific_block,
            warnings,
        }
    }

    /// Candidates come from two sources folded together (§3, §9): the
    /// free-text idea pool and active intel entries recorded during
    /// Engage sessions. Intel entries are archived once any promotion
    /// draws from the combined pool, per [`IntelStore::archive_all`]'s
    /// contract.
    fn auto_promote(
        &self,
        work_queue: &WorkQueue<'_>,
        counter: u64,
        warnings: &mut Vec<String>,
    ) -> anyhow::Result<Vec<String>> {
        let ideas_content = self.store.read_lines("ideas.md").unwrap_or_default().join("\n");
        let pool = crate::work_queue::parse_ideas(&ideas_content);

        let intel = IntelStore::new(self.store);
        let intel_entries = intel.active().unwrap_or_else(|e| {
            warnings.push(format!("intel read failed: {e}"));
            Vec::new()
        });
        let intel_titles =
            intel_entries.iter().map(|entry| format!("{}: {}", entry.platform_id, entry.summary));

        let mut candidates = pool.titles;
        candidates.extend(intel_titles);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let added =
            work_queue.auto_promote(&candidates, counter, self.knobs.auto_promote_max, self.knobs.auto_promote_buffer)?;

        if !added.is_empty() && !intel_entries.is_empty() {
            if let Err(e) = intel.archive_all() {
                warnings.push(format!("intel archive failed: {e}"));
            }
        }

        Ok(added)
    }

    fn render_mode_block(&self, mode: Mode, assigned_task: &Option<WorkItem>, plan: &SessionPlan) -> String {
        match mode {
            Mode::Build => match assigned_task {
                Some(task) => format!("Build session. Assigned task {}: {}", task.id, task.title),
                None => "Build session. No ready work item; consider brainstorming or idea promotion.".to_string(),
            },
            Mode::Engage => {
                if plan.allowed.is_empty() {
                    "Engage session. No platforms currently allowed; all are blocked or defunct.".to_string()
                } else {
                    format!("Engage session. Allowed platforms in ROI order: {}", plan.allowed.join(", "))
                }
            }
            Mode::Reflect => "Reflect session. Review recent outcomes and groom the work queue.".to_string(),
            Mode::Audit => "Audit session. Review circuit states, directives, and stale credentials.".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
