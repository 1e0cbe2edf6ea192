// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ROI ranking of platforms and selection of the next service-evaluation
//! target (§4.5).

use serde::{Deserialize, Serialize};

use crate::accounts::Account;
use crate::circuit::FilterResult;
use crate::state::StateStore;

const DOC_NAME: &str = "engagement.json";
const EPSILON: f64 = 0.000_001;

/// 0-9 evaluator verdict, bucketed to the labels this orchestrator stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictLabel {
    Unreachable,
    Minimal,
    Basic,
    Active,
    ActiveWithApi,
}

impl VerdictLabel {
    /// Map the evaluator's 0-9 scale onto the five stored buckets.
    pub fn from_score(score: u8) -> Self {
        match score {
            0 => Self::Unreachable,
            1..=2 => Self::Minimal,
            3..=5 => Self::Basic,
            6..=8 => Self::Active,
            _ => Self::ActiveWithApi,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformVerdict {
    pub platform_id: String,
    pub label: VerdictLabel,
    pub evaluated_session: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EngagementDocument {
    #[serde(default)]
    verdicts: Vec<PlatformVerdict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformScore {
    pub platform_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalTarget {
    pub platform_id: String,
    pub url: String,
    pub last_verdict: Option<VerdictLabel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPlan {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    pub half_open: Vec<String>,
    pub defunct: Vec<String>,
    pub roi_scores: Vec<PlatformScore>,
    pub degraded: bool,
    pub eval_target: Option<EvalTarget>,
}

pub struct EngagementOrchestrator<'a> {
    store: &'a StateStore,
    priority_targets: Vec<String>,
    priority_boost: f64,
    exploration_weight: f64,
}

impl<'a> EngagementOrchestrator<'a> {
    pub fn new(
        store: &'a StateStore,
        priority_targets: Vec<String>,
        priority_boost: f64,
        exploration_weight: f64,
    ) -> Self {
        Self { store, priority_targets, priority_boost, exploration_weight }
    }

    fn load(&self) -> anyhow::Result<EngagementDocument> {
        Ok(self.store.read::<EngagementDocument>(DOC_NAME)?.unwrap_or_default())
    }

    fn save(&self, doc: &EngagementDocument) -> anyhow::Result<()> {
        self.store.write(DOC_NAME, doc)
    }

    fn median(values: &mut [f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }

    fn score_accounts(&self, accounts: &[Account]) -> Vec<PlatformScore> {
        let mut engagement_counts: Vec<f64> =
            accounts.iter().map(|a| a.counters.recent_engagement_count as f64).collect();
        let median_engagement = Self::median(&mut engagement_counts);

        accounts
            .iter()
            .map(|a| {
                let writes = a.counters.writes as f64;
                let write_ratio =
                    if a.counters.total_actions > 0 { writes / a.counters.total_actions as f64 } else { 0.0 };
                let cost_per_write = if writes > 0.0 { a.counters.cost_micros as f64 / writes } else { 0.0 };
                let base = writes * write_ratio / cost_per_write.max(EPSILON);
                let exploration_bonus =
                    (median_engagement - a.counters.recent_engagement_count as f64).max(0.0) * self.exploration_weight;
                let mut score = base + exploration_bonus;
                if self.priority_targets.iter().any(|p| p == &a.id) {
                    score += self.priority_boost;
                }
                PlatformScore { platform_id: a.id.clone(), score }
            })
            .collect()
    }

    fn degraded_scores(accounts: &[Account]) -> Vec<PlatformScore> {
        let mut ids: Vec<String> = accounts.iter().map(|a| a.id.clone()).collect();
        ids.sort();
        ids.into_iter().map(|platform_id| PlatformScore { platform_id, score: 0.0 }).collect()
    }

    /// Build the session plan from successfully parsed account counters:
    /// ROI-ranked allowed platforms (filtered by the circuit registry)
    /// plus a designated evaluation target.
    pub fn build_plan(
        &self,
        accounts: &[Account],
        circuit_filter: &FilterResult,
        current_session: u64,
    ) -> anyhow::Result<SessionPlan> {
        let mut scores = self.score_accounts(accounts);
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let allowed_set: std::collections::HashSet<&str> =
            circuit_filter.allowed.iter().map(String::as_str).collect();
        let ranked_allowed: Vec<String> =
            scores.iter().filter(|s| allowed_set.contains(s.platform_id.as_str())).map(|s| s.platform_id.clone()).collect();

        let eval_target = self.pick_eval_target(accounts, &ranked_allowed, current_session)?;

        Ok(SessionPlan {
            allowed: ranked_allowed,
            blocked: circuit_filter.blocked.clone(),
            half_open: circuit_filter.half_open_probe.clone(),
            defunct: circuit_filter.defunct.clone(),
            roi_scores: scores,
            degraded: false,
            eval_target,
        })
    }

    /// Fallback plan used when the account manifest fails to parse:
    /// alphabetical-by-platform-id ordering with every score zeroed. The
    /// circuit registry's own gating is still honored.
    pub fn degraded_plan(
        &self,
        accounts: &[Account],
        circuit_filter: &FilterResult,
        current_session: u64,
    ) -> anyhow::Result<SessionPlan> {
        let scores = Self::degraded_scores(accounts);
        let allowed_set: std::collections::HashSet<&str> =
            circuit_filter.allowed.iter().map(String::as_str).collect();
        let ranked_allowed: Vec<String> =
            scores.iter().filter(|s| allowed_set.contains(s.platform_id.as_str())).map(|s| s.platform_id.clone()).collect();
        let eval_target = self.pick_eval_target(accounts, &ranked_allowed, current_session)?;

        Ok(SessionPlan {
            allowed: ranked_allowed,
            blocked: circuit_filter.blocked.clone(),
            half_open: circuit_filter.half_open_probe.clone(),
            defunct: circuit_filter.defunct.clone(),
            roi_scores: scores,
            degraded: true,
            eval_target,
        })
    }

    /// The allowed platform least recently evaluated (ties broken
    /// alphabetically), or `None` if nothing is allowed.
    fn pick_eval_target(
        &self,
        accounts: &[Account],
        ranked_allowed: &[String],
        current_session: u64,
    ) -> anyhow::Result<Option<EvalTarget>> {
        if ranked_allowed.is_empty() {
            return Ok(None);
        }
        let doc = self.load()?;
        let mut candidates: Vec<(&String, u64)> = ranked_allowed
            .iter()
            .map(|id| {
                let last = doc
                    .verdicts
                    .iter()
                    .filter(|v| &v.platform_id == id)
                    .map(|v| v.evaluated_session)
                    .max()
                    .unwrap_or(0);
                (id, last)
            })
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));

        let (chosen_id, _) = candidates[0];
        let account = accounts.iter().find(|a| &a.id == chosen_id);
        let url = account.map(|a| a.test_endpoint.url.clone()).unwrap_or_default();
        let last_verdict = doc
            .verdicts
            .iter()
            .filter(|v| &v.platform_id == chosen_id)
            .max_by_key(|v| v.evaluated_session)
            .map(|v| v.label);

        let _ = current_session;
        Ok(Some(EvalTarget { platform_id: chosen_id.clone(), url, last_verdict }))
    }

    /// Record the evaluator's verdict for a platform, superseding any
    /// prior entry for the same platform.
    pub fn record_verdict(&self, platform_id: &str, score: u8, session: u64) -> anyhow::Result<()> {
        let mut doc = self.load()?;
        doc.verdicts.retain(|v| v.platform_id != platform_id);
        doc.verdicts.push(PlatformVerdict {
            platform_id: platform_id.to_string(),
            label: VerdictLabel::from_score(score),
            evaluated_session: session,
        });
        self.save(&doc)
    }
}

#[cfg(test)]
#[path = "engagement_tests.rs"]
mod tests;
