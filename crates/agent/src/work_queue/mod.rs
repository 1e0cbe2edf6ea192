// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prioritized, dependency-aware work queue with auto-promotion from an
//! idea pool (§4.3).

mod ideas;

pub use ideas::{parse_ideas, IdeaPool};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, TaggedError};
use crate::state::StateStore;

const DOC_NAME: &str = "work-queue.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Blocked,
    Done,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    S,
    M,
    L,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNote {
    pub session: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    pub priority: u32,
    pub complexity: Complexity,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String,
    #[serde(default)]
    pub deps: Vec<String>,
    pub created_session: u64,
    #[serde(default)]
    pub progress_notes: Vec<ProgressNote>,
}

/// A patch applied via [`WorkQueue::update`]; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub status: Option<Status>,
    pub priority: Option<u32>,
    pub complexity: Option<Complexity>,
    pub tags: Option<Vec<String>>,
    pub deps: Option<Vec<String>>,
    pub append_note: Option<ProgressNote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetHint {
    Normal,
    Tight,
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub removed_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub added_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Document {
    items: Vec<WorkItem>,
}

pub struct WorkQueue<'a> {
    store: &'a StateStore,
}

impl<'a> WorkQueue<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    fn load(&self) -> anyhow::Result<Document> {
        Ok(self.store.read::<Document>(DOC_NAME)?.unwrap_or_default())
    }

    fn save(&self, doc: &Document) -> anyhow::Result<()> {
        self.store.write(DOC_NAME, doc)
    }

    pub fn list(&self) -> anyhow::Result<Vec<WorkItem>> {
        Ok(self.load()?.items)
    }

    fn next_id(doc: &Document) -> String {
        let max = doc
            .items
            .iter()
            .filter_map(|i| i.id.strip_prefix("wq-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("wq-{:03}", max + 1)
    }

    /// Insert a new item, assigning its id. Returns the assigned id.
    pub fn add(&self, mut item: WorkItem) -> anyhow::Result<String> {
        let mut doc = self.load()?;
        let id = Self::next_id(&doc);
        item.id = id.clone();
        doc.items.push(item);
        self.save(&doc)?;
        Ok(id)
    }

    fn would_cycle(items: &[WorkItem], id: &str, new_deps: &[String]) -> bool {
        let mut stack: Vec<String> = new_deps.to_vec();
        let mut seen = std::collections::HashSet::new();
        while let Some(dep) = stack.pop() {
            if dep == id {
                return true;
            }
            if !seen.insert(dep.clone()) {
                continue;
            }
            if let Some(item) = items.iter().find(|i| i.id == dep) {
                stack.extend(item.deps.iter().cloned());
            }
        }
        false
    }

    pub fn update(&self, id: &str, patch: Patch) -> anyhow::Result<()> {
        let mut doc = self.load()?;

        if let Some(ref new_deps) = patch.deps {
            if Self::would_cycle(&doc.items, id, new_deps) {
                return Err(TaggedError::new(
                    OrchestratorError::InvalidTransition,
                    format!("dep cycle introduced for {id}"),
                )
                .into());
            }
        }

        let item = doc
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| TaggedError::new(OrchestratorError::InvalidTransition, format!("no such item {id}")))?;

        if let Some(new_status) = patch.status {
            if item.status == Status::Done && new_status == Status::Pending {
                return Err(TaggedError::new(
                    OrchestratorError::InvalidTransition,
                    format!("{id}: cannot move done item back to pending"),
                )
                .into());
            }
            item.status = new_status;
        }
        if let Some(priority) = patch.priority {
            item.priority = priority;
        }
        if let Some(complexity) = patch.complexity {
            item.complexity = complexity;
        }
        if let Some(tags) = patch.tags {
            item.tags = tags;
        }
        if let Some(deps) = patch.deps {
            item.deps = deps;
        }
        if let Some(note) = patch.append_note {
            item.progress_notes.push(note);
        }

        self.save(&doc)?;
        Ok(())
    }

    /// First ready item: pending, all deps done, ranked by priority then
    /// created_session, gated by complexity when the budget is tight.
    pub fn select_next(&self, budget_hint: BudgetHint) -> anyhow::Result<Option<WorkItem>> {
        let doc = self.load()?;
        let done: std::collections::HashSet<&str> = doc
            .items
            .iter()
            .filter(|i| i.status == Status::Done)
            .map(|i| i.id.as_str())
            .collect();

        let mut ready: Vec<&WorkItem> = doc
            .items
            .iter()
            .filter(|i| i.status == Status::Pending)
            .filter(|i| i.deps.iter().all(|d| done.contains(d.as_str())))
            .collect();

        ready.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_session.cmp(&b.created_session)));

        if budget_hint == BudgetHint::Tight {
            if let Some(light) = ready.iter().find(|i| i.complexity != Complexity::L) {
                return Ok(Some((*light).clone()));
            }
        }

        Ok(ready.first().map(|i| (*i).clone()))
    }

    /// Promote ideas into pending work items when the queue is low.
    ///
    /// Empty queue: promote up to `max_promote` ideas. Non-empty queue:
    /// promote `max(0, |ideas| - buffer)` ideas, still capped at
    /// `max_promote`.
    pub fn auto_promote(
        &self,
        ideas: &[String],
        created_session: u64,
        max_promote: usize,
        buffer: usize,
    ) -> anyhow::Result<Vec<String>> {
        let mut doc = self.load()?;
        let pending_count = doc.items.iter().filter(|i| i.status == Status::Pending).count();

        let want = if pending_count == 0 {
            max_promote.min(ideas.len())
        } else {
            ideas.len().saturating_sub(buffer).min(max_promote)
        };

        let mut added = Vec::new();
        for title in ideas.iter().take(want) {
            let id = Self::next_id(&doc);
            doc.items.push(WorkItem {
                id: id.clone(),
                title: title.clone(),
                description: String::new(),
                status: Status::Pending,
                priority: u32::MAX / 2,
                complexity: Complexity::M,
                tags: Vec::new(),
                source: "idea-pool-auto".to_string(),
                deps: Vec::new(),
                created_session,
                progress_notes: Vec::new(),
            });
            added.push(id);
        }

        if !added.is_empty() {
            self.save(&doc)?;
        }
        Ok(added)
    }

    fn normalized_prefix(title: &str, words: usize) -> String {
        title
            .split_whitespace()
            .take(words)
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Drop later duplicates (by normalized first-`words`-word prefix),
    /// keeping the earliest-created of each group.
    pub fn dedup(&self, words: usize) -> anyhow::Result<DedupReport> {
        let mut doc = self.load()?;
        let mut seen: std::collections::HashMap<String, (u64, usize)> = std::collections::HashMap::new();
        let mut drop_indices = std::collections::HashSet::new();

        for (idx, item) in doc.items.iter().enumerate() {
            let key = Self::normalized_prefix(&item.title, words);
            match seen.get(&key) {
                None => {
                    seen.insert(key, (item.created_session, idx));
                }
                Some(&(earliest_session, earliest_idx)) => {
                    if item.created_session < earliest_session {
                        drop_indices.insert(earliest_idx);
                        seen.insert(key, (item.created_session, idx));
                    } else {
                        drop_indices.insert(idx);
                    }
                }
            }
        }

        let mut removed_ids = Vec::new();
        let mut kept = Vec::with_capacity(doc.items.len());
        for (idx, item) in doc.items.into_iter().enumerate() {
            if drop_indices.contains(&idx) {
                removed_ids.push(item.id.clone());
            } else {
                kept.push(item);
            }
        }
        doc.items = kept;

        if !removed_ids.is_empty() {
            self.save(&doc)?;
        }
        Ok(DedupReport { removed_ids })
    }

    /// Parse `- [ ] text` / `TODO: text` lines from a scratch file into
    /// pending work items, subject to the same dedup rule.
    pub fn ingest_todos(&self, lines: &[String], created_session: u64) -> anyhow::Result<IngestReport> {
        let mut doc = self.load()?;
        let mut added_ids = Vec::new();

        for line in lines {
            let trimmed = line.trim();
            let text = if let Some(rest) = trimmed.strip_prefix("- [ ]") {
                Some(rest.trim())
            } else if let Some(rest) = trimmed.strip_prefix("TODO:") {
                Some(rest.trim())
            } else {
                None
            };
            let Some(text) = text else { continue };
            if text.is_empty() {
                continue;
            }

            let key = Self::normalized_prefix(text, 6);
            let already_present = doc.items.iter().any(|i| Self::normalized_prefix(&i.title, 6) == key);
            if already_present {
                continue;
            }

            let id = Self::next_id(&doc);
            doc.items.push(WorkItem {
                id: id.clone(),
                title: text.to_string(),
                description: String::new(),
                status: Status::Pending,
                priority: u32::MAX / 2,
                complexity: Complexity::M,
                tags: Vec::new(),
                source: "todo-ingest".to_string(),
                deps: Vec::new(),
                created_session,
                progress_notes: Vec::new(),
            });
            added_ids.push(id);
        }

        if !added_ids.is_empty() {
            self.save(&doc)?;
        }
        Ok(IngestReport { added_ids })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
