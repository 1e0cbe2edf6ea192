// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-provided standing rules (§3). Read-only to the agent; only
//! status transitions are written by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, TaggedError};
use crate::state::StateStore;

const DOC_NAME: &str = "directives.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveStatus {
    Active,
    Acked,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub id: String,
    pub content: String,
    pub status: DirectiveStatus,
    pub acked_session: Option<u64>,
    pub created_session: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    directives: Vec<Directive>,
}

pub struct DirectiveStore<'a> {
    store: &'a StateStore,
}

impl<'a> DirectiveStore<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    fn load(&self) -> anyhow::Result<Document> {
        Ok(self.store.read::<Document>(DOC_NAME)?.unwrap_or_default())
    }

    fn save(&self, doc: &Document) -> anyhow::Result<()> {
        self.store.write(DOC_NAME, doc)
    }

    pub fn active(&self) -> anyhow::Result<Vec<Directive>> {
        Ok(self.load()?.directives.into_iter().filter(|d| d.status == DirectiveStatus::Active).collect())
    }

    pub fn all(&self) -> anyhow::Result<Vec<Directive>> {
        Ok(self.load()?.directives)
    }

    /// Acknowledge an active directive for the current session.
    pub fn ack(&self, id: &str, session: u64) -> anyhow::Result<()> {
        self.transition(id, DirectiveStatus::Acked, Some(session))
    }

    pub fn resolve(&self, id: &str) -> anyhow::Result<()> {
        self.transition(id, DirectiveStatus::Resolved, None)
    }

    fn transition(&self, id: &str, to: DirectiveStatus, acked_session: Option<u64>) -> anyhow::Result<()> {
        let mut doc = self.load()?;
        let directive = doc
            .directives
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| TaggedError::new(OrchestratorError::InvalidTransition, format!("no such directive {id}")))?;
        if directive.status == DirectiveStatus::Resolved {
            return Err(TaggedError::new(
                OrchestratorError::InvalidTransition,
                format!("{id}: already resolved"),
            )
            .into());
        }
        directive.status = to;
        if let Some(session) = acked_session {
            directive.acked_session = Some(session);
        }
        self.save(&doc)
    }
}
