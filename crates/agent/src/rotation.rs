// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic mode selection from a pattern string, with retry/advance
//! rules (§4.2).

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, TaggedError};
use crate::state::StateStore;

const DOC_NAME: &str = "rotation.json";

/// One of the four session modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Build,
    Engage,
    Reflect,
    Audit,
}

impl Mode {
    pub fn letter(&self) -> char {
        match self {
            Self::Build => 'B',
            Self::Engage => 'E',
            Self::Reflect => 'R',
            Self::Audit => 'A',
        }
    }

    pub fn from_letter(c: char) -> anyhow::Result<Self> {
        match c {
            'B' => Ok(Self::Build),
            'E' => Ok(Self::Engage),
            'R' => Ok(Self::Reflect),
            'A' => Ok(Self::Audit),
            other => Err(TaggedError::new(
                OrchestratorError::ConfigInvalid,
                format!("unknown mode letter '{other}'"),
            )
            .into()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Engage => "engage",
            Self::Reflect => "reflect",
            Self::Audit => "audit",
        }
    }
}

/// Outcome of the previous session, feeding the retry rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Timeout,
    Error,
}

/// Persisted rotation document (§3 "Rotation State").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationState {
    pub pattern: String,
    pub session_counter: u64,
    pub rotation_index: usize,
    pub retry_count: u32,
    pub last_outcome: Option<Outcome>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RotationState {
    /// Seeds `rotation_index` one step *before* the pattern's start so the
    /// first `advance` call (which always steps forward on a non-retry
    /// outcome) lands on index 0 for the very first tick.
    pub fn fresh(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let start_index = pattern.chars().count().saturating_sub(1);
        Self {
            pattern,
            session_counter: 0,
            rotation_index: start_index,
            retry_count: 0,
            last_outcome: None,
            extra: serde_json::Map::new(),
        }
    }

    /// `pattern[rotation_index % |pattern|]`, independent of retry state.
    fn mode_at_index(&self) -> anyhow::Result<Mode> {
        if self.pattern.is_empty() {
            return Err(
                TaggedError::new(OrchestratorError::ConfigInvalid, "rotation pattern is empty").into(),
            );
        }
        let letters: Vec<char> = self.pattern.chars().collect();
        let letter = letters[self.rotation_index % letters.len()];
        Mode::from_letter(letter)
    }
}

/// Result of [`RotationMachine::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advanced {
    pub mode: Mode,
    pub session_counter: u64,
    pub retry_count: u32,
    /// `true` when an operator override selected `mode` directly.
    pub overridden: bool,
}

/// Thin wrapper driving [`RotationState`] transitions through the store.
pub struct RotationMachine<'a> {
    store: &'a StateStore,
    max_retries: u32,
}

impl<'a> RotationMachine<'a> {
    pub fn new(store: &'a StateStore, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Load the rotation document, seeding it from `default_pattern` if
    /// this is the first tick.
    pub fn read(&self, default_pattern: &str) -> anyhow::Result<RotationState> {
        match self.store.read::<RotationState>(DOC_NAME)? {
            Some(state) => Ok(state),
            None => Ok(RotationState::fresh(default_pattern)),
        }
    }

    pub fn set_outcome(&self, state: &mut RotationState, outcome: Outcome) -> anyhow::Result<()> {
        state.last_outcome = Some(outcome);
        self.store.write(DOC_NAME, state)
    }

    /// Apply the §4.2 advance rules and persist the result.
    ///
    /// `override_mode`, when set, selects the mode directly: the counter
    /// still advances but `rotation_index` is left untouched (§4.8 step 3).
    pub fn advance(
        &self,
        mut state: RotationState,
        previous_outcome: Option<Outcome>,
        override_mode: Option<Mode>,
    ) -> anyhow::Result<(RotationState, Advanced)> {
        if let Some(mode) = override_mode {
            state.session_counter += 1;
            state.retry_count = 0;
            self.store.write(DOC_NAME, &state)?;
            return Ok((
                state.clone(),
                Advanced { mode, session_counter: state.session_counter, retry_count: 0, overridden: true },
            ));
        }

        let retry = matches!(previous_outcome, Some(Outcome::Timeout)) && state.retry_count < self.max_retries;

        if retry {
            state.retry_count += 1;
        } else {
            let period = state.pattern.chars().count().max(1);
            state.rotation_index = (state.rotation_index + 1) % period;
            state.retry_count = 0;
        }
        state.session_counter += 1;

        let mode = state.mode_at_index()?;
        self.store.write(DOC_NAME, &state)?;

        Ok((
            state.clone(),
            Advanced { mode, session_counter: state.session_counter, retry_count: state.retry_count, overridden: false },
        ))
    }
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod tests;
