// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short structured notes produced during Engage sessions (§3). The work
//! queue's auto-promotion reads these as extra idea candidates; archiving
//! moves consumed entries out of the active document.

use serde::{Deserialize, Serialize};

use crate::state::StateStore;

const DOC_NAME: &str = "intel.json";
const ARCHIVE_NAME: &str = "intel-archive.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelEntry {
    pub id: String,
    pub platform_id: String,
    pub summary: String,
    pub created_session: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    entries: Vec<IntelEntry>,
}

pub struct IntelStore<'a> {
    store: &'a StateStore,
}

impl<'a> IntelStore<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    fn load(&self, name: &str) -> anyhow::Result<Document> {
        Ok(self.store.read::<Document>(name)?.unwrap_or_default())
    }

    pub fn active(&self) -> anyhow::Result<Vec<IntelEntry>> {
        Ok(self.load(DOC_NAME)?.entries)
    }

    pub fn record(&self, entry: IntelEntry) -> anyhow::Result<()> {
        let mut doc = self.load(DOC_NAME)?;
        doc.entries.push(entry);
        self.store.write(DOC_NAME, &doc)
    }

    /// Move every active entry into the archive, leaving the active
    /// document empty. Used once their titles have been folded into the
    /// idea pool by a Reflect/Build session.
    pub fn archive_all(&self) -> anyhow::Result<Vec<IntelEntry>> {
        let active = self.load(DOC_NAME)?;
        if active.entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut archive = self.load(ARCHIVE_NAME)?;
        archive.entries.extend(active.entries.iter().cloned());
        self.store.write(ARCHIVE_NAME, &archive)?;
        self.store.write(DOC_NAME, &Document::default())?;
        Ok(active.entries)
    }
}
