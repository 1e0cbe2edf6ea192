// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sibling `<hookfile>.json` manifest read alongside each hook script.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookManifest {
    #[serde(default)]
    pub parallel_safe: bool,
    #[serde(default)]
    pub write_targets: Vec<String>,
    #[serde(default)]
    pub fatal_on_nonzero: bool,
}

impl Default for HookManifest {
    fn default() -> Self {
        Self { parallel_safe: false, write_targets: Vec::new(), fatal_on_nonzero: false }
    }
}

/// Read `<script_path>.json` next to a hook script. A missing manifest is
/// the all-default manifest (serial, no writes, non-fatal), not an error.
pub fn read_manifest(script_path: &Path) -> HookManifest {
    let mut manifest_name = script_path.as_os_str().to_os_string();
    manifest_name.push(".json");
    let manifest_path = std::path::PathBuf::from(manifest_name);
    match std::fs::read_to_string(&manifest_path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => HookManifest::default(),
    }
}
