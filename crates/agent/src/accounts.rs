// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform-account manifest: read-only from the orchestrator's
//! perspective (§3, §6). Written by an external account-manager tool;
//! consumed here by C5 and C10.

use serde::{Deserialize, Serialize};

use crate::state::StateStore;

const DOC_NAME: &str = "accounts.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    None,
    Bearer,
    Basic,
    ApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEndpoint {
    pub url: String,
    pub method: String,
    pub auth_scheme: AuthScheme,
}

/// Engagement counters consulted by C5's ROI formula. Optional: an
/// account with no counters yet (new platform) falls back to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementCounters {
    #[serde(default)]
    pub writes: u64,
    #[serde(default)]
    pub total_actions: u64,
    #[serde(default)]
    pub cost_micros: u64,
    #[serde(default)]
    pub recent_engagement_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub platform: String,
    pub credential_file: String,
    pub test_endpoint: TestEndpoint,
    #[serde(default)]
    pub last_known_status: Option<String>,
    #[serde(default)]
    pub counters: EngagementCounters,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    accounts: Vec<Account>,
}

pub struct AccountManifest<'a> {
    store: &'a StateStore,
}

impl<'a> AccountManifest<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self { store }
    }

    /// Read the manifest, preserving file order. An absent manifest reads
    /// as empty rather than erroring — it is produced by an external
    /// tool and may not exist yet on a fresh state directory.
    pub fn read(&self) -> anyhow::Result<Vec<Account>> {
        Ok(self.store.read::<Manifest>(DOC_NAME)?.unwrap_or_default().accounts)
    }

    /// Which credential files are declared but absent on disk, by
    /// account id — feeds the context builder's `capability_summary`.
    pub fn missing_credentials(&self, accounts: &[Account]) -> Vec<String> {
        accounts
            .iter()
            .filter(|a| !std::path::Path::new(&a.credential_file).exists())
            .map(|a| a.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::state::StateStore;

    #[test]
    fn missing_manifest_reads_as_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = StateStore::new(dir.path());
        let manifest = AccountManifest::new(&store);
        assert!(manifest.read()?.is_empty());
        Ok(())
    }

    #[test]
    fn roundtrips_accounts_with_unknown_fields_preserved() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = StateStore::new(dir.path());
        let raw = serde_json::json!({
            "accounts": [{
                "id": "acct-1",
                "platform": "mastodon",
                "credential_file": "creds/acct-1.json",
                "test_endpoint": {"url": "https://example.test/health", "method": "GET", "auth_scheme": "bearer"},
                "last_known_status": "ok",
                "counters": {"writes": 4, "total_actions": 10, "cost_micros": 500, "recent_engagement_count": 2},
                "future_field": "kept"
            }]
        });
        store.write(DOC_NAME, &raw)?;

        let manifest = AccountManifest::new(&store);
        let accounts = manifest.read()?;
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].extra.get("future_field").and_then(|v| v.as_str()), Some("kept"));
        Ok(())
    }

    #[test]
    fn missing_credential_file_is_reported() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = StateStore::new(dir.path());
        let manifest = AccountManifest::new(&store);
        let accounts = vec![Account {
            id: "acct-1".to_string(),
            platform: "mastodon".to_string(),
            credential_file: dir.path().join("nonexistent.json").to_string_lossy().to_string(),
            test_endpoint: TestEndpoint { url: "https://x".to_string(), method: "GET".to_string(), auth_scheme: AuthScheme::None },
            last_known_status: None,
            counters: EngagementCounters::default(),
            extra: serde_json::Map::new(),
        }];
        let missing = manifest.missing_credentials(&accounts);
        assert_eq!(missing, vec!["acct-1".to_string()]);
        Ok(())
    }
}
