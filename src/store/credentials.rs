//! Passwords remembered after successful protected downloads
//!
//! A usability cache, not a security boundary: the server has no sessions, so
//! the password that worked last time is kept in plain text and offered again.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::KeyValueStore;

/// Storage key of the credential document
pub const CREDENTIALS_KEY: &str = "downloadedFiles";

/// Password that last worked for one file id (the map key)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntry {
    pub password: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("password", &"<redacted>")
            .field("filename", &self.filename)
            .field("downloaded_at", &self.downloaded_at)
            .finish()
    }
}

pub struct CredentialCache {
    store: Arc<dyn KeyValueStore>,
    entries: BTreeMap<String, CredentialEntry>,
}

impl CredentialCache {
    /// Hydrate from the store. Missing or corrupt data yields an empty cache.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match store.get(CREDENTIALS_KEY) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(error = %e, "Credential data is corrupt, starting empty");
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read credentials, starting empty");
                BTreeMap::new()
            }
        };

        Self { store, entries }
    }

    /// Remembered password for `file_id`
    pub fn get(&self, file_id: &str) -> Option<&str> {
        self.entries.get(file_id).map(|e| e.password.as_str())
    }

    #[cfg(test)]
    pub fn entry(&self, file_id: &str) -> Option<&CredentialEntry> {
        self.entries.get(file_id)
    }

    /// Number of remembered passwords
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upsert the password for `file_id` and persist immediately
    pub fn remember(&mut self, file_id: &str, password: &str, filename: &str) -> Result<()> {
        self.entries.insert(
            file_id.to_string(),
            CredentialEntry {
                password: password.to_string(),
                filename: filename.to_string(),
                downloaded_at: Some(Utc::now()),
            },
        );

        debug!(id = file_id, "Remembered download password");
        self.persist()
    }

    /// Drop the entry for `file_id`. No-op when absent.
    pub fn forget(&mut self, file_id: &str) -> Result<()> {
        if self.entries.remove(file_id).is_none() {
            return Ok(());
        }

        debug!(id = file_id, "Forgot download password");
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let text =
            serde_json::to_string(&self.entries).context("Failed to serialize credentials")?;
        self.store.set(CREDENTIALS_KEY, &text)
    }
}
