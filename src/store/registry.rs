//! Registry of files uploaded from this machine
//!
//! Persisted under one key as a JSON object `id -> FileRecord`. The object is
//! written in registry order and read back in document order, so the display
//! order survives reloads. An entry that no longer reads as a record is kept
//! verbatim and written back, so its delete token is never lost.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use super::backend::KeyValueStore;
use crate::api::types::deserialize_optional_timestamp;
use crate::api::UploadedFile;

/// Storage key of the registry document
pub const REGISTRY_KEY: &str = "uploadedFiles";

/// Public download page for a file
pub fn download_link(origin: &str, id: &str) -> String {
    format!("{}/download/{}", origin.trim_end_matches('/'), id)
}

/// API resource of a file, as shown on the management card
pub fn delete_link(origin: &str, id: &str) -> String {
    format!("{}/api/files/{}", origin.trim_end_matches('/'), id)
}

/// One file uploaded by the local user
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Server-issued id, unique within the registry
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    /// Derived from `id` and the site origin
    #[serde(default)]
    pub url: String,
    /// Derived from `id` and the site origin
    #[serde(default)]
    pub delete_url: String,
    /// Capability for update and delete. Never displayed.
    pub delete_token: String,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Build a record from a completed upload, with links for `origin`
    pub fn from_upload(file: UploadedFile, origin: &str) -> Self {
        Self {
            url: download_link(origin, &file.id),
            delete_url: delete_link(origin, &file.id),
            id: file.id,
            filename: file.filename,
            size: file.size,
            mime_type: file.mime_type,
            delete_token: file.delete_token,
            expires_at: file.expires_at,
        }
    }

    /// Reconstruct missing links
    fn fill_links(&mut self, origin: &str) {
        if self.url.is_empty() {
            self.url = download_link(origin, &self.id);
        }
        if self.delete_url.is_empty() {
            self.delete_url = delete_link(origin, &self.id);
        }
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("url", &self.url)
            .field("delete_url", &self.delete_url)
            .field("delete_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Document entry that failed to read as a record, keyed by its document key
type Unreadable = (String, serde_json::Value);

/// Serializes records as an id-keyed object, in order, followed by unreadable entries
struct ById<'a> {
    records: &'a [FileRecord],
    unreadable: &'a [Unreadable],
}

impl Serialize for ById<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len() + self.unreadable.len()))?;
        for record in self.records {
            map.serialize_entry(&record.id, record)?;
        }
        for (key, value) in self.unreadable {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Reads an id-keyed object back in document order
struct InDocumentOrder {
    records: Vec<FileRecord>,
    unreadable: Vec<Unreadable>,
}

impl<'de> Deserialize<'de> for InDocumentOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = InDocumentOrder;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping file ids to file records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut records: Vec<FileRecord> = Vec::new();
                let mut unreadable: Vec<Unreadable> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    match FileRecord::deserialize(&value) {
                        Ok(record) => upsert(&mut records, record),
                        Err(e) => {
                            warn!(key = %key, error = %e, "Keeping unreadable registry entry as is");
                            unreadable.push((key, value));
                        }
                    }
                }
                Ok(InDocumentOrder {
                    records,
                    unreadable,
                })
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

/// Replace in place when the id exists, append otherwise
fn upsert(records: &mut Vec<FileRecord>, record: FileRecord) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Files the local user has uploaded, mirrored to the store after every change
pub struct RegistryCache {
    store: Arc<dyn KeyValueStore>,
    records: Vec<FileRecord>,
    unreadable: Vec<Unreadable>,
}

impl RegistryCache {
    /// Hydrate from the store.
    ///
    /// Missing or unreadable data yields an empty registry; this never fails.
    pub fn load(store: Arc<dyn KeyValueStore>, origin: &str) -> Self {
        let empty = || InDocumentOrder {
            records: Vec::new(),
            unreadable: Vec::new(),
        };
        let document = match store.get(REGISTRY_KEY) {
            Ok(Some(text)) => serde_json::from_str::<InDocumentOrder>(&text).unwrap_or_else(|e| {
                warn!(error = %e, "Registry data is corrupt, starting empty");
                empty()
            }),
            Ok(None) => empty(),
            Err(e) => {
                warn!(error = %e, "Failed to read registry, starting empty");
                empty()
            }
        };

        let mut registry = Self {
            store,
            records: document.records,
            unreadable: document.unreadable,
        };
        for record in &mut registry.records {
            record.fill_links(origin);
        }

        debug!(files = registry.records.len(), "Registry loaded");
        registry
    }

    /// Files in display order
    pub fn files(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record, replacing an existing one with the same id in place
    pub fn add(&mut self, record: FileRecord) -> Result<()> {
        debug!(id = %record.id, "Adding file to registry");
        self.unreadable.retain(|(key, _)| *key != record.id);
        upsert(&mut self.records, record);
        self.persist()
    }

    /// Remove a record. Returns false when the id was not present.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        let removed = self.records.len() != before;
        self.unreadable.retain(|(key, _)| key != id);

        debug!(id = id, removed = removed, "Removing file from registry");
        self.persist()?;
        Ok(removed)
    }

    /// Rewrite the whole document
    fn persist(&self) -> Result<()> {
        let document = ById {
            records: &self.records,
            unreadable: &self.unreadable,
        };
        let text = serde_json::to_string(&document)
            .context("Failed to serialize registry")?;
        self.store.set(REGISTRY_KEY, &text)
    }
}
