//! Store traits for the engine's external collaborators.
//!
//! The engine touches three stores: package metadata (read), validator
//! artifacts (read), and the audit log (append). Each is a trait so the
//! registry can plug in its real backends while tests and embedders use
//! the in-memory implementations shipped here.
//!
//! # Thread Safety
//!
//! All implementations must be `Send + Sync`; the engine shares them
//! across concurrent validation requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::audit::AuditRecord;

/// Metadata for one published package version.
///
/// Owned by the metadata store; the engine fetches it fresh per request.
/// Caching it locally would open an access-control gap when
/// `allowed_groups` changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Whether downloads require caller group membership.
    pub is_sensitive: bool,
    /// Groups allowed to download a sensitive package.
    pub allowed_groups: std::collections::HashSet<String>,
    /// Arbitrary package metadata forwarded to validators as `packageData`.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Read-only lookup of package metadata by `packageName@version`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the record for one package version.
    ///
    /// Returns `Ok(None)` if no such package version exists.
    async fn get_package(
        &self,
        package_name: &str,
        version: &str,
    ) -> anyhow::Result<Option<PackageRecord>>;
}

/// Read-only fetch of stored objects (validator artifacts) by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `key`.
    ///
    /// Returns `Ok(None)` when the object does not exist; absence is a
    /// first-class state, not an error.
    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Append-only audit log with unique-key insert semantics.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one record. Must fail if a record with the same `event_id`
    /// already exists, so retried requests cannot overwrite prior evidence.
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// In-memory metadata store keyed by `packageName@version`.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<HashMap<String, PackageRecord>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a package record.
    pub async fn put_package(&self, package_name: &str, version: &str, record: PackageRecord) {
        let key = composite_key(package_name, version);
        self.records.lock().await.insert(key, record);
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_package(
        &self,
        package_name: &str,
        version: &str,
    ) -> anyhow::Result<Option<PackageRecord>> {
        let key = composite_key(package_name, version);
        Ok(self.records.lock().await.get(&key).cloned())
    }
}

/// In-memory object store keyed by full object key.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub async fn put_object(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().await.insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().await.get(key).cloned())
    }
}

/// In-memory audit store that enforces `event_id` uniqueness.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all appended records, in append order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Number of appended records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Check if no records have been appended.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.event_id == record.event_id) {
            anyhow::bail!("duplicate audit event id: {}", record.event_id);
        }
        records.push(record.clone());
        Ok(())
    }
}

/// Build the composite metadata key `packageName@version`.
pub fn composite_key(package_name: &str, version: &str) -> String {
    format!("{package_name}@{version}")
}

/// Shared handles to the three stores the engine depends on.
#[derive(Clone)]
pub struct Stores {
    /// Package metadata, read side.
    pub metadata: Arc<dyn MetadataStore>,
    /// Validator artifacts.
    pub objects: Arc<dyn ObjectStore>,
    /// Audit log, write side.
    pub audit: Arc<dyn AuditStore>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditRecord, AuditStatus};

    #[test]
    fn test_composite_key() {
        assert_eq!(composite_key("acme", "1.2.3"), "acme@1.2.3");
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let store = MemoryMetadataStore::new();
        assert!(store.get_package("acme", "1.0.0").await.unwrap().is_none());

        let record = PackageRecord {
            is_sensitive: true,
            allowed_groups: ["admins".to_string()].into(),
            data: serde_json::json!({"license": "MIT"}),
        };
        store.put_package("acme", "1.0.0", record).await;

        let fetched = store.get_package("acme", "1.0.0").await.unwrap().unwrap();
        assert!(fetched.is_sensitive);
        assert!(fetched.allowed_groups.contains("admins"));
        // Different version is a different key
        assert!(store.get_package("acme", "1.0.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_object_store_absence_is_ok() {
        let store = MemoryObjectStore::new();
        assert!(store.get_object("validators/acme/1.0.0/validator.py")
            .await
            .unwrap()
            .is_none());

        store
            .put_object("validators/acme/1.0.0/validator.py", b"def validate(p): pass".to_vec())
            .await;
        let bytes = store
            .get_object("validators/acme/1.0.0/validator.py")
            .await
            .unwrap()
            .unwrap();
        assert!(bytes.starts_with(b"def validate"));
    }

    #[tokio::test]
    async fn test_audit_store_rejects_duplicate_event_id() {
        let store = MemoryAuditStore::new();
        let record = AuditRecord::new("acme", "1.0.0", "user-1", AuditStatus::Validated, "ok");

        store.append(&record).await.unwrap();
        assert_eq!(store.len().await, 1);

        // Same event id again must not overwrite prior evidence
        let err = store.append(&record).await.unwrap_err();
        assert!(err.to_string().contains("duplicate audit event id"));
        assert_eq!(store.len().await, 1);
    }
}
