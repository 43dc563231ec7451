//! The EID registry: canonical name + type (+ sense path) to 48-bit id.
//!
//! Allocation is monotonic; ids are never reused, even after a merge. The
//! reverse index is rebuilt from the records on load rather than persisted.

use super::{Eid, IdentityError};
use crate::model::EntityType;
use ares_core::{Vfs, VfsResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EidRecord {
    pub eid: Eid,
    pub canonical: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub sense_path: Vec<u16>,
    #[serde(default)]
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub count: usize,
    pub next_id: u64,
}

type ReverseKey = (String, EntityType, Vec<u16>);

#[derive(Debug, Default)]
pub struct EidRegistry {
    next_id: u64,
    records: BTreeMap<u64, EidRecord>,
    reverse: HashMap<ReverseKey, Eid>,
}

/// On-disk shape: `{version, next_id, records[], metadata}`.
#[derive(Debug, Serialize, Deserialize)]
struct EidSnapshot {
    version: u32,
    next_id: u64,
    records: Vec<EidRecord>,
    #[serde(default)]
    metadata: SnapshotMetadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotMetadata {
    #[serde(default)]
    saved_at: u64,
    #[serde(default)]
    count: usize,
}

const SNAPSHOT_VERSION: u32 = 1;

impl EidRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
            reverse: HashMap::new(),
        }
    }

    /// Look up or allocate the EID for a `(normalized canonical, type,
    /// sense path)` key. The display canonical is stored on first creation
    /// and kept stable afterwards.
    pub fn get_or_create(
        &mut self,
        canonical: &str,
        normalized: &str,
        entity_type: EntityType,
        sense_path: &[u16],
    ) -> Result<Eid, IdentityError> {
        let key = (normalized.to_string(), entity_type, sense_path.to_vec());
        if let Some(eid) = self.reverse.get(&key) {
            return Ok(*eid);
        }
        if self.next_id > Eid::MAX {
            return Err(IdentityError::Exhausted { registry: "EID" });
        }
        let eid = Eid::new(self.next_id)?;
        self.next_id += 1;
        self.records.insert(
            eid.value(),
            EidRecord {
                eid,
                canonical: canonical.to_string(),
                entity_type,
                sense_path: sense_path.to_vec(),
                created_at: ares_core::time::now_millis(),
            },
        );
        self.reverse.insert(key, eid);
        Ok(eid)
    }

    pub fn canonical_of(&self, eid: Eid) -> Option<&str> {
        self.records.get(&eid.value()).map(|r| r.canonical.as_str())
    }

    pub fn record(&self, eid: Eid) -> Option<&EidRecord> {
        self.records.get(&eid.value())
    }

    pub fn eid_of(
        &self,
        normalized: &str,
        entity_type: EntityType,
        sense_path: &[u16],
    ) -> Option<Eid> {
        self.reverse
            .get(&(normalized.to_string(), entity_type, sense_path.to_vec()))
            .copied()
    }

    pub fn all(&self) -> impl Iterator<Item = &EidRecord> {
        self.records.values()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            count: self.records.len(),
            next_id: self.next_id,
        }
    }

    pub async fn load(vfs: &dyn Vfs, path: &str, normalizer: impl Fn(&str) -> String) -> VfsResult<Self> {
        if !vfs.exists(path).await? {
            return Ok(Self::new());
        }
        let text = vfs.read_to_string(path).await?;
        let snapshot: EidSnapshot = serde_json::from_str(&text)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        let mut registry = Self {
            next_id: snapshot.next_id.max(1),
            records: BTreeMap::new(),
            reverse: HashMap::new(),
        };
        for record in snapshot.records {
            let key = (
                normalizer(&record.canonical),
                record.entity_type,
                record.sense_path.clone(),
            );
            registry.reverse.insert(key, record.eid);
            registry.records.insert(record.eid.value(), record);
        }
        Ok(registry)
    }

    pub async fn save(&self, vfs: &dyn Vfs, path: &str) -> VfsResult<()> {
        let snapshot = EidSnapshot {
            version: SNAPSHOT_VERSION,
            next_id: self.next_id,
            records: self.records.values().cloned().collect(),
            metadata: SnapshotMetadata {
                saved_at: ares_core::time::now_millis(),
                count: self.records.len(),
            },
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        vfs.write(path, json.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_for_aliasing;
    use ares_core::NativeVfs;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut reg = EidRegistry::new();
        let a = reg
            .get_or_create("Gandalf the Grey", "gandalf the grey", EntityType::Person, &[1])
            .unwrap();
        let b = reg
            .get_or_create("Gandalf the Grey", "gandalf the grey", EntityType::Person, &[1])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.stats().count, 1);
    }

    #[test]
    fn distinct_types_get_distinct_eids() {
        let mut reg = EidRegistry::new();
        let org = reg
            .get_or_create("Apple", "apple", EntityType::Org, &[1])
            .unwrap();
        let item = reg
            .get_or_create("Apple", "apple", EntityType::Item, &[2])
            .unwrap();
        assert_ne!(org, item);
    }

    #[test]
    fn allocation_is_monotonic() {
        let mut reg = EidRegistry::new();
        let a = reg
            .get_or_create("A", "a", EntityType::Person, &[1])
            .unwrap();
        let b = reg
            .get_or_create("B", "b", EntityType::Person, &[1])
            .unwrap();
        assert!(b.value() > a.value());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = NativeVfs::new(dir.path());

        let mut reg = EidRegistry::new();
        let eid = reg
            .get_or_create("Rivendell", "rivendell", EntityType::Place, &[1])
            .unwrap();
        reg.save(&vfs, "eid_registry.json").await.unwrap();

        let loaded = EidRegistry::load(&vfs, "eid_registry.json", normalize_for_aliasing)
            .await
            .unwrap();
        assert_eq!(loaded.canonical_of(eid), Some("Rivendell"));
        assert_eq!(
            loaded.eid_of("rivendell", EntityType::Place, &[1]),
            Some(eid)
        );
        assert_eq!(loaded.stats().next_id, reg.stats().next_id);
    }

    #[tokio::test]
    async fn load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = NativeVfs::new(dir.path());
        let reg = EidRegistry::load(&vfs, "absent.json", normalize_for_aliasing)
            .await
            .unwrap();
        assert_eq!(reg.stats().count, 0);
        assert_eq!(reg.stats().next_id, 1);
    }
}
