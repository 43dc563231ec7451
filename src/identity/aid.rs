//! The AID registry: surface forms to 24-bit ids, many-to-one onto EIDs.
//!
//! One normalized key maps to one AID. An AID points at exactly one EID at a
//! time; re-pointing requires strictly higher confidence. Merging EIDs moves
//! every affected AID and rebuilds the reverse index.

use super::{Aid, Eid, IdentityError};
use crate::model::EntityType;
use crate::normalize::normalize_for_aliasing;
use ares_core::{Vfs, VfsResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AidRecord {
    pub aid: Aid,
    pub surface_form: String,
    pub normalized_key: String,
    pub eid: Eid,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    pub first_seen: u64,
    pub last_seen: u64,
    pub occurrence_count: u64,
    pub confidence: f64,
}

#[derive(Debug, Default)]
pub struct AidRegistry {
    next_id: u32,
    records: BTreeMap<u32, AidRecord>,
    by_key: HashMap<String, Aid>,
    by_eid: HashMap<u64, Vec<Aid>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AidSnapshot {
    version: u32,
    next_id: u32,
    records: Vec<AidRecord>,
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

/// Optional descriptive fields for a registration.
#[derive(Debug, Clone, Default)]
pub struct AidAttrs {
    pub entity_type: Option<EntityType>,
    pub language: Option<String>,
    pub script: Option<String>,
}

impl AidRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
            by_key: HashMap::new(),
            by_eid: HashMap::new(),
        }
    }

    /// Register a surface form against an EID. Re-registration updates
    /// occurrence bookkeeping; the EID mapping moves only when the new
    /// confidence is strictly higher than the stored one.
    pub fn register(
        &mut self,
        surface_form: &str,
        eid: Eid,
        confidence: f64,
        attrs: AidAttrs,
    ) -> Result<Aid, IdentityError> {
        let key = normalize_for_aliasing(surface_form);
        let now = ares_core::time::now_millis();

        if let Some(aid) = self.by_key.get(&key).copied() {
            let remap = {
                let record = self.records.get_mut(&aid.value()).expect("indexed record");
                record.last_seen = now;
                record.occurrence_count += 1;
                if confidence > record.confidence {
                    let old_eid = record.eid;
                    record.eid = eid;
                    record.confidence = confidence;
                    Some(old_eid)
                } else {
                    None
                }
            };
            if remap.is_some() {
                self.rebuild_eid_index();
            }
            return Ok(aid);
        }

        if self.next_id > Aid::MAX {
            return Err(IdentityError::Exhausted { registry: "AID" });
        }
        let aid = Aid::new(self.next_id)?;
        self.next_id += 1;
        self.records.insert(
            aid.value(),
            AidRecord {
                aid,
                surface_form: surface_form.to_string(),
                normalized_key: key.clone(),
                eid,
                entity_type: attrs.entity_type,
                language: attrs.language,
                script: attrs.script,
                first_seen: now,
                last_seen: now,
                occurrence_count: 1,
                confidence,
            },
        );
        self.by_key.insert(key, aid);
        self.by_eid.entry(eid.value()).or_default().push(aid);
        Ok(aid)
    }

    /// Move every AID pointing at `from` onto `to`. Used when two entities
    /// are merged.
    pub fn merge_eids(&mut self, from: Eid, to: Eid) {
        let moved: Vec<Aid> = self.by_eid.remove(&from.value()).unwrap_or_default();
        for aid in &moved {
            if let Some(record) = self.records.get_mut(&aid.value()) {
                record.eid = to;
            }
        }
        self.by_eid.entry(to.value()).or_default().extend(moved);
    }

    pub fn lookup(&self, surface_form: &str) -> Option<&AidRecord> {
        let key = normalize_for_aliasing(surface_form);
        self.by_key
            .get(&key)
            .and_then(|aid| self.records.get(&aid.value()))
    }

    pub fn record(&self, aid: Aid) -> Option<&AidRecord> {
        self.records.get(&aid.value())
    }

    pub fn aids_of(&self, eid: Eid) -> &[Aid] {
        self.by_eid
            .get(&eid.value())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn rebuild_eid_index(&mut self) {
        self.by_eid.clear();
        for record in self.records.values() {
            self.by_eid
                .entry(record.eid.value())
                .or_default()
                .push(record.aid);
        }
    }

    pub async fn load(vfs: &dyn Vfs, path: &str) -> VfsResult<Self> {
        if !vfs.exists(path).await? {
            return Ok(Self::new());
        }
        let text = vfs.read_to_string(path).await?;
        let snapshot: AidSnapshot = serde_json::from_str(&text)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        let mut registry = Self {
            next_id: snapshot.next_id.max(1),
            records: BTreeMap::new(),
            by_key: HashMap::new(),
            by_eid: HashMap::new(),
        };
        for record in snapshot.records {
            registry.by_key.insert(record.normalized_key.clone(), record.aid);
            registry
                .by_eid
                .entry(record.eid.value())
                .or_default()
                .push(record.aid);
            registry.records.insert(record.aid.value(), record);
        }
        Ok(registry)
    }

    pub async fn save(&self, vfs: &dyn Vfs, path: &str) -> VfsResult<()> {
        let snapshot = AidSnapshot {
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

    fn eid(v: u64) -> Eid {
        Eid::new(v).unwrap()
    }

    #[test]
    fn same_key_returns_same_aid_and_counts() {
        let mut reg = AidRegistry::new();
        let a = reg
            .register("the wizard", eid(1), 0.8, AidAttrs::default())
            .unwrap();
        let b = reg
            .register("The  Wizard", eid(1), 0.8, AidAttrs::default())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.record(a).unwrap().occurrence_count, 2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remap_requires_strictly_higher_confidence() {
        let mut reg = AidRegistry::new();
        let aid = reg
            .register("Gandalf", eid(1), 0.8, AidAttrs::default())
            .unwrap();

        // Equal confidence: no move.
        reg.register("Gandalf", eid(2), 0.8, AidAttrs::default())
            .unwrap();
        assert_eq!(reg.record(aid).unwrap().eid, eid(1));

        // Strictly higher: moves, and the reverse index follows.
        reg.register("Gandalf", eid(2), 0.9, AidAttrs::default())
            .unwrap();
        assert_eq!(reg.record(aid).unwrap().eid, eid(2));
        assert_eq!(reg.aids_of(eid(1)), &[]);
        assert_eq!(reg.aids_of(eid(2)), &[aid]);
    }

    #[test]
    fn many_aids_may_share_one_eid() {
        let mut reg = AidRegistry::new();
        let a = reg
            .register("Gandalf", eid(7), 0.9, AidAttrs::default())
            .unwrap();
        let b = reg
            .register("the Grey Pilgrim", eid(7), 0.7, AidAttrs::default())
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.aids_of(eid(7)).len(), 2);
    }

    #[test]
    fn merge_eids_moves_all_aliases() {
        let mut reg = AidRegistry::new();
        reg.register("Strider", eid(1), 0.8, AidAttrs::default())
            .unwrap();
        reg.register("Aragorn", eid(2), 0.9, AidAttrs::default())
            .unwrap();
        reg.merge_eids(eid(1), eid(2));
        assert_eq!(reg.aids_of(eid(1)), &[]);
        assert_eq!(reg.aids_of(eid(2)).len(), 2);
        assert_eq!(reg.lookup("Strider").unwrap().eid, eid(2));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = ares_core::NativeVfs::new(dir.path());

        let mut reg = AidRegistry::new();
        let aid = reg
            .register("the wizard", eid(3), 0.75, AidAttrs::default())
            .unwrap();
        reg.save(&vfs, "aid_registry.json").await.unwrap();

        let loaded = AidRegistry::load(&vfs, "aid_registry.json").await.unwrap();
        let record = loaded.record(aid).unwrap();
        assert_eq!(record.surface_form, "the wizard");
        assert_eq!(record.eid, eid(3));
        assert_eq!(loaded.aids_of(eid(3)), &[aid]);
    }
}
