//! Sense disambiguation and the sense registry.
//!
//! Two candidates sharing a normalized canonical are either the same entity
//! or distinct senses, decided by profile similarity. Sense path values are
//! dense positive integers allocated per normalized canonical, so the
//! ordinal of every homonym under one name is unambiguous across types.

use crate::config::ExtractionConfig;
use crate::identity::Eid;
use crate::model::EntityType;
use crate::profile::{self, EntityProfile};
use ares_core::{Vfs, VfsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseDecision {
    Same,
    DifferentLowConfidence,
    Different,
}

/// The decision table: similarity at or above the upper threshold is the
/// same entity; between the thresholds, distinct with low confidence; below,
/// confidently distinct. A profile with no discriminative features
/// (descriptors, roles, titles) on either side is conservatively the same
/// entity — raw context windows alone cannot justify a homonym split.
pub fn decide(
    a: &EntityProfile,
    b: &EntityProfile,
    config: &ExtractionConfig,
) -> (SenseDecision, f64) {
    let discriminative = |p: &EntityProfile| {
        !(p.descriptors.is_empty() && p.roles.is_empty() && p.titles.is_empty())
    };
    if !discriminative(a) || !discriminative(b) {
        return (SenseDecision::Same, 0.5);
    }
    let sim = profile::similarity(a, b);
    if sim >= config.sense_same_threshold {
        (SenseDecision::Same, 0.8)
    } else if sim >= config.sense_distinct_threshold {
        (SenseDecision::DifferentLowConfidence, 0.6)
    } else {
        (SenseDecision::Different, 0.9)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenseEntry {
    pub entity_type: EntityType,
    pub sense_path: Vec<u16>,
    pub eid: Eid,
    #[serde(default)]
    pub profile: EntityProfile,
    /// Global id this sense was last bound to; the stable rebind hook.
    #[serde(default)]
    pub global_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SenseRegistry {
    senses: BTreeMap<String, Vec<SenseEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SenseSnapshot {
    version: u32,
    #[serde(default)]
    next_id: u64,
    records: Vec<SenseRecord>,
    #[serde(default)]
    metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct SenseRecord {
    canonical: String,
    #[serde(flatten)]
    entry: SenseEntry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotMetadata {
    #[serde(default)]
    saved_at: u64,
    #[serde(default)]
    count: usize,
}

const SNAPSHOT_VERSION: u32 = 1;

impl SenseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next dense sense path under a normalized canonical.
    pub fn next_sense_path(&self, canonical: &str) -> Vec<u16> {
        let count = self.senses.get(canonical).map(Vec::len).unwrap_or(0);
        vec![count as u16 + 1]
    }

    pub fn senses_of(&self, canonical: &str) -> &[SenseEntry] {
        self.senses.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sense previously bound to this global id, if any.
    pub fn sense_for_global(&self, canonical: &str, global_id: &str) -> Option<&SenseEntry> {
        self.senses_of(canonical)
            .iter()
            .find(|s| s.global_id.as_deref() == Some(global_id))
    }

    /// Best same-type sense whose profile clears the matching threshold.
    pub fn find_matching_sense(
        &self,
        canonical: &str,
        entity_type: EntityType,
        profile: Option<&EntityProfile>,
        config: &ExtractionConfig,
    ) -> Option<&SenseEntry> {
        let candidates = self
            .senses_of(canonical)
            .iter()
            .filter(|s| s.entity_type == entity_type);

        match profile {
            None => candidates.into_iter().next(),
            Some(p) => {
                let mut best: Option<(&SenseEntry, f64)> = None;
                for entry in candidates {
                    let sim = if entry.profile.is_empty() || p.is_empty() {
                        // Conservative same-entity default from the table.
                        config.merge_similarity_threshold
                    } else {
                        profile::similarity(&entry.profile, p)
                    };
                    if sim >= config.merge_similarity_threshold
                        && best.map(|(_, b)| sim > b).unwrap_or(true)
                    {
                        best = Some((entry, sim));
                    }
                }
                best.map(|(entry, _)| entry)
            }
        }
    }

    pub fn register_sense(
        &mut self,
        canonical: &str,
        entity_type: EntityType,
        sense_path: Vec<u16>,
        eid: Eid,
        profile: EntityProfile,
        global_id: Option<String>,
    ) {
        self.senses.entry(canonical.to_string()).or_default().push(SenseEntry {
            entity_type,
            sense_path,
            eid,
            profile,
            global_id,
        });
    }

    /// Refresh the stored profile and global binding of an existing sense.
    pub fn rebind(&mut self, canonical: &str, eid: Eid, profile: &EntityProfile, global_id: &str) {
        if let Some(entries) = self.senses.get_mut(canonical) {
            if let Some(entry) = entries.iter_mut().find(|e| e.eid == eid) {
                entry.profile = profile.clone();
                entry.global_id = Some(global_id.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.senses.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.senses.is_empty()
    }

    pub async fn load(vfs: &dyn Vfs, path: &str) -> VfsResult<Self> {
        if !vfs.exists(path).await? {
            return Ok(Self::new());
        }
        let text = vfs.read_to_string(path).await?;
        let snapshot: SenseSnapshot = serde_json::from_str(&text)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        let mut registry = Self::new();
        for record in snapshot.records {
            registry
                .senses
                .entry(record.canonical)
                .or_default()
                .push(record.entry);
        }
        // Paths allocate densely; keep each list ordered by first component.
        for entries in registry.senses.values_mut() {
            entries.sort_by_key(|e| e.sense_path.clone());
        }
        Ok(registry)
    }

    pub async fn save(&self, vfs: &dyn Vfs, path: &str) -> VfsResult<()> {
        let records: Vec<SenseRecord> = self
            .senses
            .iter()
            .flat_map(|(canonical, entries)| {
                entries.iter().map(move |entry| SenseRecord {
                    canonical: canonical.clone(),
                    entry: entry.clone(),
                })
            })
            .collect();
        let snapshot = SenseSnapshot {
            version: SNAPSHOT_VERSION,
            next_id: 0,
            metadata: SnapshotMetadata {
                saved_at: ares_core::time::now_millis(),
                count: records.len(),
            },
            records,
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        vfs.write(path, json.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(descriptors: &[&str], contexts: &[&str]) -> EntityProfile {
        let mut p = EntityProfile::default();
        for d in descriptors {
            p.add_descriptor(d);
        }
        for c in contexts {
            p.push_context(c, 20);
        }
        p
    }

    #[test]
    fn empty_profile_is_conservatively_same() {
        let config = ExtractionConfig::default();
        let a = EntityProfile::default();
        let b = profile_with(&["wizard"], &[]);
        assert_eq!(decide(&a, &b, &config), (SenseDecision::Same, 0.5));
    }

    #[test]
    fn similar_profiles_are_same_entity() {
        let config = ExtractionConfig::default();
        let a = profile_with(&["wizard"], &["casts spells in the tower"]);
        let b = profile_with(&["wizard"], &["casts spells in the tower"]);
        assert_eq!(decide(&a, &b, &config), (SenseDecision::Same, 0.8));
    }

    #[test]
    fn disjoint_profiles_are_confidently_different() {
        let config = ExtractionConfig::default();
        let a = profile_with(&["company"], &["announced a new phone"]);
        let b = profile_with(&["fruit"], &["grows in the orchard"]);
        assert_eq!(decide(&a, &b, &config), (SenseDecision::Different, 0.9));
    }

    #[test]
    fn sense_paths_are_dense_across_one_canonical() {
        let mut reg = SenseRegistry::new();
        assert_eq!(reg.next_sense_path("apple"), vec![1]);
        reg.register_sense(
            "apple",
            EntityType::Org,
            vec![1],
            Eid::new(10).unwrap(),
            EntityProfile::default(),
            None,
        );
        assert_eq!(reg.next_sense_path("apple"), vec![2]);
        reg.register_sense(
            "apple",
            EntityType::Item,
            vec![2],
            Eid::new(11).unwrap(),
            EntityProfile::default(),
            None,
        );
        assert_eq!(reg.next_sense_path("apple"), vec![3]);
        // Another canonical starts over.
        assert_eq!(reg.next_sense_path("gondor"), vec![1]);
    }

    #[test]
    fn find_matching_sense_filters_by_type() {
        let config = ExtractionConfig::default();
        let mut reg = SenseRegistry::new();
        reg.register_sense(
            "apple",
            EntityType::Org,
            vec![1],
            Eid::new(10).unwrap(),
            profile_with(&["company"], &[]),
            None,
        );
        assert!(reg
            .find_matching_sense("apple", EntityType::Item, None, &config)
            .is_none());
        assert!(reg
            .find_matching_sense("apple", EntityType::Org, None, &config)
            .is_some());
    }

    #[test]
    fn find_matching_sense_respects_similarity_threshold() {
        let config = ExtractionConfig::default();
        let mut reg = SenseRegistry::new();
        reg.register_sense(
            "mercury",
            EntityType::Misc,
            vec![1],
            Eid::new(5).unwrap(),
            profile_with(&["planet"], &["orbits the sun"]),
            None,
        );
        let metal = profile_with(&["metal"], &["liquid at room temperature"]);
        assert!(reg
            .find_matching_sense("mercury", EntityType::Misc, Some(&metal), &config)
            .is_none());
        let planet = profile_with(&["planet"], &["orbits the sun"]);
        assert!(reg
            .find_matching_sense("mercury", EntityType::Misc, Some(&planet), &config)
            .is_some());
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = ares_core::NativeVfs::new(dir.path());
        let mut reg = SenseRegistry::new();
        reg.register_sense(
            "apple",
            EntityType::Org,
            vec![1],
            Eid::new(10).unwrap(),
            EntityProfile::default(),
            Some("global_org_1".into()),
        );
        reg.save(&vfs, "sense_registry.json").await.unwrap();

        let loaded = SenseRegistry::load(&vfs, "sense_registry.json").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.senses_of("apple")[0].sense_path, vec![1]);
        assert_eq!(
            loaded.sense_for_global("apple", "global_org_1").unwrap().eid,
            Eid::new(10).unwrap()
        );
        assert_eq!(loaded.next_sense_path("apple"), vec![2]);
    }
}
