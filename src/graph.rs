//! The knowledge-graph snapshot.
//!
//! A typed, persistent container of everything one graph owns: entities,
//! relations, conflicts, provenance, profiles, corrections, versions, and
//! the ordered doc-id list that anchors merge determinism. Persistence is
//! whole-snapshot JSON behind the VFS's atomic replace.

use crate::model::{
    Conflict, Correction, Entity, EntityType, GraphMetadata, Predicate, ProvenanceMap, Relation,
    VersionSnapshot,
};
use crate::normalize;
use crate::profile::EntityProfile;
use ares_core::{Vfs, VfsError, VfsResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub provenance: ProvenanceMap,
    #[serde(default)]
    pub profiles: BTreeMap<String, EntityProfile>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
    #[serde(default)]
    pub versions: Vec<VersionSnapshot>,
    #[serde(default)]
    pub doc_ids: Vec<String>,
    #[serde(default)]
    pub metadata: GraphMetadata,
}

/// One oriented answer row from a relation query.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleView<'g> {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
    pub relation: &'g Relation,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        let now = ares_core::time::now_millis();
        Self {
            metadata: GraphMetadata {
                created_at: now,
                updated_at: now,
                entity_count: 0,
                relation_count: 0,
            },
            ..Self::default()
        }
    }

    pub fn has_doc(&self, doc_id: &str) -> bool {
        self.doc_ids.iter().any(|d| d == doc_id)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn entity_by_canonical(
        &self,
        entity_type: EntityType,
        canonical: &str,
    ) -> Option<&Entity> {
        let key = normalize::normalize_for_aliasing(canonical);
        self.entities.iter().find(|e| {
            e.entity_type == entity_type && normalize::normalize_for_aliasing(&e.canonical) == key
        })
    }

    pub fn relation(&self, id: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.id == id)
    }

    /// Pattern query over relations. Symmetric predicates answer in both
    /// directions, and a stored relation also answers queries phrased with
    /// its inverse predicate: storing `(A, parent_of, B)` makes
    /// `query(Some(B), Some(child_of), None)` return `(B, child_of, A)`.
    pub fn query(
        &self,
        subject: Option<&str>,
        predicate: Option<Predicate>,
        object: Option<&str>,
    ) -> Vec<TripleView<'_>> {
        let mut out = Vec::new();
        for relation in &self.relations {
            let mut orientations: Vec<(String, Predicate, String)> = vec![(
                relation.subject.clone(),
                relation.predicate,
                relation.object.clone(),
            )];
            if relation.predicate.is_symmetric() {
                orientations.push((
                    relation.object.clone(),
                    relation.predicate,
                    relation.subject.clone(),
                ));
            } else if let Some(inverse) = relation.predicate.inverse() {
                orientations.push((relation.object.clone(), inverse, relation.subject.clone()));
            }
            for (s, p, o) in orientations {
                let matches = subject.map(|q| q == s).unwrap_or(true)
                    && predicate.map(|q| q == p).unwrap_or(true)
                    && object.map(|q| q == o).unwrap_or(true);
                if matches {
                    out.push(TripleView {
                        subject: s,
                        predicate: p,
                        object: o,
                        relation,
                    });
                }
            }
        }
        out
    }

    /// All relations touching an entity, regardless of direction.
    pub fn relations_of(&self, entity_id: &str) -> Vec<&Relation> {
        self.relations
            .iter()
            .filter(|r| r.subject == entity_id || r.object == entity_id)
            .collect()
    }

    pub fn record_version(&mut self, correction_id: Option<String>) {
        let id = format!("v{}", self.versions.len() + 1);
        self.versions.push(VersionSnapshot {
            id,
            timestamp: ares_core::time::now_millis(),
            correction_id,
            entity_count: self.entities.len(),
            relation_count: self.relations.len(),
        });
    }

    pub fn update_counts(&mut self) {
        self.metadata.entity_count = self.entities.len();
        self.metadata.relation_count = self.relations.len();
        self.metadata.updated_at = ares_core::time::now_millis();
    }

    /// Referential integrity check: every relation endpoint must name an
    /// existing entity.
    pub fn check_integrity(&self) -> Result<(), String> {
        for relation in &self.relations {
            if self.entity(&relation.subject).is_none() {
                return Err(format!(
                    "relation {} references unknown subject {}",
                    relation.id, relation.subject
                ));
            }
            if self.entity(&relation.object).is_none() {
                return Err(format!(
                    "relation {} references unknown object {}",
                    relation.id, relation.object
                ));
            }
        }
        Ok(())
    }

    /// Deterministic digest over the canonicalized snapshot. Volatile fields
    /// (timestamps, version ids, relation ids, evidence-free bookkeeping)
    /// are excluded; relations order by (subject canonical, predicate,
    /// object canonical); object keys are lexicographic.
    pub fn digest(&self) -> String {
        let canonical_of = |id: &str| {
            self.entity(id)
                .map(|e| e.canonical.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let mut entities: Vec<_> = self
            .entities
            .iter()
            .map(|e| {
                let mut aliases: Vec<String> =
                    e.aliases.iter().map(|a| a.to_lowercase()).collect();
                aliases.sort();
                json!({
                    "id": e.id,
                    "type": e.entity_type.as_str(),
                    "canonical": e.canonical,
                    "aliases": aliases,
                    "sense_path": e.sense_path,
                    "eid": e.eid.map(|v| v.value()),
                    "rejected": e.rejected,
                    "manual_override": e.manual_override,
                })
            })
            .collect();
        entities.sort_by_key(|v| v["id"].as_str().map(String::from));

        let mut relations: Vec<_> = self
            .relations
            .iter()
            .map(|r| {
                (
                    canonical_of(&r.subject),
                    r.predicate.as_str().to_string(),
                    canonical_of(&r.object),
                    json!({
                        "subject": canonical_of(&r.subject),
                        "predicate": r.predicate.as_str(),
                        "object": canonical_of(&r.object),
                        "qualifiers": r.qualifiers,
                        "extractor": r.extractor,
                        "manual_override": r.manual_override,
                    }),
                )
            })
            .collect();
        relations.sort_by(|a, b| (&a.0, &a.1, &a.2).cmp(&(&b.0, &b.1, &b.2)));
        let relations: Vec<_> = relations.into_iter().map(|(_, _, _, v)| v).collect();

        let provenance: BTreeMap<&String, serde_json::Value> = self
            .provenance
            .iter()
            .map(|(local_id, entry)| {
                (
                    local_id,
                    json!({
                        "global_id": entry.global_id,
                        "doc_id": entry.doc_id,
                        "local_canonical": entry.local_canonical,
                        "entity_type": entry.entity_type.as_str(),
                    }),
                )
            })
            .collect();

        let corrections: Vec<_> = self
            .corrections
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "kind": serde_json::to_value(&c.kind).unwrap_or_default(),
                    "rolled_back": c.rolled_back,
                })
            })
            .collect();

        let projection = json!({
            "doc_ids": self.doc_ids,
            "entities": entities,
            "relations": relations,
            "provenance": provenance,
            "corrections": corrections,
        });
        ares_core::sha256_hex(ares_core::canonical_json(&projection).as_bytes())
    }

    /// Load a snapshot. A missing file or an unreadable/mismatched snapshot
    /// yields `None` — the caller decides between starting empty and
    /// aborting. I/O failures other than absence are real errors.
    pub async fn load(vfs: &dyn Vfs, path: &str) -> VfsResult<Option<KnowledgeGraph>> {
        if !vfs.exists(path).await? {
            return Ok(None);
        }
        let text = match vfs.read_to_string(path).await {
            Ok(text) => text,
            Err(VfsError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match serde_json::from_str::<KnowledgeGraph>(&text) {
            Ok(graph) => Ok(Some(graph)),
            Err(e) => {
                tracing::warn!(path, error = %e, "snapshot did not match the schema");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, vfs: &dyn Vfs, path: &str) -> VfsResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VfsError::SerializationError(e.to_string()))?;
        vfs.write(path, json.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractorTag, MentionSource};

    fn entity(id: &str, entity_type: EntityType, canonical: &str) -> Entity {
        Entity {
            id: id.to_string(),
            eid: None,
            entity_type,
            canonical: canonical.to_string(),
            aliases: Vec::new(),
            source: Some(MentionSource::Ner),
            sense_path: None,
            manual_override: false,
            rejected: false,
            created_at: 0,
        }
    }

    fn relation(id: &str, subject: &str, predicate: Predicate, object: &str) -> Relation {
        Relation {
            id: id.to_string(),
            subject: subject.to_string(),
            predicate,
            object: object.to_string(),
            confidence: 0.8,
            evidence: Vec::new(),
            qualifiers: Vec::new(),
            extractor: ExtractorTag::Dep,
            manual_override: false,
        }
    }

    fn sample() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.entities.push(entity("global_person_1", EntityType::Person, "Aragorn"));
        graph.entities.push(entity("global_person_2", EntityType::Person, "Arathorn"));
        graph.entities.push(entity("global_person_3", EntityType::Person, "Arwen"));
        graph.relations.push(relation(
            "rel_1",
            "global_person_1",
            Predicate::ChildOf,
            "global_person_2",
        ));
        graph.relations.push(relation(
            "rel_2",
            "global_person_1",
            Predicate::MarriedTo,
            "global_person_3",
        ));
        graph
    }

    #[test]
    fn inverse_predicate_queries_answer() {
        let graph = sample();
        // (Aragorn, child_of, Arathorn) stored; ask for Arathorn's children
        // through parent_of.
        let rows = graph.query(Some("global_person_2"), Some(Predicate::ParentOf), None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].object, "global_person_1");
    }

    #[test]
    fn symmetric_predicate_answers_both_directions() {
        let graph = sample();
        let rows = graph.query(Some("global_person_3"), Some(Predicate::MarriedTo), None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].object, "global_person_1");
    }

    #[test]
    fn integrity_check_flags_dangling_reference() {
        let mut graph = sample();
        graph.relations.push(relation(
            "rel_3",
            "global_person_1",
            Predicate::Knows,
            "global_person_99",
        ));
        assert!(graph.check_integrity().is_err());
    }

    #[test]
    fn digest_ignores_timestamps_and_version_ids() {
        let mut a = sample();
        let mut b = sample();
        a.metadata.updated_at = 1;
        b.metadata.updated_at = 2;
        a.record_version(None);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_changes_when_a_relation_changes() {
        let a = sample();
        let mut b = sample();
        b.relations.pop();
        assert_ne!(a.digest(), b.digest());
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = ares_core::NativeVfs::new(dir.path());
        let graph = sample();
        graph.save(&vfs, "graph.json").await.unwrap();

        let loaded = KnowledgeGraph::load(&vfs, "graph.json").await.unwrap().unwrap();
        assert_eq!(loaded.entities.len(), 3);
        assert_eq!(loaded.digest(), graph.digest());
    }

    #[tokio::test]
    async fn unreadable_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = ares_core::NativeVfs::new(dir.path());
        vfs.write("graph.json", b"{ not json").await.unwrap();
        assert!(KnowledgeGraph::load(&vfs, "graph.json").await.unwrap().is_none());
        assert!(KnowledgeGraph::load(&vfs, "absent.json").await.unwrap().is_none());
    }
}
