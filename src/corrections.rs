//! Correction log replay.
//!
//! The log is append-only and survives re-ingestion; every append replays it
//! on top of the freshly merged graph. Each entry is idempotent: replaying a
//! log twice leaves the same graph as once. Entries whose targets vanished
//! under re-extraction are skipped and counted, never fatal.

use crate::conflict;
use crate::graph::KnowledgeGraph;
use crate::model::{Correction, CorrectionKind, Entity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideOutcome {
    pub applied: usize,
    pub skipped_rolled_back: usize,
    /// Corrections whose target no longer exists.
    pub conflicts: usize,
}

/// Replay the graph's correction log in insertion order, then re-run
/// conflict detection.
pub fn apply_corrections(graph: &mut KnowledgeGraph, debug: bool) -> OverrideOutcome {
    let corrections = graph.corrections.clone();
    let mut outcome = OverrideOutcome::default();

    for correction in &corrections {
        if correction.rolled_back {
            outcome.skipped_rolled_back += 1;
            continue;
        }
        match apply_one(graph, correction) {
            Applied::Yes => outcome.applied += 1,
            Applied::TargetMissing => {
                outcome.conflicts += 1;
                if debug {
                    tracing::debug!(correction = %correction.id, "correction target missing; skipped");
                }
            }
        }
    }

    graph.conflicts = conflict::detect(&graph.relations);
    outcome
}

enum Applied {
    Yes,
    TargetMissing,
}

fn apply_one(graph: &mut KnowledgeGraph, correction: &Correction) -> Applied {
    match &correction.kind {
        CorrectionKind::EntityType { target, to, .. } => {
            match graph.entity_mut(target) {
                Some(entity) => {
                    entity.entity_type = *to;
                    entity.manual_override = true;
                    Applied::Yes
                }
                None => Applied::TargetMissing,
            }
        }
        CorrectionKind::EntityMerge {
            primary,
            secondary,
            canonical,
        } => {
            if graph.entity(primary).is_none() {
                return Applied::TargetMissing;
            }
            for secondary_id in secondary {
                // A missing secondary is the already-applied case, not a
                // conflict: merges remove their secondaries.
                let Some(pos) = graph.entities.iter().position(|e| &e.id == secondary_id)
                else {
                    continue;
                };
                let removed = graph.entities.remove(pos);
                for relation in graph.relations.iter_mut() {
                    if &relation.subject == secondary_id {
                        relation.subject = primary.clone();
                    }
                    if &relation.object == secondary_id {
                        relation.object = primary.clone();
                    }
                }
                for entry in graph.provenance.values_mut() {
                    if &entry.global_id == secondary_id {
                        entry.global_id = primary.clone();
                    }
                }
                let secondary_profile = graph.profiles.remove(secondary_id);
                let primary_entity = graph.entity_mut(primary).expect("checked above");
                primary_entity.add_alias(&removed.canonical);
                for alias in &removed.aliases {
                    primary_entity.add_alias(alias);
                }
                primary_entity.manual_override = true;
                if let Some(p) = secondary_profile {
                    graph
                        .profiles
                        .entry(primary.clone())
                        .or_default()
                        .merge(&p, 20);
                }
            }
            if let Some(canonical) = canonical {
                if let Some(entity) = graph.entity_mut(primary) {
                    if entity.canonical != *canonical {
                        let old = std::mem::replace(&mut entity.canonical, canonical.clone());
                        entity.add_alias(&old);
                    }
                }
            }
            Applied::Yes
        }
        CorrectionKind::EntitySplit { target, into } => {
            let split_ids: Vec<String> = (1..=into.len())
                .map(|i| format!("{}_split_{}", target, i))
                .collect();
            let already_applied = split_ids.iter().all(|id| graph.entity(id).is_some());
            if graph.entity(target).is_none() {
                return if already_applied {
                    Applied::Yes
                } else {
                    Applied::TargetMissing
                };
            }
            let created_at = ares_core::time::now_millis();
            for (spec, id) in into.iter().zip(&split_ids) {
                if graph.entity(id).is_some() {
                    continue;
                }
                graph.entities.push(Entity {
                    id: id.clone(),
                    eid: None,
                    entity_type: spec.entity_type,
                    canonical: spec.canonical.clone(),
                    aliases: spec.aliases.clone(),
                    source: None,
                    sense_path: None,
                    manual_override: true,
                    rejected: false,
                    created_at,
                });
            }
            graph.entities.retain(|e| &e.id != target);
            graph.profiles.remove(target);
            // Orphaned relations carry no routing information; they are
            // dropped rather than guessed at.
            graph
                .relations
                .retain(|r| &r.subject != target && &r.object != target);
            Applied::Yes
        }
        CorrectionKind::EntityReject { target } => set_rejected(graph, target, true),
        CorrectionKind::EntityRestore { target } => set_rejected(graph, target, false),
        CorrectionKind::RelationAdd { relation } => {
            if graph.relation(&relation.id).is_some() {
                return Applied::Yes;
            }
            if graph.entity(&relation.subject).is_none() || graph.entity(&relation.object).is_none()
            {
                return Applied::TargetMissing;
            }
            let mut relation = relation.clone();
            relation.manual_override = true;
            graph.relations.push(relation);
            Applied::Yes
        }
        CorrectionKind::RelationRemove { relation_id } => {
            // Absent relation means the removal already took effect.
            graph.relations.retain(|r| &r.id != relation_id);
            Applied::Yes
        }
        CorrectionKind::RelationEdit {
            relation_id,
            predicate,
            confidence,
            qualifiers,
        } => {
            let Some(relation) = graph.relations.iter_mut().find(|r| &r.id == relation_id)
            else {
                return Applied::TargetMissing;
            };
            if let Some(predicate) = predicate {
                relation.predicate = *predicate;
            }
            if let Some(confidence) = confidence {
                relation.confidence = *confidence;
            }
            if let Some(qualifiers) = qualifiers {
                relation.qualifiers = qualifiers.clone();
            }
            relation.manual_override = true;
            Applied::Yes
        }
        CorrectionKind::AliasAdd { target, alias } => match graph.entity_mut(target) {
            Some(entity) => {
                entity.add_alias(alias);
                entity.manual_override = true;
                Applied::Yes
            }
            None => Applied::TargetMissing,
        },
        CorrectionKind::AliasRemove { target, alias } => match graph.entity_mut(target) {
            Some(entity) => {
                let folded = alias.to_lowercase();
                entity.aliases.retain(|a| a.to_lowercase() != folded);
                entity.manual_override = true;
                Applied::Yes
            }
            None => Applied::TargetMissing,
        },
        CorrectionKind::CanonicalChange { target, canonical } => {
            match graph.entity_mut(target) {
                Some(entity) => {
                    if entity.canonical != *canonical {
                        let old = std::mem::replace(&mut entity.canonical, canonical.clone());
                        entity.add_alias(&old);
                        let folded = canonical.to_lowercase();
                        entity.aliases.retain(|a| a.to_lowercase() != folded);
                    }
                    entity.manual_override = true;
                    Applied::Yes
                }
                None => Applied::TargetMissing,
            }
        }
    }
}

fn set_rejected(graph: &mut KnowledgeGraph, target: &str, rejected: bool) -> Applied {
    match graph.entity_mut(target) {
        Some(entity) => {
            entity.rejected = rejected;
            Applied::Yes
        }
        None => Applied::TargetMissing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CorrectionKind, EntityType, ExtractorTag, MentionSource, Predicate, Relation, SplitSpec,
    };

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

    fn correction(id: &str, kind: CorrectionKind) -> Correction {
        Correction {
            id: id.to_string(),
            kind,
            timestamp: 0,
            author: None,
            reason: None,
            rolled_back: false,
        }
    }

    fn graph_with_gandalf() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph
            .entities
            .push(entity("global_person_1", EntityType::Person, "Gandalf"));
        graph
    }

    #[test]
    fn entity_type_correction_applies_and_marks_override() {
        let mut graph = graph_with_gandalf();
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::EntityType {
                target: "global_person_1".into(),
                from: EntityType::Person,
                to: EntityType::Deity,
            },
        ));
        let outcome = apply_corrections(&mut graph, false);
        assert_eq!(outcome.applied, 1);
        let gandalf = graph.entity("global_person_1").unwrap();
        assert_eq!(gandalf.entity_type, EntityType::Deity);
        assert!(gandalf.manual_override);
    }

    #[test]
    fn replaying_twice_equals_once() {
        let mut graph = graph_with_gandalf();
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::CanonicalChange {
                target: "global_person_1".into(),
                canonical: "Mithrandir".into(),
            },
        ));
        apply_corrections(&mut graph, false);
        let first = graph.digest();
        apply_corrections(&mut graph, false);
        assert_eq!(graph.digest(), first);
        let gandalf = graph.entity("global_person_1").unwrap();
        assert_eq!(gandalf.canonical, "Mithrandir");
        assert_eq!(gandalf.aliases, vec!["Gandalf".to_string()]);
    }

    #[test]
    fn rolled_back_entries_are_skipped() {
        let mut graph = graph_with_gandalf();
        let mut c = correction(
            "c1",
            CorrectionKind::EntityReject {
                target: "global_person_1".into(),
            },
        );
        c.rolled_back = true;
        graph.corrections.push(c);
        let outcome = apply_corrections(&mut graph, false);
        assert_eq!(outcome.skipped_rolled_back, 1);
        assert!(!graph.entity("global_person_1").unwrap().rejected);
    }

    #[test]
    fn missing_target_counts_as_conflict() {
        let mut graph = KnowledgeGraph::new();
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::EntityReject {
                target: "global_person_404".into(),
            },
        ));
        let outcome = apply_corrections(&mut graph, false);
        assert_eq!(outcome.conflicts, 1);
        assert_eq!(outcome.applied, 0);
    }

    #[test]
    fn merge_moves_relations_and_unions_aliases() {
        let mut graph = KnowledgeGraph::new();
        graph
            .entities
            .push(entity("global_person_1", EntityType::Person, "Aragorn"));
        graph
            .entities
            .push(entity("global_person_2", EntityType::Person, "Strider"));
        graph
            .entities
            .push(entity("global_place_1", EntityType::Place, "Gondor"));
        graph.relations.push(Relation {
            id: "rel_1".into(),
            subject: "global_person_2".into(),
            predicate: Predicate::TraveledTo,
            object: "global_place_1".into(),
            confidence: 0.8,
            evidence: Vec::new(),
            qualifiers: Vec::new(),
            extractor: ExtractorTag::Dep,
            manual_override: false,
        });
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::EntityMerge {
                primary: "global_person_1".into(),
                secondary: vec!["global_person_2".into()],
                canonical: None,
            },
        ));

        let outcome = apply_corrections(&mut graph, false);
        assert_eq!(outcome.applied, 1);
        assert!(graph.entity("global_person_2").is_none());
        assert_eq!(graph.relations[0].subject, "global_person_1");
        let aragorn = graph.entity("global_person_1").unwrap();
        assert!(aragorn.aliases.iter().any(|a| a == "Strider"));

        // Idempotent: the secondary is gone, replay changes nothing.
        let before = graph.digest();
        apply_corrections(&mut graph, false);
        assert_eq!(graph.digest(), before);
    }

    #[test]
    fn split_removes_original_and_orphaned_relations() {
        let mut graph = KnowledgeGraph::new();
        graph
            .entities
            .push(entity("global_person_1", EntityType::Person, "John"));
        graph
            .entities
            .push(entity("global_place_1", EntityType::Place, "Dale"));
        graph.relations.push(Relation {
            id: "rel_1".into(),
            subject: "global_person_1".into(),
            predicate: Predicate::LivesIn,
            object: "global_place_1".into(),
            confidence: 0.8,
            evidence: Vec::new(),
            qualifiers: Vec::new(),
            extractor: ExtractorTag::Dep,
            manual_override: false,
        });
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::EntitySplit {
                target: "global_person_1".into(),
                into: vec![
                    SplitSpec {
                        canonical: "John the Smith".into(),
                        entity_type: EntityType::Person,
                        aliases: vec![],
                    },
                    SplitSpec {
                        canonical: "John the Admiral".into(),
                        entity_type: EntityType::Person,
                        aliases: vec![],
                    },
                ],
            },
        ));

        let outcome = apply_corrections(&mut graph, false);
        assert_eq!(outcome.applied, 1);
        assert!(graph.entity("global_person_1").is_none());
        assert!(graph.entity("global_person_1_split_1").is_some());
        assert!(graph.entity("global_person_1_split_2").is_some());
        assert!(graph.relations.is_empty());
        assert!(graph.check_integrity().is_ok());

        // Second replay: originals gone, splits present, nothing changes.
        let before = graph.digest();
        apply_corrections(&mut graph, false);
        assert_eq!(graph.digest(), before);
    }

    #[test]
    fn relation_add_requires_existing_endpoints() {
        let mut graph = graph_with_gandalf();
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::RelationAdd {
                relation: Relation {
                    id: "manual_1".into(),
                    subject: "global_person_1".into(),
                    predicate: Predicate::Knows,
                    object: "global_person_404".into(),
                    confidence: 1.0,
                    evidence: Vec::new(),
                    qualifiers: Vec::new(),
                    extractor: ExtractorTag::Manual,
                    manual_override: false,
                },
            },
        ));
        let outcome = apply_corrections(&mut graph, false);
        assert_eq!(outcome.conflicts, 1);
        assert!(graph.relations.is_empty());
    }

    #[test]
    fn conflicts_are_regenerated_after_replay() {
        let mut graph = KnowledgeGraph::new();
        graph
            .entities
            .push(entity("global_person_1", EntityType::Person, "Frodo"));
        graph
            .entities
            .push(entity("global_place_1", EntityType::Place, "Shire"));
        graph
            .entities
            .push(entity("global_place_2", EntityType::Place, "Gondor"));
        for (i, place) in ["global_place_1", "global_place_2"].iter().enumerate() {
            graph.relations.push(Relation {
                id: format!("rel_{}", i + 1),
                subject: "global_person_1".into(),
                predicate: Predicate::BornIn,
                object: place.to_string(),
                confidence: 0.8,
                evidence: Vec::new(),
                qualifiers: Vec::new(),
                extractor: ExtractorTag::Dep,
                manual_override: false,
            });
        }
        graph.corrections.push(correction(
            "c1",
            CorrectionKind::RelationRemove {
                relation_id: "rel_2".into(),
            },
        ));
        apply_corrections(&mut graph, false);
        assert!(graph.conflicts.is_empty());
    }
}
