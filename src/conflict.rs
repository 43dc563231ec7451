//! Conflict detection over the merged relation set.
//!
//! Runs from scratch after every merge and after override replay; the
//! output replaces the previous conflict list wholesale. Relations are
//! never modified here.

use crate::model::{Conflict, ConflictKind, Predicate, QualifierKind, Relation};
use std::collections::BTreeMap;

/// Detect contradictions in the relation set.
pub fn detect(relations: &[Relation]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    // Group by (subject, predicate) once; both rule families consume it.
    let mut by_subject: BTreeMap<(&str, Predicate), Vec<&Relation>> = BTreeMap::new();
    for relation in relations {
        by_subject
            .entry((relation.subject.as_str(), relation.predicate))
            .or_default()
            .push(relation);
    }

    for ((subject, predicate), group) in &by_subject {
        if let Some(limit) = predicate.functional_limit() {
            let mut objects: Vec<&str> = group.iter().map(|r| r.object.as_str()).collect();
            objects.sort_unstable();
            objects.dedup();
            if objects.len() > limit {
                conflicts.push(Conflict {
                    kind: ConflictKind::FunctionalViolation,
                    severity: 3,
                    description: format!(
                        "{} has {} distinct '{}' objects (at most {} allowed)",
                        subject,
                        objects.len(),
                        predicate.as_str(),
                        limit
                    ),
                    relation_ids: group.iter().map(|r| r.id.clone()).collect(),
                });
            }
        }

        if predicate.is_time_bounded() && group.len() > 1 {
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    if a.object == b.object {
                        continue;
                    }
                    if time_overlaps(a, b) {
                        conflicts.push(Conflict {
                            kind: ConflictKind::TemporalOverlap,
                            severity: 2,
                            description: format!(
                                "{} '{}' both {} and {} in overlapping time",
                                subject,
                                predicate.as_str(),
                                a.object,
                                b.object
                            ),
                            relation_ids: vec![a.id.clone(), b.id.clone()],
                        });
                    }
                }
            }
        }
    }

    conflicts
}

/// Two time-bounded relations overlap unless both carry time qualifiers
/// that disagree. Missing qualifiers cannot disambiguate, so they count as
/// overlapping.
fn time_overlaps(a: &Relation, b: &Relation) -> bool {
    let time_of = |r: &Relation| {
        r.qualifiers
            .iter()
            .find(|q| q.kind == QualifierKind::Time)
            .map(|q| q.value.clone())
    };
    match (time_of(a), time_of(b)) {
        (Some(ta), Some(tb)) => ta == tb,
        _ => true,
    }
}

/// Store symmetric relations under a canonical direction: the
/// lexicographically smaller subject id first. Duplicate mirror-image pairs
/// collapse; asymmetric storage of a symmetric predicate heals silently.
pub fn canonicalize_symmetric(relations: &mut Vec<Relation>) {
    for relation in relations.iter_mut() {
        if relation.predicate.is_symmetric() && relation.object < relation.subject {
            std::mem::swap(&mut relation.subject, &mut relation.object);
        }
    }
    let mut seen: Vec<(String, Predicate, String)> = Vec::new();
    relations.retain(|r| {
        if !r.predicate.is_symmetric() {
            return true;
        }
        let key = (r.subject.clone(), r.predicate, r.object.clone());
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
}
