//! Cross-document merging.
//!
//! Takes the full local-entity population — priors reconstructed from
//! provenance plus the new document's locals, in doc append order — and
//! clusters them into global entities. The visitation order is the only
//! source of ordinal assignment, which is what makes the same input
//! sequence always produce the same global ids.

use crate::canonicalize::{informative_tokens, LocalEntity};
use crate::config::ExtractionConfig;
use crate::model::{MentionSource, MergeStats};
use crate::profile::{self, EntityProfile};
use crate::sense::{self, SenseDecision};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct GlobalEntity {
    pub global_id: String,
    pub entity_type: crate::model::EntityType,
    pub canonical: String,
    pub normalized: String,
    pub aliases: Vec<String>,
    pub source: MentionSource,
    pub confidence: f64,
    pub profile: EntityProfile,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub globals: Vec<GlobalEntity>,
    pub id_map: HashMap<String, String>,
    pub stats: MergeStats,
}

pub struct Merger<'a> {
    config: &'a ExtractionConfig,
    debug: bool,
}

struct Cluster {
    members: Vec<usize>,
    /// Minimum pairwise merge confidence; singletons keep their own
    /// extraction confidence.
    confidence: f64,
}

impl<'a> Merger<'a> {
    pub fn new(config: &'a ExtractionConfig, debug: bool) -> Self {
        Self { config, debug }
    }

    pub fn merge(&self, locals: &[LocalEntity]) -> MergeOutcome {
        let mut clusters: Vec<Cluster> = Vec::new();

        for (idx, local) in locals.iter().enumerate() {
            let mut assigned = false;
            for cluster in clusters.iter_mut() {
                if let Some(pairwise) = self.cluster_match(local, cluster, locals) {
                    cluster.confidence = cluster.confidence.min(pairwise);
                    cluster.members.push(idx);
                    assigned = true;
                    if self.debug {
                        tracing::debug!(
                            local = %local.local_id,
                            canonical = %local.canonical,
                            confidence = pairwise,
                            "merged into existing cluster"
                        );
                    }
                    break;
                }
            }
            if !assigned {
                clusters.push(Cluster {
                    members: vec![idx],
                    confidence: local.confidence,
                });
            }
        }

        self.build_outcome(locals, clusters)
    }

    /// Merge compatibility of a local against a cluster: best pairwise
    /// confidence against any member, or None when incompatible.
    fn cluster_match(
        &self,
        local: &LocalEntity,
        cluster: &Cluster,
        locals: &[LocalEntity],
    ) -> Option<f64> {
        let mut best: Option<f64> = None;
        for &member_idx in &cluster.members {
            let member = &locals[member_idx];
            if !local.entity_type.mergeable_with(&member.entity_type) {
                continue;
            }
            if local.normalized == member.normalized {
                // Same name and type family: the sense disambiguator has the
                // final word on whether the profiles diverge into homonyms.
                let (decision, _) = sense::decide(&local.profile, &member.profile, self.config);
                match decision {
                    SenseDecision::Same => return Some(1.0),
                    SenseDecision::DifferentLowConfidence | SenseDecision::Different => {
                        continue;
                    }
                }
            }
            if alias_norms(local).intersection(&alias_norms(member)).next().is_some() {
                best = Some(best.map_or(0.9, |b: f64| b.max(0.9)));
                continue;
            }
            let sim = profile::similarity(&local.profile, &member.profile);
            if sim >= self.config.merge_similarity_threshold {
                best = Some(best.map_or(sim, |b: f64| b.max(sim)));
            }
        }
        best
    }

    fn build_outcome(&self, locals: &[LocalEntity], clusters: Vec<Cluster>) -> MergeOutcome {
        let mut globals = Vec::with_capacity(clusters.len());
        let mut id_map = HashMap::new();
        let mut ordinals: HashMap<&'static str, usize> = HashMap::new();
        let mut merged_clusters = 0usize;
        let mut confidence_sum = 0.0;
        let mut low_confidence_count = 0usize;

        for cluster in &clusters {
            let rep_idx = *cluster
                .members
                .iter()
                .reduce(|best, cand| {
                    if more_informative(&locals[*cand], &locals[*best]) {
                        cand
                    } else {
                        best
                    }
                })
                .expect("cluster has members");
            let rep = &locals[rep_idx];

            let type_name = rep.entity_type.as_str();
            let ordinal = ordinals.entry(type_name).or_insert(0);
            *ordinal += 1;
            let global_id = format!("global_{}_{}", type_name.to_lowercase(), ordinal);

            let mut aliases: Vec<String> = Vec::new();
            let mut profile = EntityProfile::default();
            for &member_idx in &cluster.members {
                let member = &locals[member_idx];
                id_map.insert(member.local_id.clone(), global_id.clone());
                profile.merge(&member.profile, self.config.profile_context_cap);
                for surface in std::iter::once(&member.canonical).chain(member.aliases.iter()) {
                    if surface.to_lowercase() != rep.canonical.to_lowercase()
                        && !aliases
                            .iter()
                            .any(|a| a.to_lowercase() == surface.to_lowercase())
                    {
                        aliases.push(surface.clone());
                    }
                }
            }

            if cluster.members.len() > 1 {
                merged_clusters += 1;
            }
            confidence_sum += cluster.confidence;
            if cluster.confidence < self.config.low_confidence_threshold {
                low_confidence_count += 1;
            }

            globals.push(GlobalEntity {
                global_id,
                entity_type: rep.entity_type,
                canonical: rep.canonical.clone(),
                normalized: rep.normalized.clone(),
                aliases,
                source: rep.source,
                confidence: cluster.confidence,
                profile,
            });
        }

        let stats = MergeStats {
            total_entities: globals.len(),
            merged_clusters,
            avg_confidence: if globals.is_empty() {
                0.0
            } else {
                confidence_sum / globals.len() as f64
            },
            low_confidence_count,
        };

        if self.debug {
            tracing::debug!(
                total = stats.total_entities,
                merged = stats.merged_clusters,
                low_confidence = stats.low_confidence_count,
                "cross-document merge complete"
            );
        }

        MergeOutcome {
            globals,
            id_map,
            stats,
        }
    }
}

/// All normalized surfaces a local entity answers to.
fn alias_norms(local: &LocalEntity) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    set.insert(local.normalized.clone());
    for alias in &local.aliases {
        set.insert(crate::normalize::normalize_for_aliasing(alias));
    }
    set
}

fn more_informative(a: &LocalEntity, b: &LocalEntity) -> bool {
    if (a.source == MentionSource::Booknlp) != (b.source == MentionSource::Booknlp) {
        return a.source == MentionSource::Booknlp;
    }
    let (ia, ib) = (
        informative_tokens(&a.canonical),
        informative_tokens(&b.canonical),
    );
    if ia != ib {
        return ia > ib;
    }
    let (ta, tb) = (
        a.canonical.split_whitespace().count(),
        b.canonical.split_whitespace().count(),
    );
    if ta != tb {
        return ta > tb;
    }
    a.canonical.len() > b.canonical.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityType;

    fn local(
        id: &str,
        entity_type: EntityType,
        canonical: &str,
        aliases: &[&str],
        descriptors: &[&str],
    ) -> LocalEntity {
        let mut profile = EntityProfile::default();
        for d in descriptors {
            profile.add_descriptor(d);
        }
        LocalEntity {
            local_id: id.to_string(),
            entity_type,
            canonical: canonical.to_string(),
            normalized: crate::normalize::normalize_for_aliasing(canonical),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            source: MentionSource::Ner,
            confidence: 0.85,
            profile,
            mentions: Vec::new(),
            booknlp_id: None,
        }
    }

    fn merge(locals: &[LocalEntity]) -> MergeOutcome {
        let config = ExtractionConfig::default();
        Merger::new(&config, false).merge(locals)
    }

    #[test]
    fn equal_canonicals_merge() {
        let locals = vec![
            local("d1::e1", EntityType::Person, "Gandalf the Grey", &[], &["wizard"]),
            local("d2::e1", EntityType::Person, "Gandalf the Grey", &[], &[]),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.globals.len(), 1);
        assert_eq!(outcome.stats.merged_clusters, 1);
        assert_eq!(
            outcome.id_map["d1::e1"], outcome.id_map["d2::e1"],
        );
    }

    #[test]
    fn alias_intersection_merges() {
        let locals = vec![
            local("d1::e1", EntityType::Person, "Aragorn", &["Strider"], &[]),
            local("d2::e1", EntityType::Person, "Strider", &[], &[]),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.globals.len(), 1);
        let global = &outcome.globals[0];
        assert!(global.aliases.iter().any(|a| a == "Strider"));
    }

    #[test]
    fn place_and_org_never_merge() {
        let locals = vec![
            local("d1::e1", EntityType::Place, "Rohan", &[], &[]),
            local("d2::e1", EntityType::Org, "Rohan", &[], &[]),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.globals.len(), 2);
    }

    #[test]
    fn org_and_house_merge_under_relaxation() {
        let locals = vec![
            local("d1::e1", EntityType::Org, "Stark", &[], &[]),
            local("d2::e1", EntityType::House, "Stark", &[], &[]),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.globals.len(), 1);
    }

    #[test]
    fn divergent_profiles_split_homonyms() {
        let locals = vec![
            local("d1::e1", EntityType::Person, "John", &[], &["blacksmith"]),
            local("d2::e1", EntityType::Person, "John", &[], &["admiral"]),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.globals.len(), 2);
    }

    #[test]
    fn global_ids_are_deterministic_per_type_ordinal() {
        let locals = vec![
            local("d1::e1", EntityType::Person, "Frodo", &[], &[]),
            local("d1::e2", EntityType::Place, "Mordor", &[], &[]),
            local("d1::e3", EntityType::Person, "Sam", &[], &[]),
        ];
        let a = merge(&locals);
        let b = merge(&locals);
        let ids_a: Vec<&str> = a.globals.iter().map(|g| g.global_id.as_str()).collect();
        let ids_b: Vec<&str> = b.globals.iter().map(|g| g.global_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(
            ids_a,
            vec!["global_person_1", "global_place_1", "global_person_2"]
        );
    }

    #[test]
    fn representative_is_most_informative_member() {
        let locals = vec![
            local("d1::e1", EntityType::Person, "Gandalf", &[], &[]),
            local(
                "d2::e1",
                EntityType::Person,
                "Gandalf the Grey",
                &["Gandalf"],
                &[],
            ),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.globals.len(), 1);
        assert_eq!(outcome.globals[0].canonical, "Gandalf the Grey");
        assert!(outcome.globals[0].aliases.iter().any(|a| a == "Gandalf"));
    }

    #[test]
    fn stats_count_low_confidence_merges() {
        // Profile-similarity merge right at the threshold yields a cluster
        // confidence below the low-confidence bar only when sim < 0.7, so
        // an exact-name merge stays clean.
        let locals = vec![
            local("d1::e1", EntityType::Person, "Frodo", &[], &[]),
            local("d2::e1", EntityType::Person, "Frodo", &[], &[]),
        ];
        let outcome = merge(&locals);
        assert_eq!(outcome.stats.low_confidence_count, 0);
        assert!(outcome.stats.avg_confidence >= 0.7);
    }
}
