//! Accumulating per-entity profiles.
//!
//! A profile never embeds entity records, only plain strings; the graph owns
//! an arena of profiles keyed by global id, and lookups return borrowed
//! references. Context windows are a bounded FIFO so long corpora cannot
//! grow a profile without limit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Weight of context overlap in profile similarity.
const W_CONTEXT: f64 = 0.5;
/// Weight of descriptor overlap.
const W_DESCRIPTORS: f64 = 0.3;
/// Weight of title overlap.
const W_TITLES: f64 = 0.2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    #[serde(default)]
    pub descriptors: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub titles: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub contexts: VecDeque<String>,
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub mention_count: u64,
    #[serde(default)]
    pub confidence: f64,
}

impl EntityProfile {
    pub fn add_descriptor(&mut self, descriptor: &str) {
        self.descriptors.insert(descriptor.to_lowercase());
    }

    pub fn add_role(&mut self, role: &str) {
        self.roles.insert(role.to_lowercase());
    }

    pub fn add_title(&mut self, title: &str) {
        self.titles.insert(title.to_lowercase());
    }

    pub fn add_attribute(&mut self, key: &str, value: &str) {
        self.attributes
            .entry(key.to_lowercase())
            .or_default()
            .insert(value.to_string());
    }

    pub fn push_context(&mut self, snippet: &str, cap: usize) {
        self.contexts.push_back(snippet.to_string());
        while self.contexts.len() > cap {
            self.contexts.pop_front();
        }
    }

    pub fn observe_mention(&mut self, now: u64) {
        self.mention_count += 1;
        self.last_seen = now;
    }

    /// Union another profile into this one, respecting the context cap.
    pub fn merge(&mut self, other: &EntityProfile, context_cap: usize) {
        self.descriptors.extend(other.descriptors.iter().cloned());
        self.roles.extend(other.roles.iter().cloned());
        self.titles.extend(other.titles.iter().cloned());
        for (key, values) in &other.attributes {
            self.attributes
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        for context in &other.contexts {
            if !self.contexts.contains(context) {
                self.contexts.push_back(context.clone());
            }
        }
        while self.contexts.len() > context_cap {
            self.contexts.pop_front();
        }
        self.mention_count += other.mention_count;
        self.last_seen = self.last_seen.max(other.last_seen);
        self.confidence = self.confidence.max(other.confidence);
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
            && self.roles.is_empty()
            && self.titles.is_empty()
            && self.contexts.is_empty()
    }

    /// Lowercased tokens of all context windows.
    fn context_tokens(&self) -> BTreeSet<String> {
        self.contexts
            .iter()
            .flat_map(|c| c.split_whitespace())
            .map(|t| {
                t.trim_matches(|ch: char| !ch.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect()
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Weighted profile similarity: context 0.5, descriptors 0.3, titles 0.2.
/// Components empty on both sides drop out and the weights renormalize; two
/// profiles with nothing in common score 0.
pub fn similarity(a: &EntityProfile, b: &EntityProfile) -> f64 {
    let mut score = 0.0;
    let mut weight = 0.0;

    let (ca, cb) = (a.context_tokens(), b.context_tokens());
    if !ca.is_empty() || !cb.is_empty() {
        score += W_CONTEXT * jaccard(&ca, &cb);
        weight += W_CONTEXT;
    }
    if !a.descriptors.is_empty() || !b.descriptors.is_empty() {
        score += W_DESCRIPTORS * jaccard(&a.descriptors, &b.descriptors);
        weight += W_DESCRIPTORS;
    }
    if !a.titles.is_empty() || !b.titles.is_empty() {
        score += W_TITLES * jaccard(&a.titles, &b.titles);
        weight += W_TITLES;
    }

    if weight == 0.0 {
        return 0.0;
    }
    score / weight
}

/// Affinity between a descriptor phrase's tokens and a profile, for linking
/// "the wizard" to a candidate. Containment of the phrase tokens in each
/// term set, weighted descriptors > titles > roles over non-empty sets.
pub fn descriptor_affinity(profile: &EntityProfile, tokens: &BTreeSet<String>) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let containment = |set: &BTreeSet<String>| {
        tokens.iter().filter(|t| set.contains(*t)).count() as f64 / tokens.len() as f64
    };

    let mut score = 0.0;
    let mut weight = 0.0;
    for (set, w) in [
        (&profile.descriptors, 0.5),
        (&profile.titles, 0.3),
        (&profile.roles, 0.2),
    ] {
        if !set.is_empty() {
            score += w * containment(set);
            weight += w;
        }
    }
    if weight == 0.0 {
        return 0.0;
    }
    score / weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(descriptors: &[&str], contexts: &[&str]) -> EntityProfile {
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
    fn context_fifo_is_bounded() {
        let mut p = EntityProfile::default();
        for i in 0..30 {
            p.push_context(&format!("context {}", i), 20);
        }
        assert_eq!(p.contexts.len(), 20);
        assert_eq!(p.contexts.front().unwrap(), "context 10");
    }

    #[test]
    fn identical_profiles_score_one() {
        let a = profile(&["wizard"], &["a wizard of the west"]);
        let b = profile(&["wizard"], &["a wizard of the west"]);
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_profiles_score_zero() {
        let a = profile(&["wizard"], &["casts spells"]);
        let b = profile(&["fruit"], &["grows in orchards"]);
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn empty_components_renormalize() {
        // Only descriptors populated: the 0.3 weight renormalizes to 1.0.
        let a = profile(&["wizard"], &[]);
        let b = profile(&["wizard"], &[]);
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn descriptor_affinity_matches_single_token() {
        let p = profile(&["wizard"], &[]);
        let tokens: BTreeSet<String> = ["wizard".to_string()].into_iter().collect();
        assert!((descriptor_affinity(&p, &tokens) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn descriptor_affinity_misses_unrelated_token() {
        let p = profile(&["wizard"], &[]);
        let tokens: BTreeSet<String> = ["king".to_string()].into_iter().collect();
        assert_eq!(descriptor_affinity(&p, &tokens), 0.0);
    }

    #[test]
    fn merge_unions_and_caps() {
        let mut a = profile(&["wizard"], &["one"]);
        let b = profile(&["pilgrim"], &["two"]);
        a.merge(&b, 20);
        assert!(a.descriptors.contains("wizard"));
        assert!(a.descriptors.contains("pilgrim"));
        assert_eq!(a.contexts.len(), 2);
    }
}
