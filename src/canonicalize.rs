//! Local (per-document) canonicalization.
//!
//! Collapses mention variants within one document under the aliasing key
//! `(type, normalized canonical)` and picks the most informative surface as
//! the representative. The output is the document's local entity list, the
//! unit the cross-document merger works in.

use crate::analyzer::ParsedDoc;
use crate::config::ExtractionConfig;
use crate::extract::{Mention, ProfileFact, ProfileFactKind};
use crate::model::{EntityType, MentionSource};
use crate::normalize;
use crate::profile::EntityProfile;
use std::collections::HashMap;

/// A mention-level entity scoped to one document, before merge.
#[derive(Debug, Clone)]
pub struct LocalEntity {
    pub local_id: String,
    pub entity_type: EntityType,
    pub canonical: String,
    /// Aliasing key of the canonical.
    pub normalized: String,
    pub aliases: Vec<String>,
    pub source: MentionSource,
    pub confidence: f64,
    pub profile: EntityProfile,
    /// Indices into the document's mention list.
    pub mentions: Vec<usize>,
    pub booknlp_id: Option<u64>,
}

/// Count of tokens that carry naming information.
pub fn informative_tokens(surface: &str) -> usize {
    surface
        .split_whitespace()
        .filter(|t| !crate::lexicon::is_connector(t))
        .count()
}

/// True when `a` is a better representative surface than `b`.
fn more_informative(a: &Mention, b: &Mention) -> bool {
    if (a.source == MentionSource::Booknlp) != (b.source == MentionSource::Booknlp) {
        return a.source == MentionSource::Booknlp;
    }
    let (ia, ib) = (informative_tokens(&a.surface), informative_tokens(&b.surface));
    if ia != ib {
        return ia > ib;
    }
    let (ta, tb) = (
        a.surface.split_whitespace().count(),
        b.surface.split_whitespace().count(),
    );
    if ta != tb {
        return ta > tb;
    }
    a.surface.len() > b.surface.len()
}

/// Collapse a document's mentions into local entities.
///
/// Returns the local entities plus a map from mention index to local entity
/// index, which relation rewiring consumes.
pub fn canonicalize_local(
    doc_id: &str,
    doc: &ParsedDoc,
    mentions: &[Mention],
    facts: &[ProfileFact],
    config: &ExtractionConfig,
) -> (Vec<LocalEntity>, Vec<usize>) {
    // Group mentions by (type, aliasing key), keyed in first-appearance
    // order so local ids are stable for identical input.
    let mut order: Vec<(EntityType, String)> = Vec::new();
    let mut groups: HashMap<(EntityType, String), Vec<usize>> = HashMap::new();

    let mut sorted: Vec<usize> = (0..mentions.len()).collect();
    sorted.sort_by_key(|&i| {
        let s = &mentions[i].span;
        (s.paragraph, s.sentence, s.token_start)
    });

    for idx in sorted {
        let mention = &mentions[idx];
        let canonical = match normalize::normalize_canonical(mention.entity_type, &mention.surface)
        {
            Ok(c) => c,
            Err(_) => continue,
        };
        let key = (
            mention.entity_type,
            normalize::normalize_for_aliasing(&canonical),
        );
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(idx);
    }

    let now = ares_core::time::now_millis();
    let mut locals = Vec::with_capacity(order.len());
    let mut mention_to_local = vec![usize::MAX; mentions.len()];

    for (n, key) in order.iter().enumerate() {
        let members = &groups[key];
        let rep = *members
            .iter()
            .reduce(|best, cand| {
                if more_informative(&mentions[*cand], &mentions[*best]) {
                    cand
                } else {
                    best
                }
            })
            .expect("non-empty group");
        let rep_mention = &mentions[rep];
        let canonical = normalize::normalize_canonical(rep_mention.entity_type, &rep_mention.surface)
            .expect("representative already passed the gate");

        let mut aliases: Vec<String> = Vec::new();
        for &m in members {
            let surface = &mentions[m].surface;
            if surface.to_lowercase() != canonical.to_lowercase()
                && !aliases.iter().any(|a| a.to_lowercase() == surface.to_lowercase())
            {
                aliases.push(surface.clone());
            }
        }

        let mut profile = EntityProfile::default();
        for &m in members {
            profile.observe_mention(now);
            let span = &mentions[m].span;
            if let Some(sentence) = doc
                .paragraphs
                .get(span.paragraph)
                .and_then(|p| p.sentences.get(span.sentence))
            {
                let context: String = sentence
                    .tokens
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                profile.push_context(&context, config.profile_context_cap);
            }
        }
        for fact in facts {
            if members.contains(&fact.mention) {
                match fact.kind {
                    ProfileFactKind::Descriptor => profile.add_descriptor(&fact.value),
                    ProfileFactKind::Role => profile.add_role(&fact.value),
                    ProfileFactKind::Title => profile.add_title(&fact.value),
                }
            }
        }
        profile.confidence = members
            .iter()
            .map(|&m| mentions[m].confidence)
            .fold(0.0, f64::max);

        for &m in members {
            mention_to_local[m] = n;
        }

        locals.push(LocalEntity {
            local_id: format!("{}::e{}", doc_id, n + 1),
            entity_type: key.0,
            canonical,
            normalized: key.1.clone(),
            aliases,
            source: rep_mention.source,
            confidence: profile.confidence,
            profile,
            mentions: members.clone(),
            booknlp_id: members.iter().find_map(|&m| mentions[m].booknlp_id),
        });
    }

    (locals, mention_to_local)
}
