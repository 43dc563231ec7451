//! Entity mention extraction.
//!
//! Consumes analyzer output and emits typed mentions with provenance. Four
//! sources feed one claims table keyed by token span; when sources disagree
//! over the same span the higher-priority source wins, and spans fully
//! contained in an equal-or-stronger claim are dropped. Every surviving
//! surface must pass the canonical normalizer's gate.

use super::{Mention, MentionSpan};
use crate::analyzer::{ParsedDoc, ParsedSentence};
use crate::config::ExtractionConfig;
use crate::error::SurfaceReject;
use crate::extract::patterns::CompiledPatterns;
use crate::lexicon::{self, Whitelist};
use crate::model::{EntityType, MentionSource};
use crate::normalize;
use std::collections::HashMap;

/// Verbs whose direct object is a physical thing worth extracting even when
/// it is a common noun ("ate an apple", "wielded the hammer").
const ITEM_OBJECT_VERBS: &[&str] = &[
    "eat", "drink", "carry", "wield", "hold", "wear", "forge", "steal", "buy", "sell",
];

#[derive(Debug, Clone)]
struct Claim {
    surface: String,
    entity_type: EntityType,
    source: MentionSource,
    pattern_confidence: Option<f64>,
    booknlp_id: Option<u64>,
}

pub struct MentionExtractor<'a> {
    config: &'a ExtractionConfig,
    whitelist: &'a Whitelist,
    debug: bool,
}

impl<'a> MentionExtractor<'a> {
    pub fn new(config: &'a ExtractionConfig, whitelist: &'a Whitelist, debug: bool) -> Self {
        Self {
            config,
            whitelist,
            debug,
        }
    }

    /// Extract mentions from parsed output. At most one mention survives per
    /// token span.
    pub fn extract(
        &self,
        doc: &ParsedDoc,
        patterns: Option<&CompiledPatterns>,
    ) -> Vec<Mention> {
        let mut claims: HashMap<MentionSpan, Claim> = HashMap::new();

        for (p_idx, paragraph) in doc.paragraphs.iter().enumerate() {
            for (s_idx, sentence) in paragraph.sentences.iter().enumerate() {
                self.claim_whitelist(p_idx, s_idx, sentence, &mut claims);
                self.claim_ner(p_idx, s_idx, sentence, &mut claims);
                self.claim_dep_objects(p_idx, s_idx, sentence, &mut claims);
                if let Some(compiled) = patterns {
                    self.claim_patterns(p_idx, s_idx, sentence, compiled, &mut claims);
                }
            }
        }

        self.claim_booknlp(doc, &mut claims);
        self.resolve(claims)
    }

    fn claim(
        &self,
        claims: &mut HashMap<MentionSpan, Claim>,
        span: MentionSpan,
        claim: Claim,
    ) {
        match claims.get(&span) {
            Some(existing) if existing.source.priority() >= claim.source.priority() => {}
            _ => {
                claims.insert(span, claim);
            }
        }
    }

    fn claim_ner(
        &self,
        paragraph: usize,
        sentence_idx: usize,
        sentence: &ParsedSentence,
        claims: &mut HashMap<MentionSpan, Claim>,
    ) {
        for span in &sentence.spans {
            let Some(entity_type) = EntityType::parse(&span.kind) else {
                continue;
            };
            if span.start >= span.end || span.end > sentence.tokens.len() {
                continue;
            }
            let surface = join_tokens(sentence, span.start, span.end);
            self.claim(
                claims,
                MentionSpan {
                    paragraph,
                    sentence: sentence_idx,
                    token_start: span.start,
                    token_len: span.end - span.start,
                },
                Claim {
                    surface,
                    entity_type,
                    source: MentionSource::Ner,
                    pattern_confidence: None,
                    booknlp_id: None,
                },
            );
        }
    }

    fn claim_whitelist(
        &self,
        paragraph: usize,
        sentence_idx: usize,
        sentence: &ParsedSentence,
        claims: &mut HashMap<MentionSpan, Claim>,
    ) {
        if self.whitelist.is_empty() {
            return;
        }
        let n = sentence.tokens.len();
        for start in 0..n {
            for len in (1..=4usize.min(n - start)).rev() {
                let surface = join_tokens(sentence, start, start + len);
                if let Some(type_name) = self.whitelist.lookup(&surface) {
                    if let Some(entity_type) = EntityType::parse(type_name) {
                        self.claim(
                            claims,
                            MentionSpan {
                                paragraph,
                                sentence: sentence_idx,
                                token_start: start,
                                token_len: len,
                            },
                            Claim {
                                surface,
                                entity_type,
                                source: MentionSource::Whitelist,
                                pattern_confidence: None,
                                booknlp_id: None,
                            },
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Common-noun direct objects of the item-verb class.
    fn claim_dep_objects(
        &self,
        paragraph: usize,
        sentence_idx: usize,
        sentence: &ParsedSentence,
        claims: &mut HashMap<MentionSpan, Claim>,
    ) {
        let root = sentence.root_index;
        let Some(root_token) = sentence.tokens.get(root) else {
            return;
        };
        if !ITEM_OBJECT_VERBS.contains(&root_token.lemma.as_str()) {
            return;
        }
        for (i, token) in sentence.tokens.iter().enumerate() {
            if token.dep == "obj" && token.pos == "NOUN" && token.head == root {
                self.claim(
                    claims,
                    MentionSpan {
                        paragraph,
                        sentence: sentence_idx,
                        token_start: i,
                        token_len: 1,
                    },
                    Claim {
                        surface: token.text.clone(),
                        entity_type: EntityType::Item,
                        source: MentionSource::Dep,
                        pattern_confidence: None,
                        booknlp_id: None,
                    },
                );
            }
        }
    }

    fn claim_patterns(
        &self,
        paragraph: usize,
        sentence_idx: usize,
        sentence: &ParsedSentence,
        compiled: &CompiledPatterns,
        claims: &mut HashMap<MentionSpan, Claim>,
    ) {
        if compiled.is_empty() || sentence.tokens.is_empty() {
            return;
        }
        // Reconstruct a joined sentence string with a map back to tokens, so
        // the same template text works regardless of analyzer whitespace.
        let mut joined = String::new();
        let mut starts = Vec::with_capacity(sentence.tokens.len());
        for token in &sentence.tokens {
            if !joined.is_empty() {
                joined.push(' ');
            }
            starts.push(joined.len());
            joined.push_str(&token.text);
        }

        for hit in compiled.apply(&joined) {
            let Some(token_start) = starts.iter().position(|s| *s == hit.start) else {
                continue;
            };
            let Some(token_end) = starts
                .iter()
                .enumerate()
                .find(|(i, s)| **s + sentence.tokens[*i].text.len() == hit.end)
                .map(|(i, _)| i + 1)
            else {
                continue;
            };
            self.claim(
                claims,
                MentionSpan {
                    paragraph,
                    sentence: sentence_idx,
                    token_start,
                    token_len: token_end - token_start,
                },
                Claim {
                    surface: joined[hit.start..hit.end].to_string(),
                    entity_type: hit.entity_type,
                    source: MentionSource::Pattern,
                    pattern_confidence: Some(hit.confidence),
                    booknlp_id: None,
                },
            );
        }
    }

    fn claim_booknlp(&self, doc: &ParsedDoc, claims: &mut HashMap<MentionSpan, Claim>) {
        for mention in &doc.mentions {
            let Some((sentence_idx, local_start)) =
                locate(doc, mention.paragraph, mention.token_start)
            else {
                continue;
            };
            let entity_type = doc
                .characters
                .iter()
                .find(|c| c.id == mention.character_id)
                .and_then(|c| c.entity_type.as_deref())
                .and_then(EntityType::parse)
                .unwrap_or(EntityType::Person);
            self.claim(
                claims,
                MentionSpan {
                    paragraph: mention.paragraph,
                    sentence: sentence_idx,
                    token_start: local_start,
                    token_len: mention.token_len,
                },
                Claim {
                    surface: mention.text.clone(),
                    entity_type,
                    source: MentionSource::Booknlp,
                    pattern_confidence: None,
                    booknlp_id: Some(mention.character_id),
                },
            );
        }
    }

    /// Containment dedup, frequency counting, confidence scoring, and the
    /// canonical-normalizer gate.
    fn resolve(&self, claims: HashMap<MentionSpan, Claim>) -> Vec<Mention> {
        let mut entries: Vec<(MentionSpan, Claim)> = claims.into_iter().collect();
        // Deterministic processing order: position, then longer span first.
        entries.sort_by(|(a, _), (b, _)| {
            (a.paragraph, a.sentence, a.token_start, std::cmp::Reverse(a.token_len)).cmp(&(
                b.paragraph,
                b.sentence,
                b.token_start,
                std::cmp::Reverse(b.token_len),
            ))
        });

        let mut kept: Vec<(MentionSpan, Claim)> = Vec::new();
        for (span, claim) in entries {
            let contained = kept.iter().find(|(k, _)| contains(k, &span));
            match contained {
                Some((_, covering)) if covering.source.priority() >= claim.source.priority() => {
                    continue;
                }
                _ => kept.push((span, claim)),
            }
        }

        let mut frequency: HashMap<String, u64> = HashMap::new();
        for (_, claim) in &kept {
            *frequency
                .entry(normalize::normalize_for_aliasing(&claim.surface))
                .or_default() += 1;
        }

        let mut mentions = Vec::with_capacity(kept.len());
        for (span, claim) in kept {
            match normalize::normalize_canonical(claim.entity_type, &claim.surface) {
                Ok(_) => {}
                Err(reject) => {
                    self.log_reject(&claim.surface, &reject);
                    continue;
                }
            }
            let confidence = self.score(&claim, &frequency);
            mentions.push(Mention {
                surface: claim.surface,
                entity_type: claim.entity_type,
                span,
                source: claim.source,
                confidence,
                booknlp_id: claim.booknlp_id,
            });
        }
        mentions
    }

    fn score(&self, claim: &Claim, frequency: &HashMap<String, u64>) -> f64 {
        let base = claim
            .pattern_confidence
            .unwrap_or_else(|| claim.source.base_weight());
        let occurrences = frequency
            .get(&normalize::normalize_for_aliasing(&claim.surface))
            .copied()
            .unwrap_or(1);
        let bonus = (self.config.frequency_bonus * (occurrences.saturating_sub(1)) as f64)
            .min(self.config.frequency_bonus_cap);
        let penalty = if lexicon::is_generic_surface(&claim.surface) {
            self.config.generic_penalty
        } else {
            0.0
        };
        (base + bonus - penalty).clamp(0.0, 1.0)
    }

    fn log_reject(&self, surface: &str, reject: &SurfaceReject) {
        if self.debug {
            tracing::debug!(surface, reason = %reject, "mention surface rejected");
        }
    }
}

fn join_tokens(sentence: &ParsedSentence, start: usize, end: usize) -> String {
    sentence.tokens[start..end]
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains(outer: &MentionSpan, inner: &MentionSpan) -> bool {
    outer.paragraph == inner.paragraph
        && outer.sentence == inner.sentence
        && outer.token_start <= inner.token_start
        && outer.token_start + outer.token_len >= inner.token_start + inner.token_len
        && outer.token_len > inner.token_len
}

/// Map a paragraph-relative token index to (sentence index, sentence-local
/// token index).
pub fn locate(doc: &ParsedDoc, paragraph: usize, para_token: usize) -> Option<(usize, usize)> {
    let para = doc.paragraphs.get(paragraph)?;
    let mut offset = 0;
    for (idx, sentence) in para.sentences.iter().enumerate() {
        if para_token < offset + sentence.tokens.len() {
            return Some((idx, para_token - offset));
        }
        offset += sentence.tokens.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzeRequest, Analyzer, HeuristicAnalyzer};

    fn parse(text: &str) -> ParsedDoc {
        HeuristicAnalyzer
            .analyze(&AnalyzeRequest {
                text: text.to_string(),
                doc_id: None,
                options: None,
            })
            .unwrap()
    }

    fn extract(text: &str, whitelist: &Whitelist) -> Vec<Mention> {
        let config = ExtractionConfig::default();
        let extractor = MentionExtractor::new(&config, whitelist, false);
        extractor.extract(&parse(text), None)
    }

    #[test]
    fn ner_span_becomes_typed_mention() {
        let mentions = extract("The wizard traveled to Rivendell.", &Whitelist::default());
        let riv = mentions.iter().find(|m| m.surface == "Rivendell").unwrap();
        assert_eq!(riv.entity_type, EntityType::Place);
        assert_eq!(riv.source, MentionSource::Ner);
        assert!((riv.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn multi_token_name_is_one_mention() {
        let mentions = extract("Gandalf the Grey is a wizard.", &Whitelist::default());
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].surface, "Gandalf the Grey");
        assert_eq!(mentions[0].span.token_len, 3);
    }

    #[test]
    fn whitelist_outranks_ner() {
        let whitelist = Whitelist::from_pairs([("Rivendell", "HOUSE")]);
        let mentions = extract("The wizard traveled to Rivendell.", &whitelist);
        let riv = mentions.iter().find(|m| m.surface == "Rivendell").unwrap();
        assert_eq!(riv.entity_type, EntityType::House);
        assert_eq!(riv.source, MentionSource::Whitelist);
    }

    #[test]
    fn item_object_of_eat_is_extracted() {
        let mentions = extract("She ate an apple in the garden.", &Whitelist::default());
        let apple = mentions.iter().find(|m| m.surface == "apple").unwrap();
        assert_eq!(apple.entity_type, EntityType::Item);
        assert_eq!(apple.source, MentionSource::Dep);
    }

    #[test]
    fn pronoun_subjects_are_not_mentions() {
        let mentions = extract("He became king there.", &Whitelist::default());
        assert!(mentions.is_empty());
    }

    #[test]
    fn one_mention_per_span_with_source_priority() {
        let whitelist = Whitelist::from_pairs([("Gandalf the Grey", "PERSON")]);
        let mentions = extract("Gandalf the Grey is a wizard.", &whitelist);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].source, MentionSource::Whitelist);
        assert!((mentions[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn frequency_bonus_caps() {
        let text = "Frodo walked. Frodo walked. Frodo walked. Frodo walked. \
                    Frodo walked. Frodo walked. Frodo walked.";
        let mentions = extract(text, &Whitelist::default());
        let frodo: Vec<_> = mentions.iter().filter(|m| m.surface == "Frodo").collect();
        assert_eq!(frodo.len(), 7);
        // base 0.85 + capped bonus 0.10
        assert!((frodo[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn booknlp_mentions_carry_stable_ids() {
        let mut doc = parse("Bilbo walked.");
        doc.characters.push(crate::analyzer::BookCharacter {
            id: 11,
            name: "Bilbo".into(),
            entity_type: Some("PERSON".into()),
        });
        doc.mentions.push(crate::analyzer::BookMention {
            character_id: 11,
            text: "Bilbo".into(),
            paragraph: 0,
            token_start: 0,
            token_len: 1,
        });
        let config = ExtractionConfig::default();
        let whitelist = Whitelist::default();
        let extractor = MentionExtractor::new(&config, &whitelist, false);
        let mentions = extractor.extract(&doc, None);
        let bilbo = mentions.iter().find(|m| m.surface == "Bilbo").unwrap();
        assert_eq!(bilbo.source, MentionSource::Booknlp);
        assert_eq!(bilbo.booknlp_id, Some(11));
    }
}
