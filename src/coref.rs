//! Coreference resolution.
//!
//! Links pronouns and descriptor noun phrases back to mentions. Two hard
//! rules shape this module: the subject of the previous sentence beats any
//! entity introduced inside a same-sentence appositive, and a pronoun is
//! never linked past the configured sentence horizon. Every link records the
//! method that produced it.

use crate::analyzer::ParsedDoc;
use crate::config::ExtractionConfig;
use crate::extract::{Mention, MentionSpan};
use crate::lexicon;
use crate::model::EntityType;
use crate::profile::{self, EntityProfile};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorefMethod {
    SentenceSubject,
    DescriptorProfile,
    TitleMatch,
    Appositive,
}

impl CorefMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorefMethod::SentenceSubject => "sentence_subject",
            CorefMethod::DescriptorProfile => "descriptor_profile",
            CorefMethod::TitleMatch => "title_match",
            CorefMethod::Appositive => "appositive",
        }
    }
}

/// What a span resolved to: a mention in this document, or a global entity
/// matched through its accumulated profile.
#[derive(Debug, Clone)]
pub enum CorefTarget {
    Mention(usize),
    Global {
        global_id: String,
        canonical: String,
        entity_type: EntityType,
    },
}

#[derive(Debug, Clone)]
pub struct CorefLink {
    pub span: MentionSpan,
    pub surface: String,
    pub target: CorefTarget,
    pub method: CorefMethod,
    pub confidence: f64,
}

/// A prior global entity offered as a descriptor-resolution candidate.
pub struct GlobalCandidate<'a> {
    pub global_id: &'a str,
    pub canonical: &'a str,
    pub entity_type: EntityType,
    pub profile: &'a EntityProfile,
}

pub struct CorefResolver<'a> {
    config: &'a ExtractionConfig,
    debug: bool,
}

/// Per-sentence view of where mentions sit grammatically.
struct SentenceMentions {
    /// Mention index of the clause subject, if any.
    subject: Option<usize>,
    /// All non-appositive mentions, in token order.
    mentions: Vec<usize>,
}

impl<'a> CorefResolver<'a> {
    pub fn new(config: &'a ExtractionConfig, debug: bool) -> Self {
        Self { config, debug }
    }

    pub fn resolve(
        &self,
        doc: &ParsedDoc,
        mentions: &[Mention],
        globals: &[GlobalCandidate<'_>],
    ) -> Vec<CorefLink> {
        let token_owner = token_owner_map(mentions);
        let local_profiles = copular_profiles(doc, &token_owner);
        let sentence_table = sentence_mentions(doc, mentions);
        let mut links = Vec::new();

        let mut sentence_abs = 0usize;
        for (p_idx, paragraph) in doc.paragraphs.iter().enumerate() {
            for (s_idx, sentence) in paragraph.sentences.iter().enumerate() {
                for (t_idx, token) in sentence.tokens.iter().enumerate() {
                    if token.pos == "PRON" {
                        if let Some(link) = self.resolve_pronoun(
                            mentions,
                            &sentence_table,
                            sentence_abs,
                            p_idx,
                            s_idx,
                            t_idx,
                            &token.lemma,
                        ) {
                            links.push(link);
                        }
                    } else if token.pos == "NOUN"
                        && lexicon::is_descriptor_noun(&token.text)
                        && !lexicon::is_kinship_noun(&token.text)
                    {
                        if let Some(link) = self.resolve_descriptor(
                            doc,
                            mentions,
                            &sentence_table,
                            &local_profiles,
                            globals,
                            sentence_abs,
                            p_idx,
                            s_idx,
                            t_idx,
                        ) {
                            links.push(link);
                        }
                    }
                }
                sentence_abs += 1;
            }
        }
        links
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_pronoun(
        &self,
        mentions: &[Mention],
        table: &[SentenceMentions],
        sentence_abs: usize,
        paragraph: usize,
        sentence: usize,
        token: usize,
        lemma: &str,
    ) -> Option<CorefLink> {
        let wanted = match lemma {
            "he" | "she" | "him" | "her" | "his" | "hers" | "they" | "them" | "their" => {
                EntityType::Person
            }
            "there" | "here" => EntityType::Place,
            _ => return None,
        };

        let horizon = self.config.pronoun_horizon;
        let span = MentionSpan {
            paragraph,
            sentence,
            token_start: token,
            token_len: 1,
        };

        // Locative pro-adverbs may resolve within their own sentence; person
        // pronouns start at the previous one. Distance is measured from the
        // pronoun's sentence and never exceeds the horizon.
        let first_step = if wanted == EntityType::Place { 0 } else { 1 };

        for step in first_step..=horizon {
            let Some(cursor) = sentence_abs.checked_sub(step) else {
                break;
            };
            let record = &table[cursor];
            // Sentence-subject preference: the clause subject wins over
            // anything else in the sentence, appositive content included.
            let candidate = record
                .subject
                .filter(|m| type_matches(mentions[*m].entity_type, wanted))
                .or_else(|| {
                    record
                        .mentions
                        .iter()
                        .rev()
                        .copied()
                        .find(|m| {
                            type_matches(mentions[*m].entity_type, wanted)
                                && !(cursor == sentence_abs
                                    && mentions[*m].span.token_start >= token)
                        })
                });
            if let Some(mention_idx) = candidate {
                if self.debug {
                    tracing::debug!(
                        pronoun = lemma,
                        antecedent = %mentions[mention_idx].surface,
                        "pronoun resolved"
                    );
                }
                return Some(CorefLink {
                    span,
                    surface: lemma.to_string(),
                    target: CorefTarget::Mention(mention_idx),
                    method: CorefMethod::SentenceSubject,
                    confidence: if wanted == EntityType::Place { 0.75 } else { 0.85 },
                });
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_descriptor(
        &self,
        doc: &ParsedDoc,
        mentions: &[Mention],
        table: &[SentenceMentions],
        local_profiles: &HashMap<usize, EntityProfile>,
        globals: &[GlobalCandidate<'_>],
        sentence_abs: usize,
        paragraph: usize,
        sentence: usize,
        token: usize,
    ) -> Option<CorefLink> {
        let sent = &doc.paragraphs[paragraph].sentences[sentence];
        let descriptor = sent.tokens[token].lemma.to_lowercase();
        let tokens: BTreeSet<String> = [descriptor.clone()].into_iter().collect();
        let threshold = self.config.descriptor_link_threshold;

        // Span includes a leading determiner ("the wizard").
        let (span_start, surface) = if token > 0 && sent.tokens[token - 1].pos == "DET" {
            (
                token - 1,
                format!("{} {}", sent.tokens[token - 1].text, sent.tokens[token].text),
            )
        } else {
            (token, sent.tokens[token].text.clone())
        };
        let span = MentionSpan {
            paragraph,
            sentence,
            token_start: span_start,
            token_len: token - span_start + 1,
        };

        // Appositive descriptors bind to their anchor directly.
        if sent.tokens[token].dep == "appos" {
            let anchor = sent.tokens[token].head;
            if let Some(&mention_idx) = token_owner_map(mentions)
                .get(&(paragraph, sentence, anchor))
            {
                return Some(CorefLink {
                    span,
                    surface,
                    target: CorefTarget::Mention(mention_idx),
                    method: CorefMethod::Appositive,
                    confidence: 0.8,
                });
            }
        }

        // Local candidates first, most recent sentence outward.
        let horizon = self.config.pronoun_horizon;
        for step in 0..=horizon {
            let Some(cursor) = sentence_abs.checked_sub(step) else {
                break;
            };
            for &mention_idx in table[cursor].mentions.iter().rev() {
                if cursor == sentence_abs && mentions[mention_idx].span.token_start >= token {
                    continue;
                }
                let Some(local) = local_profiles.get(&mention_idx) else {
                    continue;
                };
                let (method, affinity) = descriptor_method(local, &tokens, &descriptor);
                if affinity >= threshold {
                    return Some(CorefLink {
                        span,
                        surface,
                        target: CorefTarget::Mention(mention_idx),
                        method,
                        confidence: affinity.min(0.95),
                    });
                }
            }
        }

        // Fall back to global profiles accumulated across documents.
        let mut best: Option<(&GlobalCandidate, CorefMethod, f64)> = None;
        for candidate in globals {
            let (method, affinity) = descriptor_method(candidate.profile, &tokens, &descriptor);
            if affinity >= threshold
                && best.map(|(_, _, b)| affinity > b).unwrap_or(true)
            {
                best = Some((candidate, method, affinity));
            }
        }
        if let Some((candidate, method, affinity)) = best {
            if self.debug {
                tracing::debug!(
                    descriptor = %descriptor,
                    global = %candidate.global_id,
                    affinity,
                    "descriptor resolved to global entity"
                );
            }
            return Some(CorefLink {
                span,
                surface,
                target: CorefTarget::Global {
                    global_id: candidate.global_id.to_string(),
                    canonical: candidate.canonical.to_string(),
                    entity_type: candidate.entity_type,
                },
                method,
                confidence: affinity.min(0.95),
            });
        }
        None
    }
}

fn type_matches(actual: EntityType, wanted: EntityType) -> bool {
    actual == wanted
}

fn descriptor_method(
    profile: &EntityProfile,
    tokens: &BTreeSet<String>,
    descriptor: &str,
) -> (CorefMethod, f64) {
    if profile.titles.contains(descriptor) {
        return (CorefMethod::TitleMatch, 0.8f64.max(profile::descriptor_affinity(profile, tokens)));
    }
    (
        CorefMethod::DescriptorProfile,
        profile::descriptor_affinity(profile, tokens),
    )
}

/// Map every token position covered by a mention to that mention's index.
pub fn token_owner_map(mentions: &[Mention]) -> HashMap<(usize, usize, usize), usize> {
    let mut map = HashMap::new();
    for (idx, mention) in mentions.iter().enumerate() {
        for t in mention.span.token_start..mention.span.token_start + mention.span.token_len {
            map.entry((mention.span.paragraph, mention.span.sentence, t))
                .or_insert(idx);
        }
    }
    map
}

/// Pre-pass over copular sentences: "X is a wizard" gives X's in-document
/// profile the descriptor "wizard" before any linking happens.
fn copular_profiles(
    doc: &ParsedDoc,
    token_owner: &HashMap<(usize, usize, usize), usize>,
) -> HashMap<usize, EntityProfile> {
    let mut profiles: HashMap<usize, EntityProfile> = HashMap::new();
    for (p_idx, paragraph) in doc.paragraphs.iter().enumerate() {
        for (s_idx, sentence) in paragraph.sentences.iter().enumerate() {
            let root = sentence.root_index;
            let Some(root_token) = sentence.tokens.get(root) else {
                continue;
            };
            if root_token.lemma != "be" && root_token.lemma != "become" {
                continue;
            }
            let subject = sentence
                .tokens
                .iter()
                .position(|t| t.dep == "nsubj" && t.head == root)
                .and_then(|t| token_owner.get(&(p_idx, s_idx, t)))
                .copied();
            let Some(subject) = subject else { continue };
            for token in &sentence.tokens {
                if token.dep == "attr" && token.pos == "NOUN" {
                    let profile = profiles.entry(subject).or_default();
                    if lexicon::is_title_word(&token.text) {
                        profile.add_title(&token.lemma);
                    } else {
                        profile.add_descriptor(&token.lemma);
                    }
                }
            }
        }
    }
    profiles
}

/// Grammatical layout of mentions per absolute sentence index.
fn sentence_mentions(doc: &ParsedDoc, mentions: &[Mention]) -> Vec<SentenceMentions> {
    let token_owner = token_owner_map(mentions);
    let mut table = Vec::new();
    for (p_idx, paragraph) in doc.paragraphs.iter().enumerate() {
        for (s_idx, sentence) in paragraph.sentences.iter().enumerate() {
            let mut subject = None;
            let mut in_order = Vec::new();
            for (t_idx, token) in sentence.tokens.iter().enumerate() {
                let Some(&mention_idx) = token_owner.get(&(p_idx, s_idx, t_idx)) else {
                    continue;
                };
                let is_appositive = token.dep == "appos" || token.dep == "nmod";
                if (token.dep == "nsubj" || token.dep == "conj") && subject.is_none() {
                    subject = Some(mention_idx);
                }
                if !is_appositive && !in_order.contains(&mention_idx) {
                    in_order.push(mention_idx);
                }
            }
            table.push(SentenceMentions {
                subject,
                mentions: in_order,
            });
        }
    }
    table
}
