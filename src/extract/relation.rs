//! Relation extraction.
//!
//! Dependency-template driven: a verb lemma plus its subject/object/oblique
//! frame looks up a predicate; appositives yield kinship pairs. The
//! extractor never invents an entity — a candidate argument without an
//! extracted mention discards the relation. Symmetric predicates come out in
//! both directions; storage canonicalization happens in the merger.

use super::RelationCandidate;
use crate::analyzer::{ParsedDoc, ParsedSentence};
use crate::config::ExtractionConfig;
use crate::lexicon;
use crate::model::{Predicate, Qualifier, QualifierKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Years 1–9999.
static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([1-9][0-9]{0,3})\b").expect("static regex"));

const TRAVEL_LEMMAS: &[&str] = &[
    "travel", "go", "journey", "ride", "walk", "sail", "return", "arrive", "come", "visit",
];
const RULER_NOUNS: &[&str] = &["king", "queen", "ruler", "lord", "emperor", "empress", "chief"];
const PLACE_CASE: &[&str] = &["to", "into", "toward"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFactKind {
    Descriptor,
    Role,
    Title,
}

/// A non-relational observation about a mention, routed into its profile.
#[derive(Debug, Clone)]
pub struct ProfileFact {
    pub mention: usize,
    pub kind: ProfileFactKind,
    pub value: String,
}

pub struct RelationExtractor<'a> {
    #[allow(dead_code)]
    config: &'a ExtractionConfig,
    debug: bool,
}

/// One sentence's grammatical frame, with all arguments resolved to mention
/// indices where possible.
struct Frame<'s> {
    sentence: &'s ParsedSentence,
    paragraph: usize,
    /// Paragraph-relative token index of the sentence start.
    token_offset: usize,
    root_lemma: String,
    subjects: Vec<usize>,
    objects: Vec<usize>,
    /// (mention index, case preposition lemma)
    obliques: Vec<(usize, String)>,
    attrs: Vec<usize>,
    /// Mention resolved from a locative pro-adverb ("there").
    locative: Option<usize>,
}

impl<'a> RelationExtractor<'a> {
    pub fn new(config: &'a ExtractionConfig, debug: bool) -> Self {
        Self { config, debug }
    }

    /// `resolved` maps token positions to mention indices, covering both
    /// direct mention tokens and coreference-resolved pronoun/descriptor
    /// spans.
    pub fn extract(
        &self,
        doc: &ParsedDoc,
        resolved: &HashMap<(usize, usize, usize), usize>,
    ) -> (Vec<RelationCandidate>, Vec<ProfileFact>) {
        let mut relations = Vec::new();
        let mut facts = Vec::new();

        for (p_idx, paragraph) in doc.paragraphs.iter().enumerate() {
            let mut token_offset = 0usize;
            for (s_idx, sentence) in paragraph.sentences.iter().enumerate() {
                let frame = self.build_frame(sentence, p_idx, s_idx, token_offset, resolved);
                self.apply_verb_templates(&frame, &mut relations, &mut facts);
                self.apply_appositives(
                    sentence,
                    p_idx,
                    s_idx,
                    token_offset,
                    resolved,
                    &mut relations,
                );
                token_offset += sentence.tokens.len();
            }
        }

        if self.debug {
            tracing::debug!(
                relations = relations.len(),
                facts = facts.len(),
                "relation extraction complete"
            );
        }
        (relations, facts)
    }

    fn build_frame<'s>(
        &self,
        sentence: &'s ParsedSentence,
        paragraph: usize,
        sentence_idx: usize,
        token_offset: usize,
        resolved: &HashMap<(usize, usize, usize), usize>,
    ) -> Frame<'s> {
        let root = sentence.root_index;
        let root_lemma = sentence
            .tokens
            .get(root)
            .map(|t| t.lemma.clone())
            .unwrap_or_default();
        let arg = |t: usize| resolved.get(&(paragraph, sentence_idx, t)).copied();

        let mut subjects = Vec::new();
        let mut objects = Vec::new();
        let mut obliques = Vec::new();
        let mut attrs = Vec::new();
        let mut locative = None;

        for (t_idx, token) in sentence.tokens.iter().enumerate() {
            match token.dep.as_str() {
                "nsubj" if token.head == root => {
                    if let Some(m) = arg(t_idx) {
                        push_unique(&mut subjects, m);
                    }
                }
                // Coordinated subject: "Frodo and Sam traveled".
                "conj" => {
                    if let Some(m) = arg(t_idx) {
                        push_unique(&mut subjects, m);
                    }
                }
                "obj" if token.head == root => {
                    if let Some(m) = arg(t_idx) {
                        push_unique(&mut objects, m);
                    }
                }
                "obl" if token.head == root => {
                    if let Some(m) = arg(t_idx) {
                        let case = sentence
                            .tokens
                            .iter()
                            .find(|c| c.dep == "case" && c.head == t_idx)
                            .map(|c| c.lemma.clone())
                            .unwrap_or_default();
                        obliques.push((m, case));
                    }
                }
                "attr" if token.head == root => {
                    attrs.push(t_idx);
                }
                "advmod" if token.lemma == "there" || token.lemma == "here" => {
                    if let Some(m) = arg(t_idx) {
                        locative = Some(m);
                    }
                }
                _ => {}
            }
        }

        Frame {
            sentence,
            paragraph,
            token_offset,
            root_lemma,
            subjects,
            objects,
            obliques,
            attrs,
            locative,
        }
    }

    fn apply_verb_templates(
        &self,
        frame: &Frame<'_>,
        relations: &mut Vec<RelationCandidate>,
        facts: &mut Vec<ProfileFact>,
    ) {
        let lemma = frame.root_lemma.as_str();

        if TRAVEL_LEMMAS.contains(&lemma) {
            for &subject in &frame.subjects {
                for (object, case) in &frame.obliques {
                    if PLACE_CASE.contains(&case.as_str()) {
                        self.emit(frame, relations, subject, Predicate::TraveledTo, *object, 0.75);
                    }
                }
            }
        }

        match lemma {
            "be" => {
                for &attr in &frame.attrs {
                    let token = &frame.sentence.tokens[attr];
                    if token.pos != "NOUN" {
                        continue;
                    }
                    for &subject in &frame.subjects {
                        facts.push(ProfileFact {
                            mention: subject,
                            kind: if lexicon::is_title_word(&token.text) {
                                ProfileFactKind::Title
                            } else {
                                ProfileFactKind::Descriptor
                            },
                            value: token.lemma.clone(),
                        });
                    }
                }
            }
            "become" => {
                for &attr in &frame.attrs {
                    let token = &frame.sentence.tokens[attr];
                    if token.pos != "NOUN" {
                        continue;
                    }
                    for &subject in &frame.subjects {
                        facts.push(ProfileFact {
                            mention: subject,
                            kind: ProfileFactKind::Role,
                            value: token.lemma.clone(),
                        });
                        if RULER_NOUNS.contains(&token.lemma.as_str()) {
                            let realm = frame.locative.or_else(|| {
                                frame
                                    .obliques
                                    .iter()
                                    .find(|(_, case)| case == "of")
                                    .map(|(m, _)| *m)
                            });
                            if let Some(realm) = realm {
                                self.emit(frame, relations, subject, Predicate::Rules, realm, 0.8);
                            }
                        }
                    }
                }
            }
            "rule" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::Rules, object, 0.8);
                    }
                    for (object, case) in &frame.obliques {
                        if case == "over" {
                            self.emit(frame, relations, subject, Predicate::Rules, *object, 0.8);
                        }
                    }
                }
            }
            "kill" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::Killed, object, 0.8);
                    }
                }
            }
            "marry" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::MarriedTo, object, 0.85);
                        self.emit(frame, relations, object, Predicate::MarriedTo, subject, 0.85);
                    }
                }
            }
            "know" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::Knows, object, 0.7);
                        self.emit(frame, relations, object, Predicate::Knows, subject, 0.7);
                    }
                }
            }
            "live" => {
                for &subject in &frame.subjects {
                    for (object, case) in &frame.obliques {
                        if case == "in" || case == "at" {
                            self.emit(frame, relations, subject, Predicate::LivesIn, *object, 0.75);
                        }
                    }
                }
            }
            "bear" => {
                // Passive "was born in"; the auxiliary carries lemma "be"
                // only when "born" itself is the root, so both shapes land
                // here via the verb table.
                for &subject in &frame.subjects {
                    for (object, case) in &frame.obliques {
                        if case == "in" {
                            self.emit(frame, relations, subject, Predicate::BornIn, *object, 0.8);
                        }
                    }
                }
            }
            "die" => {
                for &subject in &frame.subjects {
                    for (object, case) in &frame.obliques {
                        if case == "in" {
                            self.emit(frame, relations, subject, Predicate::DiesIn, *object, 0.8);
                        }
                    }
                }
            }
            "own" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::Owns, object, 0.8);
                    }
                }
            }
            "lead" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::LeaderOf, object, 0.75);
                    }
                }
            }
            "serve" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::Serves, object, 0.75);
                    }
                }
            }
            "work" => {
                for &subject in &frame.subjects {
                    for (object, case) in &frame.obliques {
                        if case == "for" {
                            self.emit(frame, relations, subject, Predicate::WorksFor, *object, 0.75);
                        }
                    }
                }
            }
            "create" | "found" | "build" | "write" | "forge" => {
                for &subject in &frame.subjects {
                    for &object in &frame.objects {
                        self.emit(frame, relations, subject, Predicate::Created, object, 0.75);
                    }
                }
            }
            _ => {}
        }
    }

    /// Kinship appositives: "Aragorn, son of Arathorn," links anchor and
    /// complement without any verb.
    fn apply_appositives(
        &self,
        sentence: &ParsedSentence,
        paragraph: usize,
        sentence_idx: usize,
        token_offset: usize,
        resolved: &HashMap<(usize, usize, usize), usize>,
        relations: &mut Vec<RelationCandidate>,
    ) {
        let arg = |t: usize| resolved.get(&(paragraph, sentence_idx, t)).copied();

        for (t_idx, token) in sentence.tokens.iter().enumerate() {
            if token.dep != "appos" || !lexicon::is_kinship_noun(&token.text) {
                continue;
            }
            let Some(anchor) = arg(token.head) else {
                continue;
            };
            let Some(complement) = sentence
                .tokens
                .iter()
                .enumerate()
                .find(|(_, c)| c.dep == "nmod" && c.head == t_idx)
                .and_then(|(c_idx, _)| arg(c_idx))
            else {
                continue;
            };

            let quote = quote_of(sentence);
            let mut emit = |subject: usize, predicate: Predicate, object: usize| {
                relations.push(RelationCandidate {
                    subject,
                    predicate,
                    object,
                    confidence: 0.85,
                    qualifiers: Vec::new(),
                    paragraph,
                    token_start: token_offset,
                    token_len: sentence.tokens.len(),
                    quote: quote.clone(),
                });
            };

            match token.lemma.as_str() {
                "son" | "daughter" | "child" => emit(anchor, Predicate::ChildOf, complement),
                "father" | "mother" | "parent" => emit(anchor, Predicate::ParentOf, complement),
                "brother" | "sister" | "sibling" => {
                    emit(anchor, Predicate::SiblingOf, complement);
                    emit(complement, Predicate::SiblingOf, anchor);
                }
                "wife" | "husband" => {
                    emit(anchor, Predicate::MarriedTo, complement);
                    emit(complement, Predicate::MarriedTo, anchor);
                }
                _ => {}
            }
        }
    }

    fn emit(
        &self,
        frame: &Frame<'_>,
        relations: &mut Vec<RelationCandidate>,
        subject: usize,
        predicate: Predicate,
        object: usize,
        confidence: f64,
    ) {
        if subject == object {
            return;
        }
        let quote = quote_of(frame.sentence);
        let mut qualifiers = Vec::new();
        if predicate.is_time_bounded() || predicate.functional_limit() == Some(1) {
            if let Some(year) = YEAR_RE.find(&quote) {
                qualifiers.push(Qualifier {
                    kind: QualifierKind::Time,
                    value: year.as_str().to_string(),
                });
            }
        }
        relations.push(RelationCandidate {
            subject,
            predicate,
            object,
            confidence,
            qualifiers,
            paragraph: frame.paragraph,
            token_start: frame.token_offset,
            token_len: frame.sentence.tokens.len(),
            quote,
        });
    }
}

fn push_unique(list: &mut Vec<usize>, value: usize) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn quote_of(sentence: &ParsedSentence) -> String {
    let mut out = String::new();
    for token in &sentence.tokens {
        if !out.is_empty() && token.pos != "PUNCT" {
            out.push(' ');
        }
        out.push_str(&token.text);
    }
    out
}
