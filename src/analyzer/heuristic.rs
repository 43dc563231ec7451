//! Built-in heuristic analyzer.
//!
//! A deterministic, dependency-lite tagger used in `legacy` mode and by the
//! test suite. It covers the grammar the pattern templates target:
//! capitalization-driven proper-noun runs, a closed verb table, appositive
//! detection between commas, and positional subject/object attachment. It is
//! not a parser; it is the floor the pipeline stands on when no external
//! analyzer is reachable.

use super::{AnalyzeRequest, Analyzer, ParsedDoc, ParsedParagraph, ParsedSentence, ParsedSpan, ParsedToken};
use crate::error::AnalyzerError;
use crate::lexicon;
use crate::segment::{self, Sentence};

pub struct HeuristicAnalyzer;

const PREPOSITIONS: &[&str] = &["to", "in", "at", "of", "from", "with", "on", "by", "for", "into"];
const PLACE_PREPOSITIONS: &[&str] = &["to", "in", "at", "from", "into"];
const COPULAR_LEMMAS: &[&str] = &["be", "become"];

impl Analyzer for HeuristicAnalyzer {
    fn analyze(&self, req: &AnalyzeRequest) -> Result<ParsedDoc, AnalyzerError> {
        let doc = segment::segment(&req.text);
        let paragraphs = doc
            .paragraphs
            .iter()
            .map(|p| ParsedParagraph {
                sentences: p.sentences.iter().map(analyze_sentence).collect(),
            })
            .collect();
        Ok(ParsedDoc {
            paragraphs,
            characters: Vec::new(),
            quotes: Vec::new(),
            mentions: Vec::new(),
            coref_links: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

fn analyze_sentence(sentence: &Sentence) -> ParsedSentence {
    let mut tokens: Vec<ParsedToken> = sentence
        .tokens
        .iter()
        .map(|t| tag_token(&t.text, t.start - sentence.start, t.end - t.start))
        .collect();

    let appositives = find_appositives(&tokens);
    let in_appositive =
        |i: usize| appositives.iter().any(|a| i >= a.start && i < a.end);

    let root = (0..tokens.len())
        .find(|&i| tokens[i].pos == "VERB" && !in_appositive(i))
        .or_else(|| tokens.iter().position(|t| t.pos == "VERB"))
        .unwrap_or(0);

    let units = nominal_units(&tokens);

    // Default heads point at the root.
    for t in tokens.iter_mut() {
        t.head = root;
    }

    for t in tokens.iter_mut() {
        match t.pos.as_str() {
            "PUNCT" => t.dep = "punct".to_string(),
            "DET" => t.dep = "det".to_string(),
            "ADP" => t.dep = "case".to_string(),
            "CCONJ" => t.dep = "cc".to_string(),
            "NUM" => t.dep = "nummod".to_string(),
            _ => {}
        }
    }

    // Appositive internals: "X, son of Y," gives son=appos(X), Y=nmod(son).
    for app in &appositives {
        let mut inner_head: Option<usize> = None;
        let mut i = app.start;
        while i < app.end {
            if is_nominal(&tokens[i].pos) {
                if inner_head.is_none() {
                    tokens[i].dep = "appos".to_string();
                    tokens[i].head = app.anchor;
                    inner_head = Some(i);
                } else {
                    tokens[i].dep = "nmod".to_string();
                    tokens[i].head = inner_head.unwrap();
                }
            }
            i += 1;
        }
    }

    // Nominal units outside appositives, positioned against the root.
    let mut subject: Option<usize> = None;
    for unit in &units {
        if in_appositive(unit.start) {
            continue;
        }
        let head_idx = unit.start;
        if head_idx < root {
            match subject {
                None => {
                    tokens[head_idx].dep = "nsubj".to_string();
                    tokens[head_idx].head = root;
                    subject = Some(head_idx);
                }
                Some(subj) => {
                    // Coordinated subject: "Frodo and Sam traveled".
                    let joined = (subj..head_idx).any(|k| tokens[k].pos == "CCONJ");
                    tokens[head_idx].dep = if joined { "conj" } else { "dep" }.to_string();
                    tokens[head_idx].head = subj;
                }
            }
        } else if head_idx > root {
            let prep = preceding_preposition(&tokens, unit.start);
            if let Some(p) = prep {
                tokens[head_idx].dep = "obl".to_string();
                tokens[head_idx].head = root;
                tokens[p].head = head_idx;
            } else if COPULAR_LEMMAS.contains(&tokens[root].lemma.as_str())
                && !objects_already_attached(&tokens, root, head_idx)
            {
                tokens[head_idx].dep = "attr".to_string();
                tokens[head_idx].head = root;
            } else {
                tokens[head_idx].dep = "obj".to_string();
                tokens[head_idx].head = root;
            }
        }
    }

    // Locative pro-adverbs ("there", "here") modify the verb.
    for i in 0..tokens.len() {
        if tokens[i].pos == "PRON"
            && (tokens[i].lemma == "there" || tokens[i].lemma == "here")
            && i > root
        {
            tokens[i].dep = "advmod".to_string();
            tokens[i].head = root;
        }
    }

    // Continuation tokens of multi-token names.
    for unit in &units {
        for i in unit.start + 1..=unit.end {
            if is_nominal(&tokens[i].pos) {
                tokens[i].dep = "flat".to_string();
                tokens[i].head = unit.start;
            }
        }
    }

    let spans = ner_spans(&mut tokens, &units, root, &appositives);

    ParsedSentence {
        tokens,
        spans,
        root_index: root,
    }
}

fn tag_token(text: &str, offset: usize, length: usize) -> ParsedToken {
    let lower = text.to_lowercase();
    let (pos, lemma, tag) = if !text.chars().any(|c| c.is_alphanumeric()) {
        ("PUNCT", lower.clone(), String::new())
    } else if matches!(lower.as_str(), "the" | "a" | "an") {
        ("DET", lower.clone(), String::new())
    } else if lexicon::is_pronoun(text) {
        ("PRON", lower.clone(), String::new())
    } else if let Some((lemma, tag)) = lexicon::verb_lemma(text) {
        ("VERB", lemma.to_string(), tag.to_string())
    } else if PREPOSITIONS.contains(&lower.as_str()) {
        ("ADP", lower.clone(), String::new())
    } else if matches!(lower.as_str(), "and" | "or" | "but") {
        ("CCONJ", lower.clone(), String::new())
    } else if text.chars().all(|c| c.is_ascii_digit()) {
        ("NUM", lower.clone(), String::new())
    } else if text.chars().next().map(char::is_uppercase).unwrap_or(false) {
        ("PROPN", text.to_string(), String::new())
    } else {
        ("NOUN", lower.clone(), String::new())
    };

    ParsedToken {
        text: text.to_string(),
        lemma,
        pos: pos.to_string(),
        tag,
        dep: String::new(),
        head: 0,
        ner: None,
        offset,
        length,
    }
}

#[derive(Debug, Clone, Copy)]
struct Appositive {
    anchor: usize,
    /// Token range between the commas, end exclusive.
    start: usize,
    end: usize,
}

/// "X, <phrase without a finite verb>," right after a proper noun is an
/// appositive. The phrase's tokens must never be mistaken for the clause
/// subject.
fn find_appositives(tokens: &[ParsedToken]) -> Vec<Appositive> {
    let mut out = Vec::new();
    for i in 0..tokens.len() {
        if tokens[i].pos != "PROPN" {
            continue;
        }
        if tokens.get(i + 1).map(|t| t.text.as_str()) != Some(",") {
            continue;
        }
        if let Some(close) = tokens
            .iter()
            .enumerate()
            .skip(i + 2)
            .find(|(_, t)| t.text == ",")
            .map(|(j, _)| j)
        {
            let inner = &tokens[i + 2..close];
            if !inner.is_empty() && !inner.iter().any(|t| t.pos == "VERB") {
                out.push(Appositive {
                    anchor: i,
                    start: i + 2,
                    end: close,
                });
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct NominalUnit {
    start: usize,
    /// Inclusive end of the run.
    end: usize,
    has_propn: bool,
}

/// Maximal name runs: PROPN ((the|of) PROPN)*, or a single NOUN/PRON.
fn nominal_units(tokens: &[ParsedToken]) -> Vec<NominalUnit> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].pos == "PROPN" {
            let start = i;
            let mut end = i;
            let mut j = i + 1;
            while j + 1 < tokens.len()
                && matches!(tokens[j].lemma.as_str(), "the" | "of")
                && tokens[j + 1].pos == "PROPN"
            {
                end = j + 1;
                j += 2;
            }
            units.push(NominalUnit {
                start,
                end,
                has_propn: true,
            });
            i = end + 1;
        } else if tokens[i].pos == "NOUN" || tokens[i].pos == "PRON" {
            units.push(NominalUnit {
                start: i,
                end: i,
                has_propn: false,
            });
            i += 1;
        } else {
            i += 1;
        }
    }
    units
}

fn is_nominal(pos: &str) -> bool {
    matches!(pos, "PROPN" | "NOUN" | "PRON")
}

/// Look back over an optional determiner for a case-marking preposition.
fn preceding_preposition(tokens: &[ParsedToken], unit_start: usize) -> Option<usize> {
    let mut i = unit_start;
    while i > 0 {
        i -= 1;
        match tokens[i].pos.as_str() {
            "DET" => continue,
            "ADP" => return Some(i),
            _ => return None,
        }
    }
    None
}

fn objects_already_attached(tokens: &[ParsedToken], root: usize, before: usize) -> bool {
    tokens[root + 1..before]
        .iter()
        .any(|t| t.dep == "attr" || t.dep == "obj")
}

/// Assign NER labels to proper-noun units and emit sentence spans.
fn ner_spans(
    tokens: &mut [ParsedToken],
    units: &[NominalUnit],
    root: usize,
    appositives: &[Appositive],
) -> Vec<ParsedSpan> {
    let in_appositive =
        |i: usize| appositives.iter().any(|a| i >= a.start && i < a.end);
    let mut spans = Vec::new();
    for unit in units {
        if !unit.has_propn {
            continue;
        }
        let label = if preceding_preposition(tokens, unit.start)
            .map(|p| PLACE_PREPOSITIONS.contains(&tokens[p].lemma.as_str()))
            .unwrap_or(false)
        {
            "GPE"
        } else if unit.start < root
            && !in_appositive(unit.start)
            && lexicon::ORG_SUBJECT_VERBS.contains(&tokens[root].lemma.as_str())
        {
            "ORG"
        } else {
            "PERSON"
        };
        for t in tokens[unit.start..=unit.end].iter_mut() {
            t.ner = Some(label.to_string());
        }
        spans.push(ParsedSpan {
            kind: label.to_string(),
            start: unit.start,
            end: unit.end + 1,
        });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedDoc {
        HeuristicAnalyzer
            .analyze(&AnalyzeRequest {
                text: text.to_string(),
                doc_id: None,
                options: None,
            })
            .unwrap()
    }

    fn sentence(doc: &ParsedDoc, p: usize, s: usize) -> &ParsedSentence {
        &doc.paragraphs[p].sentences[s]
    }

    #[test]
    fn tags_proper_noun_run_as_one_unit() {
        let doc = parse("Gandalf the Grey is a wizard.");
        let sent = sentence(&doc, 0, 0);
        assert_eq!(sent.tokens[0].dep, "nsubj");
        assert_eq!(sent.tokens[2].dep, "flat");
        assert_eq!(sent.tokens[2].head, 0);
        assert_eq!(sent.spans.len(), 1);
        assert_eq!(sent.spans[0].start, 0);
        assert_eq!(sent.spans[0].end, 3);
        assert_eq!(sent.spans[0].kind, "PERSON");
    }

    #[test]
    fn copular_complement_is_attr() {
        let doc = parse("Gandalf the Grey is a wizard.");
        let sent = sentence(&doc, 0, 0);
        let wizard = sent.tokens.iter().position(|t| t.text == "wizard").unwrap();
        assert_eq!(sent.tokens[wizard].dep, "attr");
    }

    #[test]
    fn place_after_to_is_gpe_oblique() {
        let doc = parse("The wizard traveled to Rivendell.");
        let sent = sentence(&doc, 0, 0);
        let riv = sent.tokens.iter().position(|t| t.text == "Rivendell").unwrap();
        assert_eq!(sent.tokens[riv].dep, "obl");
        assert_eq!(sent.tokens[riv].ner.as_deref(), Some("GPE"));
        let wizard = sent.tokens.iter().position(|t| t.text == "wizard").unwrap();
        assert_eq!(sent.tokens[wizard].dep, "nsubj");
    }

    #[test]
    fn appositive_does_not_steal_the_subject() {
        let doc = parse("Aragorn, son of Arathorn, traveled to Gondor.");
        let sent = sentence(&doc, 0, 0);
        assert_eq!(sent.tokens[0].text, "Aragorn");
        assert_eq!(sent.tokens[0].dep, "nsubj");
        let son = sent.tokens.iter().position(|t| t.text == "son").unwrap();
        assert_eq!(sent.tokens[son].dep, "appos");
        assert_eq!(sent.tokens[son].head, 0);
        let ara = sent.tokens.iter().position(|t| t.text == "Arathorn").unwrap();
        assert_eq!(sent.tokens[ara].dep, "nmod");
        assert_eq!(sent.tokens[ara].head, son);
        let root = sent.root_index;
        assert_eq!(sent.tokens[root].lemma, "travel");
    }

    #[test]
    fn coordinated_subjects_share_the_verb() {
        let doc = parse("Frodo and Sam traveled to Mordor.");
        let sent = sentence(&doc, 0, 0);
        assert_eq!(sent.tokens[0].dep, "nsubj");
        let sam = sent.tokens.iter().position(|t| t.text == "Sam").unwrap();
        assert_eq!(sent.tokens[sam].dep, "conj");
        assert_eq!(sent.tokens[sam].head, 0);
    }

    #[test]
    fn org_subject_verb_tags_subject_as_org() {
        let doc = parse("Apple announced a new phone.");
        let sent = sentence(&doc, 0, 0);
        assert_eq!(sent.tokens[0].ner.as_deref(), Some("ORG"));
    }

    #[test]
    fn common_noun_object_is_obj_not_ner() {
        let doc = parse("She ate an apple in the garden.");
        let sent = sentence(&doc, 0, 0);
        let apple = sent.tokens.iter().position(|t| t.text == "apple").unwrap();
        assert_eq!(sent.tokens[apple].dep, "obj");
        assert!(sent.tokens[apple].ner.is_none());
        let garden = sent.tokens.iter().position(|t| t.text == "garden").unwrap();
        assert_eq!(sent.tokens[garden].dep, "obl");
    }

    #[test]
    fn locative_pro_adverb_is_advmod() {
        let doc = parse("He became king there.");
        let sent = sentence(&doc, 0, 0);
        let there = sent.tokens.iter().position(|t| t.text == "there").unwrap();
        assert_eq!(sent.tokens[there].dep, "advmod");
        let king = sent.tokens.iter().position(|t| t.text == "king").unwrap();
        assert_eq!(sent.tokens[king].dep, "attr");
        assert_eq!(sent.tokens[0].dep, "nsubj");
        assert_eq!(sent.tokens[0].pos, "PRON");
    }

    #[test]
    fn identical_text_identical_output() {
        let a = parse("Frodo and Sam traveled to Mordor. They were tired.");
        let b = parse("Frodo and Sam traveled to Mordor. They were tired.");
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
