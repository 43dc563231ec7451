//! Analyzer wire schema and client trait.
//!
//! The linguistic parser is an external JSON-over-HTTP service; the types
//! here mirror its response shape exactly. The BookNLP-style analyzer
//! returns the same document structure plus character/quote/coref extras,
//! so one `ParsedDoc` covers both (the extras default to empty).

mod booknlp;
mod heuristic;
mod http;

pub use booknlp::BookNlpAnalyzer;
pub use heuristic::HeuristicAnalyzer;
pub use http::HttpAnalyzer;

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(rename = "docId", skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedToken {
    pub text: String,
    pub lemma: String,
    pub pos: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub dep: String,
    /// Index of the head token within the sentence.
    #[serde(default)]
    pub head: usize,
    #[serde(default)]
    pub ner: Option<String>,
    /// Byte offset into the analyzed text.
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSpan {
    /// NER label or span kind.
    pub kind: String,
    /// Token index range within the sentence, end exclusive.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSentence {
    pub tokens: Vec<ParsedToken>,
    #[serde(default)]
    pub spans: Vec<ParsedSpan>,
    #[serde(default)]
    pub root_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedParagraph {
    pub sentences: Vec<ParsedSentence>,
}

/// BookNLP character record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCharacter {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub entity_type: Option<String>,
}

/// BookNLP mention, tied to a character id that is stable across re-runs of
/// the same document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMention {
    pub character_id: u64,
    pub text: String,
    pub paragraph: usize,
    pub token_start: usize,
    pub token_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookQuote {
    pub character_id: u64,
    pub paragraph: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCorefLink {
    pub paragraph: usize,
    pub token_start: usize,
    pub token_len: usize,
    pub character_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDoc {
    pub paragraphs: Vec<ParsedParagraph>,
    #[serde(default)]
    pub characters: Vec<BookCharacter>,
    #[serde(default)]
    pub quotes: Vec<BookQuote>,
    #[serde(default)]
    pub mentions: Vec<BookMention>,
    #[serde(default, rename = "corefLinks")]
    pub coref_links: Vec<BookCorefLink>,
}

impl ParsedDoc {
    pub fn sentence_count(&self) -> usize {
        self.paragraphs.iter().map(|p| p.sentences.len()).sum()
    }

    /// Append another parsed chunk, shifting its BookNLP paragraph indices
    /// by this document's current paragraph count. Used when reducing
    /// per-chunk results in stable chunk order.
    pub fn extend_from_chunk(&mut self, mut chunk: ParsedDoc) {
        let shift = self.paragraphs.len();
        for m in &mut chunk.mentions {
            m.paragraph += shift;
        }
        for q in &mut chunk.quotes {
            q.paragraph += shift;
        }
        for l in &mut chunk.coref_links {
            l.paragraph += shift;
        }
        self.paragraphs.extend(chunk.paragraphs);
        self.quotes.extend(chunk.quotes);
        self.mentions.extend(chunk.mentions);
        self.coref_links.extend(chunk.coref_links);
        // Characters are document-scoped; union by id.
        for c in chunk.characters {
            if !self.characters.iter().any(|x| x.id == c.id) {
                self.characters.push(c);
            }
        }
    }
}

/// A linguistic analyzer. Implementations must be idempotent: identical
/// `text` yields identical token/dependency output.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, req: &AnalyzeRequest) -> Result<ParsedDoc, AnalyzerError>;
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_camel_case_doc_id() {
        let req = AnalyzeRequest {
            text: "hello".into(),
            doc_id: Some("d1".into()),
            options: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["docId"], "d1");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn parsed_doc_tolerates_missing_extras() {
        let doc: ParsedDoc = serde_json::from_str(r#"{"paragraphs": []}"#).unwrap();
        assert!(doc.characters.is_empty());
        assert!(doc.coref_links.is_empty());
    }

    #[test]
    fn extend_from_chunk_shifts_paragraph_indices() {
        let mut base: ParsedDoc = serde_json::from_str(
            r#"{"paragraphs": [{"sentences": []}, {"sentences": []}]}"#,
        )
        .unwrap();
        let chunk: ParsedDoc = serde_json::from_str(
            r#"{
                "paragraphs": [{"sentences": []}],
                "mentions": [{"character_id": 7, "text": "Bilbo", "paragraph": 0,
                              "token_start": 1, "token_len": 1}]
            }"#,
        )
        .unwrap();
        base.extend_from_chunk(chunk);
        assert_eq!(base.paragraphs.len(), 3);
        assert_eq!(base.mentions[0].paragraph, 2);
    }
}
