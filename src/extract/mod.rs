//! Extraction records shared by the mention and relation extractors.

pub mod mention;
pub mod patterns;
pub mod relation;

pub use mention::MentionExtractor;
pub use patterns::{CompiledPatterns, PatternLibrary, PatternTemplate};
pub use relation::{ProfileFact, ProfileFactKind, RelationExtractor};

use crate::analyzer::ParsedDoc;
use crate::model::{EntityType, MentionSource, Predicate, Qualifier};

/// Position of a mention: paragraph and sentence indices, token indices
/// local to the sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MentionSpan {
    pub paragraph: usize,
    pub sentence: usize,
    pub token_start: usize,
    pub token_len: usize,
}

impl MentionSpan {
    /// Token index relative to the paragraph start, the form location
    /// pointers use.
    pub fn paragraph_token_start(&self, doc: &ParsedDoc) -> usize {
        let offset: usize = doc.paragraphs[self.paragraph].sentences[..self.sentence]
            .iter()
            .map(|s| s.tokens.len())
            .sum();
        offset + self.token_start
    }
}

/// A typed entity mention within one document.
#[derive(Debug, Clone)]
pub struct Mention {
    pub surface: String,
    pub entity_type: EntityType,
    pub span: MentionSpan,
    pub source: MentionSource,
    pub confidence: f64,
    /// Stable analyzer character id, carried through for BookNLP mentions.
    pub booknlp_id: Option<u64>,
}

/// A relation between two extracted mentions, before entity resolution.
#[derive(Debug, Clone)]
pub struct RelationCandidate {
    pub subject: usize,
    pub predicate: Predicate,
    pub object: usize,
    pub confidence: f64,
    pub qualifiers: Vec<Qualifier>,
    /// Paragraph index and paragraph-relative token range of the evidence,
    /// plus the quoted sentence.
    pub paragraph: usize,
    pub token_start: usize,
    pub token_len: usize,
    pub quote: String,
}
