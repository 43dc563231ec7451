//! Document segmentation.
//!
//! Two stages, structure before words: paragraphs split on blank lines,
//! sentences split on terminal punctuation with an abbreviation guard, then
//! tokens from unicode word boundaries. Every span carries byte offsets into
//! the original text, and segmenting the same text twice yields identical
//! offsets.

use unicode_segmentation::UnicodeSegmentation;

/// A single token with byte offsets into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Sentence {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub tokens: Vec<TokenSpan>,
}

#[derive(Debug, Clone)]
pub struct Paragraph {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub sentences: Vec<Sentence>,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentedDoc {
    pub paragraphs: Vec<Paragraph>,
}

impl SegmentedDoc {
    /// Total token count across all paragraphs.
    pub fn token_count(&self) -> usize {
        self.paragraphs
            .iter()
            .flat_map(|p| &p.sentences)
            .map(|s| s.tokens.len())
            .sum()
    }
}

/// Abbreviations that may precede a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &["Mr", "Mrs", "Ms", "Dr", "St", "Prof", "Jr", "Sr"];

pub fn segment(text: &str) -> SegmentedDoc {
    let mut paragraphs = Vec::new();

    for (index, (para_start, para_text)) in split_paragraphs(text).into_iter().enumerate() {
        let sentences = split_sentences(para_text, para_start);
        paragraphs.push(Paragraph {
            index,
            start: para_start,
            end: para_start + para_text.len(),
            sentences,
        });
    }

    SegmentedDoc { paragraphs }
}

/// Split on blank lines, returning (byte offset, slice) pairs for non-empty
/// paragraphs.
fn split_paragraphs(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // A paragraph break is a newline followed by an all-whitespace line.
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            let mut saw_second_newline = false;
            while j < bytes.len() {
                match bytes[j] {
                    b' ' | b'\t' | b'\r' => j += 1,
                    b'\n' => {
                        saw_second_newline = true;
                        j += 1;
                    }
                    _ => break,
                }
            }
            if saw_second_newline {
                push_paragraph(text, start, i, &mut out);
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    push_paragraph(text, start, text.len(), &mut out);
    out
}

fn push_paragraph<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<(usize, &'a str)>) {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let offset = start + (slice.len() - slice.trim_start().len());
    out.push((offset, &text[offset..offset + trimmed.len()]));
}

fn split_sentences(para: &str, para_offset: usize) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let chars: Vec<(usize, char)> = para.char_indices().collect();
    let mut sent_start = 0;

    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if c == '.' || c == '!' || c == '?' {
            let prev_word = previous_word(para, pos);
            let is_abbrev = c == '.' && ABBREVIATIONS.iter().any(|a| *a == prev_word);
            if !is_abbrev && sentence_ends_here(&chars, i) {
                let end = pos + c.len_utf8();
                push_sentence(para, sent_start, end, para_offset, &mut sentences);
                // Skip following whitespace to the next sentence start.
                let mut j = i + 1;
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                sent_start = if j < chars.len() { chars[j].0 } else { para.len() };
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if sent_start < para.len() {
        push_sentence(para, sent_start, para.len(), para_offset, &mut sentences);
    }
    sentences
}

/// Terminal punctuation ends a sentence when followed by whitespace and an
/// uppercase letter or opening quote, or by end of paragraph.
fn sentence_ends_here(chars: &[(usize, char)], i: usize) -> bool {
    let mut j = i + 1;
    // Closing quotes stay attached to the sentence.
    while j < chars.len() && (chars[j].1 == '"' || chars[j].1 == '\'') {
        j += 1;
    }
    if j >= chars.len() {
        return true;
    }
    if !chars[j].1.is_whitespace() {
        return false;
    }
    while j < chars.len() && chars[j].1.is_whitespace() {
        j += 1;
    }
    match chars.get(j) {
        None => true,
        Some((_, c)) => c.is_uppercase() || *c == '"' || *c == '\'',
    }
}

fn previous_word(para: &str, pos: usize) -> &str {
    let before = &para[..pos];
    match before.rfind(|c: char| !c.is_alphanumeric()) {
        Some(i) => &before[i + c_len(before, i)..],
        None => before,
    }
}

fn c_len(s: &str, i: usize) -> usize {
    s[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1)
}

fn push_sentence(
    para: &str,
    start: usize,
    end: usize,
    para_offset: usize,
    out: &mut Vec<Sentence>,
) {
    let slice = para[start..end].trim();
    if slice.is_empty() {
        return;
    }
    let lead = para[start..end].len() - para[start..end].trim_start().len();
    let abs_start = para_offset + start + lead;
    let tokens = tokenize(slice, abs_start);
    out.push(Sentence {
        text: slice.to_string(),
        start: abs_start,
        end: abs_start + slice.len(),
        tokens,
    });
}

/// Tokens are the non-whitespace unicode word-bound segments; punctuation
/// marks come through as their own tokens, which the appositive detection
/// downstream relies on.
fn tokenize(sentence: &str, sentence_offset: usize) -> Vec<TokenSpan> {
    sentence
        .split_word_bound_indices()
        .filter(|(_, seg)| !seg.trim().is_empty())
        .map(|(i, seg)| TokenSpan {
            text: seg.to_string(),
            start: sentence_offset + i,
            end: sentence_offset + i + seg.len(),
        })
        .collect()
}

/// A contiguous run of whole paragraphs, sized for one analyzer call.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Index of this chunk's first paragraph within the whole document.
    pub paragraph_offset: usize,
}

/// Split a document into chunks on paragraph boundaries only, so paragraph
/// indices in analyzer output can be rebased deterministically.
pub fn chunk(text: &str, max_chars: usize) -> Vec<Chunk> {
    let paragraphs = split_paragraphs(text);
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_first_para = 0;
    let mut para_index = 0;

    for (_, para) in &paragraphs {
        if !current.is_empty() && current.len() + para.len() + 2 > max_chars {
            chunks.push(Chunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
                paragraph_offset: current_first_para,
            });
            current_first_para = para_index;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
        para_index += 1;
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            text: current,
            paragraph_offset: current_first_para,
        });
    }
    chunks
}
