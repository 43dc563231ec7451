//! Surface-form normalization.
//!
//! Two disciplines with different strength. `normalize_for_aliasing` is the
//! weak key used to group variants of one name; `normalize_canonical` is the
//! strong gate a surface must pass before it may become a durable entity
//! name. Both are pure and deterministic.

use crate::error::SurfaceReject;
use crate::lexicon;
use crate::model::EntityType;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalization key for alias grouping: NFKC, diacritics stripped, case
/// folded, whitespace collapsed, edge punctuation removed. Interior hyphens
/// and apostrophes survive ("Baggins-of-Bag-End" keeps its shape).
pub fn normalize_for_aliasing(text: &str) -> String {
    // NFKD first so combining marks are separate code points, drop the
    // marks, then recompose what remains.
    let stripped: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .nfkc()
        .collect();

    let folded = stripped.to_lowercase();

    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    trim_edge_punctuation(&collapsed)
}

// Edges trim down to the outermost alphanumeric characters; hyphens and
// apostrophes survive only in the interior.
fn trim_edge_punctuation(s: &str) -> String {
    let begin = match s.char_indices().find(|(_, c)| c.is_alphanumeric()) {
        Some((i, _)) => i,
        None => return String::new(),
    };
    let end = s
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_alphanumeric())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(begin);
    s[begin..end].to_string()
}

/// The strong gate for durable mentions. Returns the canonical surface (with
/// salvage applied) or the observable rejection reason.
pub fn normalize_canonical(
    entity_type: EntityType,
    surface: &str,
) -> Result<String, SurfaceReject> {
    let trimmed = surface.trim();
    if trimmed.is_empty() {
        return Err(SurfaceReject::Empty);
    }

    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    let tokens: Vec<&str> = collapsed.split_whitespace().collect();

    if tokens.len() == 1 && lexicon::is_pronoun(tokens[0]) {
        return Err(SurfaceReject::Pronoun {
            token: tokens[0].to_string(),
        });
    }

    if let Some(verb) = tokens.iter().find(|t| lexicon::is_finite_verb(t)) {
        return Err(SurfaceReject::FiniteVerb {
            token: verb.to_string(),
        });
    }

    // ORG canonicals drop a trailing "House" token ("Stark House" -> "Stark").
    let mut tokens = tokens;
    if entity_type == EntityType::Org && tokens.len() > 1 {
        if tokens
            .last()
            .map(|t| t.eq_ignore_ascii_case("house"))
            .unwrap_or(false)
        {
            tokens.pop();
        }
    }

    let fully_lower = tokens
        .iter()
        .all(|t| !t.chars().any(|c| c.is_uppercase()));
    let informative = tokens
        .iter()
        .any(|t| !lexicon::is_connector(t) && !lexicon::is_title_word(t));

    if fully_lower {
        if !informative {
            // Nothing but connectors and titles; not a name.
            return Err(SurfaceReject::LowercaseToken {
                entity_type,
                token: tokens.first().unwrap_or(&"").to_string(),
            });
        }
        return Ok(title_case(&tokens));
    }

    if entity_type.is_salvage_eligible() {
        if let Some(bad) = tokens.iter().find(|t| {
            let lower = !t.chars().next().map(char::is_uppercase).unwrap_or(false);
            lower && !lexicon::is_connector(t) && !lexicon::is_title_word(t)
        }) {
            return Err(SurfaceReject::LowercaseToken {
                entity_type,
                token: bad.to_string(),
            });
        }
    }

    Ok(tokens.join(" "))
}

/// Title-case a token list: every token capitalized except non-leading
/// connectors.
fn title_case(tokens: &[&str]) -> String {
    tokens
        .iter()
        .enumerate()
        .map(|(i, t)| {
            if i > 0 && lexicon::is_connector(t) {
                t.to_lowercase()
            } else {
                capitalize_first(t)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliasing_folds_case_and_diacritics() {
        assert_eq!(normalize_for_aliasing("Éowyn"), "eowyn");
        assert_eq!(normalize_for_aliasing("  GANDALF  the   Grey "), "gandalf the grey");
    }

    #[test]
    fn aliasing_strips_edge_punctuation_keeps_interior() {
        assert_eq!(normalize_for_aliasing("\"Bag-End\","), "bag-end");
        assert_eq!(normalize_for_aliasing("'Sam's'"), "sam's");
    }

    #[test]
    fn aliasing_of_pure_punctuation_is_empty() {
        assert_eq!(normalize_for_aliasing("..."), "");
    }

    #[test]
    fn pronouns_are_rejected() {
        let err = normalize_canonical(EntityType::Person, "he").unwrap_err();
        assert!(matches!(err, SurfaceReject::Pronoun { .. }));
        let err = normalize_canonical(EntityType::Place, "there").unwrap_err();
        assert!(matches!(err, SurfaceReject::Pronoun { .. }));
    }

    #[test]
    fn finite_verbs_are_rejected() {
        let err = normalize_canonical(EntityType::Person, "Gandalf is").unwrap_err();
        assert_eq!(
            err,
            SurfaceReject::FiniteVerb {
                token: "is".to_string()
            }
        );
    }

    #[test]
    fn mixed_case_person_with_stray_lowercase_is_rejected() {
        let err = normalize_canonical(EntityType::Person, "Aragorn traveling").unwrap_err();
        assert!(matches!(err, SurfaceReject::LowercaseToken { .. }));
    }

    #[test]
    fn connectors_and_titles_survive_the_lowercase_gate() {
        assert_eq!(
            normalize_canonical(EntityType::Person, "Gandalf the Grey").unwrap(),
            "Gandalf the Grey"
        );
        assert_eq!(
            normalize_canonical(EntityType::Person, "lord Denethor").unwrap(),
            "lord Denethor"
        );
    }

    #[test]
    fn fully_lowercase_informative_surface_is_promoted() {
        assert_eq!(
            normalize_canonical(EntityType::Person, "the grey wizard").unwrap(),
            "The Grey Wizard"
        );
        assert_eq!(normalize_canonical(EntityType::Item, "apple").unwrap(), "Apple");
    }

    #[test]
    fn fully_lowercase_connectors_only_is_rejected() {
        let err = normalize_canonical(EntityType::Person, "the of").unwrap_err();
        assert!(matches!(err, SurfaceReject::LowercaseToken { .. }));
    }

    #[test]
    fn org_strips_trailing_house() {
        assert_eq!(
            normalize_canonical(EntityType::Org, "Stark House").unwrap(),
            "Stark"
        );
        // HOUSE type keeps its own name intact.
        assert_eq!(
            normalize_canonical(EntityType::House, "Stark House").unwrap(),
            "Stark House"
        );
    }
}
