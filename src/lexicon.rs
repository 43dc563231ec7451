//! Closed word lists used across the pipeline.
//!
//! Everything here is a static table with a lookup helper. The lists are
//! deliberately small and closed: the normalizer and extractor gate on them,
//! so growing a list changes precision behavior and belongs in review, not
//! configuration.

use std::collections::HashMap;

/// Personal pronouns and deictics. A surface equal to one of these can never
/// become a canonical entity name.
pub const PRONOUNS: &[&str] = &[
    "he", "she", "it", "they", "him", "her", "them", "his", "hers", "its", "their", "theirs",
    "himself", "herself", "itself", "themselves", "i", "me", "my", "mine", "we", "us", "our",
    "ours", "you", "your", "yours", "there", "here", "this", "that", "these", "those", "who",
    "whom", "someone", "anyone", "everyone", "nobody",
];

/// Connector tokens that carry no naming information ("Lord of the Rings"
/// has two informative tokens, not four). This set is closed; articles
/// other than "the" do not belong to names and stay outside it.
pub const CONNECTORS: &[&str] = &["the", "of", "and"];

/// Title words permitted in lowercase inside salvage-eligible surfaces.
pub const TITLE_WORDS: &[&str] = &[
    "lord", "lady", "king", "queen", "prince", "princess", "professor", "doctor", "sir", "dame",
    "master", "mistress", "captain", "general", "emperor", "empress", "duke", "duchess", "baron",
    "chief", "elder", "saint",
];

/// Finite verbs whose presence disqualifies a candidate surface. The list
/// covers the copulas and high-frequency narrative verbs that NER models
/// most often leak into entity spans.
pub const FINITE_VERBS: &[&str] = &[
    "is", "are", "was", "were", "be", "been", "being", "has", "have", "had", "does", "do", "did",
    "says", "said", "goes", "went", "gone", "comes", "came", "takes", "took", "makes", "made",
    "gets", "got", "becomes", "became", "seems", "seemed", "appears", "appeared", "arrives",
    "arrived", "leaves", "left", "returns", "returned", "travels", "traveled", "travelled",
    "walks", "walked", "rides", "rode", "announces", "announced", "eats", "ate", "kills",
    "killed", "rules", "ruled", "lives", "lived", "dies", "died", "marries", "married", "owns",
    "owned", "leads", "led", "serves", "served", "knows", "knew", "teaches", "taught",
];

/// Generic closed-class surfaces that attract a confidence penalty when they
/// show up as mentions ("the man", "the city", ...).
pub const GENERIC_SURFACES: &[&str] = &[
    "man", "woman", "boy", "girl", "person", "people", "place", "city", "town", "land", "thing",
    "one", "day", "night", "time", "year", "way", "home", "house", "world",
];

/// Descriptor nouns the coreference resolver will try to match against
/// entity profiles ("the wizard", "the king").
pub const DESCRIPTOR_NOUNS: &[&str] = &[
    "wizard", "witch", "king", "queen", "ruler", "knight", "soldier", "warrior", "sailor",
    "hunter", "healer", "scholar", "priest", "merchant", "thief", "smith", "farmer", "ranger",
    "steward", "herald", "guard", "captain", "general", "lord", "lady", "prince", "princess",
    "emperor", "chief", "elder", "teacher", "student", "niece", "nephew", "uncle", "aunt",
    "brother", "sister", "father", "mother", "son", "daughter", "dwarf", "elf", "hobbit",
    "dragon", "giant",
];

pub fn is_pronoun(token: &str) -> bool {
    let lower = token.to_lowercase();
    PRONOUNS.contains(&lower.as_str())
}

pub fn is_connector(token: &str) -> bool {
    let lower = token.to_lowercase();
    CONNECTORS.contains(&lower.as_str())
}

pub fn is_title_word(token: &str) -> bool {
    let lower = token.to_lowercase();
    TITLE_WORDS.contains(&lower.as_str())
}

pub fn is_finite_verb(token: &str) -> bool {
    let lower = token.to_lowercase();
    FINITE_VERBS.contains(&lower.as_str())
}

pub fn is_generic_surface(surface: &str) -> bool {
    let lower = surface.to_lowercase();
    let stripped = lower
        .split_whitespace()
        .filter(|t| !is_connector(t))
        .collect::<Vec<_>>()
        .join(" ");
    GENERIC_SURFACES.contains(&stripped.as_str())
}

pub fn is_descriptor_noun(token: &str) -> bool {
    let lower = token.to_lowercase();
    DESCRIPTOR_NOUNS.contains(&lower.as_str())
}

/// Kinship nouns that carry relational meaning inside appositives
/// ("Aragorn, son of Arathorn"). These feed the relation extractor and are
/// excluded from descriptor coreference.
pub const KINSHIP_NOUNS: &[&str] = &[
    "son", "daughter", "child", "father", "mother", "parent", "brother", "sister", "sibling",
    "wife", "husband", "uncle", "aunt", "nephew", "niece", "heir",
];

pub fn is_kinship_noun(token: &str) -> bool {
    let lower = token.to_lowercase();
    KINSHIP_NOUNS.contains(&lower.as_str())
}

/// Verb lemma table for the built-in heuristic analyzer: surface form to
/// (lemma, tense tag). External analyzers supply their own lemmas; this
/// table only has to cover what the heuristic tagger can see.
pub fn verb_lemma(token: &str) -> Option<(&'static str, &'static str)> {
    static TABLE: &[(&str, &str, &str)] = &[
        ("is", "be", "VBZ"),
        ("are", "be", "VBP"),
        ("was", "be", "VBD"),
        ("were", "be", "VBD"),
        ("has", "have", "VBZ"),
        ("had", "have", "VBD"),
        ("traveled", "travel", "VBD"),
        ("travelled", "travel", "VBD"),
        ("travels", "travel", "VBZ"),
        ("went", "go", "VBD"),
        ("goes", "go", "VBZ"),
        ("became", "become", "VBD"),
        ("becomes", "become", "VBZ"),
        ("announced", "announce", "VBD"),
        ("announces", "announce", "VBZ"),
        ("ate", "eat", "VBD"),
        ("eats", "eat", "VBZ"),
        ("killed", "kill", "VBD"),
        ("kills", "kill", "VBZ"),
        ("rules", "rule", "VBZ"),
        ("ruled", "rule", "VBD"),
        ("lives", "live", "VBZ"),
        ("lived", "live", "VBD"),
        ("died", "die", "VBD"),
        ("dies", "die", "VBZ"),
        ("married", "marry", "VBD"),
        ("marries", "marry", "VBZ"),
        ("owns", "own", "VBZ"),
        ("owned", "own", "VBD"),
        ("leads", "lead", "VBZ"),
        ("led", "lead", "VBD"),
        ("serves", "serve", "VBZ"),
        ("served", "serve", "VBD"),
        ("knows", "know", "VBZ"),
        ("knew", "know", "VBD"),
        ("born", "bear", "VBN"),
        ("founded", "found", "VBD"),
        ("created", "create", "VBD"),
        ("built", "build", "VBD"),
        ("wrote", "write", "VBD"),
        ("said", "say", "VBD"),
        ("works", "work", "VBZ"),
        ("worked", "work", "VBD"),
        ("teaches", "teach", "VBZ"),
        ("taught", "teach", "VBD"),
    ];
    let lower = token.to_lowercase();
    TABLE
        .iter()
        .find(|(surface, _, _)| *surface == lower)
        .map(|(_, lemma, tag)| (*lemma, *tag))
}

/// Verbs whose grammatical subject is typically an organization. The
/// heuristic analyzer uses this to pick an ORG tag over PERSON.
pub const ORG_SUBJECT_VERBS: &[&str] = &["announce", "acquire", "release", "launch", "merge"];

/// A user-supplied whitelist of known entities: surface form to entity type
/// name. Entries here outrank every other mention source.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: HashMap<String, String>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, surface: &str, type_name: &str) {
        self.entries
            .insert(surface.to_lowercase(), type_name.to_string());
    }

    pub fn lookup(&self, surface: &str) -> Option<&str> {
        self.entries.get(&surface.to_lowercase()).map(|s| s.as_str())
    }

    pub fn from_pairs<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(pairs: I) -> Self {
        let mut wl = Self::new();
        for (surface, type_name) in pairs {
            wl.insert(surface, type_name);
        }
        wl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pronouns_match_case_insensitively() {
        assert!(is_pronoun("He"));
        assert!(is_pronoun("THERE"));
        assert!(!is_pronoun("Gandalf"));
    }

    #[test]
    fn connectors_and_titles_are_disjoint_from_verbs() {
        for c in CONNECTORS {
            assert!(!is_finite_verb(c));
        }
        for t in TITLE_WORDS {
            assert!(!is_finite_verb(t));
        }
    }

    #[test]
    fn connector_set_is_exactly_the_of_and() {
        assert_eq!(CONNECTORS, &["the", "of", "and"]);
        assert!(is_connector("OF"));
        // Indefinite articles are not connectors; a lowercase "a" inside a
        // salvage-eligible surface still trips the precision gate.
        assert!(!is_connector("a"));
        assert!(!is_connector("an"));
    }

    #[test]
    fn generic_surface_ignores_leading_article() {
        assert!(is_generic_surface("the man"));
        assert!(is_generic_surface("city"));
        assert!(!is_generic_surface("the Shire"));
    }

    #[test]
    fn verb_lemma_covers_travel_forms() {
        assert_eq!(verb_lemma("traveled"), Some(("travel", "VBD")));
        assert_eq!(verb_lemma("travelled"), Some(("travel", "VBD")));
        assert_eq!(verb_lemma("Gandalf"), None);
    }

    #[test]
    fn whitelist_lookup_is_case_insensitive() {
        let wl = Whitelist::from_pairs([("Rivendell", "PLACE")]);
        assert_eq!(wl.lookup("rivendell"), Some("PLACE"));
        assert_eq!(wl.lookup("RIVENDELL"), Some("PLACE"));
        assert_eq!(wl.lookup("Mordor"), None);
    }
}
