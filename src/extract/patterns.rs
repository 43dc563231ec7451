//! Persisted pattern library.
//!
//! A named collection of regex templates per entity type, portable across
//! corpora: the library can be loaded, merged, and saved independently of
//! any graph. Templates carry usage counters so repeated bootstrap runs
//! converge instead of duplicating.

use crate::model::EntityType;
use ares_core::{Vfs, VfsResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternTemplate {
    pub pattern: String,
    pub confidence: f64,
    #[serde(default)]
    pub hits: u64,
    #[serde(default)]
    pub misses: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryMetadata {
    #[serde(default)]
    pub total_patterns: usize,
    #[serde(default)]
    pub total_types: usize,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternLibrary {
    pub name: String,
    pub domain: String,
    pub entity_types: BTreeMap<EntityType, Vec<PatternTemplate>>,
    #[serde(default)]
    pub metadata: LibraryMetadata,
}

impl PatternLibrary {
    pub fn new(name: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            entity_types: BTreeMap::new(),
            metadata: LibraryMetadata {
                created_at: ares_core::time::now_millis(),
                ..LibraryMetadata::default()
            },
        }
    }

    pub fn add(&mut self, entity_type: EntityType, pattern: &str, confidence: f64) {
        let templates = self.entity_types.entry(entity_type).or_default();
        if templates.iter().any(|t| t.pattern == pattern) {
            return;
        }
        templates.push(PatternTemplate {
            pattern: pattern.to_string(),
            confidence,
            hits: 0,
            misses: 0,
        });
        self.touch();
    }

    /// Union another library into this one. A template present in both
    /// keeps the higher confidence and sums its counters.
    pub fn merge(&mut self, other: &PatternLibrary) {
        for (entity_type, templates) in &other.entity_types {
            let own = self.entity_types.entry(*entity_type).or_default();
            for template in templates {
                match own.iter_mut().find(|t| t.pattern == template.pattern) {
                    Some(existing) => {
                        existing.confidence = existing.confidence.max(template.confidence);
                        existing.hits += template.hits;
                        existing.misses += template.misses;
                    }
                    None => own.push(template.clone()),
                }
            }
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.metadata.total_patterns = self.entity_types.values().map(Vec::len).sum();
        self.metadata.total_types = self.entity_types.len();
        self.metadata.updated_at = ares_core::time::now_millis();
    }

    /// Compile every template, dropping (and logging) ones that fail to
    /// parse. Ordering within a type is preserved: earlier templates win
    /// ties downstream.
    pub fn compile(&self) -> CompiledPatterns {
        let mut per_type = Vec::new();
        for (entity_type, templates) in &self.entity_types {
            let mut compiled = Vec::new();
            for template in templates {
                match Regex::new(&template.pattern) {
                    Ok(regex) => compiled.push((regex, template.confidence)),
                    Err(e) => {
                        tracing::warn!(
                            library = %self.name,
                            pattern = %template.pattern,
                            error = %e,
                            "dropping unparseable pattern template"
                        );
                    }
                }
            }
            if !compiled.is_empty() {
                per_type.push((*entity_type, compiled));
            }
        }
        CompiledPatterns { per_type }
    }

    /// Generalize seed surfaces into templates. Multi-token names become
    /// shape patterns (capitalized words joined by the observed connectors);
    /// single-token seeds are too generic to template and are skipped.
    pub fn bootstrap_from_seeds(&mut self, seeds: &[(EntityType, &str)]) {
        for (entity_type, seed) in seeds {
            let tokens: Vec<&str> = seed.split_whitespace().collect();
            if tokens.len() < 2 {
                continue;
            }
            let mut parts = Vec::with_capacity(tokens.len());
            for token in &tokens {
                if crate::lexicon::is_connector(token) || crate::lexicon::is_title_word(token) {
                    parts.push(regex::escape(&token.to_lowercase()));
                } else {
                    parts.push(r"[A-Z][\w'-]+".to_string());
                }
            }
            let pattern = format!(r"\b{}\b", parts.join(" "));
            self.add(*entity_type, &pattern, 0.7);
        }
    }

    pub async fn load(vfs: &dyn Vfs, path: &str) -> VfsResult<Option<Self>> {
        if !vfs.exists(path).await? {
            return Ok(None);
        }
        let text = vfs.read_to_string(path).await?;
        let library = serde_json::from_str(&text)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        Ok(Some(library))
    }

    pub async fn save(&self, vfs: &dyn Vfs, path: &str) -> VfsResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ares_core::VfsError::SerializationError(e.to_string()))?;
        vfs.write(path, json.as_bytes()).await
    }
}

/// A library with its regexes compiled, ready to run over sentences.
#[derive(Debug)]
pub struct CompiledPatterns {
    per_type: Vec<(EntityType, Vec<(Regex, f64)>)>,
}

/// A pattern hit: character range within the matched text.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

impl CompiledPatterns {
    pub fn is_empty(&self) -> bool {
        self.per_type.is_empty()
    }

    pub fn apply(&self, text: &str) -> Vec<PatternHit> {
        let mut hits = Vec::new();
        for (entity_type, templates) in &self.per_type {
            for (regex, confidence) in templates {
                for found in regex.find_iter(text) {
                    hits.push(PatternHit {
                        entity_type: *entity_type,
                        start: found.start(),
                        end: found.end(),
                        confidence: *confidence,
                    });
                }
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_deduplicates_patterns() {
        let mut lib = PatternLibrary::new("test", "fantasy");
        lib.add(EntityType::Person, r"\b[A-Z]\w+ the [A-Z]\w+\b", 0.7);
        lib.add(EntityType::Person, r"\b[A-Z]\w+ the [A-Z]\w+\b", 0.9);
        assert_eq!(lib.entity_types[&EntityType::Person].len(), 1);
        assert_eq!(lib.metadata.total_patterns, 1);
    }

    #[test]
    fn merge_keeps_higher_confidence() {
        let mut a = PatternLibrary::new("a", "d");
        a.add(EntityType::Person, "p1", 0.5);
        let mut b = PatternLibrary::new("b", "d");
        b.add(EntityType::Person, "p1", 0.8);
        b.add(EntityType::Place, "p2", 0.6);
        a.merge(&b);
        assert_eq!(a.entity_types[&EntityType::Person][0].confidence, 0.8);
        assert_eq!(a.metadata.total_types, 2);
    }

    #[test]
    fn bootstrap_generalizes_multi_token_seeds() {
        let mut lib = PatternLibrary::new("seeded", "fantasy");
        lib.bootstrap_from_seeds(&[
            (EntityType::Person, "Gandalf the Grey"),
            (EntityType::Place, "Rivendell"),
        ]);
        // The single-token seed is skipped.
        assert!(!lib.entity_types.contains_key(&EntityType::Place));
        let compiled = lib.compile();
        let hits = compiled.apply("Saruman the White arrived.");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_type, EntityType::Person);
        assert_eq!(&"Saruman the White arrived."[hits[0].start..hits[0].end], "Saruman the White");
    }

    #[test]
    fn unparseable_template_is_dropped_not_fatal() {
        let mut lib = PatternLibrary::new("broken", "d");
        lib.add(EntityType::Person, "(unclosed", 0.5);
        lib.add(EntityType::Person, r"\bOk\b", 0.5);
        let compiled = lib.compile();
        assert_eq!(compiled.apply("Ok then").len(), 1);
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = ares_core::NativeVfs::new(dir.path());
        let mut lib = PatternLibrary::new("persisted", "fantasy");
        lib.add(EntityType::House, r"\bHouse [A-Z]\w+\b", 0.75);
        lib.save(&vfs, "patterns.json").await.unwrap();

        let loaded = PatternLibrary::load(&vfs, "patterns.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "persisted");
        assert_eq!(loaded.entity_types[&EntityType::House].len(), 1);

        assert!(PatternLibrary::load(&vfs, "missing.json").await.unwrap().is_none());
    }
}
