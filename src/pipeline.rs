//! The ingestion orchestrator.
//!
//! One `append_doc` call is a single logical writer over the graph file.
//! Inside the call, analyzer RPCs fan out over chunks on a bounded pool;
//! everything that touches the registries or the graph happens afterwards on
//! the orchestrator task, under the registry lock. Failure never leaves a
//! partial snapshot: the new graph replaces the old in memory only after the
//! atomic write succeeds.

use crate::analyzer::{
    Analyzer, AnalyzeRequest, BookNlpAnalyzer, HeuristicAnalyzer, HttpAnalyzer, ParsedDoc,
};
use crate::canonicalize::{canonicalize_local, LocalEntity};
use crate::config::{DebugFlags, ExtractionConfig, ProcessMode};
use crate::conflict;
use crate::coref::{token_owner_map, CorefResolver, CorefTarget, GlobalCandidate};
use crate::corrections::{self, OverrideOutcome};
use crate::error::IngestError;
use crate::extract::{
    CompiledPatterns, Mention, MentionExtractor, PatternLibrary, RelationExtractor,
};
use crate::graph::KnowledgeGraph;
use crate::identity::{
    lp_hash, AidAttrs, AidRegistry, Did, EidRegistry, Hert, IdentityError, Location,
};
use crate::sense::SenseRegistry;
use crate::lexicon::Whitelist;
use crate::merge::Merger;
use crate::model::{
    Conflict, Correction, Entity, Evidence, ExtractorTag, MentionSource, MergeStats,
    ProvenanceEntry, Relation,
};
use crate::normalize;
use crate::segment;
use ares_core::Vfs;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const GRAPH_FILE: &str = "graph.json";
const EID_FILE: &str = "eid_registry.json";
const AID_FILE: &str = "aid_registry.json";
const SENSE_FILE: &str = "sense_registry.json";
const PATTERN_FILE: &str = "patterns.json";

/// The three identity registries, locked together: they are only touched at
/// merge/write time from the orchestrator task or the periodic saver.
pub struct Registries {
    pub eids: EidRegistry,
    pub aids: AidRegistry,
    pub senses: SenseRegistry,
}

/// Per-call options for `append_doc`.
#[derive(Debug, Clone)]
pub struct AppendOptions {
    /// Carry the raw analyzer output in the outcome.
    pub include_analyzer_output: bool,
    /// Document version fed into DID derivation.
    pub version: u32,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            include_analyzer_output: false,
            version: 1,
        }
    }
}

/// A mention reference in the outcome: the packed form plus its readable
/// rendering and the surface it covered.
#[derive(Debug, Clone)]
pub struct MentionRef {
    pub hert: Hert,
    pub readable: String,
    pub surface: String,
}

#[derive(Debug)]
pub struct AppendOutcome {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub conflicts: Vec<Conflict>,
    pub merge_count: usize,
    pub stats: MergeStats,
    pub local_entities: Vec<LocalEntity>,
    pub spans: Vec<MentionRef>,
    pub override_outcome: OverrideOutcome,
    pub analyzer_output: Option<ParsedDoc>,
}

pub struct Pipeline {
    vfs: Arc<dyn Vfs>,
    config: ExtractionConfig,
    mode: ProcessMode,
    debug: DebugFlags,
    whitelist: Whitelist,
    analyzer: Arc<dyn Analyzer>,
    booknlp: Option<Arc<dyn Analyzer>>,
    patterns: Option<Arc<CompiledPatterns>>,
    registries: Arc<Mutex<Registries>>,
    graph: KnowledgeGraph,
}

pub struct PipelineBuilder {
    vfs: Arc<dyn Vfs>,
    config: ExtractionConfig,
    mode: ProcessMode,
    whitelist: Whitelist,
    analyzer: Option<Arc<dyn Analyzer>>,
    booknlp: Option<Arc<dyn Analyzer>>,
    pattern_library: Option<PatternLibrary>,
}

impl PipelineBuilder {
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mode(mut self, mode: ProcessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_booknlp(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.booknlp = Some(analyzer);
        self
    }

    pub fn with_pattern_library(mut self, library: PatternLibrary) -> Self {
        self.pattern_library = Some(library);
        self
    }

    /// Load persisted state and assemble the pipeline. An unreadable graph
    /// snapshot starts empty (the load-returns-no-graph policy); registries
    /// and the pattern library load from their own files.
    pub async fn build(self) -> Result<Pipeline, IngestError> {
        let timeout = Duration::from_millis(self.config.analyzer_timeout_ms);
        let analyzer: Arc<dyn Analyzer> = match self.analyzer {
            Some(analyzer) => analyzer,
            None => match self.mode {
                ProcessMode::Legacy => Arc::new(HeuristicAnalyzer),
                _ => {
                    let endpoint = ares_core::env::get("ARES_PARSER_URL")
                        .unwrap_or_else(|| "http://127.0.0.1:8765/analyze".to_string());
                    Arc::new(HttpAnalyzer::new(&endpoint, timeout))
                }
            },
        };
        let booknlp: Option<Arc<dyn Analyzer>> = if self.mode.uses_booknlp() {
            Some(match self.booknlp {
                Some(analyzer) => analyzer,
                None => {
                    let endpoint = ares_core::env::get("ARES_BOOKNLP_URL")
                        .unwrap_or_else(|| "http://127.0.0.1:8766/analyze".to_string());
                    Arc::new(BookNlpAnalyzer::new(&endpoint, timeout))
                }
            })
        } else {
            None
        };

        let patterns = if ares_core::env::flag("SKIP_PATTERN_LIBRARY") {
            None
        } else {
            let library = match self.pattern_library {
                Some(library) => Some(library),
                None => PatternLibrary::load(self.vfs.as_ref(), PATTERN_FILE).await?,
            };
            library.map(|l| Arc::new(l.compile()))
        };

        let graph = KnowledgeGraph::load(self.vfs.as_ref(), GRAPH_FILE)
            .await?
            .unwrap_or_else(KnowledgeGraph::new);
        let eids = EidRegistry::load(
            self.vfs.as_ref(),
            EID_FILE,
            normalize::normalize_for_aliasing,
        )
        .await?;
        let aids = AidRegistry::load(self.vfs.as_ref(), AID_FILE).await?;
        let senses = SenseRegistry::load(self.vfs.as_ref(), SENSE_FILE).await?;

        Ok(Pipeline {
            vfs: self.vfs,
            config: self.config,
            mode: self.mode,
            debug: DebugFlags::from_env(),
            whitelist: self.whitelist,
            analyzer,
            booknlp,
            patterns,
            registries: Arc::new(Mutex::new(Registries { eids, aids, senses })),
            graph,
        })
    }
}

impl Pipeline {
    pub fn builder(vfs: Arc<dyn Vfs>) -> PipelineBuilder {
        PipelineBuilder {
            vfs,
            config: ExtractionConfig::default(),
            mode: ProcessMode::from_env(),
            whitelist: Whitelist::default(),
            analyzer: None,
            booknlp: None,
            pattern_library: None,
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    /// Exclusive access to the identity registries.
    pub async fn registries(&self) -> tokio::sync::MutexGuard<'_, Registries> {
        self.registries.lock().await
    }

    /// Spawn the periodic registry saver. The task holds the registry lock
    /// only while serializing; dropping the handle aborts it (process exit
    /// still saves through `save_registries`).
    pub fn spawn_registry_saver(&self) -> tokio::task::JoinHandle<()> {
        let registries = Arc::clone(&self.registries);
        let vfs = Arc::clone(&self.vfs);
        let interval = Duration::from_millis(self.config.registry_save_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let registries = registries.lock().await;
                if let Err(e) = save_registries(vfs.as_ref(), &registries).await {
                    tracing::warn!(error = %e, "periodic registry save failed");
                }
            }
        })
    }

    pub async fn save_registries(&self) -> Result<(), IngestError> {
        let registries = self.registries.lock().await;
        save_registries(self.vfs.as_ref(), &registries)
            .await
            .map_err(IngestError::from)
    }

    /// Append a correction to the persisted log, replay it, and record a
    /// version entry for it.
    pub async fn record_correction(
        &mut self,
        correction: Correction,
    ) -> Result<OverrideOutcome, IngestError> {
        let mut graph = self.graph.clone();
        let correction_id = correction.id.clone();
        graph.corrections.push(correction);
        let outcome = corrections::apply_corrections(&mut graph, self.debug.l3);
        graph.record_version(Some(correction_id));
        graph.update_counts();
        graph
            .check_integrity()
            .map_err(|detail| IngestError::InvariantViolation { detail })?;
        graph.save(self.vfs.as_ref(), GRAPH_FILE).await?;
        self.graph = graph;
        Ok(outcome)
    }

    /// The public ingestion operation.
    pub async fn append_doc(
        &mut self,
        doc_id: &str,
        text: &str,
        options: AppendOptions,
    ) -> Result<AppendOutcome, IngestError> {
        if self.graph.has_doc(doc_id) {
            return Err(IngestError::DuplicateDocument {
                doc_id: doc_id.to_string(),
            });
        }

        // Phase 1: analyzer fan-out over chunks, reduced in chunk order.
        let doc = self.analyze_document(doc_id, text).await?;

        // Phase 2: extraction, coreference, local canonicalization.
        let extractor = MentionExtractor::new(&self.config, &self.whitelist, self.debug.l3);
        let mut mentions = extractor.extract(&doc, self.patterns.as_deref());

        let extraction_types = self.extraction_types();
        let graph = &self.graph;
        let global_candidates: Vec<GlobalCandidate<'_>> = graph
            .entities
            .iter()
            .filter(|e| !e.rejected)
            .map(|e| GlobalCandidate {
                global_id: &e.id,
                canonical: &e.canonical,
                entity_type: extraction_types
                    .get(e.id.as_str())
                    .copied()
                    .unwrap_or(e.entity_type),
                profile: graph.profiles.get(&e.id).unwrap_or(&EMPTY_PROFILE),
            })
            .collect();

        let resolver = CorefResolver::new(&self.config, self.debug.l3);
        let links = resolver.resolve(&doc, &mentions, &global_candidates);
        drop(global_candidates);

        // Fold links into the token resolution map; global targets become
        // synthesized mentions so relations and aliases flow through merge.
        let mut resolved = token_owner_map(&mentions);
        let mut global_aliases: Vec<(String, String)> = Vec::new();
        for link in &links {
            let mention_idx = match &link.target {
                CorefTarget::Mention(idx) => *idx,
                CorefTarget::Global {
                    canonical,
                    entity_type,
                    ..
                } => {
                    global_aliases.push((
                        normalize::normalize_for_aliasing(canonical),
                        link.surface.clone(),
                    ));
                    mentions.push(Mention {
                        surface: canonical.clone(),
                        entity_type: *entity_type,
                        span: link.span,
                        source: MentionSource::Fallback,
                        confidence: link.confidence,
                        booknlp_id: None,
                    });
                    mentions.len() - 1
                }
            };
            for t in link.span.token_start..link.span.token_start + link.span.token_len {
                resolved.insert((link.span.paragraph, link.span.sentence, t), mention_idx);
            }
        }

        let relation_extractor = RelationExtractor::new(&self.config, self.debug.l3);
        let (candidates, facts) = relation_extractor.extract(&doc, &resolved);

        let (mut locals, mention_to_local) =
            canonicalize_local(doc_id, &doc, &mentions, &facts, &self.config);
        for (normalized, alias) in &global_aliases {
            if let Some(local) = locals.iter_mut().find(|l| &l.normalized == normalized) {
                if !local
                    .aliases
                    .iter()
                    .any(|a| a.to_lowercase() == alias.to_lowercase())
                    && local.canonical.to_lowercase() != alias.to_lowercase()
                {
                    local.aliases.push(alias.clone());
                }
            }
        }

        // Phase 3: cross-document merge over the full population, in doc
        // append order.
        let priors = self.reconstruct_priors();
        let mut population = priors;
        let new_offset = population.len();
        population.extend(locals.iter().cloned());

        let merger = Merger::new(&self.config, self.debug.merge);
        let merged = merger.merge(&population);

        // Phase 4: registries, rewiring, conflicts, corrections — all under
        // the registry lock, building a fresh graph that only replaces the
        // live one after a successful atomic write.
        let mut registries = self.registries.lock().await;
        let mut new_graph = self.build_graph(
            doc_id,
            &population[new_offset..],
            &merged,
            &candidates,
            &mention_to_local,
            &mentions,
            &mut registries,
        )?;

        new_graph
            .check_integrity()
            .map_err(|detail| IngestError::InvariantViolation { detail })?;

        let override_outcome = corrections::apply_corrections(&mut new_graph, self.debug.l3);
        new_graph.record_version(None);
        new_graph.update_counts();

        // Phase 5: atomic persistence; in-memory state flips only on success.
        new_graph.save(self.vfs.as_ref(), GRAPH_FILE).await?;
        save_registries(self.vfs.as_ref(), &registries).await?;

        let spans = self.build_mention_refs(
            doc_id,
            text,
            options.version,
            &doc,
            &mentions,
            &mention_to_local,
            &locals,
            &merged.id_map,
            &new_graph,
            &registries,
        );
        drop(registries);

        self.graph = new_graph;

        Ok(AppendOutcome {
            entities: self.graph.entities.clone(),
            relations: self.graph.relations.clone(),
            conflicts: self.graph.conflicts.clone(),
            merge_count: merged.stats.merged_clusters,
            stats: merged.stats,
            local_entities: locals,
            spans,
            override_outcome,
            analyzer_output: options.include_analyzer_output.then_some(doc),
        })
    }

    /// Chunked analyzer fan-out with per-chunk deadline and one retry.
    async fn analyze_document(&self, doc_id: &str, text: &str) -> Result<ParsedDoc, IngestError> {
        let chunks = segment::chunk(text, self.config.max_chunk_chars);
        if chunks.is_empty() {
            return Ok(ParsedDoc {
                paragraphs: Vec::new(),
                characters: Vec::new(),
                quotes: Vec::new(),
                mentions: Vec::new(),
                coref_links: Vec::new(),
            });
        }

        let primary: Arc<dyn Analyzer> = match self.mode {
            ProcessMode::BookNlp => Arc::clone(self.booknlp.as_ref().expect("booknlp mode")),
            _ => Arc::clone(&self.analyzer),
        };

        let mut results = self.run_chunks(&primary, doc_id, &chunks).await;
        if results.iter().all(Option::is_none) {
            return Err(IngestError::AnalyzerUnavailable {
                analyzer: primary.name().to_string(),
                detail: format!("all {} chunks failed", chunks.len()),
            });
        }

        let mut doc = ParsedDoc {
            paragraphs: Vec::new(),
            characters: Vec::new(),
            quotes: Vec::new(),
            mentions: Vec::new(),
            coref_links: Vec::new(),
        };
        for (i, result) in results.iter_mut().enumerate() {
            match result.take() {
                Some(chunk_doc) => doc.extend_from_chunk(chunk_doc),
                None => {
                    tracing::warn!(doc_id, chunk = i, "chunk dropped after retry");
                }
            }
        }

        // Hybrid mode: the literary analyzer contributes characters,
        // mentions, quotes, and coref links on top of the syntactic parse.
        if self.mode == ProcessMode::Hybrid {
            if let Some(booknlp) = &self.booknlp {
                let extra = self.run_chunks(booknlp, doc_id, &chunks).await;
                let mut extras = ParsedDoc {
                    paragraphs: Vec::new(),
                    characters: Vec::new(),
                    quotes: Vec::new(),
                    mentions: Vec::new(),
                    coref_links: Vec::new(),
                };
                for chunk_doc in extra.into_iter().flatten() {
                    extras.extend_from_chunk(chunk_doc);
                }
                doc.characters = extras.characters;
                doc.quotes = extras.quotes;
                doc.mentions = extras.mentions;
                doc.coref_links = extras.coref_links;
            }
        }

        Ok(doc)
    }

    /// Run one analyzer over all chunks with bounded parallelism. Results
    /// come back in chunk order; a chunk that fails its retry is None.
    async fn run_chunks(
        &self,
        analyzer: &Arc<dyn Analyzer>,
        doc_id: &str,
        chunks: &[segment::Chunk],
    ) -> Vec<Option<ParsedDoc>> {
        let timeout = Duration::from_millis(self.config.analyzer_timeout_ms);
        let mut results: Vec<Option<ParsedDoc>> = vec![None; chunks.len()];

        for wave in chunks.chunks(self.config.max_parallel_chunks.max(1)) {
            let mut handles = Vec::with_capacity(wave.len());
            for chunk in wave {
                let analyzer = Arc::clone(analyzer);
                let request = AnalyzeRequest {
                    text: chunk.text.clone(),
                    doc_id: Some(format!("{}#{}", doc_id, chunk.index)),
                    options: None,
                };
                let index = chunk.index;
                handles.push((index, tokio::spawn(analyze_with_retry(analyzer, request, timeout))));
            }
            for (index, handle) in handles {
                match handle.await {
                    Ok(result) => results[index] = result,
                    Err(e) => {
                        tracing::warn!(doc_id, chunk = index, error = %e, "analyzer task failed");
                    }
                }
            }
        }
        results
    }

    /// Extraction-time types per global id, read from provenance. Coref
    /// candidates must present the type extraction saw, not a corrected one,
    /// or re-merging would split the entity.
    fn extraction_types(&self) -> HashMap<&str, crate::model::EntityType> {
        let mut map = HashMap::new();
        for entry in self.graph.provenance.values() {
            map.entry(entry.global_id.as_str())
                .or_insert(entry.entity_type);
        }
        map
    }

    /// Rebuild the local-entity population of every prior document from
    /// provenance, in doc append order, with numeric local-id order within a
    /// document.
    fn reconstruct_priors(&self) -> Vec<LocalEntity> {
        let mut priors = Vec::new();
        for doc_id in &self.graph.doc_ids {
            let mut entries: Vec<(&String, &ProvenanceEntry)> = self
                .graph
                .provenance
                .iter()
                .filter(|(_, e)| &e.doc_id == doc_id)
                .collect();
            entries.sort_by_key(|(local_id, _)| local_ordinal(local_id));

            for (local_id, entry) in entries {
                let global = self.graph.entity(&entry.global_id);
                let profile = self
                    .graph
                    .profiles
                    .get(&entry.global_id)
                    .cloned()
                    .unwrap_or_default();
                priors.push(LocalEntity {
                    local_id: local_id.clone(),
                    entity_type: entry.entity_type,
                    canonical: entry.local_canonical.clone(),
                    normalized: normalize::normalize_for_aliasing(&entry.local_canonical),
                    aliases: global.map(|g| g.aliases.clone()).unwrap_or_default(),
                    source: global.and_then(|g| g.source).unwrap_or(MentionSource::Ner),
                    confidence: 0.85,
                    profile,
                    mentions: Vec::new(),
                    booknlp_id: None,
                });
            }
        }
        priors
    }

    /// Assemble the next graph snapshot: entities with registry identity,
    /// carried-over relations remapped to their new global ids, new
    /// relations rewired from mention space, symmetric canonicalization,
    /// and fresh conflicts.
    #[allow(clippy::too_many_arguments)]
    fn build_graph(
        &self,
        doc_id: &str,
        new_locals: &[LocalEntity],
        merged: &crate::merge::MergeOutcome,
        candidates: &[crate::extract::RelationCandidate],
        mention_to_local: &[usize],
        mentions: &[Mention],
        registries: &mut Registries,
    ) -> Result<KnowledgeGraph, IngestError> {
        let now = ares_core::time::now_millis();
        let mut new_graph = KnowledgeGraph::new();
        new_graph.metadata.created_at = self.graph.metadata.created_at;
        new_graph.doc_ids = self.graph.doc_ids.clone();
        new_graph.doc_ids.push(doc_id.to_string());
        new_graph.corrections = self.graph.corrections.clone();
        new_graph.versions = self.graph.versions.clone();

        // Entities with registry identity.
        for global in &merged.globals {
            let (eid, sense_path) = assign_identity(registries, global, &self.config)
                .map_err(|e| match e {
                    IdentityError::Exhausted { registry } => {
                        IngestError::IdSpaceExhausted { registry }
                    }
                    IdentityError::WidthExceeded { kind, .. } => {
                        IngestError::IdSpaceExhausted { registry: kind }
                    }
                })?;

            registries
                .aids
                .register(
                    &global.canonical,
                    eid,
                    global.confidence.max(0.5),
                    AidAttrs {
                        entity_type: Some(global.entity_type),
                        ..AidAttrs::default()
                    },
                )
                .map_err(|_| IngestError::IdSpaceExhausted { registry: "AID" })?;
            for alias in &global.aliases {
                registries
                    .aids
                    .register(
                        alias,
                        eid,
                        (global.confidence * 0.9).max(0.4),
                        AidAttrs {
                            entity_type: Some(global.entity_type),
                            ..AidAttrs::default()
                        },
                    )
                    .map_err(|_| IngestError::IdSpaceExhausted { registry: "AID" })?;
            }

            let created_at = self
                .graph
                .entity(&global.global_id)
                .map(|e| e.created_at)
                .unwrap_or(now);
            new_graph.entities.push(Entity {
                id: global.global_id.clone(),
                eid: Some(eid),
                entity_type: global.entity_type,
                canonical: global.canonical.clone(),
                aliases: global.aliases.clone(),
                source: Some(global.source),
                sense_path: Some(sense_path),
                manual_override: false,
                rejected: false,
                created_at,
            });
            new_graph
                .profiles
                .insert(global.global_id.clone(), global.profile.clone());
        }

        // Provenance: prior entries remapped in place, new locals appended.
        let mut old_to_new: HashMap<&String, &String> = HashMap::new();
        for (local_id, old_entry) in &self.graph.provenance {
            if let Some(new_global) = merged.id_map.get(local_id) {
                let mut entry = old_entry.clone();
                old_to_new.insert(&old_entry.global_id, new_global);
                entry.global_id = new_global.clone();
                new_graph.provenance.insert(local_id.clone(), entry);
            }
        }
        for local in new_locals {
            let Some(global_id) = merged.id_map.get(&local.local_id) else {
                continue;
            };
            new_graph.provenance.insert(
                local.local_id.clone(),
                ProvenanceEntry {
                    global_id: global_id.clone(),
                    doc_id: doc_id.to_string(),
                    merged_at: now,
                    local_canonical: local.canonical.clone(),
                    entity_type: local.entity_type,
                },
            );
        }

        // Carried-over relations, endpoints remapped where merging moved
        // their globals. Relations whose endpoints only exist through a
        // correction (merge targets, split outputs, manual adds) drop here;
        // the replay below re-establishes them.
        for relation in &self.graph.relations {
            let mut relation = relation.clone();
            if let Some(new_id) = old_to_new.get(&relation.subject) {
                relation.subject = (*new_id).clone();
            }
            if let Some(new_id) = old_to_new.get(&relation.object) {
                relation.object = (*new_id).clone();
            }
            let endpoints_exist = new_graph.entities.iter().any(|e| e.id == relation.subject)
                && new_graph.entities.iter().any(|e| e.id == relation.object);
            if !endpoints_exist {
                tracing::debug!(relation = %relation.id, "carried relation waits for correction replay");
                continue;
            }
            push_or_merge_relation(&mut new_graph.relations, relation);
        }

        // New relations, rewired mention -> local -> global.
        let local_to_global = |mention_idx: usize| -> Option<String> {
            let local_idx = *mention_to_local.get(mention_idx)?;
            if local_idx == usize::MAX {
                return None;
            }
            let local = new_locals.get(local_idx)?;
            merged.id_map.get(&local.local_id).cloned()
        };
        let mut next_rel = new_graph.relations.len();
        for candidate in candidates {
            let (Some(subject), Some(object)) = (
                local_to_global(candidate.subject),
                local_to_global(candidate.object),
            ) else {
                // The extractor never invents an entity; an unresolvable
                // argument discards the relation.
                continue;
            };
            if subject == object {
                continue;
            }
            next_rel += 1;
            push_or_merge_relation(
                &mut new_graph.relations,
                Relation {
                    id: format!("rel_{}", next_rel),
                    subject,
                    predicate: candidate.predicate,
                    object,
                    confidence: candidate.confidence,
                    evidence: vec![Evidence {
                        doc_id: doc_id.to_string(),
                        paragraph: candidate.paragraph,
                        token_start: candidate.token_start,
                        token_len: candidate.token_len,
                        quote: candidate.quote.clone(),
                    }],
                    qualifiers: candidate.qualifiers.clone(),
                    extractor: match mentions
                        .get(candidate.subject)
                        .map(|m| m.source)
                        .unwrap_or(MentionSource::Dep)
                    {
                        MentionSource::Booknlp => ExtractorTag::Booknlp,
                        MentionSource::Pattern => ExtractorTag::Pattern,
                        _ => ExtractorTag::Dep,
                    },
                    manual_override: false,
                },
            );
        }

        conflict::canonicalize_symmetric(&mut new_graph.relations);

        // Stable storage order: (subject canonical, predicate, object
        // canonical).
        let canonical_of: HashMap<String, String> = new_graph
            .entities
            .iter()
            .map(|e| (e.id.clone(), e.canonical.clone()))
            .collect();
        new_graph.relations.sort_by(|a, b| {
            let ka = (
                canonical_of.get(&a.subject),
                a.predicate.as_str(),
                canonical_of.get(&a.object),
            );
            let kb = (
                canonical_of.get(&b.subject),
                b.predicate.as_str(),
                canonical_of.get(&b.object),
            );
            ka.cmp(&kb)
        });

        new_graph.conflicts = conflict::detect(&new_graph.relations);
        Ok(new_graph)
    }

    /// Encode a HERT for every mention that survived into a global entity.
    #[allow(clippy::too_many_arguments)]
    fn build_mention_refs(
        &self,
        doc_id: &str,
        text: &str,
        version: u32,
        doc: &ParsedDoc,
        mentions: &[Mention],
        mention_to_local: &[usize],
        locals: &[LocalEntity],
        id_map: &HashMap<String, String>,
        graph: &KnowledgeGraph,
        registries: &Registries,
    ) -> Vec<MentionRef> {
        let did = Did::derive(doc_id, text.as_bytes(), version);
        let mut refs = Vec::new();
        for (idx, mention) in mentions.iter().enumerate() {
            let Some(&local_idx) = mention_to_local.get(idx) else {
                continue;
            };
            if local_idx == usize::MAX {
                continue;
            }
            let Some(global_id) = locals
                .get(local_idx)
                .and_then(|l| id_map.get(&l.local_id))
            else {
                continue;
            };
            let Some(entity) = graph.entity(global_id) else {
                continue;
            };
            let Some(eid) = entity.eid else {
                continue;
            };
            let location = Location {
                paragraph: mention.span.paragraph as u32,
                token_start: mention.span.paragraph_token_start(doc) as u32,
                token_len: mention.span.token_len as u16,
            };
            let hert = Hert {
                did,
                eid,
                aid: registries.aids.lookup(&mention.surface).map(|r| r.aid),
                sense_path: entity.sense_path.clone(),
                lp_hash: lp_hash(&location),
                location,
            };
            refs.push(MentionRef {
                readable: hert.to_string(),
                surface: mention.surface.clone(),
                hert,
            });
        }
        refs
    }
}

static EMPTY_PROFILE: once_cell::sync::Lazy<crate::profile::EntityProfile> =
    once_cell::sync::Lazy::new(crate::profile::EntityProfile::default);

/// Bind a merged global to its sense and EID: an existing binding for the
/// same global id wins, then a profile-matched same-type sense, then a fresh
/// sense path and EID.
fn assign_identity(
    registries: &mut Registries,
    global: &crate::merge::GlobalEntity,
    config: &ExtractionConfig,
) -> Result<(crate::identity::Eid, Vec<u16>), IdentityError> {
    if let Some(entry) = registries
        .senses
        .sense_for_global(&global.normalized, &global.global_id)
    {
        if entry.entity_type == global.entity_type {
            let (eid, path) = (entry.eid, entry.sense_path.clone());
            registries
                .senses
                .rebind(&global.normalized, eid, &global.profile, &global.global_id);
            return Ok((eid, path));
        }
    }

    if let Some(entry) = registries.senses.find_matching_sense(
        &global.normalized,
        global.entity_type,
        Some(&global.profile),
        config,
    ) {
        let (eid, path) = (entry.eid, entry.sense_path.clone());
        registries
            .senses
            .rebind(&global.normalized, eid, &global.profile, &global.global_id);
        return Ok((eid, path));
    }

    // Divergent profiles under the same (canonical, type), or a new type
    // under this canonical: allocate the next dense sense and a fresh EID.
    let path = registries.senses.next_sense_path(&global.normalized);
    let eid = registries.eids.get_or_create(
        &global.canonical,
        &global.normalized,
        global.entity_type,
        &path,
    )?;
    registries.senses.register_sense(
        &global.normalized,
        global.entity_type,
        path.clone(),
        eid,
        global.profile.clone(),
        Some(global.global_id.clone()),
    );
    Ok((eid, path))
}

/// Accumulate evidence on an existing (subject, predicate, object) relation
/// instead of storing duplicates.
fn push_or_merge_relation(relations: &mut Vec<Relation>, relation: Relation) {
    if let Some(existing) = relations.iter_mut().find(|r| {
        r.subject == relation.subject
            && r.predicate == relation.predicate
            && r.object == relation.object
    }) {
        for evidence in relation.evidence {
            if !existing.evidence.contains(&evidence) {
                existing.evidence.push(evidence);
            }
        }
        for qualifier in relation.qualifiers {
            if !existing.qualifiers.contains(&qualifier) {
                existing.qualifiers.push(qualifier);
            }
        }
        existing.confidence = existing.confidence.max(relation.confidence);
        existing.manual_override |= relation.manual_override;
    } else {
        relations.push(relation);
    }
}

async fn analyze_with_retry(
    analyzer: Arc<dyn Analyzer>,
    request: AnalyzeRequest,
    timeout: Duration,
) -> Option<ParsedDoc> {
    for attempt in 0..2u8 {
        let analyzer = Arc::clone(&analyzer);
        let request = request.clone();
        let call = tokio::task::spawn_blocking(move || analyzer.analyze(&request));
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(doc))) => return Some(doc),
            Ok(Ok(Err(e))) => {
                tracing::warn!(attempt, error = %e, "analyzer call failed");
            }
            Ok(Err(join_error)) => {
                tracing::warn!(attempt, error = %join_error, "analyzer task panicked");
            }
            Err(_) => {
                tracing::warn!(attempt, timeout_ms = timeout.as_millis() as u64, "analyzer call timed out");
            }
        }
    }
    None
}

async fn save_registries(
    vfs: &dyn Vfs,
    registries: &Registries,
) -> Result<(), ares_core::VfsError> {
    registries.eids.save(vfs, EID_FILE).await?;
    registries.aids.save(vfs, AID_FILE).await?;
    registries.senses.save(vfs, SENSE_FILE).await?;
    Ok(())
}

/// Numeric ordinal of a local id ("doc::e12" sorts after "doc::e2").
fn local_ordinal(local_id: &str) -> usize {
    local_id
        .rsplit("::e")
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ordinals_sort_numerically() {
        let mut ids = vec!["d::e10", "d::e2", "d::e1"];
        ids.sort_by_key(|id| local_ordinal(id));
        assert_eq!(ids, vec!["d::e1", "d::e2", "d::e10"]);
    }

    #[test]
    fn relation_merge_accumulates_evidence() {
        let base = Relation {
            id: "rel_1".into(),
            subject: "a".into(),
            predicate: crate::model::Predicate::TraveledTo,
            object: "b".into(),
            confidence: 0.7,
            evidence: vec![Evidence {
                doc_id: "d1".into(),
                paragraph: 0,
                token_start: 0,
                token_len: 5,
                quote: "one".into(),
            }],
            qualifiers: Vec::new(),
            extractor: ExtractorTag::Dep,
            manual_override: false,
        };
        let mut dup = base.clone();
        dup.id = "rel_2".into();
        dup.confidence = 0.9;
        dup.evidence[0].doc_id = "d2".into();

        let mut relations = Vec::new();
        push_or_merge_relation(&mut relations, base);
        push_or_merge_relation(&mut relations, dup);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].evidence.len(), 2);
        assert!((relations[0].confidence - 0.9).abs() < 1e-9);
    }
}
