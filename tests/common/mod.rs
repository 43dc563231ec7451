//! Shared helpers for the integration suite.

use ares::analyzer::HeuristicAnalyzer;
use ares::pipeline::Pipeline;
use ares::ProcessMode;
use ares_core::NativeVfs;
use std::path::Path;
use std::sync::Arc;

/// A pipeline rooted at `dir`, running the deterministic built-in analyzer
/// so no network is involved.
pub async fn pipeline_in(dir: &Path) -> Pipeline {
    Pipeline::builder(Arc::new(NativeVfs::new(dir)))
        .with_mode(ProcessMode::Legacy)
        .with_analyzer(Arc::new(HeuristicAnalyzer))
        .build()
        .await
        .expect("pipeline build")
}

/// Entity lookup by canonical surface, any type.
pub fn entity_id_by_canonical(graph: &ares::KnowledgeGraph, canonical: &str) -> String {
    graph
        .entities
        .iter()
        .find(|e| e.canonical.eq_ignore_ascii_case(canonical))
        .unwrap_or_else(|| panic!("entity '{}' not found", canonical))
        .id
        .clone()
}
