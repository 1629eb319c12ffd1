use serde::Serialize;

use crate::reranking::RerankTierKind;

/// Captures instrumentation for each retrieval stage when diagnostics are enabled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineDiagnostics {
    pub scope: Option<ScopeStats>,
    pub collect_candidates: Option<CollectCandidatesStats>,
    pub fuse: Option<FuseStats>,
    pub rerank: Option<RerankStats>,
}

impl PipelineDiagnostics {
    /// True when an empty tag scope ended the run before any search.
    pub fn short_circuited(&self) -> bool {
        self.scope.as_ref().is_some_and(|scope| scope.short_circuited)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScopeStats {
    pub tags_requested: Vec<String>,
    pub documents_in_scope: usize,
    pub short_circuited: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectCandidatesStats {
    pub embedding_available: bool,
    pub search_take: usize,
    pub vector_candidates: usize,
    pub lexical_candidates: usize,
    pub vector_similarities: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FuseStats {
    pub fused_count: usize,
    pub found_by_both: usize,
    pub candidate_cap: usize,
    pub candidates_after_cap: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankStats {
    pub tier: RerankTierKind,
    pub failed_tiers: Vec<String>,
    pub returned: usize,
}
