use std::collections::HashSet;

use async_trait::async_trait;
use common::{
    error::{with_timeout, AppError, ProviderError},
    storage::{document_store::DocumentStore, types::search_hit::SearchHit},
    utils::embedding::TextEmbedder,
};
use tracing::{debug, instrument, warn};

use crate::{
    reranking::RerankChain,
    scoring::{reciprocal_rank_fusion, FusedResult},
    search::{lexical_candidates, vector_candidates},
    RankedResult,
};

use super::{
    config::{RetrievalRequest, RetrievalTuning},
    diagnostics::{CollectCandidatesStats, FuseStats, PipelineDiagnostics, RerankStats, ScopeStats},
    PipelineStage, PipelineStageTimings, StageKind,
};

pub struct PipelineContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub embedder: &'a dyn TextEmbedder,
    pub reranker: &'a RerankChain,
    pub tuning: &'a RetrievalTuning,
    pub request: RetrievalRequest,
    /// Documents eligible under the tag filter; `None` when no tags were requested.
    pub allowed_documents: Option<HashSet<String>>,
    pub query_embedding: Option<Vec<f32>>,
    pub vector_hits: Vec<SearchHit>,
    pub lexical_hits: Vec<SearchHit>,
    pub candidates: Vec<FusedResult>,
    pub results: Vec<RankedResult>,
    pub diagnostics: Option<PipelineDiagnostics>,
    terminal: bool,
    stage_timings: PipelineStageTimings,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        embedder: &'a dyn TextEmbedder,
        reranker: &'a RerankChain,
        tuning: &'a RetrievalTuning,
        request: RetrievalRequest,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            tuning,
            request,
            allowed_documents: None,
            query_embedding: None,
            vector_hits: Vec::new(),
            lexical_hits: Vec::new(),
            candidates: Vec::new(),
            results: Vec::new(),
            diagnostics: None,
            terminal: false,
            stage_timings: PipelineStageTimings::default(),
        }
    }

    pub fn enable_diagnostics(&mut self) {
        if self.diagnostics.is_none() {
            self.diagnostics = Some(PipelineDiagnostics::default());
        }
    }

    /// Ends the run: later stages are skipped and the results stay empty.
    pub fn finish_early(&mut self) {
        self.terminal = true;
    }

    pub const fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn record_scope(&mut self, stats: ScopeStats) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.scope = Some(stats);
        }
    }

    fn record_collect_candidates(&mut self, stats: CollectCandidatesStats) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.collect_candidates = Some(stats);
        }
    }

    fn record_fuse(&mut self, stats: FuseStats) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.fuse = Some(stats);
        }
    }

    fn record_rerank(&mut self, stats: RerankStats) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.rerank = Some(stats);
        }
    }

    pub fn take_diagnostics(&mut self) -> Option<PipelineDiagnostics> {
        self.diagnostics.take()
    }

    pub fn take_stage_timings(&mut self) -> PipelineStageTimings {
        std::mem::take(&mut self.stage_timings)
    }

    pub fn record_stage_duration(&mut self, kind: StageKind, duration: std::time::Duration) {
        self.stage_timings.record(kind, duration);
    }

    pub fn take_results(&mut self) -> Vec<RankedResult> {
        std::mem::take(&mut self.results)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveScopeStage;

#[async_trait]
impl PipelineStage for ResolveScopeStage {
    fn kind(&self) -> StageKind {
        StageKind::ResolveScope
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        resolve_scope(ctx).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmbedStage;

#[async_trait]
impl PipelineStage for EmbedStage {
    fn kind(&self) -> StageKind {
        StageKind::Embed
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        embed(ctx).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectCandidatesStage;

#[async_trait]
impl PipelineStage for CollectCandidatesStage {
    fn kind(&self) -> StageKind {
        StageKind::CollectCandidates
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        collect_candidates(ctx).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FuseStage;

#[async_trait]
impl PipelineStage for FuseStage {
    fn kind(&self) -> StageKind {
        StageKind::Fuse
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        fuse(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RerankStage;

#[async_trait]
impl PipelineStage for RerankStage {
    fn kind(&self) -> StageKind {
        StageKind::Rerank
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        rerank(ctx).await;
        Ok(())
    }
}

#[instrument(level = "trace", skip_all)]
pub async fn resolve_scope(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    if !ctx.request.is_tag_scoped() {
        return Ok(());
    }

    let tags = ctx.request.tags.clone();
    let lookup = with_timeout(ctx.tuning.provider_timeout(), async {
        ctx.store
            .resolve_tag_scope(&tags, ctx.request.project_id.as_deref())
            .await
            .map_err(ProviderError::from)
    })
    .await;

    // An unresolvable filter must not widen the search, so failure counts as an empty scope.
    let documents = match lookup {
        Ok(documents) => documents,
        Err(err) => {
            warn!(error = %err, "Tag scope lookup failed; treating scope as empty");
            HashSet::new()
        }
    };

    let short_circuited = documents.is_empty();
    ctx.record_scope(ScopeStats {
        tags_requested: tags,
        documents_in_scope: documents.len(),
        short_circuited,
    });

    if short_circuited {
        debug!("Tag scope matched no documents; skipping search");
        ctx.finish_early();
    } else {
        debug!(documents = documents.len(), "Tag scope resolved");
        ctx.allowed_documents = Some(documents);
    }

    Ok(())
}

#[instrument(level = "trace", skip_all)]
pub async fn embed(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    debug!("Generating query embedding for hybrid retrieval");
    let embedder = ctx.embedder;
    let query = ctx.request.query.as_str();

    match with_timeout(ctx.tuning.provider_timeout(), embedder.embed(query)).await {
        Ok(embedding) if !embedding.is_empty() => {
            ctx.query_embedding = Some(embedding);
        }
        Ok(_) => {
            warn!("Embedding provider returned an empty vector; continuing lexical-only");
        }
        Err(err) => {
            warn!(error = %err, "Query embedding failed; continuing lexical-only");
        }
    }

    Ok(())
}

#[instrument(level = "trace", skip_all)]
pub async fn collect_candidates(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    debug!("Collecting candidates via vector and lexical search");
    let tuning = ctx.tuning;
    let timeout = tuning.provider_timeout();
    let take = tuning.search_take(ctx.request.top_k, ctx.request.is_tag_scoped());
    let scope = ctx.request.project_id.as_deref();
    let allowlist = ctx.allowed_documents.as_ref();
    let embedding = ctx.query_embedding.as_deref().unwrap_or_default();

    let (vector_hits, lexical_hits) = tokio::join!(
        vector_candidates(
            ctx.store,
            embedding,
            take,
            tuning.similarity_threshold,
            scope,
            allowlist,
            timeout,
        ),
        lexical_candidates(
            ctx.store,
            &ctx.request.query,
            take,
            scope,
            allowlist,
            timeout,
        ),
    );

    debug!(
        vector = vector_hits.len(),
        lexical = lexical_hits.len(),
        take,
        "Candidate collection finished"
    );

    if ctx.diagnostics.is_some() {
        let stats = CollectCandidatesStats {
            embedding_available: ctx.query_embedding.is_some(),
            search_take: take,
            vector_candidates: vector_hits.len(),
            lexical_candidates: lexical_hits.len(),
            vector_similarities: vector_hits
                .iter()
                .filter_map(|hit| hit.similarity)
                .collect(),
        };
        ctx.record_collect_candidates(stats);
    }

    ctx.vector_hits = vector_hits;
    ctx.lexical_hits = lexical_hits;
    Ok(())
}

#[instrument(level = "trace", skip_all)]
pub fn fuse(ctx: &mut PipelineContext<'_>) {
    let vector_hits = std::mem::take(&mut ctx.vector_hits);
    let lexical_hits = std::mem::take(&mut ctx.lexical_hits);

    let mut fused = reciprocal_rank_fusion(vector_hits, lexical_hits, ctx.tuning.rrf_config());
    let fused_count = fused.len();
    let found_by_both = fused.iter().filter(|item| item.found_by_both()).count();

    let cap = ctx.tuning.candidate_cap.max(1);
    fused.truncate(cap);

    debug!(fused_count, kept = fused.len(), "Fused candidate lists");
    ctx.record_fuse(FuseStats {
        fused_count,
        found_by_both,
        candidate_cap: cap,
        candidates_after_cap: fused.len(),
    });
    ctx.candidates = fused;
}

#[instrument(level = "trace", skip_all)]
pub async fn rerank(ctx: &mut PipelineContext<'_>) {
    let candidates = std::mem::take(&mut ctx.candidates);
    if candidates.is_empty() {
        debug!("No candidates to rerank");
        return;
    }

    let outcome = ctx
        .reranker
        .rerank(&ctx.request.query, candidates, ctx.request.top_k)
        .await;

    debug!(tier = %outcome.tier, returned = outcome.results.len(), "Rerank finished");
    ctx.record_rerank(RerankStats {
        tier: outcome.tier,
        failed_tiers: outcome
            .failed_tiers
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect(),
        returned: outcome.results.len(),
    });
    ctx.results = outcome.results;
}
