mod config;
mod diagnostics;
mod stages;

pub use config::{RetrievalConfig, RetrievalRequest, RetrievalTuning};
pub use diagnostics::{
    CollectCandidatesStats, FuseStats, PipelineDiagnostics, RerankStats, ScopeStats,
};

use async_trait::async_trait;
use common::{
    error::AppError, storage::document_store::DocumentStore, utils::embedding::TextEmbedder,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::{reranking::RerankChain, RankedResult};
use stages::{
    CollectCandidatesStage, EmbedStage, FuseStage, PipelineContext, RerankStage, ResolveScopeStage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    ResolveScope,
    Embed,
    CollectCandidates,
    Fuse,
    Rerank,
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;
    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError>;
}

pub type BoxedStage = Box<dyn PipelineStage>;

fn hybrid_stages() -> Vec<BoxedStage> {
    vec![
        Box::new(ResolveScopeStage),
        Box::new(EmbedStage),
        Box::new(CollectCandidatesStage),
        Box::new(FuseStage),
        Box::new(RerankStage),
    ]
}

#[derive(Debug, Default, Clone)]
pub struct PipelineStageTimings {
    timings: Vec<(StageKind, Duration)>,
}

impl PipelineStageTimings {
    pub fn record(&mut self, kind: StageKind, duration: Duration) {
        self.timings.push((kind, duration));
    }

    /// Stages that actually ran, in order.
    pub fn stages_run(&self) -> Vec<StageKind> {
        self.timings.iter().map(|(kind, _)| *kind).collect()
    }

    fn get_stage_ms(&self, kind: StageKind) -> u128 {
        self.timings
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, d)| d.as_millis())
            .unwrap_or(0)
    }

    pub fn embed_ms(&self) -> u128 {
        self.get_stage_ms(StageKind::Embed)
    }

    pub fn collect_candidates_ms(&self) -> u128 {
        self.get_stage_ms(StageKind::CollectCandidates)
    }

    pub fn rerank_ms(&self) -> u128 {
        self.get_stage_ms(StageKind::Rerank)
    }
}

pub struct PipelineRunOutput<T> {
    pub results: T,
    pub diagnostics: Option<PipelineDiagnostics>,
    pub stage_timings: PipelineStageTimings,
}

pub(crate) async fn run_pipeline(
    store: &dyn DocumentStore,
    embedder: &dyn TextEmbedder,
    reranker: &RerankChain,
    tuning: &RetrievalTuning,
    request: RetrievalRequest,
    capture_diagnostics: bool,
) -> Result<PipelineRunOutput<Vec<RankedResult>>, AppError> {
    let request = request.normalized()?;

    let input_chars = request.query.chars().count();
    let preview: String = request.query.chars().take(120).collect();
    let preview_clean = preview.replace('\n', " ");
    info!(
        input_chars,
        preview_truncated = input_chars > preview_clean.chars().count(),
        preview = %preview_clean,
        top_k = request.top_k,
        tags = ?request.tags,
        project = request.project_id.as_deref().unwrap_or("*"),
        "Starting retrieval pipeline"
    );

    let mut ctx = PipelineContext::new(store, embedder, reranker, tuning, request);
    if capture_diagnostics {
        ctx.enable_diagnostics();
    }

    for stage in hybrid_stages() {
        if ctx.is_terminal() {
            debug!(stage = ?stage.kind(), "Skipping stage after early finish");
            continue;
        }
        let start = Instant::now();
        stage.execute(&mut ctx).await?;
        ctx.record_stage_duration(stage.kind(), start.elapsed());
    }

    let diagnostics = ctx.take_diagnostics();
    let stage_timings = ctx.take_stage_timings();
    let results = ctx.take_results();

    info!(
        returned = results.len(),
        embed_ms = stage_timings.embed_ms(),
        collect_ms = stage_timings.collect_candidates_ms(),
        rerank_ms = stage_timings.rerank_ms(),
        "Retrieval pipeline finished"
    );

    Ok(PipelineRunOutput {
        results,
        diagnostics,
        stage_timings,
    })
}
