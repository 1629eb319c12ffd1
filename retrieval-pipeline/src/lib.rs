pub mod pipeline;
pub mod reranking;
pub mod scoring;
pub mod search;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use common::{
    error::AppError, storage::document_store::DocumentStore, utils::embedding::TextEmbedder,
};
use serde::Serialize;
use tracing::instrument;

pub use pipeline::{
    PipelineDiagnostics, PipelineRunOutput, PipelineStageTimings, RetrievalConfig,
    RetrievalRequest, RetrievalTuning,
};
pub use reranking::{RerankChain, RerankTierKind};
pub use scoring::FusedResult;

/// A fused candidate in its final position, with the tier that placed it there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub fused: FusedResult,
    pub rerank_score: Option<f32>,
    pub tier: RerankTierKind,
}

impl RankedResult {
    pub const fn new(fused: FusedResult, rerank_score: Option<f32>, tier: RerankTierKind) -> Self {
        Self {
            fused,
            rerank_score,
            tier,
        }
    }

    pub fn to_passage(&self) -> RetrievedPassage {
        RetrievedPassage {
            chunk_id: self.fused.chunk.id.clone(),
            document_id: self.fused.chunk.document_id.clone(),
            text: self.fused.chunk.text.clone(),
            citation: self.fused.chunk.citation.clone(),
            similarity: round_score(self.fused.similarity),
            rrf_score: round_score(self.fused.rrf_score),
            rerank_score: self.rerank_score.map(round_score),
        }
    }
}

/// Shape handed to the answer-generation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub citation: Option<String>,
    pub similarity: f64,
    pub rrf_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

pub fn ranked_results_to_json(results: &[RankedResult]) -> serde_json::Value {
    serde_json::json!(results
        .iter()
        .map(RankedResult::to_passage)
        .collect::<Vec<_>>())
}

fn round_score(value: f32) -> f64 {
    (f64::from(value) * 100_000.0).round() / 100_000.0
}

/// Query-path handle: built once at startup and shared across requests.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn TextEmbedder>,
    reranker: Arc<RerankChain>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn TextEmbedder>,
        reranker: Arc<RerankChain>,
        config: RetrievalConfig,
    ) -> Result<Self, AppError> {
        config.tuning.validate()?;
        Ok(Self {
            store,
            embedder,
            reranker,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `request.top_k` passages, best first.
    ///
    /// Provider outages degrade the result instead of failing; only invalid
    /// requests return an error.
    #[instrument(skip_all)]
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<Vec<RankedResult>, AppError> {
        Ok(self.run(request, false).await?.results)
    }

    #[instrument(skip_all)]
    pub async fn retrieve_with_diagnostics(
        &self,
        request: RetrievalRequest,
    ) -> Result<PipelineRunOutput<Vec<RankedResult>>, AppError> {
        self.run(request, true).await
    }

    async fn run(
        &self,
        request: RetrievalRequest,
        capture_diagnostics: bool,
    ) -> Result<PipelineRunOutput<Vec<RankedResult>>, AppError> {
        pipeline::run_pipeline(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &self.reranker,
            &self.config.tuning,
            request,
            capture_diagnostics,
        )
        .await
    }
}
