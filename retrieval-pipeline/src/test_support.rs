use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use common::{
    error::{AppError, ProviderError},
    storage::{
        document_store::DocumentStore,
        types::{
            legal_document::{DocumentStatus, LegalDocument},
            search_hit::{ChunkRef, SearchHit},
            text_chunk::TextChunk,
        },
    },
    utils::embedding::TextEmbedder,
};
use tokio::sync::Mutex;

use crate::{
    reranking::{RerankTier, RerankTierKind, TierScore},
    scoring::{reciprocal_rank_fusion, FusedResult, RrfConfig},
};

pub fn chunk_ref(id: &str, document_id: &str) -> ChunkRef {
    ChunkRef {
        id: id.into(),
        document_id: document_id.into(),
        ordinal: 0,
        text: format!("passage {id}"),
        citation: None,
        tags: Vec::new(),
    }
}

pub fn fused(id: &str) -> FusedResult {
    fused_with(id, &format!("passage {id}"), None)
}

pub fn fused_with(id: &str, text: &str, citation: Option<&str>) -> FusedResult {
    let mut chunk = chunk_ref(id, "doc-1");
    chunk.text = text.into();
    chunk.citation = citation.map(str::to_string);
    reciprocal_rank_fusion(vec![SearchHit::vector(chunk, 0.5)], Vec::new(), RrfConfig::default())
        .into_iter()
        .next()
        .expect("one fused result")
}

#[derive(Debug, Clone)]
pub struct VectorCall {
    pub top_k: usize,
    pub threshold: f32,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LexicalCall {
    pub query: String,
    pub top_k: usize,
    pub scope: Option<String>,
    pub allowlist: Option<HashSet<String>>,
}

#[derive(Default)]
pub struct MockStore {
    vector_hits: Vec<SearchHit>,
    lexical_hits: Vec<SearchHit>,
    tag_scope: HashSet<String>,
    fail_searches: bool,
    delay: Option<Duration>,
    pub vector_calls: Mutex<Vec<VectorCall>>,
    pub lexical_calls: Mutex<Vec<LexicalCall>>,
    pub scope_calls: Mutex<Vec<Vec<String>>>,
}

impl MockStore {
    pub fn with_vector_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.vector_hits = hits;
        self
    }

    pub fn with_lexical_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.lexical_hits = hits;
        self
    }

    pub fn with_tag_scope<const N: usize>(mut self, document_ids: [&str; N]) -> Self {
        self.tag_scope = document_ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    pub fn failing_searches(mut self) -> Self {
        self.fail_searches = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn insert_document(&self, _document: LegalDocument) -> Result<String, AppError> {
        Err(AppError::InternalError("not used by retrieval".into()))
    }

    async fn get_document(&self, _document_id: &str) -> Result<Option<LegalDocument>, AppError> {
        Ok(None)
    }

    async fn insert_chunk(&self, _chunk: TextChunk) -> Result<String, AppError> {
        Err(AppError::InternalError("not used by retrieval".into()))
    }

    async fn update_document_status(
        &self,
        _document_id: &str,
        _status: DocumentStatus,
        _total_chunk_count: usize,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn delete_chunks_for_document(&self, _document_id: &str) -> Result<usize, AppError> {
        Ok(0)
    }

    async fn vector_search(
        &self,
        _embedding: &[f32],
        top_k: usize,
        threshold: f32,
        scope: Option<&str>,
    ) -> Result<Vec<SearchHit>, AppError> {
        self.vector_calls.lock().await.push(VectorCall {
            top_k,
            threshold,
            scope: scope.map(str::to_string),
        });
        self.pause().await;
        if self.fail_searches {
            return Err(AppError::InternalError("vector backend down".into()));
        }
        Ok(self.vector_hits.iter().take(top_k).cloned().collect())
    }

    async fn lexical_search(
        &self,
        query: &str,
        top_k: usize,
        scope: Option<&str>,
        allowlist: Option<&HashSet<String>>,
    ) -> Result<Vec<SearchHit>, AppError> {
        self.lexical_calls.lock().await.push(LexicalCall {
            query: query.to_string(),
            top_k,
            scope: scope.map(str::to_string),
            allowlist: allowlist.cloned(),
        });
        self.pause().await;
        if self.fail_searches {
            return Err(AppError::InternalError("lexical backend down".into()));
        }
        Ok(self.lexical_hits.iter().take(top_k).cloned().collect())
    }

    async fn resolve_tag_scope(
        &self,
        tags: &[String],
        _scope: Option<&str>,
    ) -> Result<HashSet<String>, AppError> {
        self.scope_calls.lock().await.push(tags.to_vec());
        Ok(self.tag_scope.clone())
    }
}

pub struct MockEmbedder {
    result: Result<Vec<f32>, ProviderError>,
    calls: Mutex<usize>,
}

impl MockEmbedder {
    pub fn returning(embedding: Vec<f32>) -> Self {
        Self {
            result: Ok(embedding),
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(ProviderError::CallFailure("embedding service down".into())),
            calls: Mutex::new(0),
        }
    }

    pub async fn call_count(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait]
impl TextEmbedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.result.as_ref().map(Vec::len).unwrap_or(0)
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        *self.calls.lock().await += 1;
        self.result.clone()
    }
}

pub struct MockTier {
    kind: RerankTierKind,
    result: Result<Vec<TierScore>, ProviderError>,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<String>>>,
}

impl MockTier {
    pub fn succeeding(kind: RerankTierKind, ranking: Vec<TierScore>) -> Self {
        Self {
            kind,
            result: Ok(ranking),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: RerankTierKind, error: ProviderError) -> Self {
        Self {
            kind,
            result: Err(error),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn call_count(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// Candidate ids passed to the most recent call.
    pub async fn seen_candidates(&self) -> Vec<String> {
        self.seen.lock().await.last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RerankTier for MockTier {
    fn kind(&self) -> RerankTierKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn rank(
        &self,
        _query: &str,
        candidates: &[FusedResult],
        _top_k: usize,
    ) -> Result<Vec<TierScore>, ProviderError> {
        self.seen
            .lock()
            .await
            .push(candidates.iter().map(|c| c.chunk.id.clone()).collect());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}
