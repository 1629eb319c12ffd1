use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::available_parallelism,
};

use async_trait::async_trait;
use common::{
    error::{AppError, ProviderError},
    utils::config::AppConfig,
};
use fastembed::{RerankInitOptions, RerankResult, TextRerank};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{cohere::primary_passage, RerankTier, RerankTierKind, TierScore};
use crate::scoring::FusedResult;

const LOCAL_PASSAGE_CHARS: usize = 1500;

/// Fixed set of in-process cross-encoder engines; the semaphore bounds parallel reranks.
pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
    next_engine: AtomicUsize,
}

impl RerankerPool {
    fn new_with_options(
        pool_size: usize,
        init_options: RerankInitOptions,
    ) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation(
                "reranking_pool_size must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(&init_options.cache_dir)?;

        let mut engines = Vec::with_capacity(pool_size);
        for x in 0..pool_size {
            debug!("Creating reranking engine: {x}");
            let model = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            engines.push(Arc::new(Mutex::new(model)));
        }

        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            next_engine: AtomicUsize::new(0),
        }))
    }

    /// Build the pool at startup from `reranking_pool_size` and the fastembed cache dir.
    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>, AppError> {
        let pool_size = config.reranking_pool_size.unwrap_or_else(default_pool_size);
        let mut options = RerankInitOptions::default();
        options.cache_dir = rerank_cache_dir(config);
        Self::new_with_options(pool_size, options)
    }

    /// Waits for capacity, then picks an engine round-robin.
    async fn checkout(&self) -> Result<RerankerLease, ProviderError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::Unavailable("reranker pool closed".into()))?;

        let idx = self.next_engine.fetch_add(1, Ordering::Relaxed) % self.engines.len();
        let engine = self
            .engines
            .get(idx)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable("reranker pool is empty".into()))?;

        Ok(RerankerLease {
            _permit: permit,
            engine,
        })
    }
}

fn default_pool_size() -> usize {
    available_parallelism()
        .map(|value| value.get().min(2))
        .unwrap_or(2)
        .max(1)
}

fn rerank_cache_dir(config: &AppConfig) -> PathBuf {
    config
        .fastembed_cache_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(&config.data_dir).join("fastembed"))
        .join("reranker")
}

/// Active lease on a single TextRerank instance.
struct RerankerLease {
    // Dropping the lease releases the permit.
    _permit: OwnedSemaphorePermit,
    engine: Arc<Mutex<TextRerank>>,
}

impl RerankerLease {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<String>,
    ) -> Result<Vec<RerankResult>, ProviderError> {
        let mut guard = self.engine.lock().await;

        guard
            .rerank(query.to_owned(), documents, false, None)
            .map_err(|e| ProviderError::CallFailure(e.to_string()))
    }
}

/// Cross-encoder tier running a local fastembed reranking model.
pub struct LocalCrossEncoder {
    pool: Arc<RerankerPool>,
}

impl LocalCrossEncoder {
    pub fn new(pool: Arc<RerankerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RerankTier for LocalCrossEncoder {
    fn kind(&self) -> RerankTierKind {
        RerankTierKind::CrossEncoder
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }

    async fn rank(
        &self,
        query: &str,
        candidates: &[FusedResult],
        top_k: usize,
    ) -> Result<Vec<TierScore>, ProviderError> {
        let documents = candidates
            .iter()
            .map(|candidate| primary_passage(candidate, LOCAL_PASSAGE_CHARS))
            .collect();

        let lease = self.pool.checkout().await?;
        let mut results = lease.rerank(query, documents).await?;

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results
            .into_iter()
            .take(top_k)
            .map(|result| TierScore::new(result.index, result.score))
            .collect())
    }
}
