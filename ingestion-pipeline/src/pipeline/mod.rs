mod config;

pub use config::{IngestionConfig, IngestionTuning};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::{AppError, ProviderError},
    storage::{
        document_store::DocumentStore,
        types::{
            legal_document::{DocumentStatus, LegalDocument},
            text_chunk::TextChunk,
        },
    },
    utils::embedding::TextEmbedder,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    chunking::chunk_text,
    types::{IngestionOutcome, IngestionStatus, NewDocument},
};

/// Chunks, embeds and stores documents.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn TextEmbedder>,
    pipeline_config: IngestionConfig,
}

/// Counts from writing one document's chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ChunkWriteStats {
    created: usize,
    failed: usize,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            store,
            embedder,
            pipeline_config: IngestionConfig::default(),
        }
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn TextEmbedder>,
        pipeline_config: IngestionConfig,
    ) -> Result<Self, AppError> {
        pipeline_config.tuning.validate()?;
        Ok(Self {
            store,
            embedder,
            pipeline_config,
        })
    }

    /// Stores `document` as a new record with one chunk per chunker output.
    ///
    /// Failures are reported in the returned outcome; a chunk that cannot be
    /// embedded or stored is skipped and counted.
    #[tracing::instrument(skip_all, fields(title = %document.title))]
    pub async fn ingest_document(&self, document: NewDocument) -> IngestionOutcome {
        let started = Instant::now();
        let title = document.title.trim().to_string();
        if title.is_empty() {
            return IngestionOutcome::failed(title, "document title must not be blank");
        }

        let chunks = match self.prepare_chunks(&document.text) {
            Ok(chunks) => chunks,
            Err(reason) => {
                warn!(%reason, "Rejecting document before storage");
                return IngestionOutcome::failed(title, reason);
            }
        };

        let citation = document
            .citation
            .as_deref()
            .map(str::trim)
            .filter(|citation| !citation.is_empty())
            .unwrap_or(&title)
            .to_string();
        let mut record = LegalDocument::new(
            title.clone(),
            document.normalized_tags(),
            Some(citation),
            document.category.clone(),
            document.source_file.clone(),
            document
                .project_id
                .as_deref()
                .map(str::trim)
                .filter(|project| !project.is_empty())
                .map(str::to_string),
        );
        record.status = DocumentStatus::Processing;
        record.total_chunk_count = chunks.len();

        let document_id = match self.store.insert_document(record.clone()).await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "Failed to create document record");
                return IngestionOutcome::failed(title, format!("failed to create document: {err}"));
            }
        };
        record.id.clone_from(&document_id);

        let outcome = self.write_chunks(&record, chunks).await;
        info!(
            document_id = %document_id,
            chunks_created = outcome.chunks_created,
            chunks_failed = outcome.chunks_failed,
            status = %outcome.status,
            total_ms = Self::duration_millis(started.elapsed()),
            "Document ingestion finished"
        );
        outcome
    }

    /// Replaces every chunk of an existing document with chunks of `text`.
    ///
    /// A missing document, or a store failure before new chunks are written, is an
    /// error; everything else lands in the outcome.
    #[tracing::instrument(skip(self, text))]
    pub async fn reingest_document(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IngestionOutcome, AppError> {
        let Some(record) = self.store.get_document(document_id).await? else {
            return Err(AppError::NotFound(format!("document {document_id}")));
        };

        let chunks = match self.prepare_chunks(text) {
            Ok(chunks) => chunks,
            Err(reason) => {
                warn!(%reason, "Keeping existing chunks; replacement text rejected");
                let mut outcome = IngestionOutcome::failed(record.title.clone(), reason);
                outcome.document_id = Some(record.id.clone());
                return Ok(outcome);
            }
        };

        // The record must leave `complete` before any of its chunks are touched.
        self.store
            .update_document_status(&record.id, DocumentStatus::Processing, chunks.len())
            .await?;

        match self.store.delete_chunks_for_document(&record.id).await {
            Ok(removed) => debug!(removed, "Removed previous chunks"),
            Err(err) => {
                warn!(document_id = %record.id, error = %err, "Failed to remove previous chunks");
                if let Err(status_err) = self
                    .store
                    .update_document_status(&record.id, DocumentStatus::Error, 0)
                    .await
                {
                    warn!(
                        document_id = %record.id,
                        error = %status_err,
                        "Failed to mark document as errored"
                    );
                }
                return Err(err);
            }
        }

        Ok(self.write_chunks(&record, chunks).await)
    }

    fn prepare_chunks(&self, text: &str) -> Result<Vec<String>, String> {
        let tuning = &self.pipeline_config.tuning;
        let text_chars = text.trim().chars().count();
        if text_chars < tuning.min_document_chars {
            return Err(format!(
                "document text has {text_chars} chars, fewer than the required {}",
                tuning.min_document_chars
            ));
        }

        let chunks = chunk_text(text, &tuning.chunker_config());
        if chunks.is_empty() {
            return Err("no chunks generated from text".to_string());
        }
        debug!(chunk_count = chunks.len(), "Chunked document text");
        Ok(chunks)
    }

    /// Embeds and stores chunks, then records the final document status.
    async fn write_chunks(&self, record: &LegalDocument, chunks: Vec<String>) -> IngestionOutcome {
        let stats = self.store_chunks(record, chunks).await;

        let (status, document_status) = if stats.created == 0 {
            (IngestionStatus::Error, DocumentStatus::Error)
        } else {
            (IngestionStatus::Complete, DocumentStatus::Complete)
        };

        let mut outcome = IngestionOutcome {
            document_id: Some(record.id.clone()),
            title: record.title.clone(),
            chunks_created: stats.created,
            chunks_failed: stats.failed,
            status,
            error: (stats.created == 0).then(|| "no chunks could be embedded and stored".to_string()),
        };

        if let Err(err) = self
            .store
            .update_document_status(&record.id, document_status, stats.created)
            .await
        {
            warn!(document_id = %record.id, error = %err, "Failed to record final document status");
            outcome.status = IngestionStatus::Error;
            outcome.error = Some(format!("failed to update document status: {err}"));
        }

        outcome
    }

    async fn store_chunks(&self, record: &LegalDocument, chunks: Vec<String>) -> ChunkWriteStats {
        let concurrency = self.pipeline_config.tuning.embedding_concurrency.max(1);

        let results: Vec<Result<String, ProviderError>> =
            stream::iter(chunks.into_iter().enumerate().map(|(ordinal, text)| async move {
                self.store_chunk(record, ordinal, text).await
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .fold(ChunkWriteStats::default(), |mut stats, result| {
                match result {
                    Ok(_) => stats.created += 1,
                    Err(err) => {
                        debug!(error = %err, "Skipping chunk");
                        stats.failed += 1;
                    }
                }
                stats
            })
    }

    async fn store_chunk(
        &self,
        record: &LegalDocument,
        ordinal: usize,
        text: String,
    ) -> Result<String, ProviderError> {
        let embedding = self.embedder.embed(&text).await.map_err(|err| {
            warn!(document_id = %record.id, ordinal, error = %err, "Chunk embedding failed");
            err
        })?;
        if embedding.is_empty() {
            return Err(ProviderError::Malformed("empty embedding".into()));
        }

        let chunk = TextChunk::new(
            record.id.clone(),
            ordinal,
            text,
            Some(record.citation_label().to_string()),
            record.tags.clone(),
            record.project_id.clone(),
            embedding,
        );

        self.store.insert_chunk(chunk).await.map_err(|err| {
            warn!(document_id = %record.id, ordinal, error = %err, "Chunk insert failed");
            ProviderError::from(err)
        })
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }
}
