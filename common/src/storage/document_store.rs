use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            legal_document::{DocumentStatus, LegalDocument},
            search_hit::{ChunkRef, SearchHit},
            text_chunk::{deserialize_flexible_id, TextChunk},
            StoredObject,
        },
    },
};

/// Persistence and search operations the ingest and query paths rely on.
///
/// `scope` is an optional project id; `None` searches the whole corpus.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: LegalDocument) -> Result<String, AppError>;

    async fn get_document(&self, document_id: &str) -> Result<Option<LegalDocument>, AppError>;

    async fn insert_chunk(&self, chunk: TextChunk) -> Result<String, AppError>;

    async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        total_chunk_count: usize,
    ) -> Result<(), AppError>;

    /// Removes every chunk of a document, returning how many were deleted.
    async fn delete_chunks_for_document(&self, document_id: &str) -> Result<usize, AppError>;

    /// Chunks ordered by descending cosine similarity, all at or above `threshold`.
    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
        scope: Option<&str>,
    ) -> Result<Vec<SearchHit>, AppError>;

    /// Chunks ordered by full-text relevance. An allowlist restricts hits to those documents.
    async fn lexical_search(
        &self,
        query: &str,
        top_k: usize,
        scope: Option<&str>,
        allowlist: Option<&HashSet<String>>,
    ) -> Result<Vec<SearchHit>, AppError>;

    /// Ids of documents carrying any of `tags`.
    async fn resolve_tag_scope(
        &self,
        tags: &[String],
        scope: Option<&str>,
    ) -> Result<HashSet<String>, AppError>;
}

#[derive(Debug, Deserialize)]
struct ChunkRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    document_id: String,
    ordinal: usize,
    text: String,
    #[serde(default)]
    citation: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    similarity: Option<f32>,
}

impl ChunkRow {
    fn into_chunk_ref(self) -> (ChunkRef, Option<f32>) {
        let similarity = self.similarity;
        (
            ChunkRef {
                id: self.id,
                document_id: self.document_id,
                ordinal: self.ordinal,
                text: self.text,
                citation: self.citation,
                tags: self.tags,
            },
            similarity,
        )
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
}

fn project_clause(scope: Option<&str>) -> &'static str {
    if scope.is_some() {
        "AND project_id = $project_id"
    } else {
        ""
    }
}

#[async_trait]
impl DocumentStore for SurrealDbClient {
    async fn insert_document(&self, document: LegalDocument) -> Result<String, AppError> {
        let id = document.id.clone();
        self.store_item(document)
            .await?
            .ok_or_else(|| AppError::InternalError(format!("document {id} was not stored")))?;
        Ok(id)
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<LegalDocument>, AppError> {
        Ok(self.get_item::<LegalDocument>(document_id).await?)
    }

    async fn insert_chunk(&self, chunk: TextChunk) -> Result<String, AppError> {
        let id = chunk.id.clone();
        self.store_item(chunk)
            .await?
            .ok_or_else(|| AppError::InternalError(format!("chunk {id} was not stored")))?;
        Ok(id)
    }

    async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        total_chunk_count: usize,
    ) -> Result<(), AppError> {
        let mut response = self
            .client
            .query(
                "UPDATE type::thing($table, $id)
                 SET status = $status, total_chunk_count = $count, updated_at = time::now()
                 RETURN AFTER",
            )
            .bind(("table", LegalDocument::table_name()))
            .bind(("id", document_id.to_owned()))
            .bind(("status", status))
            .bind(("count", total_chunk_count as i64))
            .await?;

        let updated: Vec<IdRow> = response.take(0)?;
        if updated.is_empty() {
            return Err(AppError::NotFound(format!("document {document_id}")));
        }
        Ok(())
    }

    async fn delete_chunks_for_document(&self, document_id: &str) -> Result<usize, AppError> {
        let query = format!(
            "DELETE {} WHERE document_id = $document_id RETURN BEFORE",
            TextChunk::table_name()
        );

        let mut response = self
            .client
            .query(query)
            .bind(("document_id", document_id.to_owned()))
            .await?;
        let deleted: Vec<IdRow> = response.take(0)?;

        debug!(document_id, deleted = deleted.len(), "Deleted document chunks");
        Ok(deleted.len())
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
        scope: Option<&str>,
    ) -> Result<Vec<SearchHit>, AppError> {
        if top_k == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, document_id, ordinal, text, citation, tags, \
                    vector::similarity::cosine(embedding, $embedding) AS similarity \
             FROM {table} \
             WHERE vector::similarity::cosine(embedding, $embedding) >= $threshold {project_clause} \
             ORDER BY similarity DESC \
             LIMIT $limit",
            table = TextChunk::table_name(),
            project_clause = project_clause(scope),
        );

        let mut query = self
            .client
            .query(sql)
            .bind(("embedding", embedding.to_vec()))
            .bind(("threshold", threshold))
            .bind(("limit", top_k as i64));
        if let Some(project_id) = scope {
            query = query.bind(("project_id", project_id.to_owned()));
        }

        let rows: Vec<ChunkRow> = query.await?.take(0)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let (chunk, similarity) = row.into_chunk_ref();
                let similarity = similarity.unwrap_or_default();
                (similarity >= threshold).then(|| SearchHit::vector(chunk, similarity))
            })
            .collect())
    }

    async fn lexical_search(
        &self,
        query: &str,
        top_k: usize,
        scope: Option<&str>,
        allowlist: Option<&HashSet<String>>,
    ) -> Result<Vec<SearchHit>, AppError> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if allowlist.is_some_and(HashSet::is_empty) {
            return Ok(Vec::new());
        }

        let allowlist_clause = if allowlist.is_some() {
            "AND document_id INSIDE $doc_ids"
        } else {
            ""
        };

        let sql = format!(
            "SELECT id, document_id, ordinal, text, citation, tags, \
                    (IF search::score(0) != NONE THEN search::score(0) ELSE 0 END) AS fts_score \
             FROM {table} \
             WHERE text @0@ $terms {project_clause} {allowlist_clause} \
             ORDER BY fts_score DESC \
             LIMIT $limit",
            table = TextChunk::table_name(),
            project_clause = project_clause(scope),
        );

        debug!(limit = top_k, scoped = scope.is_some(), "Executing lexical chunk search");

        let mut request = self
            .client
            .query(sql)
            .bind(("terms", query.to_owned()))
            .bind(("limit", top_k as i64));
        if let Some(project_id) = scope {
            request = request.bind(("project_id", project_id.to_owned()));
        }
        if let Some(ids) = allowlist {
            request = request.bind(("doc_ids", ids.iter().cloned().collect::<Vec<_>>()));
        }

        let rows: Vec<ChunkRow> = request.await?.take(0)?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHit::lexical(row.into_chunk_ref().0))
            .collect())
    }

    async fn resolve_tag_scope(
        &self,
        tags: &[String],
        scope: Option<&str>,
    ) -> Result<HashSet<String>, AppError> {
        if tags.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT id FROM {table} WHERE tags CONTAINSANY $tags {project_clause}",
            table = LegalDocument::table_name(),
            project_clause = project_clause(scope),
        );

        let mut query = self.client.query(sql).bind(("tags", tags.to_vec()));
        if let Some(project_id) = scope {
            query = query.bind(("project_id", project_id.to_owned()));
        }

        let rows: Vec<IdRow> = query.await?.take(0)?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }
}
