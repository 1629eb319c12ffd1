use anyhow::{Context, Result};
use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient};

const FTS_ANALYZER_NAME: &str = "legal_en_fts_analyzer";

#[derive(Clone, Copy)]
struct FtsIndexSpec {
    index_name: &'static str,
    table: &'static str,
    field: &'static str,
    analyzer: &'static str,
    method: &'static str,
}

impl FtsIndexSpec {
    fn definition(&self) -> String {
        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {field} \
             SEARCH ANALYZER {analyzer} {method};",
            index = self.index_name,
            table = self.table,
            field = self.field,
            analyzer = self.analyzer,
            method = self.method,
        )
    }
}

#[derive(Clone, Copy)]
struct FieldIndexSpec {
    index_name: &'static str,
    table: &'static str,
    field: &'static str,
}

impl FieldIndexSpec {
    fn definition(&self) -> String {
        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {field};",
            index = self.index_name,
            table = self.table,
            field = self.field,
        )
    }
}

const fn fts_index_specs() -> [FtsIndexSpec; 1] {
    [FtsIndexSpec {
        index_name: "idx_text_chunk_text_fts",
        table: "text_chunk",
        field: "text",
        analyzer: FTS_ANALYZER_NAME,
        method: "BM25",
    }]
}

const fn field_index_specs() -> [FieldIndexSpec; 3] {
    [
        FieldIndexSpec {
            index_name: "idx_text_chunk_document",
            table: "text_chunk",
            field: "document_id",
        },
        FieldIndexSpec {
            index_name: "idx_text_chunk_project",
            table: "text_chunk",
            field: "project_id",
        },
        FieldIndexSpec {
            index_name: "idx_legal_document_tags",
            table: "legal_document",
            field: "tags",
        },
    ]
}

/// Build the analyzer and indexes used by lexical search and scope lookups.
/// Idempotent: every definition uses `IF NOT EXISTS`.
pub async fn ensure_runtime_indexes(db: &SurrealDbClient) -> Result<(), AppError> {
    ensure_runtime_indexes_inner(db)
        .await
        .map_err(|err| AppError::InternalError(format!("{err:#}")))
}

async fn ensure_runtime_indexes_inner(db: &SurrealDbClient) -> Result<()> {
    create_fts_analyzer(db).await?;

    for spec in fts_index_specs() {
        define_index(db, spec.definition(), spec.index_name, spec.table).await?;
    }

    for spec in field_index_specs() {
        define_index(db, spec.definition(), spec.index_name, spec.table).await?;
    }

    Ok(())
}

async fn create_fts_analyzer(db: &SurrealDbClient) -> Result<()> {
    let analyzer_query = format!(
        "DEFINE ANALYZER IF NOT EXISTS {analyzer}
            TOKENIZERS class
            FILTERS lowercase, ascii, snowball(english);",
        analyzer = FTS_ANALYZER_NAME
    );

    let res = db
        .client
        .query(analyzer_query)
        .await
        .context("creating FTS analyzer")?;

    res.check().context("failed to create FTS analyzer")?;
    Ok(())
}

async fn define_index(
    db: &SurrealDbClient,
    definition: String,
    index_name: &str,
    table: &str,
) -> Result<()> {
    let res = db
        .client
        .query(definition)
        .await
        .with_context(|| format!("creating index {index_name} on table {table}"))?;
    res.check()
        .with_context(|| format!("index definition failed for {index_name} on {table}"))?;

    info!(index = %index_name, table = %table, "Index ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_definition_names_analyzer_and_method() {
        let definition = fts_index_specs()[0].definition();
        assert!(definition.contains("SEARCH ANALYZER legal_en_fts_analyzer BM25"));
        assert!(definition.starts_with("DEFINE INDEX IF NOT EXISTS idx_text_chunk_text_fts"));
    }
}
