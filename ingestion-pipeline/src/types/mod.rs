use std::fmt;

use serde::{Deserialize, Serialize};

/// A document submitted for ingestion, with its already extracted text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Label attached to every chunk; the title is used when absent.
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Trimmed, de-duplicated, non-blank tags in submission order.
    pub(crate) fn normalized_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }
}

/// How an ingestion attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    /// The document is stored and at least one chunk was persisted.
    Complete,
    /// The document record exists but holds no usable chunks.
    Error,
    /// Nothing was stored.
    Failed,
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IngestionStatus::Complete => "complete",
            IngestionStatus::Error => "error",
            IngestionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of ingesting one document. Per-chunk failures are counted, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionOutcome {
    pub document_id: Option<String>,
    pub title: String,
    pub chunks_created: usize,
    pub chunks_failed: usize,
    pub status: IngestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionOutcome {
    pub(crate) fn failed(title: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            document_id: None,
            title: title.into(),
            chunks_created: 0,
            chunks_failed: 0,
            status: IngestionStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == IngestionStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let document = NewDocument::new("ETA 3193", "text").with_tags([" nexus", "nexus ", "", "b&o"]);
        assert_eq!(document.normalized_tags(), vec!["nexus".to_string(), "b&o".to_string()]);
    }

    #[test]
    fn failed_outcome_serializes_without_document() {
        let outcome = IngestionOutcome::failed("Empty", "document text is too short");
        let value = serde_json::to_value(&outcome).expect("serialize outcome");

        assert_eq!(value["status"], "failed");
        assert!(value["document_id"].is_null());
        assert_eq!(value["error"], "document text is too short");
    }
}
