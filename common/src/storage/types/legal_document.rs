use uuid::Uuid;

use crate::stored_object;

/// Processing lifecycle of an ingested document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Complete,
    Error,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Error => "error",
        };
        f.write_str(label)
    }
}

stored_object!(LegalDocument, "legal_document", {
    title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    citation: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    total_chunk_count: usize,
    #[serde(default)]
    status: DocumentStatus
});

impl LegalDocument {
    pub fn new(
        title: String,
        tags: Vec<String>,
        citation: Option<String>,
        category: Option<String>,
        source_file: Option<String>,
        project_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            tags,
            citation,
            category,
            source_file,
            project_id,
            total_chunk_count: 0,
            status: DocumentStatus::Pending,
        }
    }

    /// Citation label used for the document's chunks; falls back to the title.
    pub fn citation_label(&self) -> &str {
        self.citation.as_deref().unwrap_or(&self.title)
    }
}
