use uuid::Uuid;

use crate::stored_object;

stored_object!(TextChunk, "text_chunk", {
    document_id: String,
    ordinal: usize,
    text: String,
    #[serde(default)]
    citation: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    project_id: Option<String>,
    embedding: Vec<f32>
});

impl TextChunk {
    pub fn new(
        document_id: String,
        ordinal: usize,
        text: String,
        citation: Option<String>,
        tags: Vec<String>,
        project_id: Option<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            ordinal,
            text,
            citation,
            tags,
            project_id,
            embedding,
        }
    }
}
