//! Request-scoped search records shared by the store and the retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Which search produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Vector,
    Lexical,
}

/// The retrievable part of a stored chunk (everything except its embedding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub text: String,
    pub citation: Option<String>,
    pub tags: Vec<String>,
}

/// One ranked row from vector or lexical search.
///
/// `similarity` is only defined for vector hits; lexical hits carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: ChunkRef,
    pub similarity: Option<f32>,
    pub provenance: Provenance,
}

impl SearchHit {
    pub fn vector(chunk: ChunkRef, similarity: f32) -> Self {
        Self {
            chunk,
            similarity: Some(similarity),
            provenance: Provenance::Vector,
        }
    }

    pub fn lexical(chunk: ChunkRef) -> Self {
        Self {
            chunk,
            similarity: None,
            provenance: Provenance::Lexical,
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}
