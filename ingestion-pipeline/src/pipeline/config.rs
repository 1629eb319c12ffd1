use common::error::AppError;
use serde::{Deserialize, Serialize};

use crate::chunking::ChunkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTuning {
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default = "default_chunk_hard_limit")]
    pub chunk_hard_limit: usize,
    #[serde(default = "default_chunk_min_chars")]
    pub chunk_min_chars: usize,
    /// Chunks embedded and stored at the same time.
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,
    /// Documents with less extracted text than this are rejected outright.
    #[serde(default = "default_min_document_chars")]
    pub min_document_chars: usize,
}

const fn default_chunk_max_chars() -> usize {
    2_000
}

const fn default_chunk_hard_limit() -> usize {
    18_000
}

const fn default_chunk_min_chars() -> usize {
    50
}

const fn default_embedding_concurrency() -> usize {
    4
}

const fn default_min_document_chars() -> usize {
    50
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            chunk_max_chars: default_chunk_max_chars(),
            chunk_hard_limit: default_chunk_hard_limit(),
            chunk_min_chars: default_chunk_min_chars(),
            embedding_concurrency: default_embedding_concurrency(),
            min_document_chars: default_min_document_chars(),
        }
    }
}

impl IngestionTuning {
    pub const fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chars: self.chunk_max_chars,
            hard_limit: self.chunk_hard_limit,
            min_chars: self.chunk_min_chars,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_max_chars == 0 || self.chunk_hard_limit == 0 {
            return Err(AppError::Validation(
                "chunk sizes must be greater than zero".into(),
            ));
        }
        if self.chunk_max_chars > self.chunk_hard_limit {
            return Err(AppError::Validation(format!(
                "chunk_max_chars {} exceeds chunk_hard_limit {}",
                self.chunk_max_chars, self.chunk_hard_limit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chunker_defaults() {
        let tuning = IngestionTuning::default();
        assert_eq!(tuning.chunker_config(), ChunkerConfig::default());
        assert!(tuning.validate().is_ok());
    }

    #[test]
    fn max_chars_above_hard_limit_is_rejected() {
        let tuning = IngestionTuning {
            chunk_max_chars: 20_000,
            ..IngestionTuning::default()
        };
        assert!(matches!(tuning.validate(), Err(AppError::Validation(_))));
    }
}
