#![allow(clippy::missing_docs_in_private_items)]

pub mod chunking;
pub mod pipeline;
pub mod types;

pub use chunking::{chunk, chunk_text, ChunkerConfig};
pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionTuning};
pub use types::{IngestionOutcome, IngestionStatus, NewDocument};
