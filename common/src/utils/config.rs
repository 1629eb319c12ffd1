use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    OpenAI,
    FastEmbed,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::OpenAI
}

/// Which service backs the primary (cross-encoder) rerank tier.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RerankBackendKind {
    Cohere,
    FastEmbed,
    None,
}

fn default_rerank_backend() -> RerankBackendKind {
    RerankBackendKind::Cohere
}

/// Optional `[retrieval]` overrides; unset fields keep the pipeline defaults.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct RetrievalSettings {
    #[serde(default)]
    pub vector_weight: Option<f32>,
    #[serde(default)]
    pub lexical_weight: Option<f32>,
    #[serde(default)]
    pub rrf_k: Option<f32>,
    #[serde(default)]
    pub unscoped_overfetch: Option<usize>,
    #[serde(default)]
    pub tag_scoped_overfetch: Option<usize>,
    #[serde(default)]
    pub candidate_cap: Option<usize>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_rerank_backend")]
    pub rerank_backend: RerankBackendKind,
    #[serde(default)]
    pub cohere_api_key: Option<String>,
    #[serde(default = "default_cohere_base_url")]
    pub cohere_base_url: String,
    #[serde(default = "default_cohere_rerank_model")]
    pub cohere_rerank_model: String,
    #[serde(default)]
    pub reranking_pool_size: Option<usize>,
    #[serde(default)]
    pub fastembed_cache_dir: Option<String>,
    #[serde(default = "default_scorer_model")]
    pub scorer_model: String,
    #[serde(default = "default_similarity_threshold")]
    pub rag_similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub rag_top_k: usize,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

impl AppConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// The Cohere key, treating an empty string the same as an unset one.
    pub fn cohere_key(&self) -> Option<&str> {
        self.cohere_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_cohere_base_url() -> String {
    "https://api.cohere.com".to_string()
}

fn default_cohere_rerank_model() -> String {
    "rerank-v3.5".to_string()
}

fn default_scorer_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_similarity_threshold() -> f32 {
    0.3
}

const fn default_top_k() -> usize {
    6
}

const fn default_provider_timeout_ms() -> u64 {
    10_000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
