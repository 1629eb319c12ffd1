use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use serde::{Deserialize, Serialize};

use crate::scoring::RrfConfig;

/// Tunable parameters that govern each retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalTuning {
    /// Weight applied to vector ranks in RRF.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    /// Weight applied to lexical ranks in RRF.
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Search depth multiplier relative to `top_k` without a tag filter.
    #[serde(default = "default_unscoped_overfetch")]
    pub unscoped_overfetch: usize,
    /// Search depth multiplier with a tag filter, to absorb post-filter losses.
    #[serde(default = "default_tag_scoped_overfetch")]
    pub tag_scoped_overfetch: usize,
    /// Fused candidates handed to the reranker.
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

const fn default_vector_weight() -> f32 {
    0.6
}

const fn default_lexical_weight() -> f32 {
    0.4
}

const fn default_rrf_k() -> f32 {
    60.0
}

const fn default_unscoped_overfetch() -> usize {
    3
}

const fn default_tag_scoped_overfetch() -> usize {
    6
}

const fn default_candidate_cap() -> usize {
    15
}

const fn default_similarity_threshold() -> f32 {
    0.3
}

const fn default_provider_timeout_ms() -> u64 {
    10_000
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            lexical_weight: default_lexical_weight(),
            rrf_k: default_rrf_k(),
            unscoped_overfetch: default_unscoped_overfetch(),
            tag_scoped_overfetch: default_tag_scoped_overfetch(),
            candidate_cap: default_candidate_cap(),
            similarity_threshold: default_similarity_threshold(),
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

impl RetrievalTuning {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        let overrides = &config.retrieval;
        Self {
            vector_weight: overrides.vector_weight.unwrap_or(defaults.vector_weight),
            lexical_weight: overrides.lexical_weight.unwrap_or(defaults.lexical_weight),
            rrf_k: overrides.rrf_k.unwrap_or(defaults.rrf_k),
            unscoped_overfetch: overrides
                .unscoped_overfetch
                .unwrap_or(defaults.unscoped_overfetch),
            tag_scoped_overfetch: overrides
                .tag_scoped_overfetch
                .unwrap_or(defaults.tag_scoped_overfetch),
            candidate_cap: overrides.candidate_cap.unwrap_or(defaults.candidate_cap),
            similarity_threshold: config.rag_similarity_threshold,
            provider_timeout_ms: config.provider_timeout_ms,
        }
    }

    pub const fn rrf_config(&self) -> RrfConfig {
        RrfConfig {
            k: self.rrf_k,
            vector_weight: self.vector_weight,
            lexical_weight: self.lexical_weight,
        }
    }

    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// How many hits to request from each search for a final `top_k`.
    pub fn search_take(&self, top_k: usize, tag_scoped: bool) -> usize {
        let multiplier = if tag_scoped {
            self.tag_scoped_overfetch
        } else {
            self.unscoped_overfetch
        };
        top_k.saturating_mul(multiplier.max(1))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.candidate_cap == 0 {
            return Err(AppError::Validation(
                "candidate_cap must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AppError::Validation(format!(
                "similarity_threshold {} must lie in [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.provider_timeout_ms == 0 {
            return Err(AppError::Validation(
                "provider_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-process retrieval settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub tuning: RetrievalTuning,
    pub default_top_k: usize,
}

impl RetrievalConfig {
    pub fn new(tuning: RetrievalTuning) -> Self {
        Self {
            tuning,
            default_top_k: 6,
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: RetrievalTuning::from_app_config(config),
            default_top_k: config.rag_top_k,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(RetrievalTuning::default())
    }
}

/// One retrieval call: the question, how many passages to return, and its scope.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub query: String,
    pub top_k: usize,
    /// Project the search is confined to; `None` searches every project.
    pub project_id: Option<String>,
    /// Restrict to documents carrying any of these tags.
    pub tags: Vec<String>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Rejects programmer errors and drops blank tags.
    pub(crate) fn normalized(mut self) -> Result<Self, AppError> {
        if self.top_k == 0 {
            return Err(AppError::Validation("top_k must be at least 1".into()));
        }
        if self.query.trim().is_empty() {
            return Err(AppError::Validation("query must not be blank".into()));
        }

        self.tags = self
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        self.project_id = self
            .project_id
            .map(|project| project.trim().to_string())
            .filter(|project| !project.is_empty());

        Ok(self)
    }

    pub fn is_tag_scoped(&self) -> bool {
        !self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_depends_on_tag_scope() {
        let tuning = RetrievalTuning::default();
        assert_eq!(tuning.search_take(6, false), 18);
        assert_eq!(tuning.search_take(6, true), 36);
    }

    #[test]
    fn tuning_deserializes_with_defaults() {
        let tuning: RetrievalTuning =
            serde_json::from_str(r#"{"candidate_cap": 20}"#).expect("tuning");

        assert_eq!(tuning.candidate_cap, 20);
        assert_eq!(tuning.unscoped_overfetch, 3);
        assert!((tuning.vector_weight - 0.6).abs() < f32::EPSILON);
        assert!(tuning.validate().is_ok());
    }

    fn app_config(retrieval: serde_json::Value) -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "openai_api_key": "sk-test",
            "surrealdb_address": "mem://",
            "surrealdb_username": "root",
            "surrealdb_password": "root",
            "surrealdb_namespace": "ns",
            "surrealdb_database": "db",
            "rag_similarity_threshold": 0.45,
            "retrieval": retrieval,
        }))
        .expect("app config")
    }

    #[test]
    fn app_config_overrides_fusion_and_fetch_settings() {
        let config = app_config(serde_json::json!({
            "vector_weight": 0.5,
            "lexical_weight": 0.5,
            "rrf_k": 20.0,
            "unscoped_overfetch": 4,
            "tag_scoped_overfetch": 8,
            "candidate_cap": 30,
        }));
        let tuning = RetrievalTuning::from_app_config(&config);

        let rrf = tuning.rrf_config();
        assert!((rrf.k - 20.0).abs() < f32::EPSILON);
        assert!((rrf.vector_weight - 0.5).abs() < f32::EPSILON);
        assert!((rrf.lexical_weight - 0.5).abs() < f32::EPSILON);
        assert_eq!(tuning.search_take(5, false), 20);
        assert_eq!(tuning.search_take(5, true), 40);
        assert_eq!(tuning.candidate_cap, 30);
        assert!((tuning.similarity_threshold - 0.45).abs() < f32::EPSILON);
        assert!(tuning.validate().is_ok());
    }

    #[test]
    fn app_config_without_retrieval_table_keeps_defaults() {
        let config = app_config(serde_json::json!({}));
        let tuning = RetrievalTuning::from_app_config(&config);
        let defaults = RetrievalTuning::default();

        assert!((tuning.rrf_k - defaults.rrf_k).abs() < f32::EPSILON);
        assert!((tuning.vector_weight - defaults.vector_weight).abs() < f32::EPSILON);
        assert_eq!(tuning.unscoped_overfetch, defaults.unscoped_overfetch);
        assert_eq!(tuning.tag_scoped_overfetch, defaults.tag_scoped_overfetch);
        assert_eq!(tuning.candidate_cap, defaults.candidate_cap);
    }

    #[test]
    fn invalid_tuning_is_rejected() {
        let tuning = RetrievalTuning {
            similarity_threshold: 1.5,
            ..RetrievalTuning::default()
        };
        assert!(matches!(tuning.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn request_normalization() {
        let request = RetrievalRequest::new("What is nexus?", 6)
            .with_tags(["  nexus ", "", "   "])
            .with_project(" ");
        let normalized = request.normalized().expect("valid request");
        assert_eq!(normalized.tags, vec!["nexus".to_string()]);
        assert_eq!(normalized.project_id, None);

        assert!(matches!(
            RetrievalRequest::new("q", 0).normalized(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            RetrievalRequest::new("   ", 3).normalized(),
            Err(AppError::Validation(_))
        ));
    }
}
