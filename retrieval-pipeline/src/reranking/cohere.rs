use async_trait::async_trait;
use common::{
    error::{AppError, ProviderError},
    utils::config::AppConfig,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{truncate_chars, RerankTier, RerankTierKind, TierScore};
use crate::scoring::FusedResult;

const PRIMARY_PASSAGE_CHARS: usize = 1500;

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultItem>,
}

#[derive(Debug, Deserialize)]
struct RerankResultItem {
    index: usize,
    relevance_score: f32,
}

/// Hosted cross-encoder tier calling Cohere's `/v2/rerank` endpoint.
#[derive(Clone)]
pub struct CohereReranker {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    passage_chars: usize,
}

impl CohereReranker {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            model,
            api_key,
            passage_chars: PRIMARY_PASSAGE_CHARS,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.cohere_base_url.clone(),
            model: config.cohere_rerank_model.clone(),
            api_key: config.cohere_key().map(str::to_string),
            passage_chars: PRIMARY_PASSAGE_CHARS,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v2/rerank", self.base_url.trim_end_matches('/'))
    }
}

/// Passage text as sent to the cross-encoder: truncated, prefixed with its citation.
pub(crate) fn primary_passage(candidate: &FusedResult, max_chars: usize) -> String {
    let text = truncate_chars(&candidate.chunk.text, max_chars);
    match candidate.chunk.citation.as_deref() {
        Some(citation) if !citation.trim().is_empty() => format!("[{citation}] {text}"),
        _ => text.to_string(),
    }
}

#[async_trait]
impl RerankTier for CohereReranker {
    fn kind(&self) -> RerankTierKind {
        RerankTierKind::CrossEncoder
    }

    fn name(&self) -> &'static str {
        "cohere"
    }

    async fn rank(
        &self,
        query: &str,
        candidates: &[FusedResult],
        top_k: usize,
    ) -> Result<Vec<TierScore>, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unavailable(
                "no Cohere API key configured".into(),
            ));
        };

        let request = RerankRequest {
            model: &self.model,
            query,
            documents: candidates
                .iter()
                .map(|candidate| primary_passage(candidate, self.passage_chars))
                .collect(),
            top_n: top_k,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RerankResponse = response.json().await?;
        debug!(results = body.results.len(), "Cohere rerank response received");

        Ok(body
            .results
            .into_iter()
            .map(|item| TierScore::new(item.index, item.relevance_score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fused_with;

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let tier = CohereReranker::new(
            "https://api.cohere.com".into(),
            "rerank-v3.5".into(),
            None,
        );

        let result = tier
            .rank("nexus", &[fused_with("c1", "text", None)], 1)
            .await;

        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn passages_are_truncated_and_labelled() {
        let long_text = "x".repeat(2000);
        let candidate = fused_with("c1", &long_text, Some("RCW 82.04.290"));

        let passage = primary_passage(&candidate, 1500);

        assert!(passage.starts_with("[RCW 82.04.290] "));
        assert_eq!(passage.chars().count(), "[RCW 82.04.290] ".len() + 1500);

        let unlabelled = fused_with("c2", "plain", None);
        assert_eq!(primary_passage(&unlabelled, 1500), "plain");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let tier = CohereReranker::new("https://api.cohere.com/".into(), "m".into(), None);
        assert_eq!(tier.endpoint(), "https://api.cohere.com/v2/rerank");
    }

    #[test]
    fn response_shape_parses() {
        let body: RerankResponse = serde_json::from_str(
            r#"{"id":"x","results":[{"index":2,"relevance_score":0.91},{"index":0,"relevance_score":0.12}]}"#,
        )
        .expect("parse");
        assert_eq!(body.results.len(), 2);
        assert_eq!(body.results[0].index, 2);
    }
}
