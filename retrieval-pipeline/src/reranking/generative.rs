use std::{collections::HashMap, sync::Arc};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use common::error::ProviderError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{truncate_chars, RerankTier, RerankTierKind, TierScore};
use crate::scoring::FusedResult;

const SCORER_PASSAGE_CHARS: usize = 400;
const MIN_SCORE: i64 = 1;
const MAX_SCORE: i64 = 10;

const SCORER_SYSTEM_PROMPT: &str = "You grade how relevant legal passages are to a tax law \
question. Score every passage from 1 to 10, where 10 means the passage directly answers the \
question. Reply with JSON only.";

#[derive(Debug, Deserialize)]
struct ScoreEnvelope {
    scores: Vec<ScoreEntry>,
}

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    index: usize,
    score: i64,
}

fn score_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer" },
                        "score": { "type": "integer" }
                    },
                    "required": ["index", "score"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["scores"],
        "additionalProperties": false
    })
}

/// Pointwise relevance scoring of the whole candidate batch by a chat model.
pub struct GenerativeScorer {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl GenerativeScorer {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn build_request(
        &self,
        query: &str,
        candidates: &[FusedResult],
    ) -> Result<CreateChatCompletionRequest, ProviderError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Per-passage relevance scores".into()),
                name: "passage_relevance_scores".into(),
                schema: Some(score_response_schema()),
                strict: Some(true),
            },
        };

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(SCORER_SYSTEM_PROMPT.to_string()).into(),
                ChatCompletionRequestUserMessage::from(scoring_prompt(query, candidates)).into(),
            ])
            .response_format(response_format)
            .build()
            .map_err(ProviderError::from)
    }
}

fn scoring_prompt(query: &str, candidates: &[FusedResult]) -> String {
    let passages = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let citation = candidate.chunk.citation.as_deref().unwrap_or("Unknown");
            let text = truncate_chars(&candidate.chunk.text, SCORER_PASSAGE_CHARS);
            format!("[{index}] ({citation})\n{text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Question: {query}\n\nPassages:\n{passages}\n\n\
         Return {{\"scores\": [{{\"index\": 0, \"score\": 8}}, ...]}} covering the passages above."
    )
}

/// Parses a scorer reply into `index -> score`.
///
/// Every entry must name an existing passage once, with an integer score in 1..=10.
pub fn parse_scores(
    content: &str,
    candidate_count: usize,
) -> Result<HashMap<usize, i64>, ProviderError> {
    let envelope: ScoreEnvelope = serde_json::from_str(content.trim())
        .map_err(|err| ProviderError::Malformed(format!("scorer reply is not valid: {err}")))?;

    let mut scores = HashMap::with_capacity(envelope.scores.len());
    for entry in envelope.scores {
        if entry.index >= candidate_count {
            return Err(ProviderError::Malformed(format!(
                "scorer referenced passage {} of {candidate_count}",
                entry.index
            )));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&entry.score) {
            return Err(ProviderError::Malformed(format!(
                "score {} for passage {} is outside 1-10",
                entry.score, entry.index
            )));
        }
        if scores.insert(entry.index, entry.score).is_some() {
            return Err(ProviderError::Malformed(format!(
                "passage {} scored twice",
                entry.index
            )));
        }
    }

    Ok(scores)
}

/// Orders every candidate by score, unscored ones counting as 0; ties keep fused order.
fn ranking_from_scores(
    scores: &HashMap<usize, i64>,
    candidate_count: usize,
    top_k: usize,
) -> Vec<TierScore> {
    let mut ranked: Vec<(usize, i64)> = (0..candidate_count)
        .map(|index| (index, scores.get(&index).copied().unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .take(top_k)
        .map(|(index, score)| TierScore::new(index, score as f32))
        .collect()
}

#[async_trait]
impl RerankTier for GenerativeScorer {
    fn kind(&self) -> RerankTierKind {
        RerankTierKind::Generative
    }

    fn name(&self) -> &'static str {
        "generative"
    }

    async fn rank(
        &self,
        query: &str,
        candidates: &[FusedResult],
        top_k: usize,
    ) -> Result<Vec<TierScore>, ProviderError> {
        let request = self.build_request(query, candidates)?;
        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| ProviderError::Malformed("scorer returned no content".into()))?;

        let scores = parse_scores(content, candidates.len())?;
        debug!(scored = scores.len(), candidates = candidates.len(), "Scorer reply parsed");

        Ok(ranking_from_scores(&scores, candidates.len(), top_k))
    }
}
