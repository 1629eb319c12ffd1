mod cohere;
mod generative;
mod local;

pub use cohere::CohereReranker;
pub use generative::{parse_scores, GenerativeScorer};
pub use local::{LocalCrossEncoder, RerankerPool};

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{
    error::{with_timeout, AppError, ProviderError},
    utils::config::{AppConfig, RerankBackendKind},
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{scoring::FusedResult, RankedResult};

/// Which tier produced the final order of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankTierKind {
    CrossEncoder,
    Generative,
    Identity,
    /// No reordering was needed: there were no more candidates than requested.
    Passthrough,
}

impl fmt::Display for RerankTierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RerankTierKind::CrossEncoder => "cross_encoder",
            RerankTierKind::Generative => "generative",
            RerankTierKind::Identity => "identity",
            RerankTierKind::Passthrough => "passthrough",
        };
        f.write_str(label)
    }
}

/// One candidate picked by a tier, by index into the candidate slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierScore {
    pub index: usize,
    pub score: Option<f32>,
}

impl TierScore {
    pub const fn new(index: usize, score: f32) -> Self {
        Self {
            index,
            score: Some(score),
        }
    }
}

/// A relevance model that can reorder candidates for a query.
///
/// Implementations return the candidates they rank best-first; they may return fewer
/// than `top_k`. Any error makes the chain move on to the next tier.
#[async_trait]
pub trait RerankTier: Send + Sync {
    fn kind(&self) -> RerankTierKind;

    fn name(&self) -> &'static str;

    async fn rank(
        &self,
        query: &str,
        candidates: &[FusedResult],
        top_k: usize,
    ) -> Result<Vec<TierScore>, ProviderError>;
}

/// Returns candidates in their fused order. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTier;

#[async_trait]
impl RerankTier for IdentityTier {
    fn kind(&self) -> RerankTierKind {
        RerankTierKind::Identity
    }

    fn name(&self) -> &'static str {
        "identity"
    }

    async fn rank(
        &self,
        _query: &str,
        candidates: &[FusedResult],
        top_k: usize,
    ) -> Result<Vec<TierScore>, ProviderError> {
        Ok((0..candidates.len().min(top_k))
            .map(|index| TierScore { index, score: None })
            .collect())
    }
}

/// Outcome of a rerank call: the ordered results and the tier that produced them.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<RankedResult>,
    pub tier: RerankTierKind,
    /// Tiers that were tried and failed, in order.
    pub failed_tiers: Vec<(&'static str, ProviderError)>,
}

/// Ordered reranker tiers; the first tier to produce a valid ordering wins.
pub struct RerankChain {
    tiers: Vec<Arc<dyn RerankTier>>,
    timeout: Duration,
}

impl RerankChain {
    /// Builds a chain from `tiers`, always ending with the identity tier.
    pub fn new(mut tiers: Vec<Arc<dyn RerankTier>>, timeout: Duration) -> Self {
        let ends_with_identity = tiers
            .last()
            .is_some_and(|tier| tier.kind() == RerankTierKind::Identity);
        if !ends_with_identity {
            tiers.push(Arc::new(IdentityTier));
        }
        Self { tiers, timeout }
    }

    pub fn identity_only() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1))
    }

    /// Primary tier from `rerank_backend`, then the generative scorer, then identity.
    pub fn from_config(
        config: &AppConfig,
        openai_client: Arc<Client<OpenAIConfig>>,
    ) -> Result<Self, AppError> {
        let mut tiers: Vec<Arc<dyn RerankTier>> = Vec::new();

        match config.rerank_backend {
            RerankBackendKind::Cohere => {
                tiers.push(Arc::new(CohereReranker::from_config(config)?));
            }
            RerankBackendKind::FastEmbed => {
                let pool = RerankerPool::from_config(config)?;
                tiers.push(Arc::new(LocalCrossEncoder::new(pool)));
            }
            RerankBackendKind::None => {}
        }

        tiers.push(Arc::new(GenerativeScorer::new(
            openai_client,
            config.scorer_model.clone(),
        )));

        let chain = Self::new(tiers, config.provider_timeout());
        info!(tiers = ?chain.tier_names(), "Reranker chain ready");
        Ok(chain)
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Returns exactly `min(top_k, candidates.len())` results. Never fails.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<FusedResult>,
        top_k: usize,
    ) -> RerankOutcome {
        if candidates.len() <= top_k {
            return RerankOutcome {
                results: candidates
                    .into_iter()
                    .map(|fused| RankedResult::new(fused, None, RerankTierKind::Passthrough))
                    .collect(),
                tier: RerankTierKind::Passthrough,
                failed_tiers: Vec::new(),
            };
        }

        let wanted = top_k.min(candidates.len());
        let mut failed_tiers = Vec::new();

        for tier in &self.tiers {
            let attempt = with_timeout(self.timeout, tier.rank(query, &candidates, wanted))
                .await
                .and_then(|ranking| validate_ranking(ranking, candidates.len()));

            match attempt {
                Ok(ranking) => {
                    debug!(tier = tier.name(), returned = ranking.len(), "Rerank tier succeeded");
                    let kind = tier.kind();
                    return RerankOutcome {
                        results: assemble(&candidates, ranking, wanted, kind),
                        tier: kind,
                        failed_tiers,
                    };
                }
                Err(err) => {
                    warn!(tier = tier.name(), error = %err, "Rerank tier failed; falling through");
                    failed_tiers.push((tier.name(), err));
                }
            }
        }

        RerankOutcome {
            results: assemble(&candidates, Vec::new(), wanted, RerankTierKind::Identity),
            tier: RerankTierKind::Identity,
            failed_tiers,
        }
    }
}

/// Rejects rankings that reference missing candidates or repeat one.
fn validate_ranking(
    ranking: Vec<TierScore>,
    candidate_count: usize,
) -> Result<Vec<TierScore>, ProviderError> {
    if ranking.is_empty() && candidate_count > 0 {
        return Err(ProviderError::Malformed("tier returned no rankings".into()));
    }

    let mut seen = HashSet::with_capacity(ranking.len());
    for entry in &ranking {
        if entry.index >= candidate_count {
            return Err(ProviderError::Malformed(format!(
                "index {} out of range for {candidate_count} candidates",
                entry.index
            )));
        }
        if !seen.insert(entry.index) {
            return Err(ProviderError::Malformed(format!(
                "index {} ranked more than once",
                entry.index
            )));
        }
    }

    Ok(ranking)
}

/// Applies a validated ranking, then pads with unranked candidates in fused order.
fn assemble(
    candidates: &[FusedResult],
    ranking: Vec<TierScore>,
    wanted: usize,
    tier: RerankTierKind,
) -> Vec<RankedResult> {
    let mut used = HashSet::with_capacity(wanted);
    let mut results = Vec::with_capacity(wanted);

    for entry in ranking.into_iter().take(wanted) {
        if let Some(candidate) = candidates.get(entry.index) {
            used.insert(entry.index);
            results.push(RankedResult::new(candidate.clone(), entry.score, tier));
        }
    }

    for (index, candidate) in candidates.iter().enumerate() {
        if results.len() >= wanted {
            break;
        }
        if !used.contains(&index) {
            results.push(RankedResult::new(candidate.clone(), None, tier));
        }
    }

    results
}

/// Cuts `text` to at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
