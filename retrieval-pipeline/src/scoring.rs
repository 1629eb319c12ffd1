use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use common::storage::types::search_hit::{ChunkRef, Provenance, SearchHit};
use serde::{Deserialize, Serialize};

/// 1-indexed rank of a chunk in each source list, when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceRanks {
    pub vector: Option<usize>,
    pub lexical: Option<usize>,
}

/// A de-duplicated search hit carrying its accumulated reciprocal rank score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub chunk: ChunkRef,
    /// Vector similarity; `0.0` for chunks only the lexical search returned.
    pub similarity: f32,
    pub provenance: Provenance,
    pub ranks: SourceRanks,
    pub rrf_score: f32,
}

impl FusedResult {
    fn from_hit(hit: SearchHit) -> Self {
        Self {
            similarity: hit.similarity.unwrap_or(0.0),
            provenance: hit.provenance,
            chunk: hit.chunk,
            ranks: SourceRanks::default(),
            rrf_score: 0.0,
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }

    pub fn found_by_both(&self) -> bool {
        self.ranks.vector.is_some() && self.ranks.lexical.is_some()
    }
}

/// Configuration for reciprocal rank fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RrfConfig {
    pub k: f32,
    pub vector_weight: f32,
    pub lexical_weight: f32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            vector_weight: 0.6,
            lexical_weight: 0.4,
        }
    }
}

impl RrfConfig {
    fn sanitized(self) -> Self {
        let k = if self.k.is_finite() && self.k > 0.0 {
            self.k
        } else {
            60.0
        };
        Self {
            k,
            vector_weight: non_negative(self.vector_weight),
            lexical_weight: non_negative(self.lexical_weight),
        }
    }
}

fn non_negative(weight: f32) -> f32 {
    if weight.is_finite() {
        weight.max(0.0)
    } else {
        0.0
    }
}

#[derive(Clone, Copy)]
enum Source {
    Vector,
    Lexical,
}

/// Combines the vector and lexical rankings with weighted reciprocal rank fusion.
///
/// Each chunk scores `weight / (k + rank)` per list it appears in, with 1-indexed
/// ranks. Only a chunk's first occurrence within a list counts. The result is sorted
/// by descending score; ties keep first-seen order, so vector order wins.
pub fn reciprocal_rank_fusion(
    vector_ranked: Vec<SearchHit>,
    lexical_ranked: Vec<SearchHit>,
    config: RrfConfig,
) -> Vec<FusedResult> {
    let config = config.sanitized();
    let mut fused: Vec<FusedResult> = Vec::with_capacity(vector_ranked.len() + lexical_ranked.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    accumulate(
        &mut fused,
        &mut positions,
        vector_ranked,
        Source::Vector,
        config.vector_weight,
        config.k,
    );
    accumulate(
        &mut fused,
        &mut positions,
        lexical_ranked,
        Source::Lexical,
        config.lexical_weight,
        config.k,
    );

    sort_by_rrf_desc(&mut fused);
    fused
}

fn accumulate(
    fused: &mut Vec<FusedResult>,
    positions: &mut HashMap<String, usize>,
    ranked: Vec<SearchHit>,
    source: Source,
    weight: f32,
    k: f32,
) {
    let mut seen = HashSet::new();
    let mut rank = 0usize;

    for hit in ranked {
        if !seen.insert(hit.chunk.id.clone()) {
            continue;
        }
        rank += 1;

        let position = match positions.get(&hit.chunk.id) {
            Some(position) => *position,
            None => {
                positions.insert(hit.chunk.id.clone(), fused.len());
                fused.push(FusedResult::from_hit(hit));
                fused.len() - 1
            }
        };

        if let Some(entry) = fused.get_mut(position) {
            entry.rrf_score += weight / (k + rank as f32);
            match source {
                Source::Vector => entry.ranks.vector = Some(rank),
                Source::Lexical => entry.ranks.lexical = Some(rank),
            }
        }
    }
}

/// Stable descending sort on the fused score.
pub fn sort_by_rrf_desc(items: &mut [FusedResult]) {
    items.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> ChunkRef {
        ChunkRef {
            id: id.into(),
            document_id: format!("doc-{id}"),
            ordinal: 0,
            text: format!("text of {id}"),
            citation: None,
            tags: Vec::new(),
        }
    }

    fn vector(id: &str, similarity: f32) -> SearchHit {
        SearchHit::vector(chunk(id), similarity)
    }

    fn lexical(id: &str) -> SearchHit {
        SearchHit::lexical(chunk(id))
    }

    fn ids(results: &[FusedResult]) -> Vec<&str> {
        results.iter().map(FusedResult::chunk_id).collect()
    }

    #[test]
    fn overlap_ranks_first_and_scores_accumulate() {
        let fused = reciprocal_rank_fusion(
            vec![vector("c1", 0.9), vector("c2", 0.8)],
            vec![lexical("c2"), lexical("c3")],
            RrfConfig::default(),
        );

        assert_eq!(ids(&fused), vec!["c2", "c1", "c3"]);
        assert!((fused[0].rrf_score - (0.6 / 62.0 + 0.4 / 61.0)).abs() < 1e-6);
        assert!((fused[1].rrf_score - 0.6 / 61.0).abs() < 1e-6);
        assert!((fused[2].rrf_score - 0.4 / 62.0).abs() < 1e-6);
        assert!(fused[0].found_by_both());
        assert_eq!(fused[0].ranks.vector, Some(2));
        assert_eq!(fused[0].ranks.lexical, Some(1));
    }

    #[test]
    fn lexical_only_hits_carry_zero_similarity() {
        let fused =
            reciprocal_rank_fusion(vec![vector("a", 0.7)], vec![lexical("b")], RrfConfig::default());

        let b = fused
            .iter()
            .find(|item| item.chunk_id() == "b")
            .expect("lexical hit present");
        assert_eq!(b.similarity, 0.0);
        assert_eq!(b.provenance, Provenance::Lexical);

        let a = fused
            .iter()
            .find(|item| item.chunk_id() == "a")
            .expect("vector hit present");
        assert!((a.similarity - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn fusing_with_empty_list_preserves_order() {
        let list = vec![vector("x", 0.3), vector("y", 0.9), vector("z", 0.5)];
        let fused = reciprocal_rank_fusion(list, Vec::new(), RrfConfig::default());
        assert_eq!(ids(&fused), vec!["x", "y", "z"]);

        let lexical_only = reciprocal_rank_fusion(
            Vec::new(),
            vec![lexical("p"), lexical("q")],
            RrfConfig::default(),
        );
        assert_eq!(ids(&lexical_only), vec!["p", "q"]);
    }

    #[test]
    fn equal_scores_keep_vector_order() {
        let config = RrfConfig {
            k: 60.0,
            vector_weight: 0.5,
            lexical_weight: 0.5,
        };
        let fused = reciprocal_rank_fusion(
            vec![vector("v1", 0.9), vector("v2", 0.8)],
            vec![lexical("l1"), lexical("l2")],
            config,
        );

        assert_eq!(ids(&fused), vec!["v1", "l1", "v2", "l2"]);
    }

    #[test]
    fn duplicates_within_one_list_count_once() {
        let fused = reciprocal_rank_fusion(
            vec![vector("a", 0.9), vector("a", 0.9), vector("b", 0.5)],
            Vec::new(),
            RrfConfig::default(),
        );

        assert_eq!(ids(&fused), vec!["a", "b"]);
        assert!((fused[0].rrf_score - 0.6 / 61.0).abs() < 1e-6);
        assert!((fused[1].rrf_score - 0.6 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_config_values_are_sanitized() {
        let config = RrfConfig {
            k: -1.0,
            vector_weight: f32::NAN,
            lexical_weight: 1.0,
        };
        let fused = reciprocal_rank_fusion(vec![vector("a", 0.9)], vec![lexical("b")], config);

        assert_eq!(ids(&fused), vec!["b", "a"]);
        assert_eq!(fused[1].rrf_score, 0.0);
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-6);
    }
}
