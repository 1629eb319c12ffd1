//! Soft-failing wrappers around the store's search capabilities.
//!
//! Every call runs under the provider timeout. A failed or late search yields an
//! empty list so hybrid retrieval degrades to whichever source did answer.

use std::{collections::HashSet, time::Duration};

use common::{
    error::{with_timeout, ProviderError},
    storage::{document_store::DocumentStore, types::search_hit::SearchHit},
};
use tracing::{debug, warn};

/// Vector search over `scope`, post-filtered to `allowlist` when one is given.
pub async fn vector_candidates(
    store: &dyn DocumentStore,
    embedding: &[f32],
    take: usize,
    threshold: f32,
    scope: Option<&str>,
    allowlist: Option<&HashSet<String>>,
    timeout: Duration,
) -> Vec<SearchHit> {
    if embedding.is_empty() || take == 0 {
        return Vec::new();
    }

    let result = with_timeout(timeout, async {
        store
            .vector_search(embedding, take, threshold, scope)
            .await
            .map_err(ProviderError::from)
    })
    .await;

    match result {
        Ok(hits) => {
            let returned = hits.len();
            let hits = restrict_to_documents(hits, allowlist);
            debug!(returned, kept = hits.len(), "Vector search completed");
            hits
        }
        Err(err) => {
            warn!(error = %err, "Vector search failed; continuing without vector candidates");
            Vec::new()
        }
    }
}

/// Lexical search over `scope`; the allowlist is pushed down to the store.
pub async fn lexical_candidates(
    store: &dyn DocumentStore,
    query: &str,
    take: usize,
    scope: Option<&str>,
    allowlist: Option<&HashSet<String>>,
    timeout: Duration,
) -> Vec<SearchHit> {
    if take == 0 {
        return Vec::new();
    }

    let result = with_timeout(timeout, async {
        store
            .lexical_search(query, take, scope, allowlist)
            .await
            .map_err(ProviderError::from)
    })
    .await;

    match result {
        Ok(hits) => {
            debug!(returned = hits.len(), "Lexical search completed");
            hits
        }
        Err(err) => {
            warn!(error = %err, "Lexical search failed; continuing without lexical candidates");
            Vec::new()
        }
    }
}

fn restrict_to_documents(
    hits: Vec<SearchHit>,
    allowlist: Option<&HashSet<String>>,
) -> Vec<SearchHit> {
    match allowlist {
        Some(allowed) => hits
            .into_iter()
            .filter(|hit| allowed.contains(&hit.chunk.document_id))
            .collect(),
        None => hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chunk_ref, MockStore};

    #[tokio::test]
    async fn vector_hits_are_post_filtered_to_allowlist() {
        let store = MockStore::default().with_vector_hits(vec![
            SearchHit::vector(chunk_ref("c1", "doc-a"), 0.9),
            SearchHit::vector(chunk_ref("c2", "doc-b"), 0.8),
            SearchHit::vector(chunk_ref("c3", "doc-a"), 0.7),
        ]);
        let allowlist: HashSet<String> = ["doc-a".to_string()].into_iter().collect();

        let hits = vector_candidates(
            &store,
            &[1.0, 0.0],
            10,
            0.3,
            None,
            Some(&allowlist),
            Duration::from_secs(1),
        )
        .await;

        let ids: Vec<&str> = hits.iter().map(SearchHit::chunk_id).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
    }

    #[tokio::test]
    async fn failing_searches_degrade_to_empty() {
        let store = MockStore::default().failing_searches();

        let vector = vector_candidates(
            &store,
            &[1.0],
            5,
            0.3,
            None,
            None,
            Duration::from_secs(1),
        )
        .await;
        let lexical =
            lexical_candidates(&store, "nexus", 5, None, None, Duration::from_secs(1)).await;

        assert!(vector.is_empty());
        assert!(lexical.is_empty());
    }

    #[tokio::test]
    async fn slow_search_times_out_to_empty() {
        let store = MockStore::default()
            .with_lexical_hits(vec![SearchHit::lexical(chunk_ref("c1", "doc-a"))])
            .with_delay(Duration::from_millis(200));

        let lexical =
            lexical_candidates(&store, "nexus", 5, None, None, Duration::from_millis(10)).await;

        assert!(lexical.is_empty());
    }

    #[tokio::test]
    async fn lexical_search_receives_allowlist() {
        let store = MockStore::default()
            .with_lexical_hits(vec![SearchHit::lexical(chunk_ref("c1", "doc-a"))]);
        let allowlist: HashSet<String> = ["doc-a".to_string()].into_iter().collect();

        let hits = lexical_candidates(
            &store,
            "apportionment",
            5,
            Some("project-1"),
            Some(&allowlist),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(hits.len(), 1);
        let calls = store.lexical_calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].scope.as_deref(), Some("project-1"));
        assert_eq!(calls[0].allowlist.as_ref(), Some(&allowlist));
    }
}
