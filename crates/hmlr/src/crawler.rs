//! Crawler
//!
//! Vector recall over the two long-term surfaces: gardened memory chunks
//! and dossier fact embeddings. Cosine similarity with a tunable floor;
//! the short-term ledger is never searched here (the Hydrator loads the
//! active block directly). An embedding failure degrades to empty
//! candidate lists rather than failing the query.

use std::sync::Arc;

use tracing::{debug, warn};

use hmlr_core::types::{DossierFactHit, MemoryCandidate};
use hmlr_core::Storage;

use crate::embed::{cosine_similarity, Embedder};
use crate::error::HmlrResult;

/// A crawl request
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub query: String,
    /// Optional keywords appended to the embedded query text
    pub keywords: Vec<String>,
    pub memory_top_k: usize,
    pub dossier_top_k: usize,
    pub threshold: f32,
}

/// Ranked candidates from both long-term surfaces
#[derive(Debug, Default)]
pub struct CrawlResult {
    pub memories: Vec<MemoryCandidate>,
    pub dossier_hits: Vec<DossierFactHit>,
}

/// Two-surface vector searcher
pub struct Crawler {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
}

impl Crawler {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        Self { storage, embedder }
    }

    /// Run the crawl; returns empty lists when the encoder is down
    pub async fn crawl(&self, request: &CrawlRequest) -> HmlrResult<CrawlResult> {
        let mut text = request.query.clone();
        if !request.keywords.is_empty() {
            text.push_str("\nKeywords: ");
            text.push_str(&request.keywords.join(", "));
        }

        let query_vector = match self.embedder.encode(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding failed, returning no candidates");
                return Ok(CrawlResult::default());
            }
        };

        let memories = self
            .search_gardened(&query_vector, request.memory_top_k, request.threshold)
            .await?;
        let dossier_hits = self
            .search_dossier_facts(&query_vector, request.dossier_top_k, request.threshold)
            .await?;

        debug!(
            memories = memories.len(),
            dossier_hits = dossier_hits.len(),
            "crawl complete"
        );

        Ok(CrawlResult {
            memories,
            dossier_hits,
        })
    }

    /// Score every fact against the query and return hits above the floor
    ///
    /// Used both for read-side retrieval and (with a wider `top_k`) for
    /// multi-vector voting.
    pub async fn search_dossier_facts(
        &self,
        query_vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> HmlrResult<Vec<DossierFactHit>> {
        let vectors = self.storage.dossier_fact_vectors().await?;

        let mut hits: Vec<DossierFactHit> = vectors
            .into_iter()
            .map(|(fact_id, dossier_id, vector)| DossierFactHit {
                score: cosine_similarity(query_vector, &vector),
                fact_id,
                dossier_id,
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fact_id.cmp(&b.fact_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn search_gardened(
        &self,
        query_vector: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> HmlrResult<Vec<MemoryCandidate>> {
        let vectors = self.storage.gardened_vectors().await?;

        let mut scored: Vec<(String, f32)> = vectors
            .into_iter()
            .map(|(chunk_id, vector)| (chunk_id, cosine_similarity(query_vector, &vector)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        let mut candidates = Vec::with_capacity(scored.len());
        for (chunk_id, score) in scored {
            if let Some(chunk) = self.storage.get_gardened_chunk(&chunk_id).await? {
                candidates.push(MemoryCandidate {
                    chunk_id: chunk.chunk_id,
                    text: chunk.text,
                    source_block_id: chunk.block_id,
                    turn_ordinal: chunk.turn_ordinal,
                    score,
                    source_date: chunk.source_date,
                });
            }
        }
        Ok(candidates)
    }
}
