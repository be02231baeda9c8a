//! Fact Scrubber
//!
//! Extracts durable key/value facts (credentials, identifiers,
//! definitions) from sentence-level chunks. Facts land in the fact store
//! with `source_block_id = NULL`; the engine stamps the routed block
//! after the Governor commits. Rows are never updated: rotations
//! append, and newest-wins ordering resolves conflicts at read time.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use hmlr_core::chunk::Chunk;
use hmlr_core::types::NewFact;
use hmlr_core::{IdGenerator, Storage};

use crate::error::HmlrResult;
use crate::llm::{call_llm, extract::parse_lenient, LlmClient, ResponseFormat};

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    facts: Vec<ExtractedFact>,
}

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    key: String,
    value: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
}

/// LLM-driven fact extractor
pub struct FactScrubber {
    storage: Storage,
    ids: Arc<IdGenerator>,
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl FactScrubber {
    pub fn new(
        storage: Storage,
        ids: Arc<IdGenerator>,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            ids,
            llm,
            model: model.into(),
            timeout,
        }
    }

    /// Extract and store facts from one turn's sentence chunks
    ///
    /// Issues one prompt per sentence. A failed extraction yields zero
    /// facts for that sentence and never fails the turn.
    pub async fn scrub(&self, sentences: &[Chunk]) -> HmlrResult<Vec<i64>> {
        let mut fact_ids = Vec::new();

        for sentence in sentences {
            let extracted = match self.extract_from_sentence(&sentence.text).await {
                Ok(facts) => facts,
                Err(e) => {
                    warn!(chunk_id = %sentence.chunk_id, error = %e, "fact extraction failed, skipping sentence");
                    continue;
                }
            };

            for fact in extracted {
                if fact.key.trim().is_empty() || fact.value.trim().is_empty() {
                    continue;
                }
                let row = NewFact {
                    key: fact.key.trim().to_string(),
                    value: fact.value.trim().to_string(),
                    category: fact.category,
                    evidence_snippet: fact.evidence,
                    source_chunk_id: Some(sentence.chunk_id.clone()),
                };
                let fact_id = self
                    .storage
                    .insert_fact(&row, self.ids.next_timestamp())
                    .await?;
                fact_ids.push(fact_id);
            }
        }

        debug!(count = fact_ids.len(), "scrubbed facts from turn");
        Ok(fact_ids)
    }

    async fn extract_from_sentence(&self, text: &str) -> HmlrResult<Vec<ExtractedFact>> {
        let prompt = format!(
            r#"You are a fact extraction system. Extract durable facts from this sentence: credentials, API keys, identifiers, acronym definitions, names, and configuration values. Ignore opinions, questions, and small talk.

SENTENCE:
{text}

Return JSON with zero or more facts:
{{"facts": [{{"key": "weather_api_key", "value": "ABC123", "category": "credential", "evidence": "exact quote"}}]}}

If the sentence contains no durable fact, return {{"facts": []}}."#
        );

        let raw = call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::JsonObject,
            self.timeout,
        )
        .await?;

        let response: ExtractionResponse = parse_lenient(&raw)
            .ok_or_else(|| crate::error::HmlrError::llm_parse("fact extraction response"))?;
        Ok(response.facts)
    }
}
