//! Dossier Governor - write-side fact routing.
//!
//! Receives fact packets from the Gardener and decides where they land:
//! Multi-Vector Voting surfaces candidate dossiers, one LLM call picks
//! append-or-create, and summaries evolve incrementally as facts
//! accumulate. Every change leaves a provenance row.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use hmlr_core::types::{DossierFact, ProvenanceOp};
use hmlr_core::{IdGenerator, Storage};

use crate::crawler::Crawler;
use crate::embed::Embedder;
use crate::error::{HmlrError, HmlrResult};
use crate::llm::{call_llm, extract::parse_lenient, LlmClient, ResponseFormat};

/// How many voted candidates the routing call sees
const CANDIDATE_LIMIT: usize = 5;

/// A semantically grouped set of facts headed for one dossier
#[derive(Debug, Clone)]
pub struct FactPacket {
    pub cluster_label: String,
    pub facts: Vec<String>,
    pub source_block_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A voted candidate with its tally
#[derive(Debug, Clone)]
pub struct VotedCandidate {
    pub dossier_id: String,
    pub hits: u32,
    pub score_sum: f32,
}

#[derive(Debug, Deserialize)]
struct RoutingDecision {
    action: String,
    #[serde(default)]
    target_dossier_id: Option<String>,
}

/// Write-side router for fact packets
pub struct DossierGovernor {
    storage: Storage,
    crawler: Crawler,
    embedder: Arc<dyn Embedder>,
    ids: Arc<IdGenerator>,
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
    voting_top_k: usize,
    threshold: f32,
}

impl DossierGovernor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        embedder: Arc<dyn Embedder>,
        ids: Arc<IdGenerator>,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        timeout: Duration,
        voting_top_k: usize,
        threshold: f32,
    ) -> Self {
        Self {
            crawler: Crawler::new(storage.clone(), embedder.clone()),
            storage,
            embedder,
            ids,
            llm,
            model: model.into(),
            timeout,
            voting_top_k,
            threshold,
        }
    }

    /// Route one fact packet; returns the dossier it landed in
    pub async fn process_packet(&self, packet: &FactPacket) -> HmlrResult<String> {
        info!(
            cluster = %packet.cluster_label,
            facts = packet.facts.len(),
            "processing fact packet"
        );

        let candidates = self.find_candidates(&packet.facts).await?;

        if !candidates.is_empty() {
            let decision = self.decide_routing(&packet.facts, &candidates).await;
            if decision.action == "append" {
                if let Some(target) = decision.target_dossier_id {
                    if self.storage.get_dossier(&target).await?.is_some() {
                        info!(dossier_id = %target, "routing decision: append");
                        self.append_to_dossier(&target, packet).await?;
                        return Ok(target);
                    }
                    warn!(dossier_id = %target, "append target does not exist, creating instead");
                }
            }
        }

        self.create_dossier(packet).await
    }

    /// Multi-Vector Voting
    ///
    /// Every fact in the packet searches the dossier embedding index
    /// independently; dossiers are ranked by how many facts hit them,
    /// with summed similarity then dossier ID as tiebreakers. Specific
    /// facts outvote vague ones, so the right dossier bubbles up even
    /// when the packet carries noise.
    pub async fn find_candidates(&self, facts: &[String]) -> HmlrResult<Vec<VotedCandidate>> {
        let mut tally: HashMap<String, (u32, f32)> = HashMap::new();

        for fact in facts {
            let query_vector = match self.embedder.encode(fact).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(error = %e, "fact embedding failed during voting, skipping fact");
                    continue;
                }
            };
            let hits = self
                .crawler
                .search_dossier_facts(&query_vector, self.voting_top_k, self.threshold)
                .await?;

            for hit in hits {
                let entry = tally.entry(hit.dossier_id).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += hit.score;
            }
        }

        let mut candidates: Vec<VotedCandidate> = tally
            .into_iter()
            .map(|(dossier_id, (hits, score_sum))| VotedCandidate {
                dossier_id,
                hits,
                score_sum,
            })
            .collect();

        // hits desc, score sum desc, then dossier_id asc for determinism
        candidates.sort_by(|a, b| {
            b.hits
                .cmp(&a.hits)
                .then_with(|| {
                    b.score_sum
                        .partial_cmp(&a.score_sum)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.dossier_id.cmp(&b.dossier_id))
        });
        candidates.truncate(CANDIDATE_LIMIT);

        debug!(candidates = candidates.len(), "voting complete");
        Ok(candidates)
    }

    async fn decide_routing(
        &self,
        new_facts: &[String],
        candidates: &[VotedCandidate],
    ) -> RoutingDecision {
        let mut views = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Ok(Some(dossier)) = self.storage.get_dossier(&candidate.dossier_id).await else {
                continue;
            };
            let facts = self
                .storage
                .dossier_facts(&candidate.dossier_id)
                .await
                .unwrap_or_default();
            views.push(json!({
                "dossier_id": dossier.dossier_id,
                "title": dossier.title,
                "summary": dossier.summary,
                "vote_hits": candidate.hits,
                "existing_facts": facts.iter().take(5).map(|f| f.fact_text.clone()).collect::<Vec<_>>(),
            }));
        }

        let prompt = format!(
            r#"You are a fact routing system. Decide whether new facts should be appended to an existing dossier or create a new dossier.

NEW FACTS TO ROUTE:
{facts}

CANDIDATE DOSSIERS (ranked by Multi-Vector Voting):
{candidates}

DECISION RULES:
1. If new facts semantically belong to an existing dossier (same topic, related concepts), APPEND
2. If new facts form a distinct topic that doesn't fit existing dossiers, CREATE
3. Consider the vote_hits: higher hits mean stronger semantic relationship
4. Facts don't need to be identical - look for conceptual relationships

Return JSON:
- To append: {{"action": "append", "target_dossier_id": "dos_xxx"}}
- To create new: {{"action": "create"}}"#,
            facts = serde_json::to_string_pretty(new_facts).unwrap_or_default(),
            candidates = serde_json::to_string_pretty(&views).unwrap_or_default(),
        );

        match call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::JsonObject,
            self.timeout,
        )
        .await
        {
            Ok(raw) => parse_lenient(&raw).unwrap_or_else(|| {
                warn!("routing decision did not parse, defaulting to create");
                RoutingDecision {
                    action: "create".into(),
                    target_dossier_id: None,
                }
            }),
            Err(e) => {
                warn!(error = %e, "routing decision failed, defaulting to create");
                RoutingDecision {
                    action: "create".into(),
                    target_dossier_id: None,
                }
            }
        }
    }

    async fn append_to_dossier(&self, dossier_id: &str, packet: &FactPacket) -> HmlrResult<()> {
        self.insert_facts(dossier_id, packet).await?;
        self.update_summary(dossier_id, &packet.facts, &packet.source_block_id)
            .await;
        Ok(())
    }

    async fn create_dossier(&self, packet: &FactPacket) -> HmlrResult<String> {
        let dossier_id = self.ids.dossier_id();
        info!(dossier_id = %dossier_id, title = %packet.cluster_label, "creating dossier");

        let summary = self
            .generate_summary(&packet.facts, &packet.cluster_label)
            .await;
        self.storage
            .create_dossier(
                &dossier_id,
                &packet.cluster_label,
                &summary,
                self.ids.next_timestamp(),
            )
            .await?;

        // The `created` row precedes every fact_added row in the log
        self.storage
            .add_provenance(
                &self.ids.prefixed_id("prov"),
                &dossier_id,
                ProvenanceOp::Created,
                Some(&packet.source_block_id),
                &json!({"num_facts": packet.facts.len(), "title": packet.cluster_label}),
                self.ids.next_timestamp(),
            )
            .await?;

        self.insert_facts(&dossier_id, packet).await?;

        Ok(dossier_id)
    }

    /// Insert each fact with its embedding and a `fact_added` row
    async fn insert_facts(&self, dossier_id: &str, packet: &FactPacket) -> HmlrResult<()> {
        for fact_text in &packet.facts {
            let vector = self
                .embedder
                .encode(fact_text)
                .await
                .map_err(|e| HmlrError::embedding(format!("dossier fact embedding: {}", e)))?;

            let fact_id = self.ids.prefixed_id("fact");
            self.storage
                .add_dossier_fact(
                    &DossierFact {
                        fact_id: fact_id.clone(),
                        dossier_id: dossier_id.to_string(),
                        fact_text: fact_text.clone(),
                        fact_type: None,
                        confidence: 1.0,
                        source_block_id: Some(packet.source_block_id.clone()),
                        source_turn_id: None,
                        added_at: self.ids.next_timestamp(),
                    },
                    &vector,
                )
                .await?;

            self.storage
                .add_provenance(
                    &self.ids.prefixed_id("prov"),
                    dossier_id,
                    ProvenanceOp::FactAdded,
                    Some(&packet.source_block_id),
                    &json!({"fact_id": fact_id, "fact_text": truncate(fact_text, 100)}),
                    self.ids.next_timestamp(),
                )
                .await?;
        }
        Ok(())
    }

    /// Incremental summary rewrite: old summary + new facts
    ///
    /// A failed call keeps the old summary; the facts are already
    /// committed.
    async fn update_summary(&self, dossier_id: &str, new_facts: &[String], source_block_id: &str) {
        let old_summary = match self.storage.get_dossier(dossier_id).await {
            Ok(Some(dossier)) => dossier.summary,
            _ => return,
        };

        let prompt = format!(
            r#"Update this dossier summary with new facts. Build causal chains where possible.

OLD SUMMARY:
{old_summary}

NEW FACTS BEING ADDED:
{facts}

INSTRUCTIONS:
1. Integrate new facts into the existing narrative
2. Build causal chains where facts relate (e.g., "Because X, therefore Y")
3. Do NOT create duplicates of existing information
4. Keep summary concise but comprehensive (2-4 sentences)

Return only the updated summary text."#,
            facts = serde_json::to_string_pretty(new_facts).unwrap_or_default(),
        );

        let summary = match call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::Text,
            self.timeout,
        )
        .await
        {
            Ok(raw) => raw.trim().to_string(),
            Err(e) => {
                warn!(dossier_id, error = %e, "summary update failed, keeping old summary");
                return;
            }
        };

        if summary.is_empty() {
            return;
        }
        if let Err(e) = self.storage.update_dossier_summary(dossier_id, &summary).await {
            warn!(dossier_id, error = %e, "summary write failed");
            return;
        }
        if let Err(e) = self
            .storage
            .add_provenance(
                &self.ids.prefixed_id("prov"),
                dossier_id,
                ProvenanceOp::SummaryUpdated,
                Some(source_block_id),
                &json!({"num_new_facts": new_facts.len()}),
                self.ids.next_timestamp(),
            )
            .await
        {
            warn!(dossier_id, error = %e, "summary provenance write failed");
        }
    }

    async fn generate_summary(&self, facts: &[String], title: &str) -> String {
        let prompt = format!(
            r#"Generate a concise summary for a new fact dossier.

TITLE: {title}

FACTS:
{facts}

Generate a 2-3 sentence summary that:
1. Captures the essence of these facts
2. Identifies any causal relationships
3. Sets context for future facts

Return only the summary text."#,
            facts = serde_json::to_string_pretty(facts).unwrap_or_default(),
        );

        match call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::Text,
            self.timeout,
        )
        .await
        {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            _ => {
                // Fallback: concatenate the leading facts
                let head: Vec<&str> = facts.iter().take(3).map(String::as_str).collect();
                format!("{}: {}", title, head.join("; "))
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
