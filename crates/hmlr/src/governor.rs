//! Governor
//!
//! The router. Classifies each query into one of four routing scenarios,
//! commits the bridge-block state transitions that keep exactly one
//! block ACTIVE, prunes the Crawler's raw candidates with an LLM
//! relevance pass, and maintains the chosen block's accumulating fields
//! after each turn.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use hmlr_core::types::{BlockStatus, BlockSummary, MemoryCandidate};
use hmlr_core::{IdGenerator, Storage};

use crate::error::HmlrResult;
use crate::llm::{call_llm, extract::parse_lenient, LlmClient, ResponseFormat};

/// The four routing outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingScenario {
    /// Query belongs to the sole ACTIVE block's topic
    Continuation,
    /// Query resumes a PAUSED block's topic
    Resumption,
    /// No block matches; a fresh block is created
    NewTopic,
    /// New topic while a block is ACTIVE; it is paused first
    TopicShift,
}

impl RoutingScenario {
    /// Scenario number used in prompts and logs
    pub fn number(&self) -> u8 {
        match self {
            Self::Continuation => 1,
            Self::Resumption => 2,
            Self::NewTopic => 3,
            Self::TopicShift => 4,
        }
    }

    fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Continuation),
            2 => Some(Self::Resumption),
            3 => Some(Self::NewTopic),
            4 => Some(Self::TopicShift),
            _ => None,
        }
    }
}

/// Committed routing result
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    pub block_id: String,
    pub scenario: RoutingScenario,
    /// Keywords the router extracted from the query, unioned into the
    /// block after the turn lands
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoutingResponse {
    scenario: u8,
    #[serde(default)]
    target_block_id: Option<String>,
    #[serde(default)]
    topic_label: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FilterResponse {
    #[serde(default)]
    approved_indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct RollupResponse {
    summary: String,
    #[serde(default)]
    open_loops: Vec<String>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default)]
    topic_label: Option<String>,
}

/// Router over the daily ledger
pub struct Governor {
    storage: Storage,
    ids: Arc<IdGenerator>,
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl Governor {
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

    /// Route a query and commit the resulting block transitions
    ///
    /// `gardening` holds block IDs currently locked by the Gardener;
    /// those are treated as CLOSED and can never be resumed.
    pub async fn govern(
        &self,
        query: &str,
        profile_context: &str,
        gardening: &HashSet<String>,
    ) -> HmlrResult<RoutingOutcome> {
        self.repair_active_singleton().await?;

        let snapshot: Vec<BlockSummary> = self
            .storage
            .ledger_snapshot()
            .await?
            .into_iter()
            .filter(|b| !gardening.contains(&b.block_id) && b.status != BlockStatus::Closed)
            .collect();

        let active_id = snapshot
            .iter()
            .find(|b| b.status == BlockStatus::Active)
            .map(|b| b.block_id.clone());

        let response = match self.route_llm(query, &snapshot, profile_context).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "routing call failed, using fallback scenario");
                RoutingResponse {
                    scenario: if active_id.is_some() { 1 } else { 3 },
                    target_block_id: active_id.clone(),
                    topic_label: None,
                    keywords: vec![],
                }
            }
        };

        let scenario = RoutingScenario::from_number(response.scenario).unwrap_or({
            if active_id.is_some() {
                RoutingScenario::Continuation
            } else {
                RoutingScenario::NewTopic
            }
        });

        let outcome = self
            .commit(scenario, response, query, &snapshot, active_id)
            .await?;

        info!(
            scenario = outcome.scenario.number(),
            block_id = %outcome.block_id,
            "routing committed"
        );
        Ok(outcome)
    }

    /// Apply the decided scenario, degrading gracefully when the LLM's
    /// target does not match ledger reality
    async fn commit(
        &self,
        scenario: RoutingScenario,
        response: RoutingResponse,
        query: &str,
        snapshot: &[BlockSummary],
        active_id: Option<String>,
    ) -> HmlrResult<RoutingOutcome> {
        let keywords = response.keywords.clone();

        let (scenario, block_id) = match scenario {
            RoutingScenario::Continuation => match active_id {
                Some(id) => (RoutingScenario::Continuation, id),
                None => {
                    let id = self.create_block(&response, query).await?;
                    (RoutingScenario::NewTopic, id)
                }
            },
            RoutingScenario::Resumption => {
                let target = response.target_block_id.as_deref().and_then(|id| {
                    snapshot
                        .iter()
                        .find(|b| b.block_id == id && b.status == BlockStatus::Paused)
                });
                match target {
                    Some(block) => {
                        let target_id = block.block_id.clone();
                        if let Some(active) = &active_id {
                            self.storage
                                .set_block_status(active, BlockStatus::Paused)
                                .await?;
                        }
                        self.storage
                            .set_block_status(&target_id, BlockStatus::Active)
                            .await?;
                        (RoutingScenario::Resumption, target_id)
                    }
                    None => {
                        // Target gone or being gardened: treat as a fresh topic
                        debug!("resumption target unavailable, creating fresh block");
                        if let Some(active) = &active_id {
                            self.storage
                                .set_block_status(active, BlockStatus::Paused)
                                .await?;
                        }
                        let id = self.create_block(&response, query).await?;
                        let scenario = if active_id.is_some() {
                            RoutingScenario::TopicShift
                        } else {
                            RoutingScenario::NewTopic
                        };
                        (scenario, id)
                    }
                }
            }
            RoutingScenario::NewTopic | RoutingScenario::TopicShift => {
                let had_active = active_id.is_some();
                if let Some(active) = &active_id {
                    self.storage
                        .set_block_status(active, BlockStatus::Paused)
                        .await?;
                }
                let id = self.create_block(&response, query).await?;
                let scenario = if had_active {
                    RoutingScenario::TopicShift
                } else {
                    RoutingScenario::NewTopic
                };
                (scenario, id)
            }
        };

        Ok(RoutingOutcome {
            block_id,
            scenario,
            keywords,
        })
    }

    async fn create_block(&self, response: &RoutingResponse, query: &str) -> HmlrResult<String> {
        let label = response
            .topic_label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| fallback_label(query));

        let (block_id, created_at) = self.ids.block_id();
        self.storage
            .create_block(
                &block_id,
                &label,
                &response.keywords,
                BlockStatus::Active,
                created_at,
            )
            .await?;
        Ok(block_id)
    }

    /// Force-pause all but the newest ACTIVE block
    ///
    /// Two ACTIVE blocks is an invariant violation; repair it at entry and
    /// warn rather than failing the query.
    async fn repair_active_singleton(&self) -> HmlrResult<()> {
        let active = self.storage.active_blocks().await?;
        if active.len() <= 1 {
            return Ok(());
        }

        warn!(count = active.len(), "multiple ACTIVE blocks observed, force-pausing older ones");
        // list_blocks orders oldest first; keep the newest
        for block in &active[..active.len() - 1] {
            self.storage
                .set_block_status(&block.block_id, BlockStatus::Paused)
                .await?;
        }
        Ok(())
    }

    async fn route_llm(
        &self,
        query: &str,
        snapshot: &[BlockSummary],
        profile_context: &str,
    ) -> HmlrResult<RoutingResponse> {
        let ledger_view: Vec<serde_json::Value> = snapshot
            .iter()
            .map(|b| {
                json!({
                    "block_id": b.block_id,
                    "topic_label": b.topic_label,
                    "status": b.status.as_str(),
                    "keywords": b.keywords,
                    "summary": b.summary,
                })
            })
            .collect();

        let prompt = format!(
            r#"You are a conversation router. Decide which ongoing topic this query belongs to.

QUERY:
{query}

LEDGER (ongoing topic blocks):
{ledger}

USER PROFILE CONTEXT:
{profile}

SCENARIOS:
1 CONTINUATION - the query belongs to the ACTIVE block's topic. Gradual drift within a domain stays in the same block.
2 RESUMPTION - the query returns to a PAUSED block's topic, possibly after an interruption.
3 NEW TOPIC - no block matches and no block is ACTIVE.
4 TOPIC SHIFT - an abrupt new topic while a block is ACTIVE.

RULES:
- Prefer semantic continuity over recency: a vague follow-up like "Why?" belongs to the semantically nearest block even if it is not the newest.
- Abrupt cross-domain jumps are a shift; drift within the same domain is a continuation.
- Also extract 1-5 topical keywords from the query, and for new blocks propose a concise topic_label.

Return JSON:
{{"scenario": 1, "target_block_id": "bb_xxx or null", "topic_label": "label or null", "keywords": ["kw1", "kw2"]}}"#,
            ledger = serde_json::to_string_pretty(&ledger_view)?,
            profile = if profile_context.is_empty() { "(none)" } else { profile_context },
        );

        let raw = call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::JsonObject,
            self.timeout,
        )
        .await?;

        parse_lenient(&raw)
            .ok_or_else(|| crate::error::HmlrError::llm_parse("routing response"))
    }

    /// LLM relevance pass over the Crawler's shortlist
    ///
    /// Vector search recalls; this prunes. On failure the raw shortlist
    /// passes through untouched.
    pub async fn filter_candidates(
        &self,
        query: &str,
        candidates: Vec<MemoryCandidate>,
    ) -> HmlrResult<Vec<MemoryCandidate>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut views = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.iter().enumerate() {
            let metadata = self
                .storage
                .get_block_metadata(&candidate.source_block_id)
                .await?;
            views.push(json!({
                "index": index,
                "text": candidate.text,
                "source_block": candidate.source_block_id,
                "source_topic": metadata.as_ref().map(|m| m.topic_label.clone()),
                "source_summary": metadata.as_ref().map(|m| m.summary.clone()),
                "similarity": candidate.score,
            }));
        }

        let prompt = format!(
            r#"You are a relevance filter. Keep only the retrieved memories that genuinely help answer the query; drop coincidental vector matches.

QUERY:
{query}

CANDIDATES:
{candidates}

Return JSON with the indices to keep:
{{"approved_indices": [0, 2]}}"#,
            candidates = serde_json::to_string_pretty(&views)?,
        );

        let raw = match call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::JsonObject,
            self.timeout,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "candidate filter failed, keeping full shortlist");
                return Ok(candidates);
            }
        };

        let Some(response) = parse_lenient::<FilterResponse>(&raw) else {
            warn!("candidate filter response did not parse, keeping full shortlist");
            return Ok(candidates);
        };

        let approved: HashSet<usize> = response.approved_indices.into_iter().collect();
        Ok(candidates
            .into_iter()
            .enumerate()
            .filter(|(index, _)| approved.contains(index))
            .map(|(_, candidate)| candidate)
            .collect())
    }

    /// Refresh the routed block's accumulating fields after a turn lands
    ///
    /// Unions the query keywords, regenerates the rolling summary from
    /// the turn list, and picks up open loops / decisions. A failed
    /// summary call keeps the previous rollup.
    pub async fn update_block_after_turn(
        &self,
        block_id: &str,
        keywords: &[String],
    ) -> HmlrResult<()> {
        if !keywords.is_empty() {
            self.storage.merge_block_keywords(block_id, keywords).await?;
        }

        let Some(block) = self.storage.get_block(block_id).await? else {
            return Ok(());
        };

        let turns: Vec<serde_json::Value> = block
            .turns
            .iter()
            .map(|t| json!({"user": t.user_text, "assistant": t.ai_text}))
            .collect();

        let prompt = format!(
            r#"Maintain the rolling state of one conversation topic.

TOPIC LABEL: {label}
CURRENT SUMMARY: {summary}

TURNS:
{turns}

Return JSON:
{{"summary": "2-4 sentence rolling summary of the topic so far",
  "open_loops": ["unresolved questions or pending actions"],
  "decisions": ["explicit decisions made"],
  "topic_label": "only if you can name the topic MORE specifically than the current label, else null"}}"#,
            label = block.topic_label,
            summary = if block.summary.is_empty() { "(none)" } else { &block.summary },
            turns = serde_json::to_string_pretty(&turns)?,
        );

        let raw = match call_llm(
            self.llm.as_ref(),
            &prompt,
            &self.model,
            ResponseFormat::JsonObject,
            self.timeout,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(block_id, error = %e, "rollup call failed, keeping previous summary");
                return Ok(());
            }
        };

        let Some(response) = parse_lenient::<RollupResponse>(&raw) else {
            warn!(block_id, "rollup response did not parse, keeping previous summary");
            return Ok(());
        };

        self.storage
            .update_block_rollup(
                block_id,
                &response.summary,
                &response.open_loops,
                &response.decisions,
            )
            .await?;

        if let Some(label) = response.topic_label {
            let label = label.trim();
            if !label.is_empty() && label != block.topic_label {
                self.storage.set_block_topic_label(block_id, label).await?;
            }
        }

        Ok(())
    }
}

/// Label for a new block when the router offered none
fn fallback_label(query: &str) -> String {
    let words: Vec<&str> = query.split_whitespace().take(6).collect();
    if words.is_empty() {
        "Untitled Topic".into()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;
    use chrono::Utc;

    fn governor(llm: MockLlm) -> (Storage, Governor) {
        let storage = Storage::open_in_memory().unwrap();
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );
        (storage, governor)
    }

    /// Shared clock so seeded blocks always get strictly increasing
    /// `created_at` values
    fn test_ids() -> &'static IdGenerator {
        static IDS: std::sync::OnceLock<IdGenerator> = std::sync::OnceLock::new();
        IDS.get_or_init(IdGenerator::new)
    }

    async fn seed_block(storage: &Storage, label: &str, status: BlockStatus) -> String {
        let (block_id, ts) = test_ids().block_id();
        storage
            .create_block(&block_id, label, &[], status, ts)
            .await
            .unwrap();
        block_id
    }

    #[tokio::test]
    async fn test_scenario_3_creates_active_block() {
        let llm = MockLlm::always(
            r#"{"scenario": 3, "target_block_id": null, "topic_label": "Hiking Trip", "keywords": ["hiking"]}"#,
        );
        let (storage, governor) = governor(llm);

        let outcome = governor
            .govern("Help me plan a hiking trip", "", &HashSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.scenario, RoutingScenario::NewTopic);
        let block = storage.get_block(&outcome.block_id).await.unwrap().unwrap();
        assert_eq!(block.status, BlockStatus::Active);
        assert_eq!(block.topic_label, "Hiking Trip");
    }

    #[tokio::test]
    async fn test_scenario_1_routes_to_active() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let block_id = seed_block(&storage, "Hiking", BlockStatus::Active).await;

        let llm = MockLlm::always(
            &format!(r#"{{"scenario": 1, "target_block_id": "{block_id}", "keywords": ["boots"]}}"#),
        );
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );

        let outcome = governor
            .govern("What boots should I buy?", "", &HashSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.scenario, RoutingScenario::Continuation);
        assert_eq!(outcome.block_id, block_id);
        assert_eq!(storage.active_blocks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_4_pauses_current_and_creates() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let old_block = seed_block(&storage, "Hiking", BlockStatus::Active).await;

        let llm = MockLlm::always(
            r#"{"scenario": 4, "target_block_id": null, "topic_label": "Python Debugging", "keywords": ["python"]}"#,
        );
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );

        let outcome = governor
            .govern("Anyway, help me debug this Python error", "", &HashSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.scenario, RoutingScenario::TopicShift);
        assert_ne!(outcome.block_id, old_block);

        let old = storage.get_block(&old_block).await.unwrap().unwrap();
        assert_eq!(old.status, BlockStatus::Paused);
        assert_eq!(storage.active_blocks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_2_swaps_active_and_paused() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let paused = seed_block(&storage, "Hiking", BlockStatus::Paused).await;
        let active = seed_block(&storage, "Python", BlockStatus::Active).await;

        let llm = MockLlm::always(&format!(
            r#"{{"scenario": 2, "target_block_id": "{paused}", "keywords": []}}"#
        ));
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );

        let outcome = governor
            .govern("Back to the hiking plans", "", &HashSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.scenario, RoutingScenario::Resumption);
        assert_eq!(outcome.block_id, paused);

        let reactivated = storage.get_block(&paused).await.unwrap().unwrap();
        assert_eq!(reactivated.status, BlockStatus::Active);
        let parked = storage.get_block(&active).await.unwrap().unwrap();
        assert_eq!(parked.status, BlockStatus::Paused);
    }

    #[tokio::test]
    async fn test_resuming_gardened_block_creates_fresh() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let paused = seed_block(&storage, "Hiking", BlockStatus::Paused).await;

        let llm = MockLlm::always(&format!(
            r#"{{"scenario": 2, "target_block_id": "{paused}", "topic_label": "Hiking Again", "keywords": []}}"#
        ));
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );

        let gardening: HashSet<String> = [paused.clone()].into_iter().collect();
        let outcome = governor
            .govern("Back to the hiking plans", "", &gardening)
            .await
            .unwrap();

        // The locked block must be treated as CLOSED
        assert_ne!(outcome.block_id, paused);
        assert_eq!(outcome.scenario, RoutingScenario::NewTopic);

        let untouched = storage.get_block(&paused).await.unwrap().unwrap();
        assert_eq!(untouched.status, BlockStatus::Paused);
    }

    #[tokio::test]
    async fn test_parse_failure_falls_back_to_continuation() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let active = seed_block(&storage, "Hiking", BlockStatus::Active).await;

        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(MockLlm::always("not json at all")),
            "test-model",
            Duration::from_secs(5),
        );

        let outcome = governor.govern("hm", "", &HashSet::new()).await.unwrap();
        assert_eq!(outcome.scenario, RoutingScenario::Continuation);
        assert_eq!(outcome.block_id, active);
    }

    #[tokio::test]
    async fn test_llm_failure_without_active_creates_block() {
        let (storage, governor) = governor(MockLlm::failing());

        let outcome = governor
            .govern("Hello there", "", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(outcome.scenario, RoutingScenario::NewTopic);
        assert_eq!(storage.active_blocks().await.unwrap().len(), 1);
        let block = storage.get_block(&outcome.block_id).await.unwrap().unwrap();
        assert_eq!(block.topic_label, "Hello there");
    }

    #[tokio::test]
    async fn test_two_active_blocks_repaired_at_entry() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let older = seed_block(&storage, "First", BlockStatus::Active).await;
        let newer = seed_block(&storage, "Second", BlockStatus::Active).await;

        let llm = MockLlm::always(&format!(
            r#"{{"scenario": 1, "target_block_id": "{newer}", "keywords": []}}"#
        ));
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );

        let outcome = governor.govern("continue", "", &HashSet::new()).await.unwrap();
        assert_eq!(outcome.block_id, newer);

        let repaired = storage.get_block(&older).await.unwrap().unwrap();
        assert_eq!(repaired.status, BlockStatus::Paused);
        assert_eq!(storage.active_blocks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_keeps_only_approved_indices() {
        let llm = MockLlm::always(r#"{"approved_indices": [1]}"#);
        let (_storage, governor) = governor(llm);

        let candidates = vec![
            candidate("c0", "noise"),
            candidate("c1", "Titan is deprecated"),
            candidate("c2", "more noise"),
        ];
        let filtered = governor
            .filter_candidates("is Titan ok?", candidates)
            .await
            .unwrap();

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn test_filter_failure_keeps_shortlist() {
        let (_storage, governor) = governor(MockLlm::failing());

        let candidates = vec![candidate("c0", "a"), candidate("c1", "b")];
        let filtered = governor
            .filter_candidates("query", candidates)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn test_rollup_updates_summary_and_label() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let block_id = seed_block(&storage, "General Conversation", BlockStatus::Active).await;
        let ids = IdGenerator::new();
        let (turn_id, ts) = ids.turn_id();
        storage
            .append_turn(&block_id, &turn_id, "Planning the Olympus migration", "Sure.", ts)
            .await
            .unwrap();

        let llm = MockLlm::always(
            r#"{"summary": "User is migrating Project Hades to Olympus.", "open_loops": ["pick a date"], "decisions": [], "topic_label": "Olympus Migration"}"#,
        );
        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(llm),
            "test-model",
            Duration::from_secs(5),
        );

        governor
            .update_block_after_turn(&block_id, &["olympus".into(), "migration".into()])
            .await
            .unwrap();

        let block = storage.get_block(&block_id).await.unwrap().unwrap();
        assert_eq!(block.summary, "User is migrating Project Hades to Olympus.");
        assert_eq!(block.topic_label, "Olympus Migration");
        assert_eq!(block.open_loops, vec!["pick a date"]);
        assert!(block.keywords.contains(&"olympus".to_string()));
    }

    #[tokio::test]
    async fn test_rollup_failure_keeps_previous_state() {
        let (storage, _) = governor(MockLlm::always("unused"));
        let block_id = seed_block(&storage, "Topic", BlockStatus::Active).await;
        storage
            .update_block_rollup(&block_id, "existing summary", &[], &[])
            .await
            .unwrap();

        let governor = Governor::new(
            storage.clone(),
            Arc::new(IdGenerator::new()),
            Arc::new(MockLlm::failing()),
            "test-model",
            Duration::from_secs(5),
        );
        governor.update_block_after_turn(&block_id, &[]).await.unwrap();

        let block = storage.get_block(&block_id).await.unwrap().unwrap();
        assert_eq!(block.summary, "existing summary");
    }

    fn candidate(chunk_id: &str, text: &str) -> MemoryCandidate {
        MemoryCandidate {
            chunk_id: chunk_id.into(),
            text: text.into(),
            source_block_id: "bb_old".into(),
            turn_ordinal: 0,
            score: 0.8,
            source_date: Utc::now(),
        }
    }
}
