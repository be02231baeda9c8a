//! Gardener
//!
//! Offline/on-demand pipeline that consumes an aged bridge block:
//! classifies its facts into sticky tags via three heuristics
//! (environment / constraint / definition), promotes the block's chunks
//! into long-term gardened memory, routes the remaining narrative facts
//! to the Dossier Governor, and finally deletes the block. The delete is
//! the atomic commit boundary: any earlier failure leaves the block
//! intact for retry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use hmlr_core::chunk::ChunkEngine;
use hmlr_core::types::{BridgeBlock, Fact, GardenedChunk, GlobalTag, SectionRule};
use hmlr_core::Storage;

use crate::dossier::{DossierGovernor, FactPacket};
use crate::embed::Embedder;
use crate::error::{HmlrError, HmlrResult};
use crate::llm::{call_llm, extract::parse_lenient, LlmClient, ResponseFormat};

/// Per-block exclusive locks shared between the Gardener and the router
///
/// A block being gardened must look CLOSED to the Governor so a query
/// cannot resume it mid-consumption.
#[derive(Clone, Default)]
pub struct GardenLocks {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl GardenLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one block; `None` if already held
    pub fn try_acquire(&self, block_id: &str) -> Option<GardenGuard> {
        let mut held = self.inner.lock().expect("garden lock poisoned");
        if held.insert(block_id.to_string()) {
            Some(GardenGuard {
                locks: self.clone(),
                block_id: block_id.to_string(),
            })
        } else {
            None
        }
    }

    /// Block IDs currently being gardened
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner.lock().expect("garden lock poisoned").clone()
    }
}

/// RAII lock over one block
pub struct GardenGuard {
    locks: GardenLocks,
    block_id: String,
}

impl Drop for GardenGuard {
    fn drop(&mut self) {
        self.locks
            .inner
            .lock()
            .expect("garden lock poisoned")
            .remove(&self.block_id);
    }
}

/// Outcome of gardening one block
#[derive(Debug, Clone)]
pub struct GardenReport {
    pub block_id: String,
    pub topic_label: String,
    pub facts_processed: usize,
    pub global_tags: usize,
    pub section_rules: usize,
    pub chunks_promoted: usize,
    /// Dossiers created or appended to
    pub dossiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Classification {
    #[serde(default)]
    global_tags: Vec<GlobalTag>,
    #[serde(default)]
    section_rules: Vec<SectionRule>,
    #[serde(default)]
    dossier_facts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FactGroup {
    label: String,
    #[serde(default)]
    facts: Vec<String>,
}

/// Bridge-block consumer
pub struct Gardener {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
    dossier_governor: Arc<DossierGovernor>,
    chunker: ChunkEngine,
    locks: GardenLocks,
    model: String,
    timeout: Duration,
}

impl Gardener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
        dossier_governor: Arc<DossierGovernor>,
        locks: GardenLocks,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            embedder,
            llm,
            dossier_governor,
            chunker: ChunkEngine::new(),
            locks,
            model: model.into(),
            timeout,
        }
    }

    /// Consume one bridge block
    pub async fn garden(&self, block_id: &str) -> HmlrResult<GardenReport> {
        let _guard = self
            .locks
            .try_acquire(block_id)
            .ok_or_else(|| HmlrError::gardening(block_id, "block is already being gardened"))?;

        let block = self
            .storage
            .get_block(block_id)
            .await?
            .ok_or_else(|| HmlrError::gardening(block_id, "block not found"))?;

        info!(block_id, topic = %block.topic_label, "gardening block");

        let facts = self.storage.facts_for_block(block_id).await?;

        let classification = if facts.is_empty() {
            Classification {
                global_tags: vec![],
                section_rules: vec![],
                dossier_facts: vec![],
            }
        } else {
            self.classify_facts(&facts).await
        };

        self.storage
            .save_block_metadata(
                block_id,
                &block.topic_label,
                &block.summary,
                &classification.global_tags,
                &classification.section_rules,
            )
            .await?;

        let chunks_promoted = self.promote_chunks(&block).await?;

        let mut dossiers = Vec::new();
        if !classification.dossier_facts.is_empty() {
            let groups = self.group_facts(&classification.dossier_facts).await;
            for group in groups {
                if group.facts.is_empty() {
                    continue;
                }
                let packet = FactPacket {
                    cluster_label: group.label,
                    facts: group.facts,
                    source_block_id: block_id.to_string(),
                    timestamp: block.updated_at,
                };
                let dossier_id = self.dossier_governor.process_packet(&packet).await?;
                dossiers.push(dossier_id);
            }
        }

        // The atomic commit boundary: everything above must have succeeded
        self.storage.delete_block(block_id).await?;

        info!(
            block_id,
            tags = classification.global_tags.len(),
            dossiers = dossiers.len(),
            "gardening complete"
        );

        Ok(GardenReport {
            block_id: block_id.to_string(),
            topic_label: block.topic_label,
            facts_processed: facts.len(),
            global_tags: classification.global_tags.len(),
            section_rules: classification.section_rules.len(),
            chunks_promoted,
            dossiers,
        })
    }

    /// Three-heuristic classification pass
    ///
    /// A failed or unparseable call falls back to routing every fact to
    /// the dossier pass, never losing data.
    async fn classify_facts(&self, facts: &[Fact]) -> Classification {
        let views: Vec<serde_json::Value> = facts
            .iter()
            .map(|f| {
                serde_json::json!({
                    "text": f.value,
                    "key": f.key,
                    "chunk_id": f.source_chunk_id,
                })
            })
            .collect();

        let prompt = format!(
            r#"Analyze these facts extracted from one conversation topic and classify them using THREE heuristics:

FACTS:
{facts}

HEURISTICS:

1. ENVIRONMENT TEST: global settings, versions, languages, OS?
   Examples: "Using Python 3.9" -> {{"type": "env", "value": "python-3.9"}}
             "Project uses TypeScript" -> {{"type": "env", "value": "lang: typescript"}}
   These become GLOBAL tags (they govern the whole conversation).

2. CONSTRAINT TEST: rules that FORBID or MANDATE something?
   Examples: "Never use eval()" -> {{"type": "constraint", "value": "no-eval"}}
             "New projects must use Olympus" -> {{"type": "constraint", "value": "new projects use Olympus"}}
   Global unless clearly limited to part of the conversation.

3. DEFINITION TEST: temporary aliases, renamings, status markers, deprecations?
   Examples: "Call the server Box A" -> section rule "server=Box A" over the turns where it held
             "Old API is deprecated" -> {{"type": "deprecation", "value": "old API deprecated"}}
   Section rules carry integer start_turn/end_turn ordinals.

Facts matching none of these are narrative facts (preferences, history, context) and go to "dossier_facts".

Tag types: global_rule, deprecation, constraint, decision, fact, alias, status, env.

Return JSON:
{{"global_tags": [{{"type": "env", "value": "python-3.9"}}],
  "section_rules": [{{"start_turn": 2, "end_turn": 4, "rule": "server=Box A"}}],
  "dossier_facts": ["User prefers dark mode"]}}"#,
            facts = serde_json::to_string_pretty(&views).unwrap_or_default(),
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
                warn!(error = %e, "classification failed, routing all facts to dossiers");
                return fallback_classification(facts);
            }
        };

        match parse_lenient::<Classification>(&raw) {
            Some(classification) => classification,
            None => {
                warn!("classification response did not parse, routing all facts to dossiers");
                fallback_classification(facts)
            }
        }
    }

    /// Promote every chunk of the block's turns into gardened memory,
    /// embedding any node that does not already have a vector for its
    /// content. An encode failure is retried once then aborts gardening.
    async fn promote_chunks(&self, block: &BridgeBlock) -> HmlrResult<usize> {
        let mut promoted = 0;

        for turn in &block.turns {
            let tree = self
                .chunker
                .chunk_turn(&turn.turn_id, &turn.user_text, &turn.ai_text);

            for chunk in tree.nodes() {
                if !self
                    .storage
                    .has_embedding_for(&chunk.chunk_id, &chunk.text)
                    .await?
                {
                    let vector = match self.embedder.encode(&chunk.text).await {
                        Ok(vector) => vector,
                        Err(first) => {
                            warn!(chunk_id = %chunk.chunk_id, error = %first, "embedding failed, retrying once");
                            self.embedder.encode(&chunk.text).await?
                        }
                    };
                    self.storage
                        .save_embedding(&chunk.chunk_id, &chunk.text, &vector)
                        .await?;
                }

                self.storage
                    .insert_gardened_chunk(&GardenedChunk {
                        chunk_id: chunk.chunk_id.clone(),
                        block_id: block.block_id.clone(),
                        parent_id: chunk.parent_id.clone(),
                        level: chunk.level.as_str().to_string(),
                        text: chunk.text.clone(),
                        token_count: chunk.token_count,
                        turn_ordinal: turn.ordinal,
                        source_date: turn.created_at,
                    })
                    .await?;
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    /// Cluster narrative facts by theme; fallback is a single group
    async fn group_facts(&self, facts: &[String]) -> Vec<FactGroup> {
        let prompt = format!(
            r#"Given these facts extracted from a conversation, group related facts by semantic theme.

FACTS:
{facts}

For each group provide a concise label (2-5 words) and the facts that belong to it. Every fact must appear in exactly one group.

Return a JSON array:
[{{"label": "Dietary Preferences", "facts": ["User is vegetarian"]}}]"#,
            facts = serde_json::to_string_pretty(facts).unwrap_or_default(),
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
                warn!(error = %e, "semantic grouping failed, using single group");
                return vec![single_group(facts)];
            }
        };

        // The grouping response may be a bare array or wrapped in an object
        if let Some(groups) = parse_lenient::<Vec<FactGroup>>(&raw) {
            return groups;
        }
        #[derive(Deserialize)]
        struct Wrapped {
            groups: Vec<FactGroup>,
        }
        if let Some(wrapped) = parse_lenient::<Wrapped>(&raw) {
            return wrapped.groups;
        }

        warn!("grouping response did not parse, using single group");
        vec![single_group(facts)]
    }
}

fn fallback_classification(facts: &[Fact]) -> Classification {
    Classification {
        global_tags: vec![],
        section_rules: vec![],
        dossier_facts: facts.iter().map(|f| f.value.clone()).collect(),
    }
}

fn single_group(facts: &[String]) -> FactGroup {
    FactGroup {
        label: "General Facts".into(),
        facts: facts.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HashEmbedder, MockLlm};
    use hmlr_core::types::{BlockStatus, NewFact};
    use hmlr_core::IdGenerator;

    async fn seed_block_with_facts(storage: &Storage) -> String {
        let ids = IdGenerator::new();
        let (block_id, ts) = ids.block_id();
        storage
            .create_block(&block_id, "Project Hades", &["hades".into()], BlockStatus::Paused, ts)
            .await
            .unwrap();

        let (turn_id, turn_ts) = ids.turn_id();
        storage
            .append_turn(
                &block_id,
                &turn_id,
                "We use Python 3.9. Titan is deprecated.",
                "Noted; new projects use Olympus.",
                turn_ts,
            )
            .await
            .unwrap();

        let ts_part = hmlr_core::ids::turn_timestamp(&turn_id).unwrap().to_string();
        for (key, value) in [
            ("env_python", "Using Python 3.9"),
            ("titan_status", "Titan is deprecated"),
            ("user_pref", "User prefers dark mode"),
        ] {
            storage
                .insert_fact(
                    &NewFact {
                        key: key.into(),
                        value: value.into(),
                        category: None,
                        evidence_snippet: None,
                        source_chunk_id: Some(format!("turn_{}_p00_s00", ts_part)),
                    },
                    ids.next_timestamp(),
                )
                .await
                .unwrap();
        }
        storage.link_facts_to_block(&ts_part, &block_id).await.unwrap();
        block_id
    }

    fn gardener(storage: &Storage, llm: MockLlm) -> Gardener {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new());
        let ids = Arc::new(IdGenerator::new());
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        let dossier_governor = Arc::new(DossierGovernor::new(
            storage.clone(),
            embedder.clone(),
            ids,
            llm.clone(),
            "test-model",
            Duration::from_secs(5),
            10,
            0.4,
        ));
        Gardener::new(
            storage.clone(),
            embedder,
            llm,
            dossier_governor,
            GardenLocks::new(),
            "test-model",
            Duration::from_secs(5),
        )
    }

    fn scripted_llm() -> MockLlm {
        MockLlm::with_handler(|prompt| {
            if prompt.contains("THREE heuristics") {
                Some(
                    r#"{"global_tags": [{"type": "env", "value": "python-3.9"}, {"type": "deprecation", "value": "Titan deprecated"}],
                        "section_rules": [],
                        "dossier_facts": ["User prefers dark mode"]}"#
                        .into(),
                )
            } else if prompt.contains("group related facts") {
                Some(r#"[{"label": "UI Preferences", "facts": ["User prefers dark mode"]}]"#.into())
            } else if prompt.contains("fact routing system") {
                Some(r#"{"action": "create"}"#.into())
            } else {
                // Summary generation calls
                Some("User prefers dark interfaces.".into())
            }
        })
    }

    #[tokio::test]
    async fn test_full_pass_writes_all_artifacts_then_deletes() {
        let storage = Storage::open_in_memory().unwrap();
        let block_id = seed_block_with_facts(&storage).await;
        let gardener = gardener(&storage, scripted_llm());

        let report = gardener.garden(&block_id).await.unwrap();

        assert_eq!(report.facts_processed, 3);
        assert_eq!(report.global_tags, 2);
        assert_eq!(report.dossiers.len(), 1);
        assert!(report.chunks_promoted > 0);

        // Metadata written once, tags referenced not copied
        let metadata = storage.get_block_metadata(&block_id).await.unwrap().unwrap();
        assert_eq!(metadata.global_tags.len(), 2);
        assert_eq!(metadata.topic_label, "Project Hades");

        // Chunks promoted with embeddings
        let chunks = storage.gardened_chunks_for_block(&block_id).await.unwrap();
        assert_eq!(chunks.len(), report.chunks_promoted);
        for chunk in &chunks {
            assert!(storage.get_embedding(&chunk.chunk_id).await.unwrap().is_some());
        }

        // Dossier holds the narrative fact
        let facts = storage.dossier_facts(&report.dossiers[0]).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact_text, "User prefers dark mode");

        // Block consumed; facts survive in the fact store
        assert!(storage.get_block(&block_id).await.unwrap().is_none());
        assert_eq!(storage.facts_for_block(&block_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_classification_fallback_routes_everything_to_dossiers() {
        let storage = Storage::open_in_memory().unwrap();
        let block_id = seed_block_with_facts(&storage).await;

        let llm = MockLlm::with_handler(|prompt| {
            if prompt.contains("THREE heuristics") {
                Some("not json".into())
            } else if prompt.contains("group related facts") {
                Some("also not json".into())
            } else if prompt.contains("fact routing system") {
                Some(r#"{"action": "create"}"#.into())
            } else {
                Some("summary".into())
            }
        });
        let gardener = gardener(&storage, llm);

        let report = gardener.garden(&block_id).await.unwrap();

        // No tags, one "General Facts" dossier carrying all three facts
        assert_eq!(report.global_tags, 0);
        assert_eq!(report.dossiers.len(), 1);
        let facts = storage.dossier_facts(&report.dossiers[0]).await.unwrap();
        assert_eq!(facts.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_block_errors_and_nothing_is_written() {
        let storage = Storage::open_in_memory().unwrap();
        let gardener = gardener(&storage, scripted_llm());

        let result = gardener.garden("bb_missing").await;
        assert!(result.is_err());
        assert!(storage.get_block_metadata("bb_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_prevents_concurrent_gardening() {
        let locks = GardenLocks::new();
        let guard = locks.try_acquire("bb_1");
        assert!(guard.is_some());
        assert!(locks.try_acquire("bb_1").is_none());
        assert!(locks.snapshot().contains("bb_1"));

        drop(guard);
        assert!(locks.try_acquire("bb_1").is_some());
    }

    #[tokio::test]
    async fn test_dossier_failure_leaves_block_intact() {
        let storage = Storage::open_in_memory().unwrap();
        let block_id = seed_block_with_facts(&storage).await;

        // Classification succeeds but the dossier embedding path fails
        struct HalfEmbedder;
        #[async_trait::async_trait]
        impl Embedder for HalfEmbedder {
            async fn encode(&self, text: &str) -> HmlrResult<Vec<f32>> {
                if text.contains("dark mode") {
                    Err(HmlrError::embedding("encoder offline"))
                } else {
                    HashEmbedder::new().encode(text).await
                }
            }
        }

        let embedder: Arc<dyn Embedder> = Arc::new(HalfEmbedder);
        let ids = Arc::new(IdGenerator::new());
        let llm: Arc<dyn LlmClient> = Arc::new(scripted_llm());
        let dossier_governor = Arc::new(DossierGovernor::new(
            storage.clone(),
            embedder.clone(),
            ids,
            llm.clone(),
            "test-model",
            Duration::from_secs(5),
            10,
            0.4,
        ));
        let gardener = Gardener::new(
            storage.clone(),
            embedder,
            llm,
            dossier_governor,
            GardenLocks::new(),
            "test-model",
            Duration::from_secs(5),
        );

        let result = gardener.garden(&block_id).await;
        assert!(result.is_err());

        // Step 6 never ran: the block is still in the ledger for retry
        assert!(storage.get_block(&block_id).await.unwrap().is_some());
    }
}
