//! Conversation Engine
//!
//! The public entry point. Each query runs the five-stage pipeline:
//! chunk → fan-out (Scribe ‖ Fact Scrubber ‖ Crawler ‖ Governor) →
//! candidate filtering → hydration → generation, then the completed turn
//! is appended and the block's rolling state refreshed. The Scribe is
//! fire-and-forget; the Fact Scrubber is awaited before fact-linking so
//! the Hydrator always observes freshly linked facts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use hmlr_core::chunk::{Chunk, ChunkEngine};
use hmlr_core::ids::turn_timestamp;
use hmlr_core::profile::{ProfileStore, UserProfile};
use hmlr_core::types::BlockStatus;
use hmlr_core::{IdGenerator, Storage};

use crate::config::HmlrConfig;
use crate::crawler::{CrawlRequest, CrawlResult, Crawler};
use crate::dossier::{DossierGovernor, DossierRetriever};
use crate::embed::Embedder;
use crate::error::HmlrResult;
use crate::gardener::{GardenLocks, GardenReport, Gardener};
use crate::governor::Governor;
use crate::hydrator::{HydrationInput, Hydrator};
use crate::llm::{call_llm, LlmClient, ResponseFormat};
use crate::scribe::Scribe;
use crate::scrubber::FactScrubber;

/// Reply sent when the downstream generator is unavailable; the turn is
/// not committed so nothing is lost.
const GENERATOR_APOLOGY: &str =
    "Sorry, I could not produce a reply just now. Please try again in a moment.";

/// The HMLR memory engine
pub struct ConversationEngine {
    config: HmlrConfig,
    storage: Storage,
    ids: Arc<IdGenerator>,
    chunker: ChunkEngine,
    profile: ProfileStore,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn LlmClient>,
    scrubber: Arc<FactScrubber>,
    scribe: Arc<Scribe>,
    crawler: Arc<Crawler>,
    governor: Governor,
    hydrator: Hydrator,
    retriever: DossierRetriever,
    gardener: Gardener,
    garden_locks: GardenLocks,
}

impl ConversationEngine {
    /// Build an engine over the configured database and profile document
    pub fn new(
        config: HmlrConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
    ) -> HmlrResult<Self> {
        config.validate()?;
        let storage = Storage::open(&config.db_path)?;
        Self::with_storage(config, llm, embedder, storage)
    }

    /// Build over an existing storage handle (in-memory databases, tests)
    pub fn with_storage(
        config: HmlrConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        storage: Storage,
    ) -> HmlrResult<Self> {
        let ids = Arc::new(IdGenerator::new());
        let timeout = Duration::from_secs(config.llm_timeout_secs);
        let profile = ProfileStore::new(&config.user_profile_path);
        let garden_locks = GardenLocks::new();

        let scrubber = Arc::new(FactScrubber::new(
            storage.clone(),
            ids.clone(),
            llm.clone(),
            &config.llm_model,
            timeout,
        ));
        let scribe = Arc::new(Scribe::new(
            profile.clone(),
            llm.clone(),
            &config.llm_model,
            timeout,
        ));
        let crawler = Arc::new(Crawler::new(storage.clone(), embedder.clone()));
        let governor = Governor::new(
            storage.clone(),
            ids.clone(),
            llm.clone(),
            &config.llm_model,
            timeout,
        );
        let hydrator = Hydrator::new(storage.clone(), config.retrieval.dossier_token_budget);
        let retriever = DossierRetriever::new(storage.clone());

        let dossier_governor = Arc::new(DossierGovernor::new(
            storage.clone(),
            embedder.clone(),
            ids.clone(),
            llm.clone(),
            &config.llm_model,
            timeout,
            config.retrieval.voting_top_k,
            config.retrieval.similarity_threshold,
        ));
        let gardener = Gardener::new(
            storage.clone(),
            embedder.clone(),
            llm.clone(),
            dossier_governor,
            garden_locks.clone(),
            &config.llm_model,
            timeout,
        );

        Ok(Self {
            generator: llm,
            config,
            storage,
            ids,
            chunker: ChunkEngine::new(),
            profile,
            embedder,
            scrubber,
            scribe,
            crawler,
            governor,
            hydrator,
            retriever,
            gardener,
            garden_locks,
        })
    }

    /// Use a different client for final reply composition
    pub fn with_generator(mut self, generator: Arc<dyn LlmClient>) -> Self {
        self.generator = generator;
        self
    }

    /// Direct storage access, for maintenance tooling
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Process one user message and return the reply
    pub async fn process_user_message(&self, text: &str) -> HmlrResult<String> {
        let (turn_id, turn_created_at) = self.ids.turn_id();
        debug!(%turn_id, "processing user message");

        // Chunk the query half of the turn; the assistant half is chunked
        // at gardening time once it exists.
        let tree = self.chunker.chunk_turn(&turn_id, text, "");
        let sentences: Vec<Chunk> = tree.sentences().cloned().collect();
        self.embed_chunks(tree.nodes()).await;

        let profile = self.profile.load().unwrap_or_else(|e| {
            warn!(error = %e, "profile load failed, continuing without profile");
            UserProfile::default()
        });

        // Fan-out: Scribe is never awaited; Scrubber and Crawler are
        // joined below.
        let scribe = self.scribe.clone();
        let scribe_text = text.to_string();
        tokio::spawn(async move { scribe.observe(&scribe_text).await });

        let scrubber = self.scrubber.clone();
        let scrub_handle = tokio::spawn(async move { scrubber.scrub(&sentences).await });

        let crawler = self.crawler.clone();
        let crawl_request = CrawlRequest {
            query: text.to_string(),
            keywords: self.active_keywords().await?,
            memory_top_k: self.config.retrieval.memory_top_k,
            dossier_top_k: self.config.retrieval.dossier_top_k,
            threshold: self.config.retrieval.similarity_threshold,
        };
        let crawl_handle = tokio::spawn(async move { crawler.crawl(&crawl_request).await });

        // Route while retrieval runs
        let outcome = self
            .governor
            .govern(text, &profile_context(&profile), &self.garden_locks.snapshot())
            .await?;

        let crawl = match crawl_handle.await {
            Ok(result) => result?,
            Err(e) => {
                warn!(error = %e, "crawler task failed, proceeding with empty retrieval");
                CrawlResult::default()
            }
        };
        let memories = self
            .governor
            .filter_candidates(text, crawl.memories)
            .await?;

        // Facts must be linked before hydration
        match scrub_handle.await {
            Ok(result) => {
                result?;
            }
            Err(e) => warn!(error = %e, "scrubber task failed, no facts extracted"),
        }
        if let Some(ts) = turn_timestamp(&turn_id) {
            let linked = self.storage.link_facts_to_block(ts, &outcome.block_id).await?;
            debug!(linked, block_id = %outcome.block_id, "facts linked");
        }

        let facts = self.storage.facts_for_block(&outcome.block_id).await?;
        let dossiers = self
            .retriever
            .resolve_hits(&crawl.dossier_hits, self.config.retrieval.dossier_top_k)
            .await?;
        let block = self
            .storage
            .get_block(&outcome.block_id)
            .await?
            .ok_or_else(|| hmlr_core::CoreError::not_found("BridgeBlock", &outcome.block_id))?;

        let prompt = self
            .hydrator
            .assemble(&HydrationInput {
                query: text,
                profile: &profile,
                block: &block,
                facts: &facts,
                memories: &memories,
                dossiers: &dossiers,
            })
            .await?;

        let reply = match call_llm(
            self.generator.as_ref(),
            &prompt,
            self.config.generator_model(),
            ResponseFormat::Text,
            Duration::from_secs(self.config.llm_timeout_secs),
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // The turn is not committed; the user can simply retry.
                error!(error = %e, "generator failed, turn not committed");
                return Ok(GENERATOR_APOLOGY.to_string());
            }
        };

        self.storage
            .append_turn(&outcome.block_id, &turn_id, text, &reply, turn_created_at)
            .await?;
        self.governor
            .update_block_after_turn(&outcome.block_id, &outcome.keywords)
            .await?;

        info!(
            block_id = %outcome.block_id,
            scenario = outcome.scenario.number(),
            "turn committed"
        );
        Ok(reply)
    }

    /// Pause every ACTIVE block; the next query starts a fresh routing
    /// decision from a quiet ledger
    pub async fn reset_session(&self) -> HmlrResult<()> {
        for block in self.storage.active_blocks().await? {
            self.storage
                .set_block_status(&block.block_id, BlockStatus::Paused)
                .await?;
        }
        Ok(())
    }

    /// Garden one bridge block into long-term artifacts
    pub async fn garden(&self, block_id: &str) -> HmlrResult<GardenReport> {
        self.gardener.garden(block_id).await
    }

    /// Best-effort embedding of the query's chunk tree
    ///
    /// One retry per the chunk-engine contract; a still-failing encoder
    /// only degrades retrieval, so the query proceeds.
    async fn embed_chunks(&self, chunks: &[Chunk]) {
        for chunk in chunks {
            match self.storage.has_embedding_for(&chunk.chunk_id, &chunk.text).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "embedding lookup failed");
                    return;
                }
            }

            let vector = match self.embedder.encode(&chunk.text).await {
                Ok(vector) => vector,
                Err(first) => match self.embedder.encode(&chunk.text).await {
                    Ok(vector) => vector,
                    Err(_) => {
                        warn!(chunk_id = %chunk.chunk_id, error = %first, "chunk embedding failed after retry");
                        continue;
                    }
                },
            };
            if let Err(e) = self
                .storage
                .save_embedding(&chunk.chunk_id, &chunk.text, &vector)
                .await
            {
                warn!(error = %e, "embedding write failed");
            }
        }
    }

    /// Keywords of the current ACTIVE block, fed to the Crawler
    async fn active_keywords(&self) -> HmlrResult<Vec<String>> {
        let active = self.storage.active_blocks().await?;
        Ok(active.into_iter().next().map(|b| b.keywords).unwrap_or_default())
    }
}

/// Compact constraint rendering for the routing prompt
fn profile_context(profile: &UserProfile) -> String {
    profile
        .glossary
        .constraints
        .iter()
        .map(|c| format!("{} ({}): {}", c.key, c.severity, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}
