//! HMLR - Hierarchical Memory Lookup & Routing
//!
//! Long-term memory engine for conversational agents. Ingests a stream
//! of user/assistant turns, routes each query onto the right
//! conversational topic, extracts durable facts and profile constraints,
//! gardens aged topics into long-term artifacts, and assembles a
//! governance-aware context window for a downstream generator.
//!
//! # Pipeline
//!
//! Per query: chunk → {Scribe ‖ Fact Scrubber ‖ Crawler ‖ Governor} →
//! candidate filtering → Hydrator → generator → append turn.
//!
//! Background: `garden(block_id)` classifies the block's facts into
//! sticky tags, promotes its chunks into gardened memory, routes
//! narrative facts to dossiers via Multi-Vector Voting, and deletes the
//! consumed block.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hmlr::{ConversationEngine, HmlrConfig, OpenAiClient};
//!
//! # #[cfg(feature = "embeddings")]
//! async fn example() -> anyhow::Result<()> {
//!     let config = HmlrConfig::from_env();
//!     let llm = Arc::new(OpenAiClient::new(
//!         config.api_base_url.clone(),
//!         config.api_key.clone().unwrap_or_default(),
//!     ));
//!     let embedder = Arc::new(hmlr::embed::FastembedEmbedder::new());
//!
//!     let engine = ConversationEngine::new(config, llm, embedder)?;
//!     let reply = engine.process_user_message("My API key is ABC123.").await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod dossier;
pub mod embed;
pub mod engine;
pub mod gardener;
pub mod governor;
pub mod hydrator;
pub mod llm;
pub mod scribe;
pub mod scrubber;

mod error;

#[cfg(test)]
pub(crate) mod testing;

// Core re-exports
pub use hmlr_core::{
    BlockMetadata, BlockStatus, BlockSummary, BridgeBlock, Chunk, ChunkEngine, ChunkLevel,
    Dossier, DossierFact, Fact, GardenedChunk, GlobalTag, IdGenerator, MemoryCandidate,
    ProfileStore, ProvenanceEntry, ProvenanceOp, SectionRule, Storage, TagType, Turn, UserProfile,
};

pub use config::{HmlrConfig, RetrievalConfig};
pub use crawler::{CrawlRequest, CrawlResult, Crawler};
pub use dossier::{DossierGovernor, DossierRetriever, DossierView, FactPacket};
pub use embed::{cosine_similarity, Embedder, EMBEDDING_DIMENSIONS};
pub use engine::ConversationEngine;
pub use error::{HmlrError, HmlrResult};
pub use gardener::{GardenLocks, GardenReport, Gardener};
pub use governor::{Governor, RoutingOutcome, RoutingScenario};
pub use hydrator::{HydrationInput, Hydrator};
pub use llm::{LlmClient, OpenAiClient, ResponseFormat};
pub use scribe::Scribe;
pub use scrubber::FactScrubber;
