//! HMLR Core - Types, Storage, and Chunking
//!
//! Foundation crate for the Hierarchical Memory Lookup & Routing system:
//!
//! - **types** - Bridge blocks, turns, facts, sticky tags, dossiers
//! - **ids** - Structured, monotone identifier generation
//! - **chunk** - Deterministic turn → paragraph → sentence splitter
//! - **storage** - SQLite persistence for the ledger, fact store,
//!   embeddings, gardened memory, block metadata, and dossiers
//! - **profile** - The cross-topic user profile document
//!
//! The pipeline crate (`hmlr`) builds the routing, retrieval, and
//! gardening machinery on top of these pieces.

pub mod chunk;
pub mod ids;
pub mod profile;
pub mod storage;
pub mod types;

mod error;

pub use chunk::{Chunk, ChunkEngine, ChunkLevel, ChunkTree};
pub use error::{CoreError, CoreResult};
pub use ids::IdGenerator;
pub use profile::{Glossary, ProfileConstraint, ProfileEntry, ProfileStore, UserProfile};
pub use storage::Storage;
pub use types::{
    BlockMetadata, BlockStatus, BlockSummary, BridgeBlock, Dossier, DossierFact, DossierFactHit,
    Fact, GardenedChunk, GlobalTag, MemoryCandidate, NewFact, ProvenanceEntry, ProvenanceOp,
    SectionRule, TagType, Turn,
};
