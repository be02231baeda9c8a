//! Dossier System
//!
//! Long-lived, named aggregations of facts built incrementally across
//! many bridge blocks. The write side (`DossierGovernor`) routes fact
//! packets via Multi-Vector Voting; the read side (`DossierRetriever`)
//! resolves crawler hits into full dossiers for the Hydrator.

mod governor;
mod retriever;

pub use governor::{DossierGovernor, FactPacket, VotedCandidate};
pub use retriever::{format_dossiers, DossierRetriever, DossierView};
