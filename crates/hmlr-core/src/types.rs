//! HMLR Type Definitions
//!
//! Defines the core entities of the memory system: bridge blocks, turns,
//! facts, sticky tags, gardened chunks, and dossiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bridge block lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStatus {
    Active,
    Paused,
    Closed,
}

impl BlockStatus {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "PAUSED" => Some(Self::Paused),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single user/assistant exchange, appended to exactly one bridge block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: String,
    pub user_text: String,
    pub ai_text: String,
    /// Position within the owning block, assigned at append time
    pub ordinal: u32,
    pub created_at: DateTime<Utc>,
}

/// Short-term container for one ongoing conversational topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeBlock {
    pub block_id: String,
    pub topic_label: String,
    pub status: BlockStatus,
    /// Accumulating keyword set, unioned on every routed turn
    pub keywords: Vec<String>,
    /// Rolling summary, regenerated from the turn list
    pub summary: String,
    pub turns: Vec<Turn>,
    pub open_loops: Vec<String>,
    pub decisions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BridgeBlock {
    /// Ordinal the next appended turn will receive
    pub fn next_turn_ordinal(&self) -> u32 {
        self.turns.len() as u32
    }
}

/// Compact per-block view handed to the router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block_id: String,
    pub topic_label: String,
    pub status: BlockStatus,
    pub keywords: Vec<String>,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

/// Durable key/value fact extracted from conversation
///
/// Facts are append-only; a rotated value is a new row and conflict
/// resolution is purely `created_at` ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: i64,
    pub key: String,
    pub value: String,
    pub category: Option<String>,
    pub evidence_snippet: Option<String>,
    pub source_chunk_id: Option<String>,
    /// Null until the router commits a block for the originating turn
    pub source_block_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a new fact row
#[derive(Debug, Clone)]
pub struct NewFact {
    pub key: String,
    pub value: String,
    pub category: Option<String>,
    pub evidence_snippet: Option<String>,
    pub source_chunk_id: Option<String>,
}

/// Tag category governing how retrieved content is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    GlobalRule,
    Deprecation,
    Constraint,
    Decision,
    Fact,
    Alias,
    Status,
    Env,
}

impl TagType {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "global_rule" => Some(Self::GlobalRule),
            "deprecation" => Some(Self::Deprecation),
            "constraint" => Some(Self::Constraint),
            "decision" => Some(Self::Decision),
            "fact" => Some(Self::Fact),
            "alias" => Some(Self::Alias),
            "status" => Some(Self::Status),
            "env" => Some(Self::Env),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalRule => "global_rule",
            Self::Deprecation => "deprecation",
            Self::Constraint => "constraint",
            Self::Decision => "decision",
            Self::Fact => "fact",
            Self::Alias => "alias",
            Self::Status => "status",
            Self::Env => "env",
        }
    }
}

impl std::fmt::Display for TagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `{type, value}` annotation stored once per gardened block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTag {
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub value: String,
}

impl GlobalTag {
    pub fn new(tag_type: TagType, value: impl Into<String>) -> Self {
        Self {
            tag_type,
            value: value.into(),
        }
    }

    /// Render as `type: value` for prompt headers
    pub fn render(&self) -> String {
        format!("{}: {}", self.tag_type, self.value)
    }
}

/// A rule scoped to a turn-ordinal range within one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRule {
    pub start_turn: u32,
    pub end_turn: u32,
    pub rule: String,
}

impl SectionRule {
    /// Whether a chunk from the given turn ordinal falls under this rule
    pub fn applies_to(&self, turn_ordinal: u32) -> bool {
        self.start_turn <= turn_ordinal && turn_ordinal <= self.end_turn
    }
}

/// Sticky metadata written once per gardened block and joined at read time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub block_id: String,
    pub topic_label: String,
    pub summary: String,
    pub global_tags: Vec<GlobalTag>,
    pub section_rules: Vec<SectionRule>,
    pub created_at: DateTime<Utc>,
}

/// Long-term chunk promoted out of a consumed bridge block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenedChunk {
    pub chunk_id: String,
    pub block_id: String,
    pub parent_id: Option<String>,
    pub level: String,
    pub text: String,
    pub token_count: u32,
    /// Ordinal of the source turn within its block
    pub turn_ordinal: u32,
    pub source_date: DateTime<Utc>,
}

/// A retrieval candidate produced by the crawler
#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    pub chunk_id: String,
    pub text: String,
    pub source_block_id: String,
    pub turn_ordinal: u32,
    pub score: f32,
    pub source_date: DateTime<Utc>,
}

/// A per-fact hit against the dossier embedding index
#[derive(Debug, Clone)]
pub struct DossierFactHit {
    pub fact_id: String,
    pub dossier_id: String,
    pub score: f32,
}

/// Long-lived, named aggregation of facts on a single theme
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dossier {
    pub dossier_id: String,
    pub title: String,
    pub summary: String,
    pub status: String,
    pub permissions: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Append-only fact row inside a dossier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DossierFact {
    pub fact_id: String,
    pub dossier_id: String,
    pub fact_text: String,
    pub fact_type: Option<String>,
    pub confidence: f64,
    pub source_block_id: Option<String>,
    pub source_turn_id: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Dossier audit-log operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceOp {
    Created,
    FactAdded,
    FactRemoved,
    SummaryUpdated,
}

impl ProvenanceOp {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "fact_added" => Some(Self::FactAdded),
            "fact_removed" => Some(Self::FactRemoved),
            "summary_updated" => Some(Self::SummaryUpdated),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FactAdded => "fact_added",
            Self::FactRemoved => "fact_removed",
            Self::SummaryUpdated => "summary_updated",
        }
    }
}

impl std::fmt::Display for ProvenanceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit entry for a dossier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub provenance_id: String,
    pub dossier_id: String,
    pub operation: ProvenanceOp,
    pub source_block_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        assert_eq!(BlockStatus::from_str("ACTIVE"), Some(BlockStatus::Active));
        assert_eq!(BlockStatus::Paused.as_str(), "PAUSED");
        assert_eq!(BlockStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_tag_render() {
        let tag = GlobalTag::new(TagType::Deprecation, "Titan deprecated");
        assert_eq!(tag.render(), "deprecation: Titan deprecated");
    }

    #[test]
    fn test_tag_serde_uses_type_key() {
        let tag = GlobalTag::new(TagType::Env, "python-3.9");
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["type"], "env");
        assert_eq!(json["value"], "python-3.9");
    }

    #[test]
    fn test_section_rule_range() {
        let rule = SectionRule {
            start_turn: 3,
            end_turn: 5,
            rule: "no-eval".into(),
        };
        assert!(!rule.applies_to(2));
        assert!(rule.applies_to(3));
        assert!(rule.applies_to(5));
        assert!(!rule.applies_to(6));
    }

    #[test]
    fn test_provenance_op_conversion() {
        assert_eq!(ProvenanceOp::from_str("fact_added"), Some(ProvenanceOp::FactAdded));
        assert_eq!(ProvenanceOp::Created.as_str(), "created");
    }
}
