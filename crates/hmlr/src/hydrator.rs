//! Hydrator - context assembly.
//!
//! Builds the generator prompt in a fixed, layered order: user profile,
//! block-scoped facts (newest first), retrieved dossiers, retrieved
//! memories grouped by source block, the active block's turn history,
//! and finally the query itself.
//!
//! Group-by-block is the sticky-tag contract: tags are stored once per
//! block in `block_metadata` and injected here as a single header, never
//! duplicated onto chunks. Section rules apply per chunk by turn-ordinal
//! range.

use std::collections::HashMap;

use hmlr_core::profile::UserProfile;
use hmlr_core::types::{BlockMetadata, BridgeBlock, Fact, MemoryCandidate};
use hmlr_core::Storage;

use crate::dossier::{format_dossiers, DossierView};
use crate::error::HmlrResult;

/// Everything the Hydrator folds into one prompt
pub struct HydrationInput<'a> {
    pub query: &'a str,
    pub profile: &'a UserProfile,
    pub block: &'a BridgeBlock,
    pub facts: &'a [Fact],
    pub memories: &'a [MemoryCandidate],
    pub dossiers: &'a [DossierView],
}

/// Prompt assembler
pub struct Hydrator {
    storage: Storage,
    dossier_token_budget: usize,
}

impl Hydrator {
    pub fn new(storage: Storage, dossier_token_budget: usize) -> Self {
        Self {
            storage,
            dossier_token_budget,
        }
    }

    /// Assemble the full generator prompt
    pub async fn assemble(&self, input: &HydrationInput<'_>) -> HmlrResult<String> {
        let mut sections = Vec::new();

        let profile = render_profile(input.profile);
        if !profile.is_empty() {
            sections.push(profile);
        }

        let facts = render_facts(input.facts);
        if !facts.is_empty() {
            sections.push(facts);
        }

        let dossiers = format_dossiers(input.dossiers, self.dossier_token_budget);
        if !dossiers.is_empty() {
            sections.push(dossiers);
        }

        let memories = self.render_memories(input.memories).await?;
        if !memories.is_empty() {
            sections.push(memories);
        }

        sections.push(render_history(input.block));
        sections.push(format!("## Current Query\n{}", input.query));

        Ok(sections.join("\n\n"))
    }

    /// Retrieved memories, grouped by source block
    ///
    /// One header per block carries the tag list exactly once; chunks
    /// under it are prefixed with any section rule covering their turn.
    async fn render_memories(&self, memories: &[MemoryCandidate]) -> HmlrResult<String> {
        if memories.is_empty() {
            return Ok(String::new());
        }

        // Group in first-seen order so output is stable
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&MemoryCandidate>> = HashMap::new();
        for memory in memories {
            let block_id = memory.source_block_id.as_str();
            if !groups.contains_key(block_id) {
                order.push(block_id);
            }
            groups.entry(block_id).or_default().push(memory);
        }

        let mut parts = vec!["## Retrieved Memories".to_string()];
        for block_id in order {
            let metadata = self.storage.get_block_metadata(block_id).await?;
            parts.push(render_block_group(block_id, &groups[block_id], metadata.as_ref()));
        }
        Ok(parts.join("\n"))
    }
}

fn render_block_group(
    block_id: &str,
    chunks: &[&MemoryCandidate],
    metadata: Option<&BlockMetadata>,
) -> String {
    let mut parts = vec![format!("### Context Block: {}", block_id)];

    if let Some(metadata) = metadata {
        if !metadata.global_tags.is_empty() {
            let tags: Vec<String> = metadata
                .global_tags
                .iter()
                .map(|tag| format!("[{}]", tag.render()))
                .collect();
            parts.push(format!("Active Rules: {}", tags.join(", ")));
        }
    }
    parts.push(String::new());

    let rules = metadata.map(|m| m.section_rules.as_slice()).unwrap_or(&[]);
    for chunk in chunks {
        let rule = rules.iter().find(|r| r.applies_to(chunk.turn_ordinal));
        match rule {
            Some(rule) => parts.push(format!("  [{}] {}", rule.rule, chunk.text)),
            None => parts.push(format!("  {}", chunk.text)),
        }
    }
    parts.push(String::new());

    parts.join("\n")
}

/// Constraints carry key, type, description, and severity so the
/// generator sees the full semantic content, not just a key/value pair.
fn render_profile(profile: &UserProfile) -> String {
    if profile.is_empty() {
        return String::new();
    }

    let mut parts = vec!["## User Profile".to_string()];

    if !profile.glossary.constraints.is_empty() {
        parts.push("Constraints (must be respected):".into());
        for c in &profile.glossary.constraints {
            parts.push(format!(
                "- {} ({}, severity: {}): {}",
                c.key, c.constraint_type, c.severity, c.description
            ));
        }
    }
    if !profile.glossary.preferences.is_empty() {
        parts.push("Preferences:".into());
        for p in &profile.glossary.preferences {
            parts.push(format!("- {}: {}", p.key, p.value));
        }
    }
    if !profile.glossary.identities.is_empty() {
        parts.push("Identity:".into());
        for i in &profile.glossary.identities {
            parts.push(format!("- {}: {}", i.key, i.value));
        }
    }

    parts.join("\n")
}

/// Block-scoped facts, already ordered newest first by the store
fn render_facts(facts: &[Fact]) -> String {
    if facts.is_empty() {
        return String::new();
    }

    let mut parts = vec!["## Known Facts (newest first)".to_string()];
    for fact in facts {
        parts.push(format!(
            "- {}: {} ({})",
            fact.key,
            fact.value,
            fact.created_at.to_rfc3339()
        ));
    }
    parts.join("\n")
}

fn render_history(block: &BridgeBlock) -> String {
    let mut parts = vec![format!("## Current Conversation: {}", block.topic_label)];
    if block.turns.is_empty() {
        parts.push("(no prior turns)".into());
    }
    for turn in &block.turns {
        parts.push(format!("User: {}", turn.user_text));
        parts.push(format!("Assistant: {}", turn.ai_text));
    }
    parts.join("\n")
}
