//! Hierarchical Chunk Engine
//!
//! Deterministic splitter producing a rooted tree per turn:
//! turn → paragraphs (blank-line split) → sentences (boundary detection).
//! Every node carries a stable ID derived from its parent, with
//! zero-padded ordinals, plus an estimated token count. The engine is
//! pure and synchronous; embedding happens downstream.

mod sentence;

pub use sentence::split_sentences;

use serde::{Deserialize, Serialize};

/// Characters per token for the budget estimator
const CHARS_PER_TOKEN: usize = 4;

/// Chunk granularity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkLevel {
    Turn,
    Paragraph,
    Sentence,
}

impl ChunkLevel {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "turn" => Some(Self::Turn),
            "paragraph" => Some(Self::Paragraph),
            "sentence" => Some(Self::Sentence),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Turn => "turn",
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
        }
    }
}

impl std::fmt::Display for ChunkLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node of the chunk tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub parent_id: Option<String>,
    pub level: ChunkLevel,
    pub text: String,
    pub token_count: u32,
}

/// The rooted tree produced for one turn, in document order
#[derive(Debug, Clone)]
pub struct ChunkTree {
    pub turn_id: String,
    nodes: Vec<Chunk>,
}

impl ChunkTree {
    /// All nodes in document order (turn first)
    pub fn nodes(&self) -> &[Chunk] {
        &self.nodes
    }

    /// The turn-level root node
    pub fn turn(&self) -> &Chunk {
        &self.nodes[0]
    }

    /// Sentence-level leaves in document order
    pub fn sentences(&self) -> impl Iterator<Item = &Chunk> {
        self.nodes
            .iter()
            .filter(|c| c.level == ChunkLevel::Sentence)
    }

    /// Paragraph-level nodes in document order
    pub fn paragraphs(&self) -> impl Iterator<Item = &Chunk> {
        self.nodes
            .iter()
            .filter(|c| c.level == ChunkLevel::Paragraph)
    }
}

/// Estimate token count from character length
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count().div_ceil(CHARS_PER_TOKEN)) as u32
}

/// Deterministic hierarchical splitter
#[derive(Debug, Default)]
pub struct ChunkEngine;

impl ChunkEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build the chunk tree for one turn
    ///
    /// `ai_text` may be empty at query time; the assistant half is only
    /// available once the turn completes.
    pub fn chunk_turn(&self, turn_id: &str, user_text: &str, ai_text: &str) -> ChunkTree {
        let placeholder = turn_placeholder(user_text, ai_text);
        let mut nodes = vec![Chunk {
            chunk_id: turn_id.to_string(),
            parent_id: None,
            level: ChunkLevel::Turn,
            token_count: estimate_tokens(&placeholder),
            text: placeholder,
        }];

        let mut paragraph_ordinal = 0usize;
        for source in [user_text, ai_text] {
            for paragraph in split_paragraphs(source) {
                let paragraph_id = format!("{}_p{:02}", turn_id, paragraph_ordinal);
                nodes.push(Chunk {
                    chunk_id: paragraph_id.clone(),
                    parent_id: Some(turn_id.to_string()),
                    level: ChunkLevel::Paragraph,
                    token_count: estimate_tokens(&paragraph),
                    text: paragraph.clone(),
                });

                for (sentence_ordinal, sentence) in
                    split_sentences(&paragraph).into_iter().enumerate()
                {
                    nodes.push(Chunk {
                        chunk_id: format!("{}_s{:02}", paragraph_id, sentence_ordinal),
                        parent_id: Some(paragraph_id.clone()),
                        level: ChunkLevel::Sentence,
                        token_count: estimate_tokens(&sentence),
                        text: sentence,
                    });
                }

                paragraph_ordinal += 1;
            }
        }

        ChunkTree {
            turn_id: turn_id.to_string(),
            nodes,
        }
    }
}

/// Split text into non-empty paragraphs on blank lines
fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Placeholder text for the turn-level node
fn turn_placeholder(user_text: &str, ai_text: &str) -> String {
    let user = first_line(user_text, 120);
    if ai_text.trim().is_empty() {
        user
    } else {
        format!("{} / {}", user, first_line(ai_text, 120))
    }
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sentence_turn() {
        let engine = ChunkEngine::new();
        let tree = engine.chunk_turn("turn_20251215T103000000Z", "My key is ABC123.", "");

        assert_eq!(tree.turn().level, ChunkLevel::Turn);
        assert_eq!(tree.paragraphs().count(), 1);
        assert_eq!(tree.sentences().count(), 1);

        let sentence = tree.sentences().next().unwrap();
        assert_eq!(sentence.chunk_id, "turn_20251215T103000000Z_p00_s00");
        assert_eq!(
            sentence.parent_id.as_deref(),
            Some("turn_20251215T103000000Z_p00")
        );
    }

    #[test]
    fn test_multi_paragraph_ids_are_zero_padded() {
        let engine = ChunkEngine::new();
        let user = "First paragraph here.\n\nSecond paragraph. With two sentences.";
        let tree = engine.chunk_turn("turn_x", user, "A reply.");

        let ids: Vec<&str> = tree.paragraphs().map(|p| p.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["turn_x_p00", "turn_x_p01", "turn_x_p02"]);

        // Second user paragraph has two sentence children
        let children: Vec<&Chunk> = tree
            .sentences()
            .filter(|s| s.parent_id.as_deref() == Some("turn_x_p01"))
            .collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].chunk_id, "turn_x_p01_s01");
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let engine = ChunkEngine::new();
        let a = engine.chunk_turn("turn_x", "Hello world. Bye.", "Ok.");
        let b = engine.chunk_turn("turn_x", "Hello world. Bye.", "Ok.");

        let ids_a: Vec<&String> = a.nodes().iter().map(|c| &c.chunk_id).collect();
        let ids_b: Vec<&String> = b.nodes().iter().map(|c| &c.chunk_id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_every_chunk_id_contains_turn_timestamp() {
        let engine = ChunkEngine::new();
        let tree = engine.chunk_turn("turn_20251215T103000000Z", "One. Two.", "Three.");
        for chunk in tree.nodes() {
            assert!(chunk.chunk_id.contains("20251215T103000000Z"));
        }
    }

    #[test]
    fn test_empty_ai_text() {
        let engine = ChunkEngine::new();
        let tree = engine.chunk_turn("turn_x", "Just a question?", "");
        assert_eq!(tree.paragraphs().count(), 1);
        assert!(!tree.turn().text.contains('/'));
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
