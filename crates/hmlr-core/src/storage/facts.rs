//! Fact store operations.
//!
//! Facts are append-only: rotations insert new rows and the newest value
//! wins purely through `created_at` ordering. Rows arrive with
//! `source_block_id = NULL` and are stamped once the router commits a
//! block for the originating turn.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::CoreResult;
use crate::types::{Fact, NewFact};

use super::ledger::parse_timestamp;
use super::Storage;

impl Storage {
    /// Insert a fact row; `source_block_id` starts out null
    pub async fn insert_fact(&self, fact: &NewFact, created_at: DateTime<Utc>) -> CoreResult<i64> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT INTO fact_store (key, value, category, evidence_snippet, source_chunk_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &fact.key,
                &fact.value,
                &fact.category,
                &fact.evidence_snippet,
                &fact.source_chunk_id,
                created_at.to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Stamp a block onto every fact whose source chunk carries the given
    /// turn timestamp
    ///
    /// Chunk IDs embed their turn's timestamp, so a substring match covers
    /// all facts extracted from that turn.
    pub async fn link_facts_to_block(
        &self,
        turn_timestamp: &str,
        block_id: &str,
    ) -> CoreResult<usize> {
        let conn = self.conn().await;

        let pattern = format!("%{}%", turn_timestamp);
        let changed = conn.execute(
            "UPDATE fact_store SET source_block_id = ?1
             WHERE source_block_id IS NULL AND source_chunk_id LIKE ?2",
            params![block_id, pattern],
        )?;

        Ok(changed)
    }

    /// Facts linked to a block, newest first
    pub async fn facts_for_block(&self, block_id: &str) -> CoreResult<Vec<Fact>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT fact_id, key, value, category, evidence_snippet, source_chunk_id,
                    source_block_id, created_at
             FROM fact_store WHERE source_block_id = ?1
             ORDER BY created_at DESC, fact_id DESC",
        )?;
        let rows = stmt.query_map(params![block_id], row_to_fact)?;
        let facts: Result<Vec<_>, _> = rows.collect();
        Ok(facts?)
    }

    /// The newest facts across all blocks, linked or not
    pub async fn recent_facts(&self, limit: usize) -> CoreResult<Vec<Fact>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT fact_id, key, value, category, evidence_snippet, source_chunk_id,
                    source_block_id, created_at
             FROM fact_store
             ORDER BY created_at DESC, fact_id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_fact)?;
        let facts: Result<Vec<_>, _> = rows.collect();
        Ok(facts?)
    }

    /// All rows for a key, newest first
    pub async fn facts_for_key(&self, key: &str) -> CoreResult<Vec<Fact>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT fact_id, key, value, category, evidence_snippet, source_chunk_id,
                    source_block_id, created_at
             FROM fact_store WHERE key = ?1
             ORDER BY created_at DESC, fact_id DESC",
        )?;
        let rows = stmt.query_map(params![key], row_to_fact)?;
        let facts: Result<Vec<_>, _> = rows.collect();
        Ok(facts?)
    }
}

fn row_to_fact(row: &Row) -> rusqlite::Result<Fact> {
    let created_at: String = row.get(7)?;
    Ok(Fact {
        fact_id: row.get(0)?,
        key: row.get(1)?,
        value: row.get(2)?,
        category: row.get(3)?,
        evidence_snippet: row.get(4)?,
        source_chunk_id: row.get(5)?,
        source_block_id: row.get(6)?,
        created_at: parse_timestamp(&created_at),
    })
}
