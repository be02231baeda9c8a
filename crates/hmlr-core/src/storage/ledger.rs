//! Daily ledger operations: bridge block CRUD and lifecycle.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::types::{BlockStatus, BlockSummary, BridgeBlock, Turn};

use super::Storage;

impl Storage {
    /// Insert a new bridge block
    pub async fn create_block(
        &self,
        block_id: &str,
        topic_label: &str,
        keywords: &[String],
        status: BlockStatus,
        created_at: DateTime<Utc>,
    ) -> CoreResult<BridgeBlock> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT INTO daily_ledger (block_id, topic_label, status, keywords_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                block_id,
                topic_label,
                status.as_str(),
                serde_json::to_string(keywords)?,
                created_at.to_rfc3339(),
            ],
        )?;
        drop(conn);

        self.get_block(block_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BridgeBlock", block_id))
    }

    /// Fetch a block by ID
    pub async fn get_block(&self, block_id: &str) -> CoreResult<Option<BridgeBlock>> {
        let conn = self.conn().await;

        let result = conn.query_row(
            "SELECT block_id, topic_label, status, keywords_json, summary, turns_json,
                    open_loops_json, decisions_json, created_at, updated_at
             FROM daily_ledger WHERE block_id = ?1",
            params![block_id],
            row_to_block,
        );

        match result {
            Ok(block) => Ok(Some(block)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All blocks in the ledger, oldest first
    pub async fn list_blocks(&self) -> CoreResult<Vec<BridgeBlock>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT block_id, topic_label, status, keywords_json, summary, turns_json,
                    open_loops_json, decisions_json, created_at, updated_at
             FROM daily_ledger ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_block)?;
        let blocks: Result<Vec<_>, _> = rows.collect();
        Ok(blocks?)
    }

    /// Compact per-block view for the router, oldest first
    pub async fn ledger_snapshot(&self) -> CoreResult<Vec<BlockSummary>> {
        let blocks = self.list_blocks().await?;
        Ok(blocks
            .into_iter()
            .map(|b| BlockSummary {
                block_id: b.block_id,
                topic_label: b.topic_label,
                status: b.status,
                keywords: b.keywords,
                summary: b.summary,
                updated_at: b.updated_at,
            })
            .collect())
    }

    /// All blocks currently marked ACTIVE
    pub async fn active_blocks(&self) -> CoreResult<Vec<BridgeBlock>> {
        let blocks = self.list_blocks().await?;
        Ok(blocks
            .into_iter()
            .filter(|b| b.status == BlockStatus::Active)
            .collect())
    }

    /// Transition a block's status
    pub async fn set_block_status(&self, block_id: &str, status: BlockStatus) -> CoreResult<()> {
        let conn = self.conn().await;

        let changed = conn.execute(
            "UPDATE daily_ledger SET status = ?1, updated_at = ?2 WHERE block_id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), block_id],
        )?;

        if changed == 0 {
            return Err(CoreError::not_found("BridgeBlock", block_id));
        }
        Ok(())
    }

    /// Append a completed turn to a block, assigning its ordinal
    pub async fn append_turn(
        &self,
        block_id: &str,
        turn_id: &str,
        user_text: &str,
        ai_text: &str,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Turn> {
        let block = self
            .get_block(block_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BridgeBlock", block_id))?;

        let turn = Turn {
            turn_id: turn_id.to_string(),
            user_text: user_text.to_string(),
            ai_text: ai_text.to_string(),
            ordinal: block.next_turn_ordinal(),
            created_at,
        };

        let mut turns = block.turns;
        turns.push(turn.clone());

        let conn = self.conn().await;
        conn.execute(
            "UPDATE daily_ledger SET turns_json = ?1, updated_at = ?2 WHERE block_id = ?3",
            params![
                serde_json::to_string(&turns)?,
                Utc::now().to_rfc3339(),
                block_id
            ],
        )?;

        Ok(turn)
    }

    /// Union new keywords into a block's accumulating set
    pub async fn merge_block_keywords(
        &self,
        block_id: &str,
        keywords: &[String],
    ) -> CoreResult<()> {
        let block = self
            .get_block(block_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BridgeBlock", block_id))?;

        let mut merged = block.keywords;
        for kw in keywords {
            let kw = kw.trim().to_lowercase();
            if !kw.is_empty() && !merged.contains(&kw) {
                merged.push(kw);
            }
        }

        let conn = self.conn().await;
        conn.execute(
            "UPDATE daily_ledger SET keywords_json = ?1, updated_at = ?2 WHERE block_id = ?3",
            params![
                serde_json::to_string(&merged)?,
                Utc::now().to_rfc3339(),
                block_id
            ],
        )?;
        Ok(())
    }

    /// Replace the rolling summary and optional open loops / decisions
    pub async fn update_block_rollup(
        &self,
        block_id: &str,
        summary: &str,
        open_loops: &[String],
        decisions: &[String],
    ) -> CoreResult<()> {
        let conn = self.conn().await;

        let changed = conn.execute(
            "UPDATE daily_ledger
             SET summary = ?1, open_loops_json = ?2, decisions_json = ?3, updated_at = ?4
             WHERE block_id = ?5",
            params![
                summary,
                serde_json::to_string(open_loops)?,
                serde_json::to_string(decisions)?,
                Utc::now().to_rfc3339(),
                block_id
            ],
        )?;

        if changed == 0 {
            return Err(CoreError::not_found("BridgeBlock", block_id));
        }
        Ok(())
    }

    /// Replace the topic label
    ///
    /// Callers only invoke this with a more specific label; a block's
    /// label never reverts to a generic default.
    pub async fn set_block_topic_label(&self, block_id: &str, topic_label: &str) -> CoreResult<()> {
        let conn = self.conn().await;

        let changed = conn.execute(
            "UPDATE daily_ledger SET topic_label = ?1, updated_at = ?2 WHERE block_id = ?3",
            params![topic_label, Utc::now().to_rfc3339(), block_id],
        )?;

        if changed == 0 {
            return Err(CoreError::not_found("BridgeBlock", block_id));
        }
        Ok(())
    }

    /// Remove a consumed block from the ledger
    pub async fn delete_block(&self, block_id: &str) -> CoreResult<()> {
        let conn = self.conn().await;
        let changed = conn.execute(
            "DELETE FROM daily_ledger WHERE block_id = ?1",
            params![block_id],
        )?;
        if changed == 0 {
            warn!(block_id, "delete_block: no such block");
        }
        Ok(())
    }
}

fn row_to_block(row: &Row) -> rusqlite::Result<BridgeBlock> {
    let status_str: String = row.get(2)?;
    let keywords_json: String = row.get(3)?;
    let turns_json: String = row.get(5)?;
    let open_loops_json: String = row.get(6)?;
    let decisions_json: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(BridgeBlock {
        block_id: row.get(0)?,
        topic_label: row.get(1)?,
        status: BlockStatus::from_str(&status_str).unwrap_or(BlockStatus::Paused),
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        summary: row.get(4)?,
        turns: serde_json::from_str(&turns_json).unwrap_or_default(),
        open_loops: serde_json::from_str(&open_loops_json).unwrap_or_default(),
        decisions: serde_json::from_str(&decisions_json).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
