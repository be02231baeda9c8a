//! Block metadata operations.
//!
//! One row per gardened block: global tags plus section rules, stored as
//! canonical JSON and referenced by every retrieved chunk of the block.

use chrono::Utc;
use rusqlite::params;

use crate::error::CoreResult;
use crate::types::{BlockMetadata, GlobalTag, SectionRule};

use super::ledger::parse_timestamp;
use super::Storage;

impl Storage {
    /// Write (or replace) a gardened block's sticky metadata
    pub async fn save_block_metadata(
        &self,
        block_id: &str,
        topic_label: &str,
        summary: &str,
        global_tags: &[GlobalTag],
        section_rules: &[SectionRule],
    ) -> CoreResult<()> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT OR REPLACE INTO block_metadata
             (block_id, topic_label, summary, global_tags_json, section_rules_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                block_id,
                topic_label,
                summary,
                serde_json::to_string(global_tags)?,
                serde_json::to_string(section_rules)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load a block's sticky metadata
    pub async fn get_block_metadata(&self, block_id: &str) -> CoreResult<Option<BlockMetadata>> {
        let conn = self.conn().await;

        let result = conn.query_row(
            "SELECT block_id, topic_label, summary, global_tags_json, section_rules_json, created_at
             FROM block_metadata WHERE block_id = ?1",
            params![block_id],
            |row| {
                let tags_json: String = row.get(3)?;
                let rules_json: String = row.get(4)?;
                let created_at: String = row.get(5)?;
                Ok(BlockMetadata {
                    block_id: row.get(0)?,
                    topic_label: row.get(1)?,
                    summary: row.get(2)?,
                    global_tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    section_rules: serde_json::from_str(&rules_json).unwrap_or_default(),
                    created_at: parse_timestamp(&created_at),
                })
            },
        );

        match result {
            Ok(metadata) => Ok(Some(metadata)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
