//! Long-term gardened memory operations.
//!
//! Chunks of a consumed bridge block are promoted here; their sticky tags
//! live in `block_metadata` and are joined at read time, never copied
//! onto rows.

use rusqlite::{params, Row};

use crate::error::CoreResult;
use crate::types::GardenedChunk;

use super::ledger::parse_timestamp;
use super::Storage;

impl Storage {
    /// Promote a chunk into long-term memory
    pub async fn insert_gardened_chunk(&self, chunk: &GardenedChunk) -> CoreResult<()> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT OR REPLACE INTO gardened_memory
             (chunk_id, block_id, parent_id, level, text, token_count, turn_ordinal, source_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &chunk.chunk_id,
                &chunk.block_id,
                &chunk.parent_id,
                &chunk.level,
                &chunk.text,
                chunk.token_count,
                chunk.turn_ordinal,
                chunk.source_date.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a gardened chunk by ID
    pub async fn get_gardened_chunk(&self, chunk_id: &str) -> CoreResult<Option<GardenedChunk>> {
        let conn = self.conn().await;

        let result = conn.query_row(
            "SELECT chunk_id, block_id, parent_id, level, text, token_count, turn_ordinal, source_date
             FROM gardened_memory WHERE chunk_id = ?1",
            params![chunk_id],
            row_to_chunk,
        );

        match result {
            Ok(chunk) => Ok(Some(chunk)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All gardened chunk vectors, for similarity scans
    ///
    /// Joins the embeddings table; chunks without a vector are skipped
    /// (the gardener always embeds before promoting).
    pub async fn gardened_vectors(&self) -> CoreResult<Vec<(String, Vec<f32>)>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT g.chunk_id, e.vector
             FROM gardened_memory g JOIN embeddings e ON g.chunk_id = e.chunk_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut vectors = Vec::new();
        for row in rows {
            let (chunk_id, blob) = row?;
            vectors.push((chunk_id, super::blob_to_vector(&blob)));
        }
        Ok(vectors)
    }

    /// Gardened chunks belonging to one source block
    pub async fn gardened_chunks_for_block(&self, block_id: &str) -> CoreResult<Vec<GardenedChunk>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT chunk_id, block_id, parent_id, level, text, token_count, turn_ordinal, source_date
             FROM gardened_memory WHERE block_id = ?1 ORDER BY chunk_id ASC",
        )?;
        let rows = stmt.query_map(params![block_id], row_to_chunk)?;
        let chunks: Result<Vec<_>, _> = rows.collect();
        Ok(chunks?)
    }
}

fn row_to_chunk(row: &Row) -> rusqlite::Result<GardenedChunk> {
    let source_date: String = row.get(7)?;
    Ok(GardenedChunk {
        chunk_id: row.get(0)?,
        block_id: row.get(1)?,
        parent_id: row.get(2)?,
        level: row.get(3)?,
        text: row.get(4)?,
        token_count: row.get(5)?,
        turn_ordinal: row.get(6)?,
        source_date: parse_timestamp(&source_date),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(chunk_id: &str, block_id: &str) -> GardenedChunk {
        GardenedChunk {
            chunk_id: chunk_id.into(),
            block_id: block_id.into(),
            parent_id: None,
            level: "sentence".into(),
            text: "Titan is deprecated.".into(),
            token_count: 5,
            turn_ordinal: 0,
            source_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .insert_gardened_chunk(&chunk("c1", "bb_old"))
            .await
            .unwrap();

        let fetched = storage.get_gardened_chunk("c1").await.unwrap().unwrap();
        assert_eq!(fetched.block_id, "bb_old");
        assert!(storage.get_gardened_chunk("c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vectors_join_embeddings() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .insert_gardened_chunk(&chunk("c1", "bb_old"))
            .await
            .unwrap();
        storage
            .insert_gardened_chunk(&chunk("c2", "bb_old"))
            .await
            .unwrap();
        // Only c1 gets an embedding
        storage
            .save_embedding("c1", "Titan is deprecated.", &[1.0, 0.0])
            .await
            .unwrap();

        let vectors = storage.gardened_vectors().await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].0, "c1");
        assert_eq!(vectors[0].1, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_chunks_for_block() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_gardened_chunk(&chunk("c1", "bb_a")).await.unwrap();
        storage.insert_gardened_chunk(&chunk("c2", "bb_b")).await.unwrap();

        let chunks = storage.gardened_chunks_for_block("bb_a").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "c1");
    }
}
