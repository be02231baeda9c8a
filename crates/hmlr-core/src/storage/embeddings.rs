//! Chunk embedding storage.
//!
//! Vectors are stored as little-endian f32 blobs keyed by chunk ID. A
//! content hash lets callers skip re-encoding identical text.

use chrono::Utc;
use rusqlite::params;
use sha2::{Digest, Sha256};

use crate::error::CoreResult;

use super::Storage;

/// Encode a vector as a little-endian f32 blob
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 blob back into a vector
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// SHA-256 content hash, hex-encoded
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

impl Storage {
    /// Store (or replace) a chunk's embedding
    pub async fn save_embedding(
        &self,
        chunk_id: &str,
        content: &str,
        vector: &[f32],
    ) -> CoreResult<()> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT OR REPLACE INTO embeddings (chunk_id, content_hash, vector, dimensions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chunk_id,
                hash_content(content),
                vector_to_blob(vector),
                vector.len(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load a chunk's embedding
    pub async fn get_embedding(&self, chunk_id: &str) -> CoreResult<Option<Vec<f32>>> {
        let conn = self.conn().await;

        let result = conn.query_row(
            "SELECT vector FROM embeddings WHERE chunk_id = ?1",
            params![chunk_id],
            |row| row.get::<_, Vec<u8>>(0),
        );

        match result {
            Ok(blob) => Ok(Some(blob_to_vector(&blob))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a chunk already has an embedding for this exact content
    pub async fn has_embedding_for(&self, chunk_id: &str, content: &str) -> CoreResult<bool> {
        let conn = self.conn().await;

        let result = conn.query_row(
            "SELECT content_hash FROM embeddings WHERE chunk_id = ?1",
            params![chunk_id],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(hash) => Ok(hash == hash_content(content)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let vector = vec![0.1f32, -2.5, 3.75, 0.0];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_vector(&blob), vector);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_content("hello"), hash_content("hello"));
        assert_ne!(hash_content("hello"), hash_content("world"));
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let storage = Storage::open_in_memory().unwrap();
        let vector = vec![1.0f32, 0.0, -1.0];

        storage
            .save_embedding("turn_x_p00_s00", "some text", &vector)
            .await
            .unwrap();

        let loaded = storage.get_embedding("turn_x_p00_s00").await.unwrap();
        assert_eq!(loaded, Some(vector));
        assert!(storage.get_embedding("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_hash_dedup() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .save_embedding("c1", "some text", &[1.0, 2.0])
            .await
            .unwrap();

        assert!(storage.has_embedding_for("c1", "some text").await.unwrap());
        assert!(!storage.has_embedding_for("c1", "other text").await.unwrap());
        assert!(!storage.has_embedding_for("c2", "some text").await.unwrap());
    }
}
