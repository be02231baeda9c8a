//! Dossier storage operations.
//!
//! Dossier facts are append-only; summaries are the only mutable field.
//! Every change is mirrored by a provenance row.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::{CoreError, CoreResult};
use crate::types::{Dossier, DossierFact, ProvenanceEntry, ProvenanceOp};

use super::ledger::parse_timestamp;
use super::Storage;

impl Storage {
    /// Insert a new dossier row
    pub async fn create_dossier(
        &self,
        dossier_id: &str,
        title: &str,
        summary: &str,
        created_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT INTO dossiers (dossier_id, title, summary, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![dossier_id, title, summary, created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch a dossier by ID
    pub async fn get_dossier(&self, dossier_id: &str) -> CoreResult<Option<Dossier>> {
        let conn = self.conn().await;

        let result = conn.query_row(
            "SELECT dossier_id, title, summary, status, permissions, created_at, last_updated
             FROM dossiers WHERE dossier_id = ?1",
            params![dossier_id],
            row_to_dossier,
        );

        match result {
            Ok(dossier) => Ok(Some(dossier)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All dossiers, most recently updated first
    pub async fn list_dossiers(&self) -> CoreResult<Vec<Dossier>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT dossier_id, title, summary, status, permissions, created_at, last_updated
             FROM dossiers ORDER BY last_updated DESC",
        )?;
        let rows = stmt.query_map([], row_to_dossier)?;
        let dossiers: Result<Vec<_>, _> = rows.collect();
        Ok(dossiers?)
    }

    /// Append a fact to a dossier along with its embedding
    ///
    /// The fact and its vector are written together so the "exactly one
    /// embedding row per fact" invariant holds at every commit point.
    pub async fn add_dossier_fact(
        &self,
        fact: &DossierFact,
        vector: &[f32],
    ) -> CoreResult<()> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO dossier_facts
             (fact_id, dossier_id, fact_text, fact_type, confidence, source_block_id, source_turn_id, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &fact.fact_id,
                &fact.dossier_id,
                &fact.fact_text,
                &fact.fact_type,
                fact.confidence,
                &fact.source_block_id,
                &fact.source_turn_id,
                fact.added_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO dossier_fact_embeddings (fact_id, dossier_id, vector, dimensions)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &fact.fact_id,
                &fact.dossier_id,
                super::vector_to_blob(vector),
                vector.len(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Facts of one dossier, oldest first
    pub async fn dossier_facts(&self, dossier_id: &str) -> CoreResult<Vec<DossierFact>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT fact_id, dossier_id, fact_text, fact_type, confidence,
                    source_block_id, source_turn_id, added_at
             FROM dossier_facts WHERE dossier_id = ?1 ORDER BY added_at ASC, fact_id ASC",
        )?;
        let rows = stmt.query_map(params![dossier_id], row_to_fact)?;
        let facts: Result<Vec<_>, _> = rows.collect();
        Ok(facts?)
    }

    /// All dossier fact vectors, for voting and retrieval scans
    pub async fn dossier_fact_vectors(&self) -> CoreResult<Vec<(String, String, Vec<f32>)>> {
        let conn = self.conn().await;

        let mut stmt =
            conn.prepare("SELECT fact_id, dossier_id, vector FROM dossier_fact_embeddings")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut vectors = Vec::new();
        for row in rows {
            let (fact_id, dossier_id, blob) = row?;
            vectors.push((fact_id, dossier_id, super::blob_to_vector(&blob)));
        }
        Ok(vectors)
    }

    /// Rewrite a dossier's summary and bump its update time
    pub async fn update_dossier_summary(&self, dossier_id: &str, summary: &str) -> CoreResult<()> {
        let conn = self.conn().await;

        let changed = conn.execute(
            "UPDATE dossiers SET summary = ?1, last_updated = ?2 WHERE dossier_id = ?3",
            params![summary, Utc::now().to_rfc3339(), dossier_id],
        )?;
        if changed == 0 {
            return Err(CoreError::not_found("Dossier", dossier_id));
        }
        Ok(())
    }

    /// Append an audit-log row
    ///
    /// Callers supply `created_at` from a monotone clock so the log's
    /// order is well-defined even within one millisecond.
    pub async fn add_provenance(
        &self,
        provenance_id: &str,
        dossier_id: &str,
        operation: ProvenanceOp,
        source_block_id: Option<&str>,
        details: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let conn = self.conn().await;

        conn.execute(
            "INSERT INTO dossier_provenance
             (provenance_id, dossier_id, operation, source_block_id, details_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                provenance_id,
                dossier_id,
                operation.as_str(),
                source_block_id,
                serde_json::to_string(details)?,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Audit log of one dossier, oldest first
    pub async fn provenance_for(&self, dossier_id: &str) -> CoreResult<Vec<ProvenanceEntry>> {
        let conn = self.conn().await;

        let mut stmt = conn.prepare(
            "SELECT provenance_id, dossier_id, operation, source_block_id, details_json, created_at
             FROM dossier_provenance WHERE dossier_id = ?1
             ORDER BY created_at ASC, provenance_id ASC",
        )?;
        let rows = stmt.query_map(params![dossier_id], |row| {
            let op_str: String = row.get(2)?;
            let details_json: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok(ProvenanceEntry {
                provenance_id: row.get(0)?,
                dossier_id: row.get(1)?,
                operation: ProvenanceOp::from_str(&op_str).unwrap_or(ProvenanceOp::Created),
                source_block_id: row.get(3)?,
                details: serde_json::from_str(&details_json)
                    .unwrap_or(serde_json::Value::Null),
                created_at: parse_timestamp(&created_at),
            })
        })?;
        let entries: Result<Vec<_>, _> = rows.collect();
        Ok(entries?)
    }
}

fn row_to_dossier(row: &Row) -> rusqlite::Result<Dossier> {
    let created_at: String = row.get(5)?;
    let last_updated: String = row.get(6)?;
    Ok(Dossier {
        dossier_id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        status: row.get(3)?,
        permissions: row.get(4)?,
        created_at: parse_timestamp(&created_at),
        last_updated: parse_timestamp(&last_updated),
    })
}

fn row_to_fact(row: &Row) -> rusqlite::Result<DossierFact> {
    let added_at: String = row.get(7)?;
    Ok(DossierFact {
        fact_id: row.get(0)?,
        dossier_id: row.get(1)?,
        fact_text: row.get(2)?,
        fact_type: row.get(3)?,
        confidence: row.get(4)?,
        source_block_id: row.get(5)?,
        source_turn_id: row.get(6)?,
        added_at: parse_timestamp(&added_at),
    })
}
