//! Identifier Generation
//!
//! Mints the structured IDs used across the system. Turn and block IDs
//! embed a compact UTC timestamp; the generator guarantees timestamps are
//! strictly monotone within a process so IDs never collide and ordering
//! by `created_at` matches insertion order.

use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Compact timestamp format embedded in IDs, millisecond precision
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Monotone ID and timestamp source
#[derive(Debug)]
pub struct IdGenerator {
    last_millis: Mutex<i64>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last_millis: Mutex::new(0),
        }
    }

    /// Next timestamp, strictly after every previously issued one
    pub fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_millis.lock().expect("id clock poisoned");
        let now = Utc::now().timestamp_millis();
        let millis = now.max(*last + 1);
        *last = millis;
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Bridge block ID: `bb_<UTC>_<hex>`
    pub fn block_id(&self) -> (String, DateTime<Utc>) {
        let ts = self.next_timestamp();
        let id = format!(
            "bb_{}_{}",
            ts.format(ID_TIMESTAMP_FORMAT),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        (id, ts)
    }

    /// Turn ID: `turn_<UTC>`; the embedded timestamp is what fact linking
    /// matches against
    pub fn turn_id(&self) -> (String, DateTime<Utc>) {
        let ts = self.next_timestamp();
        (format!("turn_{}", ts.format(ID_TIMESTAMP_FORMAT)), ts)
    }

    /// Dossier ID: `dos_<UTC>`
    pub fn dossier_id(&self) -> String {
        let ts = self.next_timestamp();
        format!("dos_{}", ts.format(ID_TIMESTAMP_FORMAT))
    }

    /// Opaque prefixed ID for dossier facts and provenance rows
    pub fn prefixed_id(&self, prefix: &str) -> String {
        format!(
            "{}_{}",
            prefix,
            &Uuid::new_v4().simple().to_string()[..12]
        )
    }
}

/// Extract the compact timestamp portion of a turn ID
///
/// `turn_20251215T103000123Z` → `20251215T103000123Z`. Chunk IDs are
/// derived from turn IDs, so this substring also identifies every chunk
/// of the turn.
pub fn turn_timestamp(turn_id: &str) -> Option<&str> {
    turn_id.strip_prefix("turn_")
}
