//! Storage Layer
//!
//! SQLite-backed persistence for the HMLR memory system. A single
//! connection is wrapped in a mutex and treated as a serial resource:
//! every operation takes the lock, does its synchronous work, and
//! releases before any await point.

pub mod migrations;

mod dossiers;
mod embeddings;
mod facts;
mod gardened;
mod ledger;
mod metadata;

pub use embeddings::{blob_to_vector, hash_content, vector_to_blob};

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::CoreResult;

/// Handle to the HMLR database
///
/// Cheap to clone; all clones share one serialized connection.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open (or create) the database at the given path
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database, used by tests
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the connection
    pub(crate) async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().await
    }
}
