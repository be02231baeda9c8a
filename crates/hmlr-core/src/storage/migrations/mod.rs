//! Storage migrations
//!
//! SQL migrations are embedded as strings and executed when the store is
//! opened.

use rusqlite::Connection;

use crate::error::CoreResult;

/// HMLR tables SQL (001)
pub const HMLR_TABLES_SQL: &str = include_str!("001_hmlr_tables.sql");

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(HMLR_TABLES_SQL)?;
    Ok(())
}
