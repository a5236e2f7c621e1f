//! SQLite schema for the durable store (spec.md §6 "Durable schema
//! (guardian)", SPEC_FULL.md §6.1).
//!
//! Matches the teacher's `shared_knowledge::database` pattern: one JSON
//! column per entity (full struct, round-tripped through serde) plus a
//! handful of indexed scalar columns pulled out for fast filtering, rather
//! than a fully normalized relational schema — `PiggybackResponse`-shaped
//! data (nested lists, optional fields) is awkward to normalize and nothing
//! in this crate queries across its sub-fields directly.

use rusqlite::Connection;

use crate::error::Result;

/// WAL + 5s busy timeout (spec.md §6: "Journal mode WAL, busy timeout 5 s"),
/// matching `cortex-drift-bridge::storage::pragmas::configure_connection`.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vision (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            vision_json TEXT NOT NULL,
            created INTEGER NOT NULL,
            updated INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            observation_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(session_id);
        CREATE INDEX IF NOT EXISTS idx_observations_kind ON observations(kind);
        CREATE INDEX IF NOT EXISTS idx_observations_timestamp ON observations(timestamp);

        CREATE TABLE IF NOT EXISTS alignment_checks (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            result TEXT NOT NULL,
            check_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_alignment_checks_timestamp ON alignment_checks(timestamp);
        CREATE INDEX IF NOT EXISTS idx_alignment_checks_result ON alignment_checks(result);

        CREATE TABLE IF NOT EXISTS drift_events (
            id TEXT PRIMARY KEY,
            severity TEXT NOT NULL,
            resolved INTEGER NOT NULL,
            related_check_id TEXT,
            event_json TEXT NOT NULL,
            FOREIGN KEY (related_check_id) REFERENCES alignment_checks(id)
        );
        CREATE INDEX IF NOT EXISTS idx_drift_events_severity ON drift_events(severity);
        CREATE INDEX IF NOT EXISTS idx_drift_events_resolved ON drift_events(resolved);

        CREATE TABLE IF NOT EXISTS guardian_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            state_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ingested_docs (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            confidence REAL NOT NULL,
            atom_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ingested_docs_relevance ON ingested_docs(confidence);

        CREATE TABLE IF NOT EXISTS learning_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            shard_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            args TEXT NOT NULL,
            extra TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_learning_patterns_shard_kind ON learning_patterns(shard_name, kind);

        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object TEXT NOT NULL,
            confidence REAL NOT NULL,
            metadata TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_links_subject ON links(subject);

        CREATE TABLE IF NOT EXISTS stored_facts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            predicate TEXT NOT NULL,
            args TEXT NOT NULL,
            source TEXT NOT NULL,
            priority INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_stored_facts_predicate ON stored_facts(predicate);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_initializes_on_an_in_memory_connection() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'guardian_state'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 1);
    }

    #[test]
    fn busy_timeout_is_five_seconds() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();
        let timeout: i64 = conn.pragma_query_value(None, "busy_timeout", |row| row.get(0)).unwrap();
        assert_eq!(timeout, 5000);
    }
}
