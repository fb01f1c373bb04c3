//! SQL DDL for the relational store.
//!
//! `memories`, `documents`, `document_memories`, `faces`, `cluster_labels` and
//! `schema_meta`. All DDL uses `IF NOT EXISTS`, so initialization is idempotent.

use rusqlite::Connection;

/// The schema version this binary writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
-- Text fragments. Immutable once inserted.
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Uploaded source files
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_type TEXT NOT NULL CHECK(file_type IN ('image','pdf','excel')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_memories (
    document_id INTEGER NOT NULL REFERENCES documents(id),
    memory_id INTEGER NOT NULL REFERENCES memories(id)
);

CREATE INDEX IF NOT EXISTS idx_document_memories_memory ON document_memories(memory_id);

-- One row per observed face. `label` is a lookup cache, reconciled from cluster_labels.
CREATE TABLE IF NOT EXISTS faces (
    id TEXT PRIMARY KEY,
    image_path TEXT NOT NULL,
    label TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_faces_label ON faces(label);

-- Authoritative identity labels, keyed by cluster id
CREATE TABLE IF NOT EXISTS cluster_labels (
    cluster_id INTEGER PRIMARY KEY CHECK(cluster_id != -1),
    label TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// The embedding model the persisted text index was built with, if recorded.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'embedding_model'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [model],
    )?;
    Ok(())
}
