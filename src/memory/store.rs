//! Relational store access: memories, documents, faces, and cluster labels.
//!
//! Plain functions over a [`Connection`]. Callers hold the connection lock.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::types::{Document, FaceRecord, FileType, MemoryRecord};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ── Memories ──────────────────────────────────────────────────────────────────

/// Insert a text memory and return its id.
pub fn insert_memory(conn: &Connection, content: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO memories (content, created_at) VALUES (?1, ?2)",
        params![content, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_memory(conn: &Connection, id: i64) -> Result<Option<MemoryRecord>> {
    let record = conn
        .query_row(
            "SELECT id, content, created_at FROM memories WHERE id = ?1",
            params![id],
            |row| {
                Ok(MemoryRecord {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Every memory in id order. This is the snapshot a full index rebuild reads.
pub fn all_memories(conn: &Connection) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare("SELECT id, content, created_at FROM memories ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MemoryRecord {
                id: row.get(0)?,
                content: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn memory_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
}

pub fn memory_ids(conn: &Connection) -> Result<BTreeSet<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM memories")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<BTreeSet<i64>, _>>()?;
    Ok(ids)
}

/// Memories left out of the last text index build because they failed to embed.
pub fn unindexed_memories(conn: &Connection) -> Result<BTreeSet<i64>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'unindexed_memories'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(BTreeSet::new()),
    }
}

pub fn set_unindexed_memories(conn: &Connection, ids: &BTreeSet<i64>) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('unindexed_memories', ?1)",
        [serde_json::to_string(ids)?],
    )?;
    Ok(())
}

// ── Documents ─────────────────────────────────────────────────────────────────

/// Record an uploaded file. The file type is derived from the filename.
pub fn insert_document(conn: &Connection, filename: &str, file_path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO documents (filename, file_path, file_type, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            filename,
            file_path,
            FileType::from_filename(filename).as_str(),
            now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn link_document_memory(conn: &Connection, document_id: i64, memory_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO document_memories (document_id, memory_id) VALUES (?1, ?2)",
        params![document_id, memory_id],
    )?;
    Ok(())
}

/// The document a memory was extracted from, if any. The earliest link wins.
pub fn document_for_memory(conn: &Connection, memory_id: i64) -> Result<Option<Document>> {
    let doc = conn
        .query_row(
            "SELECT d.id, d.filename, d.file_path \
             FROM document_memories dm JOIN documents d ON d.id = dm.document_id \
             WHERE dm.memory_id = ?1 ORDER BY dm.rowid LIMIT 1",
            params![memory_id],
            |row| {
                Ok(Document {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    file_path: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(doc)
}

// ── Faces ─────────────────────────────────────────────────────────────────────

pub fn insert_face(
    conn: &Connection,
    id: &str,
    image_path: &str,
    label: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO faces (id, image_path, label, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, image_path, label, now()],
    )?;
    Ok(())
}

pub fn get_face(conn: &Connection, id: &str) -> Result<Option<FaceRecord>> {
    let face = conn
        .query_row(
            "SELECT id, image_path, label, created_at FROM faces WHERE id = ?1",
            params![id],
            |row| {
                Ok(FaceRecord {
                    id: row.get(0)?,
                    image_path: row.get(1)?,
                    label: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(face)
}

/// The face's label snapshot. `None` when the face is unknown or unlabeled.
pub fn get_face_label(conn: &Connection, id: &str) -> Result<Option<String>> {
    let label: Option<Option<String>> = conn
        .query_row(
            "SELECT label FROM faces WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(label.flatten())
}

/// Overwrite a face's label snapshot. Returns `false` when the face does not exist.
pub fn update_face_label(conn: &Connection, id: &str, label: Option<&str>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE faces SET label = ?1 WHERE id = ?2",
        params![label, id],
    )?;
    Ok(changed > 0)
}

/// Faces whose label snapshot occurs in `text`, compared case-insensitively.
pub fn faces_with_label_in(conn: &Connection, text: &str) -> Result<Vec<FaceRecord>> {
    let needle = text.to_lowercase();
    let mut stmt = conn.prepare(
        "SELECT id, image_path, label, created_at FROM faces \
         WHERE label IS NOT NULL AND label != '' ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FaceRecord {
                id: row.get(0)?,
                image_path: row.get(1)?,
                label: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|face| {
            face.label
                .as_deref()
                .is_some_and(|label| needle.contains(&label.to_lowercase()))
        })
        .collect())
}

pub fn face_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?)
}

// ── Cluster labels ────────────────────────────────────────────────────────────

pub fn load_cluster_labels(conn: &Connection) -> Result<BTreeMap<i64, String>> {
    let mut stmt = conn.prepare("SELECT cluster_id, label FROM cluster_labels")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

/// Replace every stored binding with `labels`, in one transaction.
pub fn save_cluster_labels(conn: &mut Connection, labels: &BTreeMap<i64, String>) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cluster_labels", [])?;
    let stamp = now();
    for (cluster_id, label) in labels {
        tx.execute(
            "INSERT INTO cluster_labels (cluster_id, label, updated_at) VALUES (?1, ?2, ?3)",
            params![cluster_id, label, stamp],
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    #[test]
    fn memories_round_trip_in_order() {
        let conn = open_memory_database().unwrap();
        let a = insert_memory(&conn, "first").unwrap();
        let b = insert_memory(&conn, "second").unwrap();
        assert!(b > a);

        assert_eq!(get_memory(&conn, a).unwrap().unwrap().content, "first");
        assert!(get_memory(&conn, 999).unwrap().is_none());

        let all: Vec<i64> = all_memories(&conn).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(all, vec![a, b]);
        assert_eq!(memory_count(&conn).unwrap(), 2);
    }

    #[test]
    fn unindexed_set_replaces_previous() {
        let conn = open_memory_database().unwrap();
        assert!(unindexed_memories(&conn).unwrap().is_empty());

        let a = insert_memory(&conn, "first").unwrap();
        let b = insert_memory(&conn, "second").unwrap();
        assert_eq!(memory_ids(&conn).unwrap(), BTreeSet::from([a, b]));

        set_unindexed_memories(&conn, &BTreeSet::from([b])).unwrap();
        assert_eq!(unindexed_memories(&conn).unwrap(), BTreeSet::from([b]));
        set_unindexed_memories(&conn, &BTreeSet::new()).unwrap();
        assert!(unindexed_memories(&conn).unwrap().is_empty());
    }

    #[test]
    fn document_join_for_evidence() {
        let conn = open_memory_database().unwrap();
        let mem = insert_memory(&conn, "scheduling chapter").unwrap();
        let loose = insert_memory(&conn, "typed note").unwrap();
        let doc = insert_document(&conn, "os.pdf", "/uploads/os.pdf").unwrap();
        link_document_memory(&conn, doc, mem).unwrap();

        let found = document_for_memory(&conn, mem).unwrap().unwrap();
        assert_eq!(found.id, doc);
        assert_eq!(found.filename, "os.pdf");
        assert!(document_for_memory(&conn, loose).unwrap().is_none());

        let stored_type: String = conn
            .query_row("SELECT file_type FROM documents WHERE id = ?1", [doc], |r| r.get(0))
            .unwrap();
        assert_eq!(stored_type, "pdf");
    }

    #[test]
    fn face_label_snapshot() {
        let conn = open_memory_database().unwrap();
        insert_face(&conn, "f1", "img.jpg", None).unwrap();
        assert_eq!(get_face_label(&conn, "f1").unwrap(), None);
        assert_eq!(get_face_label(&conn, "missing").unwrap(), None);

        assert!(update_face_label(&conn, "f1", Some("Raj")).unwrap());
        assert!(!update_face_label(&conn, "missing", Some("Raj")).unwrap());
        assert_eq!(get_face_label(&conn, "f1").unwrap().as_deref(), Some("Raj"));
        assert_eq!(get_face(&conn, "f1").unwrap().unwrap().image_path, "img.jpg");
        assert_eq!(face_count(&conn).unwrap(), 1);
    }

    #[test]
    fn label_lookup_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        insert_face(&conn, "f1", "a.jpg", Some("Raj")).unwrap();
        insert_face(&conn, "f2", "b.jpg", Some("Meera")).unwrap();
        insert_face(&conn, "f3", "c.jpg", None).unwrap();

        let hits = faces_with_label_in(&conn, "photo of raj").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "f1");
    }

    #[test]
    fn cluster_labels_replace_all() {
        let mut conn = open_memory_database().unwrap();
        let mut labels = BTreeMap::new();
        labels.insert(0, "Raj".to_string());
        labels.insert(2, "Meera".to_string());
        save_cluster_labels(&mut conn, &labels).unwrap();

        labels.remove(&0);
        save_cluster_labels(&mut conn, &labels).unwrap();

        let loaded = load_cluster_labels(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&2).map(String::as_str), Some("Meera"));
    }
}
