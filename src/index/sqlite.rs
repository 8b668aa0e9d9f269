//! Persistent vector backend on SQLite
//!
//! Vectors are stored as little-endian f32 BLOBs next to their JSON
//! metadata and searched by brute-force cosine distance. Uses its own
//! database connection (WAL mode) so index writes never contend with the
//! record store connection.

use super::{cosine_distance, rank_by_distance, Metadata, MetadataFilter, VectorBackend, VectorEntry};
use crate::error::{RagdError, RagdResult};
use crate::id::ChunkId;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteVectorBackend {
    conn: Mutex<Connection>,
}

/// Every backend failure is an availability problem from the caller's view.
fn unavailable(e: impl std::fmt::Display) -> RagdError {
    RagdError::IndexUnavailable(e.to_string())
}

/// Encode a float vector as a BLOB of 4-byte little-endian values.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl SqliteVectorBackend {
    /// Open a persistent vector store at the given path.
    pub fn open(path: impl AsRef<Path>) -> RagdResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(unavailable)?;
        Self::init_connection(conn)
    }

    pub fn open_in_memory() -> RagdResult<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> RagdResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS vectors (
                chunk_id TEXT PRIMARY KEY,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                metadata_json TEXT NOT NULL
            );
            "#,
        )
        .map_err(unavailable)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl VectorBackend for SqliteVectorBackend {
    fn upsert(&self, entry: VectorEntry) -> RagdResult<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO vectors (chunk_id, dims, embedding, metadata_json)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(chunk_id) DO UPDATE SET
                dims = excluded.dims,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json
            "#,
            params![
                entry.chunk_id.to_string(),
                entry.vector.len() as i64,
                vec_to_blob(&entry.vector),
                metadata_json,
            ],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn get(&self, chunk_id: &ChunkId) -> RagdResult<Option<VectorEntry>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT embedding, metadata_json FROM vectors WHERE chunk_id = ?1",
                params![chunk_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(unavailable)?;

        match row {
            Some((blob, metadata_json)) => Ok(Some(VectorEntry {
                chunk_id: chunk_id.clone(),
                vector: blob_to_vec(&blob),
                metadata: serde_json::from_str(&metadata_json)?,
            })),
            None => Ok(None),
        }
    }

    fn remove(&self, chunk_id: &ChunkId) -> RagdResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute("DELETE FROM vectors WHERE chunk_id = ?1", params![chunk_id.to_string()])
            .map_err(unavailable)?;
        Ok(rows > 0)
    }

    fn query(&self, vector: &[f32], k: usize, filter: &MetadataFilter) -> RagdResult<Vec<(ChunkId, f32)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT chunk_id, embedding, metadata_json FROM vectors WHERE dims = ?1")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![vector.len() as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        let mut scored = Vec::new();
        for (chunk_id, blob, metadata_json) in rows {
            let metadata: Metadata = serde_json::from_str(&metadata_json)?;
            if !filter.matches(&metadata) {
                continue;
            }
            scored.push((ChunkId::parse(&chunk_id)?, cosine_distance(vector, &blob_to_vec(&blob))));
        }
        Ok(rank_by_distance(scored, k))
    }

    fn len(&self) -> RagdResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::DocumentId;
    use crate::index::MetadataValue;

    fn entry(seq: u32, vector: Vec<f32>, section: &str) -> VectorEntry {
        let doc = DocumentId::parse("doc").unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("section".into(), MetadataValue::Str(section.into()));
        metadata.insert("page".into(), MetadataValue::Int(seq as i64 + 1));
        metadata.insert("title".into(), MetadataValue::Null);
        VectorEntry {
            chunk_id: ChunkId::new(&doc, seq),
            vector,
            metadata,
        }
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let v = vec![0.5f32, -1.25, 3.0e-7];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        let e = entry(0, vec![1.0, 2.0, 3.0], "Intro");
        {
            let backend = SqliteVectorBackend::open(&path).unwrap();
            backend.upsert(e.clone()).unwrap();
        }
        let backend = SqliteVectorBackend::open(&path).unwrap();
        assert_eq!(backend.get(&e.chunk_id).unwrap(), Some(e));
    }

    #[test]
    fn query_applies_filter() {
        let backend = SqliteVectorBackend::open_in_memory().unwrap();
        backend.upsert(entry(0, vec![1.0, 0.0], "Intro")).unwrap();
        backend.upsert(entry(1, vec![1.0, 0.1], "Methods")).unwrap();
        let filter = MetadataFilter::new().eq("section", "Methods");
        let hits = backend.query(&[1.0, 0.0], 5, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.sequence_num(), 1);
    }

    #[test]
    fn query_skips_other_dimensionalities() {
        let backend = SqliteVectorBackend::open_in_memory().unwrap();
        backend.upsert(entry(0, vec![1.0, 0.0], "Intro")).unwrap();
        backend.upsert(entry(1, vec![1.0, 0.0, 0.0], "Intro")).unwrap();
        let hits = backend.query(&[1.0, 0.0], 5, &MetadataFilter::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(backend.len().unwrap(), 2);
    }
}
