//! SQLite record store for documents, chunks, tags and provenance

use super::traits::{
    ChunkStore, DocumentStore, KeywordHit, OpenStore, ProvenanceStore, RescanStatus, StoreStats,
};
use crate::config::Config;
use crate::error::{Entity, RagdError, RagdResult};
use crate::id::{ChunkId, DocumentId};
use crate::model::{Chunk, ChunkDraft, DocType, Document, EmbeddingStatus, TagEntry, TagQuery, TagSource};
use crate::provenance::{ProvenanceEntry, ProvenanceRecord, TAG_FIELD};
use crate::validate::validate_batch;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Created-by marker for tags merged in through `upsert_document`
const UPSERT_TAGGER: &str = "ragd";

const DOCUMENT_COLUMNS: &str = "doc_id, source_path, source_hash, title, creators_json, \
     subjects_json, description, date_created, doc_type, language, chunk_count, total_chars, \
     embedding_model, ingestion_date, last_modified, project";

const CHUNK_COLUMNS: &str = "chunk_id, doc_id, sequence_num, char_start, char_end, content, \
     content_hash, pages_json, section_heading, overlap_prev_chars, overlap_next_chars, \
     prev_chunk_id, next_chunk_id, embedding_model, embedding_timestamp, embedding_status";

/// SQLite-backed record store
///
/// Uses a single database file with tables for documents, chunks, tags and
/// the provenance log, plus an FTS5 index over chunk content kept in sync
/// by triggers. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Minimum length for every chunk except the last of a batch
    min_chunk_chars: u64,
}

impl SqliteStore {
    /// Open the store at `config.storage.db_path` with its chunking rules.
    pub fn open_with_config(config: &Config) -> RagdResult<Self> {
        Ok(Self::open(&config.storage.db_path)?.with_min_chunk_chars(config.chunking.min_chunk_chars))
    }

    pub fn with_min_chunk_chars(mut self, min_chunk_chars: u64) -> Self {
        self.min_chunk_chars = min_chunk_chars;
        self
    }

    fn from_connection(conn: Connection) -> RagdResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            min_chunk_chars: 1,
        })
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> RagdResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                source_hash TEXT NOT NULL UNIQUE,
                title TEXT,
                creators_json TEXT NOT NULL,
                subjects_json TEXT NOT NULL,
                description TEXT,
                date_created TEXT,
                doc_type TEXT NOT NULL,
                language TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                total_chars INTEGER NOT NULL,
                embedding_model TEXT NOT NULL,
                ingestion_date TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                project TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_documents_source_path
                ON documents(source_path, ingestion_date);

            CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project);

            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                sequence_num INTEGER NOT NULL,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                pages_json TEXT NOT NULL,
                section_heading TEXT,
                overlap_prev_chars INTEGER NOT NULL,
                overlap_next_chars INTEGER NOT NULL,
                prev_chunk_id TEXT,
                next_chunk_id TEXT,
                embedding_model TEXT,
                embedding_timestamp TEXT,
                embedding_status TEXT NOT NULL DEFAULT 'pending',
                UNIQUE (doc_id, sequence_num),
                FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_status
                ON chunks(embedding_status, doc_id, sequence_num);

            CREATE TABLE IF NOT EXISTS tags (
                entity_id TEXT NOT NULL,
                name TEXT NOT NULL,
                source TEXT NOT NULL,
                confidence REAL,
                confirmed INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                PRIMARY KEY (entity_id, name)
            );

            CREATE TABLE IF NOT EXISTS provenance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                source TEXT NOT NULL,
                confidence REAL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_provenance_entity
                ON provenance(entity_id, id);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                content,
                tokenize = 'unicode61'
            );

            CREATE TRIGGER IF NOT EXISTS chunks_fts_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts (chunk_id, content) VALUES (new.chunk_id, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_fts_ad AFTER DELETE ON chunks BEGIN
                DELETE FROM chunks_fts WHERE chunk_id = old.chunk_id;
            END;

            PRAGMA foreign_keys = ON;

            -- Concurrent reads during ingestion writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    fn load_document(conn: &Connection, id: &str) -> RagdResult<Option<Document>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE doc_id = ?1", DOCUMENT_COLUMNS),
                params![id],
                DocumentRow::from_row,
            )
            .optional()?;
        match row {
            Some(row) => Ok(Some(Self::finish_document(conn, row)?)),
            None => Ok(None),
        }
    }

    fn query_documents(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> RagdResult<Vec<Document>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|row| Self::finish_document(conn, row))
            .collect()
    }

    /// Attach confirmed tags to a loaded row.
    fn finish_document(conn: &Connection, row: DocumentRow) -> RagdResult<Document> {
        let tags = Self::load_tags(conn, &row.doc_id, Some(true))?
            .into_iter()
            .map(|t| t.name)
            .collect();
        row.into_document(tags)
    }

    fn load_chunk(conn: &Connection, id: &ChunkId) -> RagdResult<Option<Chunk>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM chunks WHERE chunk_id = ?1", CHUNK_COLUMNS),
                params![id.to_string()],
                ChunkRow::from_row,
            )
            .optional()?;
        row.map(ChunkRow::into_chunk).transpose()
    }

    fn query_chunks(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> RagdResult<Vec<Chunk>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, ChunkRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ChunkRow::into_chunk).collect()
    }

    fn document_counts(conn: &Connection, doc_id: &DocumentId) -> RagdResult<(u64, u32)> {
        conn.query_row(
            "SELECT total_chars, chunk_count FROM documents WHERE doc_id = ?1",
            params![doc_id.as_str()],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u32)),
        )
        .optional()?
        .ok_or_else(|| RagdError::document_not_found(doc_id))
    }

    fn load_tags(conn: &Connection, entity_id: &str, confirmed: Option<bool>) -> RagdResult<Vec<TagEntry>> {
        let mut sql = String::from(
            "SELECT name, source, confidence, confirmed, created_at, created_by FROM tags WHERE entity_id = ?1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(entity_id.to_string())];
        if let Some(confirmed) = confirmed {
            sql.push_str(" AND confirmed = ?2");
            args.push(Box::new(confirmed));
        }
        sql.push_str(" ORDER BY name");

        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(arg_refs.as_slice(), TagRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TagRow::into_tag).collect()
    }

    /// Insert a tag unless one with the same name exists; true if inserted.
    fn insert_tag(conn: &Connection, entity_id: &str, tag: &TagEntry) -> RagdResult<bool> {
        let rows = conn.execute(
            r#"
            INSERT OR IGNORE INTO tags (entity_id, name, source, confidence, confirmed, created_at, created_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entity_id,
                tag.name,
                tag.source.as_str(),
                tag.confidence,
                tag.confirmed,
                tag.created_at.to_rfc3339(),
                tag.created_by,
            ],
        )?;
        Ok(rows > 0)
    }

    fn insert_provenance(conn: &Connection, record: &ProvenanceRecord) -> RagdResult<ProvenanceEntry> {
        let created_at = Utc::now();
        conn.execute(
            r#"
            INSERT INTO provenance (entity_id, field, value, source, confidence, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.entity_id,
                record.field,
                record.value,
                record.source.as_str(),
                record.confidence,
                record.created_by,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(ProvenanceEntry {
            id: conn.last_insert_rowid(),
            entity_id: record.entity_id.clone(),
            field: record.field.clone(),
            value: record.value.clone(),
            source: record.source,
            confidence: record.confidence,
            created_by: record.created_by.clone(),
            created_at,
        })
    }

    fn count(conn: &Connection, sql: &str) -> RagdResult<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> RagdResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> RagdResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl DocumentStore for SqliteStore {
    fn upsert_document(&self, doc: &Document) -> RagdResult<DocumentId> {
        doc.validate()?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT 1 FROM documents WHERE source_hash = ?1",
                params![doc.source_hash],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        // An existing record keeps its identity, metadata and chunk count;
        // only the modification time and an unset project are refreshed.
        let stored_id: String = tx.query_row(
            r#"
            INSERT INTO documents (doc_id, source_path, source_hash, title, creators_json, subjects_json,
                                   description, date_created, doc_type, language, chunk_count, total_chars,
                                   embedding_model, ingestion_date, last_modified, project)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(source_hash) DO UPDATE SET
                last_modified = excluded.last_modified,
                project = COALESCE(documents.project, excluded.project)
            RETURNING doc_id
            "#,
            params![
                doc.doc_id.as_str(),
                doc.source_path,
                doc.source_hash,
                doc.title,
                serde_json::to_string(&doc.creators)?,
                serde_json::to_string(&doc.subjects)?,
                doc.description,
                doc.date_created.map(|d| d.to_rfc3339()),
                doc.doc_type.as_str(),
                doc.language,
                doc.total_chars as i64,
                doc.embedding_model,
                doc.ingestion_date.to_rfc3339(),
                Utc::now().to_rfc3339(),
                doc.project,
            ],
            |row| row.get(0),
        )?;

        let mut merged = 0;
        for name in &doc.tags {
            if Self::insert_tag(&tx, &stored_id, &TagEntry::manual(name.as_str(), UPSERT_TAGGER)?)? {
                let record = ProvenanceRecord::new(
                    stored_id.as_str(),
                    TAG_FIELD,
                    name.as_str(),
                    TagSource::Manual,
                    None,
                    UPSERT_TAGGER,
                )?;
                Self::insert_provenance(&tx, &record)?;
                merged += 1;
            }
        }
        tx.commit()?;

        let doc_id = DocumentId::parse(stored_id)?;
        debug!(
            doc_id = %doc_id,
            source_path = %doc.source_path,
            existing,
            merged_tags = merged,
            "upserted document"
        );
        Ok(doc_id)
    }

    fn get_document(&self, id: &DocumentId) -> RagdResult<Document> {
        let conn = self.conn.lock().unwrap();
        Self::load_document(&conn, id.as_str())?.ok_or_else(|| RagdError::document_not_found(id))
    }

    fn find_by_source_path(&self, path: &str) -> RagdResult<Document> {
        self.list_versions(path)?
            .into_iter()
            .next()
            .ok_or_else(|| RagdError::NotFound(Entity::Document, path.to_string()))
    }

    fn list_versions(&self, path: &str) -> RagdResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        Self::query_documents(
            &conn,
            &format!(
                "SELECT {} FROM documents WHERE source_path = ?1 ORDER BY ingestion_date DESC, doc_id DESC",
                DOCUMENT_COLUMNS
            ),
            &[&path],
        )
    }

    fn classify_rescan(&self, path: &str, source_hash: &str) -> RagdResult<RescanStatus> {
        match self.find_by_source_path(path) {
            Ok(doc) if doc.source_hash == source_hash => Ok(RescanStatus::Unchanged(doc)),
            Ok(previous) => Ok(RescanStatus::Changed { previous }),
            Err(e) if e.is_not_found() => Ok(RescanStatus::New),
            Err(e) => Err(e),
        }
    }

    fn list_documents(&self, filter: Option<&TagQuery>) -> RagdResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let docs = Self::query_documents(
            &conn,
            &format!(
                "SELECT {} FROM documents ORDER BY ingestion_date, doc_id",
                DOCUMENT_COLUMNS
            ),
            &[],
        )?;
        Ok(match filter {
            Some(query) => docs.into_iter().filter(|d| query.matches(&d.tags)).collect(),
            None => docs,
        })
    }

    fn set_embedding_model(&self, id: &DocumentId, model: &str) -> RagdResult<u32> {
        if model.trim().is_empty() {
            return Err(RagdError::InvalidArgument("embedding_model is empty".into()));
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE documents SET embedding_model = ?1, last_modified = ?2 WHERE doc_id = ?3",
            params![model, Utc::now().to_rfc3339(), id.as_str()],
        )?;
        if updated == 0 {
            return Err(RagdError::document_not_found(id));
        }
        let reset = tx.execute(
            r#"
            UPDATE chunks SET embedding_status = 'pending'
            WHERE doc_id = ?1
              AND (embedding_model IS NULL OR embedding_model != ?2)
              AND embedding_status != 'pending'
            "#,
            params![id.as_str(), model],
        )?;
        tx.commit()?;

        info!(doc_id = %id, model, reset, "switched embedding model");
        Ok(reset as u32)
    }

    fn purge_document(&self, id: &DocumentId) -> RagdResult<u32> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM documents WHERE doc_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(RagdError::document_not_found(id));
        }

        tx.execute(
            "DELETE FROM tags WHERE entity_id = ?1 OR entity_id IN (SELECT chunk_id FROM chunks WHERE doc_id = ?1)",
            params![id.as_str()],
        )?;
        let chunks = tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![id.as_str()])?;
        tx.execute("DELETE FROM documents WHERE doc_id = ?1", params![id.as_str()])?;
        tx.commit()?;

        info!(doc_id = %id, chunks, "purged document");
        Ok(chunks as u32)
    }
}

impl ChunkStore for SqliteStore {
    fn insert_chunks(&self, doc_id: &DocumentId, drafts: &[ChunkDraft]) -> RagdResult<Vec<ChunkId>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (total_chars, chunk_count) = Self::document_counts(&tx, doc_id)?;
        if chunk_count > 0 {
            return Err(RagdError::AlreadyChunked(doc_id.clone()));
        }
        validate_batch(drafts, total_chars, self.min_chunk_chars)?;

        let total = drafts.len() as u32;
        let mut ids = Vec::with_capacity(drafts.len());
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO chunks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, 'pending')",
                CHUNK_COLUMNS
            ))?;
            for draft in drafts {
                let chunk = Chunk::from_draft(doc_id, draft, total);
                stmt.execute(params![
                    chunk.chunk_id.to_string(),
                    doc_id.as_str(),
                    chunk.sequence_num,
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    chunk.content,
                    chunk.content_hash,
                    serde_json::to_string(&chunk.page_numbers)?,
                    chunk.section_heading,
                    chunk.overlap_prev_chars as i64,
                    chunk.overlap_next_chars as i64,
                    chunk.prev_chunk_id.as_ref().map(ChunkId::to_string),
                    chunk.next_chunk_id.as_ref().map(ChunkId::to_string),
                ])?;
                ids.push(chunk.chunk_id);
            }
        }
        tx.execute(
            "UPDATE documents SET chunk_count = ?1, last_modified = ?2 WHERE doc_id = ?3",
            params![total, Utc::now().to_rfc3339(), doc_id.as_str()],
        )?;
        tx.commit()?;

        debug!(doc_id = %doc_id, chunks = total, "inserted chunk batch");
        Ok(ids)
    }

    fn get_chunk(&self, id: &ChunkId) -> RagdResult<Chunk> {
        let conn = self.conn.lock().unwrap();
        Self::load_chunk(&conn, id)?.ok_or_else(|| RagdError::chunk_not_found(id))
    }

    fn get_chunks_in_range(
        &self,
        doc_id: &DocumentId,
        start_seq: u32,
        end_seq: u32,
    ) -> RagdResult<Vec<Chunk>> {
        if start_seq > end_seq {
            return Err(RagdError::InvalidArgument(format!(
                "start_seq {} is greater than end_seq {}",
                start_seq, end_seq
            )));
        }
        let conn = self.conn.lock().unwrap();
        let (_, chunk_count) = Self::document_counts(&conn, doc_id)?;
        if end_seq >= chunk_count {
            return Err(RagdError::OutOfRange {
                doc_id: doc_id.clone(),
                start_seq,
                end_seq,
                chunk_count,
            });
        }
        Self::query_chunks(
            &conn,
            &format!(
                "SELECT {} FROM chunks WHERE doc_id = ?1 AND sequence_num BETWEEN ?2 AND ?3 ORDER BY sequence_num",
                CHUNK_COLUMNS
            ),
            &[&doc_id.as_str(), &start_seq, &end_seq],
        )
    }

    fn chunks_for_document(&self, doc_id: &DocumentId) -> RagdResult<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        Self::document_counts(&conn, doc_id)?;
        Self::query_chunks(
            &conn,
            &format!(
                "SELECT {} FROM chunks WHERE doc_id = ?1 ORDER BY sequence_num",
                CHUNK_COLUMNS
            ),
            &[&doc_id.as_str()],
        )
    }

    fn chunk_count(&self, doc_id: &DocumentId) -> RagdResult<u32> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::document_counts(&conn, doc_id)?.1)
    }

    fn update_embedding_metadata(
        &self,
        id: &ChunkId,
        model: &str,
        timestamp: DateTime<Utc>,
    ) -> RagdResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE chunks
            SET embedding_model = ?1, embedding_timestamp = ?2, embedding_status = 'complete'
            WHERE chunk_id = ?3
            "#,
            params![model, timestamp.to_rfc3339(), id.to_string()],
        )?;
        if rows == 0 {
            return Err(RagdError::chunk_not_found(id));
        }
        Ok(())
    }

    fn chunks_by_status(&self, status: EmbeddingStatus, limit: usize) -> RagdResult<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        Self::query_chunks(
            &conn,
            &format!(
                "SELECT {} FROM chunks WHERE embedding_status = ?1 ORDER BY doc_id, sequence_num LIMIT ?2",
                CHUNK_COLUMNS
            ),
            &[&status.as_str(), &(limit as i64)],
        )
    }

    fn keyword_search(&self, query: &str, limit: usize) -> RagdResult<Vec<KeywordHit>> {
        // Each term is quoted so user input never reaches FTS5 query syntax.
        let match_expr = query
            .split_whitespace()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" ");
        if match_expr.is_empty() {
            return Err(RagdError::InvalidArgument("keyword query is empty".into()));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT chunk_id, rank FROM chunks_fts
            WHERE chunks_fts MATCH ?1
            ORDER BY rank, chunk_id
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(chunk_id, rank)| {
                Ok(KeywordHit {
                    chunk_id: ChunkId::parse(&chunk_id)?,
                    // negate so higher = better
                    score: -rank,
                })
            })
            .collect()
    }

    fn stats(&self) -> RagdResult<StoreStats> {
        let conn = self.conn.lock().unwrap();
        Ok(StoreStats {
            documents: Self::count(&conn, "SELECT COUNT(*) FROM documents")?,
            chunks: Self::count(&conn, "SELECT COUNT(*) FROM chunks")?,
            pending_chunks: Self::count(
                &conn,
                "SELECT COUNT(*) FROM chunks WHERE embedding_status = 'pending'",
            )?,
            complete_chunks: Self::count(
                &conn,
                "SELECT COUNT(*) FROM chunks WHERE embedding_status = 'complete'",
            )?,
            tags: Self::count(&conn, "SELECT COUNT(*) FROM tags")?,
            provenance_entries: Self::count(&conn, "SELECT COUNT(*) FROM provenance")?,
        })
    }
}

impl ProvenanceStore for SqliteStore {
    fn append_provenance(&self, record: &ProvenanceRecord) -> RagdResult<ProvenanceEntry> {
        let conn = self.conn.lock().unwrap();
        Self::insert_provenance(&conn, record)
    }

    fn append_with_tag(&self, record: &ProvenanceRecord, tag: &TagEntry) -> RagdResult<ProvenanceEntry> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = Self::insert_tag(&tx, &record.entity_id, tag)?;
        let entry = Self::insert_provenance(&tx, record)?;
        tx.commit()?;

        debug!(entity_id = %record.entity_id, tag = %tag.name, inserted, "recorded tag");
        Ok(entry)
    }

    fn confirm_tag(
        &self,
        entity_id: &str,
        name: &str,
        record: &ProvenanceRecord,
    ) -> RagdResult<ProvenanceEntry> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let confirmed: Option<bool> = tx
            .query_row(
                "SELECT confirmed FROM tags WHERE entity_id = ?1 AND name = ?2",
                params![entity_id, name],
                |row| row.get(0),
            )
            .optional()?;
        match confirmed {
            None => {
                return Err(RagdError::NotFound(
                    Entity::Tag,
                    format!("{} on {}", name, entity_id),
                ))
            }
            Some(true) => {
                return Err(RagdError::AlreadyConfirmed {
                    entity_id: entity_id.to_string(),
                    tag: name.to_string(),
                })
            }
            Some(false) => {}
        }

        tx.execute(
            "UPDATE tags SET confirmed = 1 WHERE entity_id = ?1 AND name = ?2",
            params![entity_id, name],
        )?;
        let entry = Self::insert_provenance(&tx, record)?;
        tx.commit()?;

        info!(entity_id, tag = name, "confirmed tag");
        Ok(entry)
    }

    fn get_tag(&self, entity_id: &str, name: &str) -> RagdResult<Option<TagEntry>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, source, confidence, confirmed, created_at, created_by FROM tags WHERE entity_id = ?1 AND name = ?2",
                params![entity_id, name],
                TagRow::from_row,
            )
            .optional()?;
        row.map(TagRow::into_tag).transpose()
    }

    fn list_tags(&self, entity_id: &str, confirmed: Option<bool>) -> RagdResult<Vec<TagEntry>> {
        let conn = self.conn.lock().unwrap();
        Self::load_tags(&conn, entity_id, confirmed)
    }

    fn provenance_page(
        &self,
        entity_id: &str,
        after_id: i64,
        limit: usize,
    ) -> RagdResult<Vec<ProvenanceEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, entity_id, field, value, source, confidence, created_by, created_at
            FROM provenance
            WHERE entity_id = ?1 AND id > ?2
            ORDER BY id
            LIMIT ?3
            "#,
        )?;
        let rows = stmt
            .query_map(params![entity_id, after_id, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, entity_id, field, value, source, confidence, created_by, created_at)| {
                Ok(ProvenanceEntry {
                    id,
                    entity_id,
                    field,
                    value,
                    source: source.parse()?,
                    confidence,
                    created_by,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

fn parse_timestamp(s: &str) -> RagdResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| RagdError::DateParse(e.to_string()))?
        .with_timezone(&Utc))
}

/// Raw document columns, converted outside the rusqlite row closure
struct DocumentRow {
    doc_id: String,
    source_path: String,
    source_hash: String,
    title: Option<String>,
    creators_json: String,
    subjects_json: String,
    description: Option<String>,
    date_created: Option<String>,
    doc_type: String,
    language: String,
    chunk_count: i64,
    total_chars: i64,
    embedding_model: String,
    ingestion_date: String,
    last_modified: String,
    project: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            doc_id: row.get("doc_id")?,
            source_path: row.get("source_path")?,
            source_hash: row.get("source_hash")?,
            title: row.get("title")?,
            creators_json: row.get("creators_json")?,
            subjects_json: row.get("subjects_json")?,
            description: row.get("description")?,
            date_created: row.get("date_created")?,
            doc_type: row.get("doc_type")?,
            language: row.get("language")?,
            chunk_count: row.get("chunk_count")?,
            total_chars: row.get("total_chars")?,
            embedding_model: row.get("embedding_model")?,
            ingestion_date: row.get("ingestion_date")?,
            last_modified: row.get("last_modified")?,
            project: row.get("project")?,
        })
    }

    fn into_document(self, tags: std::collections::BTreeSet<String>) -> RagdResult<Document> {
        Ok(Document {
            doc_id: DocumentId::parse(self.doc_id)?,
            source_path: self.source_path,
            source_hash: self.source_hash,
            title: self.title,
            creators: serde_json::from_str(&self.creators_json)?,
            subjects: serde_json::from_str(&self.subjects_json)?,
            description: self.description,
            date_created: self.date_created.as_deref().map(parse_timestamp).transpose()?,
            doc_type: DocType::from(self.doc_type),
            language: self.language,
            chunk_count: self.chunk_count as u32,
            total_chars: self.total_chars as u64,
            embedding_model: self.embedding_model,
            ingestion_date: parse_timestamp(&self.ingestion_date)?,
            last_modified: parse_timestamp(&self.last_modified)?,
            tags,
            project: self.project,
        })
    }
}

struct ChunkRow {
    chunk_id: String,
    sequence_num: i64,
    char_start: i64,
    char_end: i64,
    content: String,
    content_hash: String,
    pages_json: String,
    section_heading: Option<String>,
    overlap_prev_chars: i64,
    overlap_next_chars: i64,
    prev_chunk_id: Option<String>,
    next_chunk_id: Option<String>,
    embedding_model: Option<String>,
    embedding_timestamp: Option<String>,
    embedding_status: String,
}

impl ChunkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chunk_id: row.get("chunk_id")?,
            sequence_num: row.get("sequence_num")?,
            char_start: row.get("char_start")?,
            char_end: row.get("char_end")?,
            content: row.get("content")?,
            content_hash: row.get("content_hash")?,
            pages_json: row.get("pages_json")?,
            section_heading: row.get("section_heading")?,
            overlap_prev_chars: row.get("overlap_prev_chars")?,
            overlap_next_chars: row.get("overlap_next_chars")?,
            prev_chunk_id: row.get("prev_chunk_id")?,
            next_chunk_id: row.get("next_chunk_id")?,
            embedding_model: row.get("embedding_model")?,
            embedding_timestamp: row.get("embedding_timestamp")?,
            embedding_status: row.get("embedding_status")?,
        })
    }

    fn into_chunk(self) -> RagdResult<Chunk> {
        let chunk_id = ChunkId::parse(&self.chunk_id)?;
        Ok(Chunk {
            doc_id: chunk_id.doc_id().clone(),
            chunk_id,
            sequence_num: self.sequence_num as u32,
            char_start: self.char_start as u64,
            char_end: self.char_end as u64,
            content: self.content,
            content_hash: self.content_hash,
            page_numbers: serde_json::from_str(&self.pages_json)?,
            section_heading: self.section_heading,
            overlap_prev_chars: self.overlap_prev_chars as u64,
            overlap_next_chars: self.overlap_next_chars as u64,
            prev_chunk_id: self.prev_chunk_id.as_deref().map(ChunkId::parse).transpose()?,
            next_chunk_id: self.next_chunk_id.as_deref().map(ChunkId::parse).transpose()?,
            embedding_model: self.embedding_model,
            embedding_timestamp: self.embedding_timestamp.as_deref().map(parse_timestamp).transpose()?,
            embedding_status: self.embedding_status.parse()?,
        })
    }
}

struct TagRow {
    name: String,
    source: String,
    confidence: Option<f64>,
    confirmed: bool,
    created_at: String,
    created_by: String,
}

impl TagRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            source: row.get(1)?,
            confidence: row.get(2)?,
            confirmed: row.get(3)?,
            created_at: row.get(4)?,
            created_by: row.get(5)?,
        })
    }

    fn into_tag(self) -> RagdResult<TagEntry> {
        let source: TagSource = self.source.parse()?;
        Ok(TagEntry {
            name: self.name,
            source,
            confidence: self.confidence,
            confirmed: self.confirmed,
            created_at: parse_timestamp(&self.created_at)?,
            created_by: self.created_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    /// "alpha beta gamma delta" chunked into three overlapping pieces.
    const TEXT: &str = "alpha beta gamma delta";

    fn create_test_document() -> Document {
        Document::from_text("notes/greek.txt", TEXT, "nomic-embed-text-v1.5").with_title("Greek")
    }

    fn create_test_drafts() -> Vec<ChunkDraft> {
        vec![
            ChunkDraft::new(0, 0, "alpha beta").with_overlap(0, 4),
            ChunkDraft::new(1, 6, "beta gamma").with_overlap(4, 5),
            ChunkDraft::new(2, 11, "gamma delta").with_overlap(5, 0),
        ]
    }

    fn store_with_chunks() -> (SqliteStore, DocumentId) {
        let store = create_test_store();
        let doc_id = store.upsert_document(&create_test_document()).unwrap();
        store.insert_chunks(&doc_id, &create_test_drafts()).unwrap();
        (store, doc_id)
    }

    // ========================================================================
    // Documents
    // ========================================================================

    #[test]
    fn test_upsert_is_idempotent_on_source_hash() {
        let store = create_test_store();
        let doc = create_test_document();
        let first = store.upsert_document(&doc).unwrap();

        let mut again = doc.clone();
        again.doc_id = DocumentId::random();
        again.title = Some("Renamed".into());
        let second = store.upsert_document(&again).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.list_documents(None).unwrap().len(), 1);
        assert_eq!(store.get_document(&first).unwrap().title.as_deref(), Some("Greek"));
    }

    #[test]
    fn test_upsert_merges_tags_as_confirmed() {
        let store = create_test_store();
        let id = store.upsert_document(&create_test_document().with_tag("finance")).unwrap();
        store
            .upsert_document(&create_test_document().with_tag("q3-2024"))
            .unwrap();

        let doc = store.get_document(&id).unwrap();
        assert_eq!(doc.tags.iter().cloned().collect::<Vec<_>>(), vec!["finance", "q3-2024"]);
        let tag = store.get_tag(id.as_str(), "finance").unwrap().unwrap();
        assert_eq!(tag.source, TagSource::Manual);
        assert!(tag.confirmed);
    }

    #[test]
    fn test_upsert_logs_provenance_for_new_tags_only() {
        let store = create_test_store();
        let id = store.upsert_document(&create_test_document().with_tag("finance")).unwrap();
        store
            .upsert_document(&create_test_document().with_tag("finance").with_tag("q3-2024"))
            .unwrap();

        let log = store.provenance_page(id.as_str(), 0, 10).unwrap();
        let values: Vec<&str> = log.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["finance", "q3-2024"]);
        assert!(log.iter().all(|e| e.field == TAG_FIELD
            && e.source == TagSource::Manual
            && e.created_by == UPSERT_TAGGER));
    }

    #[test]
    fn test_document_roundtrips_metadata() {
        let store = create_test_store();
        let date = DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let doc = create_test_document()
            .with_creator("Ada Lovelace")
            .with_creator("Charles Babbage")
            .with_subject("history")
            .with_date_created(date)
            .with_project("alpha");
        let id = store.upsert_document(&doc).unwrap();

        let loaded = store.get_document(&id).unwrap();
        assert_eq!(loaded.creators, doc.creators);
        assert_eq!(loaded.subjects, doc.subjects);
        assert_eq!(loaded.date_created, Some(date));
        assert_eq!(loaded.doc_type, DocType::Text);
        assert_eq!(loaded.project.as_deref(), Some("alpha"));
        assert_eq!(loaded.total_chars, TEXT.chars().count() as u64);
    }

    #[test]
    fn test_get_missing_document_is_not_found() {
        let store = create_test_store();
        let err = store.get_document(&DocumentId::random()).unwrap_err();
        assert!(matches!(err, RagdError::NotFound(Entity::Document, _)));
    }

    #[test]
    fn test_changed_content_at_same_path_keeps_history() {
        let store = create_test_store();
        let v1 = Document::from_text("report.md", "first draft", "m");
        let v1_id = store.upsert_document(&v1).unwrap();

        let v2 = Document::from_text("report.md", "second draft", "m");
        match store.classify_rescan("report.md", &v2.source_hash).unwrap() {
            RescanStatus::Changed { previous } => assert_eq!(previous.doc_id, v1_id),
            other => panic!("expected Changed, got {:?}", other),
        }
        let v2_id = store.upsert_document(&v2).unwrap();
        assert_ne!(v1_id, v2_id);

        let versions = store.list_versions("report.md").unwrap();
        assert_eq!(versions.len(), 2);
        assert!(matches!(
            store.classify_rescan("report.md", &v2.source_hash).unwrap(),
            RescanStatus::Unchanged(_)
        ));
        assert_eq!(store.classify_rescan("other.md", "x").unwrap(), RescanStatus::New);
    }

    #[test]
    fn test_list_documents_filters_on_confirmed_tags_only() {
        let store = create_test_store();
        let tagged = store
            .upsert_document(&Document::from_text("a.txt", "a", "m").with_tag("finance"))
            .unwrap();
        let suggested = store.upsert_document(&Document::from_text("b.txt", "b", "m")).unwrap();
        let record = ProvenanceRecord::new(suggested.as_str(), "tag", "finance", TagSource::AutoLlm, Some(0.9), "llama3")
            .unwrap();
        let tag = TagEntry::new("finance", TagSource::AutoLlm, Some(0.9), "llama3").unwrap();
        store.append_with_tag(&record, &tag).unwrap();

        let query = TagQuery::new().all(["finance"]);
        let docs = store.list_documents(Some(&query)).unwrap();
        assert_eq!(docs.iter().map(|d| d.doc_id.clone()).collect::<Vec<_>>(), vec![tagged]);
    }

    // ========================================================================
    // Chunks
    // ========================================================================

    #[test]
    fn test_insert_chunks_links_and_counts() {
        let (store, doc_id) = store_with_chunks();
        assert_eq!(store.get_document(&doc_id).unwrap().chunk_count, 3);

        let middle = store.get_chunk(&ChunkId::new(&doc_id, 1)).unwrap();
        assert_eq!(middle.prev_chunk_id, Some(ChunkId::new(&doc_id, 0)));
        assert_eq!(middle.next_chunk_id, Some(ChunkId::new(&doc_id, 2)));
        assert_eq!(middle.embedding_status, EmbeddingStatus::Pending);
        assert_eq!(middle.content_hash, crate::model::content_hash("beta gamma"));
    }

    #[test]
    fn test_second_batch_is_rejected() {
        let (store, doc_id) = store_with_chunks();
        let err = store.insert_chunks(&doc_id, &create_test_drafts()).unwrap_err();
        assert!(matches!(err, RagdError::AlreadyChunked(_)));
    }

    #[test]
    fn test_invalid_batch_writes_nothing() {
        let store = create_test_store();
        let doc_id = store.upsert_document(&create_test_document()).unwrap();
        let mut drafts = create_test_drafts();
        drafts[1].overlap_prev_chars = 3;

        let err = store.insert_chunks(&doc_id, &drafts).unwrap_err();
        assert!(matches!(err, RagdError::ChunkConsistency { index: 1, .. }));
        assert_eq!(store.chunk_count(&doc_id).unwrap(), 0);
        assert_eq!(store.stats().unwrap().chunks, 0);
    }

    #[test]
    fn test_insert_chunks_for_missing_document() {
        let store = create_test_store();
        let err = store.insert_chunks(&DocumentId::random(), &create_test_drafts()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_minimum_chunk_length_from_store_setting() {
        let store = create_test_store().with_min_chunk_chars(11);
        let doc_id = store.upsert_document(&create_test_document()).unwrap();
        let err = store.insert_chunks(&doc_id, &create_test_drafts()).unwrap_err();
        assert!(matches!(err, RagdError::ChunkConsistency { index: 0, .. }));
    }

    #[test]
    fn test_range_is_inclusive_and_bounded() {
        let (store, doc_id) = store_with_chunks();
        let chunks = store.get_chunks_in_range(&doc_id, 1, 2).unwrap();
        assert_eq!(chunks.iter().map(|c| c.sequence_num).collect::<Vec<_>>(), vec![1, 2]);

        assert!(matches!(
            store.get_chunks_in_range(&doc_id, 0, 3).unwrap_err(),
            RagdError::OutOfRange { chunk_count: 3, .. }
        ));
        assert!(matches!(
            store.get_chunks_in_range(&doc_id, 2, 1).unwrap_err(),
            RagdError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_context_window_clamps_to_document() {
        let (store, doc_id) = store_with_chunks();
        let window = store.context_window(&ChunkId::new(&doc_id, 0), 2, 1).unwrap();
        assert_eq!(window.iter().map(|c| c.sequence_num).collect::<Vec<_>>(), vec![0, 1]);
        let window = store.context_window(&ChunkId::new(&doc_id, 2), 1, 5).unwrap();
        assert_eq!(window.iter().map(|c| c.sequence_num).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_embedding_metadata_completes_chunk() {
        let (store, doc_id) = store_with_chunks();
        let id = ChunkId::new(&doc_id, 0);
        let before = store.get_chunk(&id).unwrap();
        store.update_embedding_metadata(&id, "nomic-embed-text-v1.5", Utc::now()).unwrap();

        let after = store.get_chunk(&id).unwrap();
        assert_eq!(after.embedding_status, EmbeddingStatus::Complete);
        assert_eq!(after.embedding_model.as_deref(), Some("nomic-embed-text-v1.5"));
        assert_eq!(after.content, before.content);
        assert_eq!(after.char_start, before.char_start);
        assert_eq!(store.pending_chunks(&doc_id).unwrap().len(), 2);
        assert_eq!(store.chunks_by_status(EmbeddingStatus::Complete, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_model_switch_resets_chunks_to_pending() {
        let (store, doc_id) = store_with_chunks();
        for seq in 0..3 {
            store
                .update_embedding_metadata(&ChunkId::new(&doc_id, seq), "nomic-embed-text-v1.5", Utc::now())
                .unwrap();
        }
        let reset = store.set_embedding_model(&doc_id, "bge-small-en-v1.5").unwrap();
        assert_eq!(reset, 3);
        assert_eq!(store.get_document(&doc_id).unwrap().embedding_model, "bge-small-en-v1.5");
        assert_eq!(store.pending_chunks(&doc_id).unwrap().len(), 3);
    }

    #[test]
    fn test_keyword_search_uses_fts() {
        let (store, doc_id) = store_with_chunks();
        let hits = store.keyword_search("gamma", 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.sequence_num()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1) && ids.contains(&2));
        assert!(hits.iter().all(|h| h.chunk_id.doc_id() == &doc_id));

        // FTS syntax characters are treated as literal terms
        assert!(store.keyword_search("\"alpha OR", 10).unwrap().is_empty());
    }

    #[test]
    fn test_purge_removes_everything_in_one_step() {
        let (store, doc_id) = store_with_chunks();
        let removed = store.purge_document(&doc_id).unwrap();
        assert_eq!(removed, 3);
        assert!(store.get_document(&doc_id).unwrap_err().is_not_found());
        assert!(store.keyword_search("gamma", 10).unwrap().is_empty());
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    // ========================================================================
    // Tags and provenance
    // ========================================================================

    #[test]
    fn test_confirm_tag_distinguishes_missing_and_confirmed() {
        let store = create_test_store();
        let record = ProvenanceRecord::new("doc-1", "tag.confirmed", "finance", TagSource::Manual, None, "alice").unwrap();
        assert!(matches!(
            store.confirm_tag("doc-1", "finance", &record).unwrap_err(),
            RagdError::NotFound(Entity::Tag, _)
        ));

        let suggestion = TagEntry::new("finance", TagSource::AutoNer, Some(0.7), "spacy").unwrap();
        let applied = ProvenanceRecord::new("doc-1", "tag", "finance", TagSource::AutoNer, Some(0.7), "spacy").unwrap();
        store.append_with_tag(&applied, &suggestion).unwrap();
        store.confirm_tag("doc-1", "finance", &record).unwrap();
        assert!(matches!(
            store.confirm_tag("doc-1", "finance", &record).unwrap_err(),
            RagdError::AlreadyConfirmed { .. }
        ));
    }

    #[test]
    fn test_provenance_pages_by_id() {
        let store = create_test_store();
        for i in 0..5 {
            let record = ProvenanceRecord::new("doc-1", "title", format!("v{}", i), TagSource::Imported, Some(1.0), "zotero")
                .unwrap();
            store.append_provenance(&record).unwrap();
        }
        let first = store.provenance_page("doc-1", 0, 2).unwrap();
        assert_eq!(first.iter().map(|e| e.value.as_str()).collect::<Vec<_>>(), vec!["v0", "v1"]);
        let rest = store.provenance_page("doc-1", first[1].id, 10).unwrap();
        assert_eq!(rest.len(), 3);
        assert!(store.provenance_page("doc-2", 0, 10).unwrap().is_empty());
    }

    // ========================================================================
    // Connection behaviour
    // ========================================================================

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_reopen_keeps_project() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ragd.db");
        let id = {
            let store = SqliteStore::open(&db_path).unwrap();
            store.upsert_document(&create_test_document().with_project("alpha")).unwrap()
        };
        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.get_document(&id).unwrap().project.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_concurrent_upserts_of_same_hash_produce_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("concurrent.db");
        let stores: Vec<_> = (0..4).map(|_| SqliteStore::open(&db_path).unwrap()).collect();

        let ids: Vec<DocumentId> = std::thread::scope(|s| {
            let handles: Vec<_> = stores
                .iter()
                .map(|store| s.spawn(move || store.upsert_document(&create_test_document()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(stores[0].list_documents(None).unwrap().len(), 1);
    }
}
