//! `SQLite` store implementation.
//!
//! Single-connection store in WAL mode with foreign keys on. Session
//! appends happen inside one statement so a turn's write is atomic.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::core::{CatalogDevice, ChunkKind, CorpusChunk, Session, SessionRecord};
use crate::error::{Result, StorageError};
use crate::fda::Endpoint;
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::{Path, PathBuf};

/// Store statistics for the `status` command.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    /// Catalog device rows.
    pub device_count: usize,
    /// Corpus chunks.
    pub corpus_chunk_count: usize,
    /// Corpus chunks with a stored embedding.
    pub embedded_chunk_count: usize,
    /// Stored sessions.
    pub session_count: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes (if applicable).
    pub db_size: Option<u64>,
}

/// SQLite-backed store for the catalog, corpus and sessions.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Creates an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        Ok(Self { conn, path: None })
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Initializes the schema. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails or the database was
    /// written by a newer version.
    pub fn init(&mut self) -> Result<()> {
        let is_init: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;

        if is_init == 0 {
            self.conn
                .execute_batch(SCHEMA_SQL)
                .map_err(StorageError::from)?;
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        } else if let Some(version) = self.schema_version()?
            && version > CURRENT_SCHEMA_VERSION
        {
            return Err(StorageError::Migration(format!(
                "database schema v{version} is newer than supported v{CURRENT_SCHEMA_VERSION}"
            ))
            .into());
        }

        Ok(())
    }

    /// Checks if the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    pub fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    /// Deletes all stored data, preserving the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub fn reset(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r"
            DELETE FROM corpus_embeddings;
            DELETE FROM corpus_chunks;
            DELETE FROM devices;
            DELETE FROM sessions;
        ",
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn schema_version(&self) -> Result<Option<u32>> {
        let version: Option<String> = self
            .conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;
        Ok(version.and_then(|v| v.parse().ok()))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StorageError::from)?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    // ==================== Catalog Operations ====================

    /// Inserts catalog devices in one transaction. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails (the whole batch rolls back).
    pub fn insert_devices(&mut self, devices: &[CatalogDevice]) -> Result<usize> {
        let now = Self::now();
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        {
            let mut stmt = tx
                .prepare(
                    r"
                INSERT INTO devices (
                    brand_name, company_name, description, product_code,
                    gmdn_term, identifier, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
                )
                .map_err(StorageError::from)?;
            for device in devices {
                stmt.execute(params![
                    device.brand_name,
                    device.company_name,
                    device.description,
                    device.product_code,
                    device.gmdn_term,
                    device.identifier,
                    now,
                ])
                .map_err(StorageError::from)?;
            }
        }
        tx.commit().map_err(StorageError::from)?;
        Ok(devices.len())
    }

    /// Exact case-insensitive brand-name lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn devices_by_brand_exact(&self, brand: &str) -> Result<Vec<CatalogDevice>> {
        self.query_devices(
            "SELECT id, brand_name, company_name, description, product_code, gmdn_term, identifier
             FROM devices WHERE brand_name = ? COLLATE NOCASE",
            params![brand],
        )
    }

    /// Direct product-code lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn devices_by_product_code(&self, code: &str) -> Result<Vec<CatalogDevice>> {
        self.query_devices(
            "SELECT id, brand_name, company_name, description, product_code, gmdn_term, identifier
             FROM devices WHERE product_code = ?",
            params![code.to_ascii_uppercase()],
        )
    }

    /// Full-text search over brand, company and description.
    ///
    /// Returns `(device, score)` pairs, higher score = better match.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_devices(&self, query: &str, limit: usize) -> Result<Vec<(CatalogDevice, f64)>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT d.id, d.brand_name, d.company_name, d.description,
                       d.product_code, d.gmdn_term, d.identifier,
                       -bm25(devices_fts) as score
                FROM devices_fts
                JOIN devices d ON d.id = devices_fts.rowid
                WHERE devices_fts MATCH ?
                ORDER BY score DESC
                LIMIT ?
            ",
            )
            .map_err(StorageError::from)?;

        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok((
                    CatalogDevice {
                        id: Some(row.get(0)?),
                        brand_name: row.get(1)?,
                        company_name: row.get(2)?,
                        description: row.get(3)?,
                        product_code: row.get(4)?,
                        gmdn_term: row.get(5)?,
                        identifier: row.get(6)?,
                    },
                    row.get::<_, f64>(7)?,
                ))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(rows)
    }

    /// Distinct brand names for the fuzzy match stage, capped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn distinct_brands(&self, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT brand_name FROM devices LIMIT ?")
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get(0))
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    /// Catalog row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn device_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    fn query_devices<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<CatalogDevice>> {
        let mut stmt = self.conn.prepare(sql).map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(CatalogDevice {
                    id: Some(row.get(0)?),
                    brand_name: row.get(1)?,
                    company_name: row.get(2)?,
                    description: row.get(3)?,
                    product_code: row.get(4)?,
                    gmdn_term: row.get(5)?,
                    identifier: row.get(6)?,
                })
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    // ==================== Corpus Operations ====================

    /// Inserts corpus chunks, assigning their ids in place.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails (the whole batch rolls back).
    pub fn insert_corpus_chunks(&mut self, chunks: &mut [CorpusChunk]) -> Result<()> {
        let now = Self::now();
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO corpus_chunks (endpoint, kind, fields, text, created_at)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .map_err(StorageError::from)?;
            for chunk in chunks.iter_mut() {
                let fields_json =
                    serde_json::to_string(&chunk.fields).map_err(StorageError::from)?;
                let kind_json = serde_json::to_string(&chunk.kind)
                    .map_err(StorageError::from)?
                    .trim_matches('"')
                    .to_string();
                stmt.execute(params![
                    chunk.endpoint_label(),
                    kind_json,
                    fields_json,
                    chunk.text,
                    now,
                ])
                .map_err(StorageError::from)?;
                chunk.id = Some(tx.last_insert_rowid());
            }
        }
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// BM25 search over the corpus, optionally restricted to endpoint
    /// labels. Returns `(chunk_id, score)`, higher = better.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn corpus_search_fts(
        &self,
        query: &str,
        limit: usize,
        endpoints: Option<&[&str]>,
    ) -> Result<Vec<(i64, f64)>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT c.id, -bm25(corpus_fts) as score
            FROM corpus_fts
            JOIN corpus_chunks c ON c.id = corpus_fts.rowid
            WHERE corpus_fts MATCH ?
        ",
        );
        let mut bindings: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(fts_query)];
        if let Some(labels) = endpoints
            && !labels.is_empty()
        {
            let placeholders = vec!["?"; labels.len()].join(", ");
            sql.push_str(&format!(" AND c.endpoint IN ({placeholders})"));
            bindings.extend(
                labels
                    .iter()
                    .map(|l| rusqlite::types::Value::Text((*l).to_string())),
            );
        }
        sql.push_str(" ORDER BY score DESC LIMIT ?");
        bindings.push(rusqlite::types::Value::Integer(limit as i64));

        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params_from_iter(bindings.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    /// Loads one corpus chunk by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn corpus_chunk(&self, id: i64) -> Result<Option<CorpusChunk>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, endpoint, kind, fields, text FROM corpus_chunks WHERE id = ?",
                params![id],
                Self::row_to_chunk,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }

    /// Loads all chunks carrying an endpoint label.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn corpus_chunks_for_endpoint(&self, label: &str) -> Result<Vec<CorpusChunk>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, endpoint, kind, fields, text FROM corpus_chunks WHERE endpoint = ?",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![label], Self::row_to_chunk)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<CorpusChunk> {
        let endpoint_label: String = row.get(1)?;
        let kind_label: String = row.get(2)?;
        let fields_json: String = row.get(3)?;
        Ok(CorpusChunk {
            id: Some(row.get(0)?),
            endpoint: endpoint_label.parse::<Endpoint>().ok(),
            kind: serde_json::from_str(&format!("\"{kind_label}\""))
                .unwrap_or(ChunkKind::Overview),
            fields: serde_json::from_str(&fields_json).unwrap_or_default(),
            text: row.get(4)?,
        })
    }

    /// Stores one chunk embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn store_corpus_embedding(
        &mut self,
        chunk_id: i64,
        embedding: &[f32],
        model_name: Option<&str>,
    ) -> Result<()> {
        let blob = encode_embedding(embedding);
        self.conn
            .execute(
                "INSERT OR REPLACE INTO corpus_embeddings
                 (chunk_id, embedding, dimensions, model_name, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    chunk_id,
                    blob,
                    embedding.len() as i64,
                    model_name,
                    Self::now()
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads chunk embeddings, optionally restricted to endpoint labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn corpus_embeddings(&self, endpoints: Option<&[&str]>) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut sql = String::from(
            "SELECT e.chunk_id, e.embedding FROM corpus_embeddings e
             JOIN corpus_chunks c ON c.id = e.chunk_id",
        );
        let mut bindings: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(labels) = endpoints
            && !labels.is_empty()
        {
            let placeholders = vec!["?"; labels.len()].join(", ");
            sql.push_str(&format!(" WHERE c.endpoint IN ({placeholders})"));
            bindings.extend(
                labels
                    .iter()
                    .map(|l| rusqlite::types::Value::Text((*l).to_string())),
            );
        }

        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params_from_iter(bindings.iter()), |row| {
                let chunk_id: i64 = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((chunk_id, decode_embedding(&blob)))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    /// Corpus chunk count.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn corpus_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM corpus_chunks", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    // ==================== Session Operations ====================

    /// Upserts a full session document. The write is one statement, so
    /// a turn's append is atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_session(&mut self, record: &SessionRecord) -> Result<()> {
        let document = serde_json::to_string(record).map_err(StorageError::from)?;
        self.conn
            .execute(
                r"
            INSERT OR REPLACE INTO sessions
                (id, created_at, updated_at, message_count, cost_usd, document)
            VALUES (?, ?, ?, ?, ?, ?)
        ",
                params![
                    record.session.id,
                    record.session.created_at,
                    record.session.updated_at,
                    record.session.message_count as i64,
                    record.session.cost_usd,
                    document,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads a session document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or deserialization fails.
    pub fn load_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM sessions WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;

        match document {
            Some(json) => {
                let record = serde_json::from_str(&json).map_err(StorageError::from)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Deletes a session. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_session(&mut self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?", params![id])
            .map_err(StorageError::from)?;
        Ok(affected > 0)
    }

    /// Lists session headers, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, created_at, updated_at, message_count, cost_usd
                 FROM sessions ORDER BY updated_at DESC",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Session {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    updated_at: row.get(2)?,
                    message_count: row.get::<_, i64>(3)? as u64,
                    cost_usd: row.get(4)?,
                })
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    // ==================== Utility Operations ====================

    /// Gathers store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    pub fn stats(&self) -> Result<StoreStats> {
        let embedded_chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM corpus_embeddings", [], |row| {
                row.get(0)
            })
            .map_err(StorageError::from)?;
        let session_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        let db_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len());

        Ok(StoreStats {
            device_count: self.device_count()?,
            corpus_chunk_count: self.corpus_count()?,
            embedded_chunk_count: embedded_chunk_count as usize,
            session_count: session_count as usize,
            schema_version: self.schema_version()?.unwrap_or(0),
            db_size,
        })
    }
}

/// Converts free text to a forgiving FTS5 query: each term quoted (so
/// special characters are literals) and joined with OR.
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Serializes an f32 slice as little-endian bytes.
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Deserializes little-endian bytes back to f32 values.
fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkKind, Message, ResolverContext, SessionUsage};

    fn store() -> SqliteStore {
        let mut store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();
        store
    }

    fn sample_devices() -> Vec<CatalogDevice> {
        vec![
            CatalogDevice {
                id: None,
                brand_name: "AcmeMask Pro".to_string(),
                company_name: "Acme Medical".to_string(),
                description: "Single-use surgical mask".to_string(),
                product_code: "FXX".to_string(),
                gmdn_term: Some("Surgical face mask".to_string()),
                identifier: Some("00812345678905".to_string()),
            },
            CatalogDevice {
                id: None,
                brand_name: "CardioPace 3000".to_string(),
                company_name: "PulseWorks".to_string(),
                description: "Implantable cardiac pacemaker".to_string(),
                product_code: "DXY".to_string(),
                gmdn_term: None,
                identifier: None,
            },
        ]
    }

    #[test]
    fn test_init_idempotent() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();
        store.init().unwrap();
        assert!(store.is_initialized().unwrap());
    }

    #[test]
    fn test_catalog_insert_and_lookup() {
        let mut store = store();
        let count = store.insert_devices(&sample_devices()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.device_count().unwrap(), 2);

        let by_code = store.devices_by_product_code("fxx").unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].brand_name, "AcmeMask Pro");

        let by_brand = store.devices_by_brand_exact("acmemask pro").unwrap();
        assert_eq!(by_brand.len(), 1);
    }

    #[test]
    fn test_catalog_fts_search() {
        let mut store = store();
        store.insert_devices(&sample_devices()).unwrap();

        let hits = store.search_devices("pacemaker", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.product_code, "DXY");
        assert!(hits[0].1 > 0.0, "negated bm25 is positive");
    }

    #[test]
    fn test_catalog_fts_special_chars_are_literal() {
        let mut store = store();
        store.insert_devices(&sample_devices()).unwrap();
        // Must not error out as FTS5 syntax
        let hits = store.search_devices("mask? *pro^", 10).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_distinct_brands() {
        let mut store = store();
        store.insert_devices(&sample_devices()).unwrap();
        let brands = store.distinct_brands(100).unwrap();
        assert_eq!(brands.len(), 2);
    }

    fn sample_chunks() -> Vec<CorpusChunk> {
        vec![
            CorpusChunk::new(
                Some(Endpoint::Enforcement),
                ChunkKind::Howto,
                vec!["classification".to_string(), "recalling_firm".to_string()],
                "How to search recalls by class and firm.",
            ),
            CorpusChunk::new(
                Some(Endpoint::Event),
                ChunkKind::Howto,
                vec!["event_type".to_string()],
                "How to search adverse events.",
            ),
            CorpusChunk::new(None, ChunkKind::QuerySyntax, Vec::new(), "Filter syntax."),
        ]
    }

    #[test]
    fn test_corpus_insert_assigns_ids() {
        let mut store = store();
        let mut chunks = sample_chunks();
        store.insert_corpus_chunks(&mut chunks).unwrap();
        assert!(chunks.iter().all(|c| c.id.is_some()));
        assert_eq!(store.corpus_count().unwrap(), 3);
    }

    #[test]
    fn test_corpus_fts_with_endpoint_prefilter() {
        let mut store = store();
        let mut chunks = sample_chunks();
        store.insert_corpus_chunks(&mut chunks).unwrap();

        let all = store.corpus_search_fts("search", 10, None).unwrap();
        assert!(all.len() >= 2);

        let only_recalls = store
            .corpus_search_fts("search", 10, Some(&["enforcement"]))
            .unwrap();
        assert_eq!(only_recalls.len(), 1);
        assert_eq!(only_recalls[0].0, chunks[0].id.unwrap());
    }

    #[test]
    fn test_corpus_chunk_roundtrip() {
        let mut store = store();
        let mut chunks = sample_chunks();
        store.insert_corpus_chunks(&mut chunks).unwrap();

        let loaded = store.corpus_chunk(chunks[0].id.unwrap()).unwrap().unwrap();
        assert_eq!(loaded.endpoint, Some(Endpoint::Enforcement));
        assert_eq!(loaded.kind, ChunkKind::Howto);
        assert_eq!(loaded.fields, chunks[0].fields);

        let general = store.corpus_chunk(chunks[2].id.unwrap()).unwrap().unwrap();
        assert_eq!(general.endpoint, None);
    }

    #[test]
    fn test_corpus_chunks_for_endpoint() {
        let mut store = store();
        let mut chunks = sample_chunks();
        store.insert_corpus_chunks(&mut chunks).unwrap();
        let event_chunks = store.corpus_chunks_for_endpoint("event").unwrap();
        assert_eq!(event_chunks.len(), 1);
    }

    #[test]
    fn test_embeddings_roundtrip() {
        let mut store = store();
        let mut chunks = sample_chunks();
        store.insert_corpus_chunks(&mut chunks).unwrap();

        let embedding = vec![0.25f32, -0.5, 1.0];
        store
            .store_corpus_embedding(chunks[0].id.unwrap(), &embedding, Some("fallback"))
            .unwrap();

        let all = store.corpus_embeddings(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, embedding);

        let filtered = store.corpus_embeddings(Some(&["event"])).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_encode_decode_embedding() {
        let original = vec![1.5f32, -2.25, 0.0, f32::MIN_POSITIVE];
        let decoded = decode_embedding(&encode_embedding(&original));
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut store = store();
        let mut record = SessionRecord::new(1.50);
        let id = record.session.id.clone();

        store.save_session(&record).unwrap();
        let loaded = store.load_session(&id).unwrap().unwrap();
        assert_eq!(loaded, record);

        record.append_turn(
            vec![Message::user("q")],
            ResolverContext::default(),
            SessionUsage {
                total_cost_usd: 0.02,
                ..SessionUsage::default()
            },
        );
        store.save_session(&record).unwrap();
        let reloaded = store.load_session(&id).unwrap().unwrap();
        assert_eq!(reloaded.messages.len(), 1);

        assert!(store.delete_session(&id).unwrap());
        assert!(!store.delete_session(&id).unwrap());
        assert!(store.load_session(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_sessions_most_recent_first() {
        let mut store = store();
        let mut first = SessionRecord::new(1.50);
        first.session.updated_at = 100;
        let mut second = SessionRecord::new(1.50);
        second.session.updated_at = 200;
        store.save_session(&first).unwrap();
        store.save_session(&second).unwrap();

        let listed = store.list_sessions().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.session.id);
    }

    #[test]
    fn test_stats() {
        let mut store = store();
        store.insert_devices(&sample_devices()).unwrap();
        let mut chunks = sample_chunks();
        store.insert_corpus_chunks(&mut chunks).unwrap();
        store.save_session(&SessionRecord::new(1.50)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.device_count, 2);
        assert_eq!(stats.corpus_chunk_count, 3);
        assert_eq!(stats.session_count, 1);
        assert_eq!(stats.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(stats.db_size.is_none(), "in-memory database");
    }

    #[test]
    fn test_sanitize_fts_query() {
        assert_eq!(sanitize_fts_query("CLI tool?"), "\"CLI\" OR \"tool?\"");
        assert_eq!(sanitize_fts_query(""), "");
    }
}
