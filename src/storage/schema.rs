//! Database schema definitions.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- GUDID device catalog
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brand_name TEXT NOT NULL,
    company_name TEXT NOT NULL,
    description TEXT NOT NULL,
    product_code TEXT NOT NULL,
    gmdn_term TEXT,
    identifier TEXT,
    created_at INTEGER NOT NULL
);

-- Secondary indices for direct lookups
CREATE INDEX IF NOT EXISTS idx_devices_product_code ON devices(product_code);
CREATE INDEX IF NOT EXISTS idx_devices_identifier ON devices(identifier);
CREATE INDEX IF NOT EXISTS idx_devices_brand ON devices(brand_name COLLATE NOCASE);

-- FTS5 over the three searchable device surfaces
CREATE VIRTUAL TABLE IF NOT EXISTS devices_fts USING fts5(
    brand_name,
    company_name,
    description,
    content='devices',
    content_rowid='id',
    tokenize='porter unicode61'
);

-- Triggers to keep the device index in sync
CREATE TRIGGER IF NOT EXISTS devices_ai AFTER INSERT ON devices BEGIN
    INSERT INTO devices_fts(rowid, brand_name, company_name, description)
    VALUES (new.id, new.brand_name, new.company_name, new.description);
END;

CREATE TRIGGER IF NOT EXISTS devices_ad AFTER DELETE ON devices BEGIN
    INSERT INTO devices_fts(devices_fts, rowid, brand_name, company_name, description)
    VALUES('delete', old.id, old.brand_name, old.company_name, old.description);
END;

CREATE TRIGGER IF NOT EXISTS devices_au AFTER UPDATE ON devices BEGIN
    INSERT INTO devices_fts(devices_fts, rowid, brand_name, company_name, description)
    VALUES('delete', old.id, old.brand_name, old.company_name, old.description);
    INSERT INTO devices_fts(rowid, brand_name, company_name, description)
    VALUES (new.id, new.brand_name, new.company_name, new.description);
END;

-- Retriever documentation corpus
CREATE TABLE IF NOT EXISTS corpus_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint TEXT NOT NULL,
    kind TEXT NOT NULL,
    fields TEXT NOT NULL,  -- JSON array of canonical field names
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_corpus_endpoint ON corpus_chunks(endpoint);

CREATE VIRTUAL TABLE IF NOT EXISTS corpus_fts USING fts5(
    text,
    content='corpus_chunks',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS corpus_ai AFTER INSERT ON corpus_chunks BEGIN
    INSERT INTO corpus_fts(rowid, text) VALUES (new.id, new.text);
END;

CREATE TRIGGER IF NOT EXISTS corpus_ad AFTER DELETE ON corpus_chunks BEGIN
    INSERT INTO corpus_fts(corpus_fts, rowid, text) VALUES('delete', old.id, old.text);
END;

CREATE TRIGGER IF NOT EXISTS corpus_au AFTER UPDATE ON corpus_chunks BEGIN
    INSERT INTO corpus_fts(corpus_fts, rowid, text) VALUES('delete', old.id, old.text);
    INSERT INTO corpus_fts(rowid, text) VALUES (new.id, new.text);
END;

-- Dense vectors for corpus chunks
CREATE TABLE IF NOT EXISTS corpus_embeddings (
    chunk_id INTEGER PRIMARY KEY,
    embedding BLOB NOT NULL,  -- f32 array serialized as little-endian bytes
    dimensions INTEGER NOT NULL,
    model_name TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (chunk_id) REFERENCES corpus_chunks(id) ON DELETE CASCADE
);

-- Session documents
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    message_count INTEGER NOT NULL,
    cost_usd REAL NOT NULL,
    document TEXT NOT NULL  -- JSON serialized SessionRecord
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
";

/// SQL to check if schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";
