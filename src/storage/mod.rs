//! `SQLite` storage.
//!
//! One database file backs the three persistent surfaces: the GUDID
//! device catalog (FTS5-indexed), the retriever documentation corpus
//! (FTS5 plus embedding BLOBs) and the session store (one JSON document
//! per session).

mod schema;
mod sqlite;

pub use schema::CURRENT_SCHEMA_VERSION;
pub use sqlite::{SqliteStore, StoreStats};

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".openfda-agent/agent.db";
