//! Session store.
//!
//! Keyed, durable session documents over the `SQLite` store with an
//! in-process cache in front. Appends are atomic per turn: either the
//! whole turn (messages, context merge, usage) lands or none of it
//! does. Reads observe the last committed turn.

use crate::core::{Message, ResolverContext, Session, SessionRecord, SessionUsage};
use crate::error::{Result, StorageError};
use crate::storage::SqliteStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Session store with an in-process read cache.
pub struct SessionStore {
    store: Arc<Mutex<SqliteStore>>,
    cache: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    /// Creates a session store over the shared database.
    #[must_use]
    pub fn new(store: Arc<Mutex<SqliteStore>>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn db(&self) -> Result<std::sync::MutexGuard<'_, SqliteStore>> {
        self.store
            .lock()
            .map_err(|_| StorageError::Database("store lock poisoned".to_string()).into())
    }

    /// Creates and persists a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn create(&self, limit_usd: f64) -> Result<SessionRecord> {
        let record = SessionRecord::new(limit_usd);
        self.db()?.save_session(&record)?;
        self.cache
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))?
            .insert(record.session.id.clone(), record.clone());
        Ok(record)
    }

    /// Loads a session, cache first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SessionNotFound`] for unknown ids.
    pub fn load(&self, id: &str) -> Result<SessionRecord> {
        if let Some(record) = self
            .cache
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))?
            .get(id)
        {
            return Ok(record.clone());
        }

        let record = self
            .db()?
            .load_session(id)?
            .ok_or_else(|| StorageError::SessionNotFound { id: id.to_string() })?;
        self.cache
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))?
            .insert(id.to_string(), record.clone());
        Ok(record)
    }

    /// Appends one committed turn to a session and persists it.
    ///
    /// Resolver-context fields are replaced field-wise: a new devices
    /// resolution replaces the old, absent fields leave prior values
    /// intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or the write fails.
    pub fn append(
        &self,
        id: &str,
        messages: Vec<Message>,
        context: ResolverContext,
        usage: SessionUsage,
    ) -> Result<SessionRecord> {
        let mut record = self.load(id)?;
        record.append_turn(messages, context, usage);
        self.db()?.save_session(&record)?;
        self.cache
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))?
            .insert(id.to_string(), record.clone());
        Ok(record)
    }

    /// Replaces the resolver context wholesale.
    ///
    /// The explicit per-field reset path: append's merge semantics
    /// would resurrect a cleared field, so the reset writes the whole
    /// context back.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or the write fails.
    pub fn replace_context(
        &self,
        id: &str,
        context: ResolverContext,
        usage: SessionUsage,
    ) -> Result<SessionRecord> {
        let mut record = self.load(id)?;
        record.resolver_context = context;
        record.usage = usage;
        record.session.updated_at = chrono::Utc::now().timestamp();
        self.db()?.save_session(&record)?;
        self.cache
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))?
            .insert(id.to_string(), record.clone());
        Ok(record)
    }

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SessionNotFound`] for unknown ids.
    pub fn delete(&self, id: &str) -> Result<()> {
        let existed = self.db()?.delete_session(id)?;
        self.cache
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))?
            .remove(id);
        if existed {
            Ok(())
        } else {
            Err(StorageError::SessionNotFound { id: id.to_string() }.into())
        }
    }

    /// Lists session headers, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<Session>> {
        self.db()?.list_sessions()
    }
}
