//! Bot session persistence — a conversational flow's per-user working memory.
//!
//! The store is a blind substrate for whatever labels the conversational
//! logic assigns: `handler_type`, `state`, and `pending_intent` are opaque
//! strings with no validation and no transition rules. Unlike the
//! supplement store, writes here are full-replace upserts — every field
//! overwrites the stored value — except `created_at`, which is set on first
//! insert and never touched again.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::codec::{self, DataMap};
use crate::db::{Database, now_rfc3339};
use crate::error::{StoreError, StoreResult};

/// One user's session row, with the structured payload already decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Messaging-platform user identifier. One session per user.
    pub user_id: String,
    /// Which conversational flow owns this user.
    pub handler_type: Option<String>,
    /// Flow-specific discrete state label.
    pub state: Option<String>,
    /// Facts accumulated during the flow. A malformed or missing stored
    /// payload decodes to an empty map, never an error.
    pub data: DataMap,
    /// Intent waiting on confirmation, if any.
    pub pending_intent: Option<String>,
    /// Human-readable message associated with the pending intent.
    pub pending_intent_message: Option<String>,
    /// Set once, on first insert.
    pub created_at: Option<String>,
    /// Set on every write.
    pub updated_at: Option<String>,
}

/// Fields written on every session update. All of them replace the stored
/// values unconditionally; an absent `data` is stored as an empty map.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub handler_type: Option<String>,
    pub state: Option<String>,
    pub data: Option<DataMap>,
    pub pending_intent: Option<String>,
    pub pending_intent_message: Option<String>,
}

/// CRUD over the `bot_sessions` table.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    /// Create a new session store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch a user's session, returning `None` if absent.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: &str) -> StoreResult<Option<Session>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT user_id, handler_type, state, data, pending_intent, \
                            pending_intent_message, created_at, updated_at \
                     FROM bot_sessions WHERE user_id = ?1",
                    rusqlite::params![user_id],
                    |row| {
                        let raw_data: Option<String> = row.get(3)?;
                        Ok(Session {
                            user_id: row.get(0)?,
                            handler_type: row.get(1)?,
                            state: row.get(2)?,
                            data: codec::decode_map(raw_data.as_deref()),
                            pending_intent: row.get(4)?,
                            pending_intent_message: row.get(5)?,
                            created_at: row.get(6)?,
                            updated_at: row.get(7)?,
                        })
                    },
                );
                match result {
                    Ok(session) => Ok(Some(session)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Full-replace upsert of a user's session.
    ///
    /// Inserts the row on first write; on conflict every field overwrites
    /// the stored value except `created_at`, which keeps its insert-time
    /// value. Returns the affected-row count.
    #[instrument(skip(self, session))]
    pub async fn update(&self, user_id: &str, session: SessionData) -> StoreResult<usize> {
        let user_id = user_id.to_string();
        let now = now_rfc3339();
        let data_json = codec::encode_map(&session.data.unwrap_or_default())?;

        self.db
            .execute(move |conn| {
                let changes = conn.execute(
                    "INSERT INTO bot_sessions (
                         user_id, handler_type, state, data, pending_intent,
                         pending_intent_message, created_at, updated_at
                     )
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                     ON CONFLICT(user_id) DO UPDATE SET
                         handler_type = excluded.handler_type,
                         state = excluded.state,
                         data = excluded.data,
                         pending_intent = excluded.pending_intent,
                         pending_intent_message = excluded.pending_intent_message,
                         updated_at = excluded.updated_at",
                    rusqlite::params![
                        user_id,
                        session.handler_type,
                        session.state,
                        data_json,
                        session.pending_intent,
                        session.pending_intent_message,
                        now,
                    ],
                )?;
                debug!(user_id = %user_id, changes, "session replaced");
                Ok(changes)
            })
            .await
    }

    /// Delete a user's session. Deleting a missing session is not an error;
    /// returns the affected-row count (0 or 1).
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str) -> StoreResult<usize> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM bot_sessions WHERE user_id = ?1",
                    rusqlite::params![user_id],
                )?;
                debug!(user_id = %user_id, deleted, "session deleted");
                Ok(deleted)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
