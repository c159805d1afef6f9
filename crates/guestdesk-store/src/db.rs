//! SQLite database setup and the process-wide connection handle.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//! One long-lived handle serves the whole process — the embedded engine
//! serializes writes internally, so there is no pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::schema;

/// Directory created next to the running process for the database file.
const DATA_DIR: &str = "data";

/// Database file name inside [`DATA_DIR`].
const DB_FILE: &str = "guest_store.db";

/// Wall-clock timestamp in the RFC 3339 millisecond form the existing
/// rows use (e.g. `2026-08-24T09:15:00.123Z`).
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Thread-safe handle to the embedded SQLite database.
///
/// All read/write operations go through [`Database::execute`] which
/// dispatches onto the blocking thread pool via `tokio::task::spawn_blocking`.
/// The handle is never explicitly closed in steady state; it lives as long
/// as the process.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database at `path` and apply pragmas.
    ///
    /// This call blocks briefly (file I/O), so call it during startup before
    /// entering the main async loop, or wrap it in `spawn_blocking` yourself.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database — useful for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Default on-disk location: `data/guest_store.db` next to the process.
    ///
    /// Creating the directory is an idempotent startup side effect.
    pub fn default_path() -> PathBuf {
        Path::new(DATA_DIR).join(DB_FILE)
    }

    /// Open the default database, creating its `data/` directory on demand,
    /// and initialize the schema before returning the handle.
    pub async fn open_default() -> StoreResult<Self> {
        let dir = PathBuf::from(DATA_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Schema {
            table: "(data directory)",
            message: format!("failed to create {}: {e}", dir.display()),
        })?;
        Self::open_and_init(Self::default_path()).await
    }

    /// Open the database at `path` and ensure all tables exist, in order,
    /// before any store operation is served. Fails fast on the first schema
    /// error; use [`Database::init_schema_lenient`] for log-and-continue
    /// startup instead.
    pub async fn open_and_init(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.init_schema().await?;
        Ok(db)
    }

    /// Ensure all tables and additive column migrations, failing on the
    /// first error.
    pub async fn init_schema(&self) -> StoreResult<()> {
        self.execute(|conn| schema::init_all(conn)).await
    }

    /// Ensure all tables, logging and skipping failures instead of aborting.
    ///
    /// A table that failed here stays unusable — its operations surface
    /// storage errors — but the process and the other tables keep working.
    /// Returns the number of tables ready.
    pub async fn init_schema_lenient(&self) -> StoreResult<usize> {
        self.execute(|conn| {
            let ready = schema::init_all_lenient(conn);
            Ok(ready)
        })
        .await
        .inspect(|ready| {
            if *ready == 0 {
                warn!("no entity tables are usable");
            }
        })
    }

    /// Execute a closure against the connection on the blocking pool.
    ///
    /// This is the primary way to interact with the database from async
    /// code. The closure receives a `&Connection` and must return a
    /// `StoreResult<T>`. The mutex is held for the closure's duration, so
    /// multi-statement closures observe a consistent connection state.
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }

    // ── pragmas ──────────────────────────────────────────────────────

    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        debug!("applying SQLite pragmas");

        // WAL mode: concurrent readers, non-blocking writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL — we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        // Busy timeout so concurrent writers wait instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
