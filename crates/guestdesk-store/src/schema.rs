//! Schema lifecycle: create-if-absent tables plus additive column migration.
//!
//! Tables are defined as static `CREATE TABLE IF NOT EXISTS` statements and
//! ensured in a fixed order before the stores accept traffic. There is no
//! version ledger: production database files predate any such bookkeeping,
//! so the live column set is probed directly via `PRAGMA table_info` and
//! newer optional columns are added with `ALTER TABLE ... ADD COLUMN`
//! (nullable, no default) without touching existing rows.

use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};

/// A single entity table definition.
struct TableDef {
    name: &'static str,
    /// `CREATE TABLE IF NOT EXISTS` statement for the table's base shape.
    create_sql: &'static str,
}

/// A column added after a table's base shape shipped.
///
/// Must be nullable with no default so the ALTER is a pure metadata change.
struct ColumnDef {
    table: &'static str,
    name: &'static str,
    decl: &'static str,
}

/// All entity tables, ensured in this order.
///
/// `guest_supplements` deliberately omits `line_name` here — it arrived
/// after the table shipped and is added by [`ADDED_COLUMNS`], which keeps
/// the migration path exercised on fresh databases too.
static TABLES: &[TableDef] = &[
    TableDef {
        name: "guest_supplements",
        create_sql: "CREATE TABLE IF NOT EXISTS guest_supplements (
            booking_id            TEXT PRIMARY KEY,
            confirmed_phone       TEXT,
            arrival_time          TEXT,
            staff_memo            TEXT,
            ai_extracted_requests TEXT,
            updated_at            DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    },
    TableDef {
        name: "bot_sessions",
        create_sql: "CREATE TABLE IF NOT EXISTS bot_sessions (
            user_id                TEXT PRIMARY KEY,
            handler_type           TEXT,
            state                  TEXT,
            data                   TEXT,
            pending_intent         TEXT,
            pending_intent_message TEXT,
            created_at             DATETIME,
            updated_at             DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    },
    TableDef {
        name: "vip_users",
        create_sql: "CREATE TABLE IF NOT EXISTS vip_users (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            line_user_id TEXT NOT NULL UNIQUE,
            display_name TEXT,
            vip_type     TEXT DEFAULT 'guest',
            vip_level    INTEGER DEFAULT 1,
            role         TEXT,
            permissions  TEXT,
            note         TEXT,
            created_at   DATETIME,
            updated_at   DATETIME
        );",
    },
];

/// Columns introduced after their table's base shape.
static ADDED_COLUMNS: &[ColumnDef] = &[ColumnDef {
    table: "guest_supplements",
    name: "line_name",
    decl: "TEXT",
}];

// ── public API ───────────────────────────────────────────────────────

/// Ensure every table and added column exists, failing on the first error.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
/// Running it against an already-initialized database is a no-op.
pub fn init_all(conn: &Connection) -> StoreResult<()> {
    for table in TABLES {
        ensure_table(conn, table)?;
    }
    for column in ADDED_COLUMNS {
        ensure_column(conn, column)?;
    }
    debug!("schema ready");
    Ok(())
}

/// Like [`init_all`], but a failed table is logged and skipped rather than
/// aborting the remaining tables.
///
/// Operations against a table that failed here will fail at statement time;
/// the other tables stay usable. Returns the number of tables ready.
pub fn init_all_lenient(conn: &Connection) -> usize {
    let mut ready = 0;
    for table in TABLES {
        match ensure_table(conn, table) {
            Ok(()) => ready += 1,
            Err(err) => {
                error!(table = table.name, %err, "schema init failed; table unusable");
            }
        }
    }
    for column in ADDED_COLUMNS {
        if let Err(err) = ensure_column(conn, column) {
            error!(
                table = column.table,
                column = column.name,
                %err,
                "column migration failed"
            );
        }
    }
    ready
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_table(conn: &Connection, def: &TableDef) -> StoreResult<()> {
    conn.execute_batch(def.create_sql)
        .map_err(|e| StoreError::Schema {
            table: def.name,
            message: format!("create failed: {e}"),
        })?;
    debug!(table = def.name, "table ready");
    Ok(())
}

/// Add `def` to its table if the live column set lacks it. Idempotent.
fn ensure_column(conn: &Connection, def: &ColumnDef) -> StoreResult<bool> {
    if has_column(conn, def.table, def.name)? {
        return Ok(false);
    }

    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        def.table, def.name, def.decl
    ))
    .map_err(|e| StoreError::Schema {
        table: def.table,
        message: format!("add column `{}` failed: {e}", def.name),
    })?;

    info!(table = def.table, column = def.name, "schema upgraded: column added");
    Ok(true)
}

/// Probe the live column set of `table` for `column`.
fn has_column(conn: &Connection, table: &'static str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| StoreError::Schema {
            table,
            message: format!("column probe failed: {e}"),
        })?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::Schema {
            table,
            message: format!("column probe failed: {e}"),
        })?;
    Ok(names.iter().any(|n| n == column))
}

// ── tests ────────────────────────────────────────────────────────────
