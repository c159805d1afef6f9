//! Guest supplement persistence.
//!
//! A supplement extends an externally-owned booking record with locally
//! collected facts: a confirmed phone number, an arrival time, a staff memo,
//! AI-extracted request text, and the guest's messaging display name. Fields
//! arrive from independent sources at independent times (staff notes today,
//! guest confirmation tomorrow), so the write path is a merge-upsert: a
//! later non-null value replaces the stored one, and a null never erases
//! what another source contributed.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::{Database, now_rfc3339};
use crate::error::{StoreError, StoreResult};

/// Locally-collected facts for one booking. At most one row per booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplement {
    /// Booking identifier owned by the upstream reservation system.
    pub booking_id: String,
    /// Phone number the guest confirmed over chat.
    pub confirmed_phone: Option<String>,
    /// Expected arrival time, free text.
    pub arrival_time: Option<String>,
    /// Staff-entered memo.
    pub staff_memo: Option<String>,
    /// Request text extracted from the conversation by the AI layer.
    pub ai_extracted_requests: Option<String>,
    /// Guest display name from the messaging platform.
    pub line_name: Option<String>,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: Option<String>,
}

/// Fields to merge into a booking's supplement row.
///
/// `None` means "leave the stored value alone", not "clear it" — there is
/// no way to erase a field through this layer.
#[derive(Debug, Clone, Default)]
pub struct SupplementPatch {
    pub confirmed_phone: Option<String>,
    pub arrival_time: Option<String>,
    pub staff_memo: Option<String>,
    pub ai_extracted_requests: Option<String>,
    pub line_name: Option<String>,
}

/// CRUD over the `guest_supplements` table. No delete is exposed.
#[derive(Clone)]
pub struct SupplementStore {
    db: Database,
}

impl SupplementStore {
    /// Create a new supplement store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the supplement for one booking, returning `None` if absent.
    #[instrument(skip(self))]
    pub async fn get(&self, booking_id: &str) -> StoreResult<Option<Supplement>> {
        let booking_id = booking_id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT booking_id, confirmed_phone, arrival_time, staff_memo, \
                            ai_extracted_requests, line_name, updated_at \
                     FROM guest_supplements WHERE booking_id = ?1",
                    rusqlite::params![booking_id],
                    map_row,
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Batch lookup. An empty input returns an empty result without issuing
    /// a query; duplicate ids collapse to one row each; result order is
    /// unspecified.
    #[instrument(skip(self, booking_ids), fields(count = booking_ids.len()))]
    pub async fn get_many(&self, booking_ids: &[String]) -> StoreResult<Vec<Supplement>> {
        if booking_ids.is_empty() {
            return Ok(Vec::new());
        }

        let booking_ids = booking_ids.to_vec();
        self.db
            .execute(move |conn| {
                let placeholders = (1..=booking_ids.len())
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(",");
                let mut stmt = conn.prepare(&format!(
                    "SELECT booking_id, confirmed_phone, arrival_time, staff_memo, \
                            ai_extracted_requests, line_name, updated_at \
                     FROM guest_supplements WHERE booking_id IN ({placeholders})"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(booking_ids), map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Merge-upsert the supplement for `booking_id`.
    ///
    /// Inserts the row if absent. If it exists, each non-null patch field
    /// replaces the stored value and each null field leaves it untouched;
    /// `updated_at` is rewritten either way. The merge is a single atomic
    /// statement so racing writers cannot drop each other's fields.
    /// Returns the affected-row count.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, booking_id: &str, patch: SupplementPatch) -> StoreResult<usize> {
        let booking_id = booking_id.to_string();
        let updated_at = now_rfc3339();

        self.db
            .execute(move |conn| {
                let changes = conn.execute(
                    "INSERT INTO guest_supplements (
                         booking_id, confirmed_phone, arrival_time, staff_memo,
                         ai_extracted_requests, line_name, updated_at
                     )
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(booking_id) DO UPDATE SET
                         confirmed_phone = COALESCE(excluded.confirmed_phone, confirmed_phone),
                         arrival_time = COALESCE(excluded.arrival_time, arrival_time),
                         staff_memo = COALESCE(excluded.staff_memo, staff_memo),
                         ai_extracted_requests = COALESCE(excluded.ai_extracted_requests, ai_extracted_requests),
                         line_name = COALESCE(excluded.line_name, line_name),
                         updated_at = excluded.updated_at",
                    rusqlite::params![
                        booking_id,
                        patch.confirmed_phone,
                        patch.arrival_time,
                        patch.staff_memo,
                        patch.ai_extracted_requests,
                        patch.line_name,
                        updated_at,
                    ],
                )?;
                debug!(booking_id = %booking_id, changes, "supplement merged");
                Ok(changes)
            })
            .await
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Supplement> {
    Ok(Supplement {
        booking_id: row.get(0)?,
        confirmed_phone: row.get(1)?,
        arrival_time: row.get(2)?,
        staff_memo: row.get(3)?,
        ai_extracted_requests: row.get(4)?,
        line_name: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────
