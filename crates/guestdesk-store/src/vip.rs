//! VIP registry — tiered identity and permission records.
//!
//! One table serves two tiers: casual `guest` VIPs and elevated `internal`
//! staff, distinguished by `vip_type` with `vip_level` ranking users within
//! a type. The write path is an upsert with a mixed merge policy:
//! `display_name` and `note` preserve the stored value when the caller
//! passes nothing, while `vip_type`, `vip_level`, `role`, and `permissions`
//! always overwrite. The store assigns a numeric surrogate id on first
//! insert; the external `line_user_id` stays the natural key.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::codec;
use crate::db::{Database, now_rfc3339};
use crate::error::{StoreError, StoreResult};

/// Default category for users registered without an explicit type.
const DEFAULT_VIP_TYPE: &str = "guest";

/// Default rank for users registered without an explicit level.
const DEFAULT_VIP_LEVEL: i64 = 1;

/// One VIP row, with permissions already decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VipUser {
    /// Store-assigned surrogate id.
    pub id: i64,
    /// Messaging-platform user identifier, unique per row.
    pub line_user_id: String,
    pub display_name: Option<String>,
    /// Category tag, e.g. `guest` or `internal`. Opaque to the store.
    pub vip_type: String,
    /// Ordinal rank within a type. The store enforces no range.
    pub vip_level: i64,
    /// Label meaningful mainly for the internal tier.
    pub role: Option<String>,
    /// Permission labels. A malformed stored list decodes to empty.
    pub permissions: Vec<String>,
    pub note: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Registration data for [`VipStore::add`].
///
/// `display_name` and `note` follow preserve-on-null; the remaining fields
/// overwrite the stored values, with `vip_type`/`vip_level` defaulting to
/// `"guest"`/`1` when omitted.
#[derive(Debug, Clone, Default)]
pub struct NewVipUser {
    pub line_user_id: String,
    pub display_name: Option<String>,
    pub vip_type: Option<String>,
    pub vip_level: Option<i64>,
    pub role: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub note: Option<String>,
}

/// CRUD over the `vip_users` table.
#[derive(Clone)]
pub struct VipStore {
    db: Database,
}

impl VipStore {
    /// Create a new VIP store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List every VIP, types ascending and higher ranks first within a
    /// type; ties break stably on the surrogate id.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> StoreResult<Vec<VipUser>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, line_user_id, display_name, vip_type, vip_level, \
                            role, permissions, note, created_at, updated_at \
                     FROM vip_users ORDER BY vip_type ASC, vip_level DESC, id ASC",
                )?;
                let rows = stmt
                    .query_map([], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Fetch one VIP by the external user identifier, `None` if absent.
    #[instrument(skip(self))]
    pub async fn get(&self, line_user_id: &str) -> StoreResult<Option<VipUser>> {
        let line_user_id = line_user_id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, line_user_id, display_name, vip_type, vip_level, \
                            role, permissions, note, created_at, updated_at \
                     FROM vip_users WHERE line_user_id = ?1",
                    rusqlite::params![line_user_id],
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

    /// Register or re-register a VIP (mixed-merge upsert).
    ///
    /// The merge itself is one atomic statement; the surrogate id is read
    /// back under the same connection lock. Returns the surrogate id (new
    /// or existing) and the affected-row count.
    #[instrument(skip(self, user), fields(line_user_id = %user.line_user_id))]
    pub async fn add(&self, user: NewVipUser) -> StoreResult<(i64, usize)> {
        let now = now_rfc3339();
        let permissions_json = match &user.permissions {
            Some(perms) => Some(codec::encode_permissions(perms)?),
            None => None,
        };

        self.db
            .execute(move |conn| {
                let changes = conn.execute(
                    "INSERT INTO vip_users (
                         line_user_id, display_name, vip_type, vip_level,
                         role, permissions, note, created_at, updated_at
                     )
                     VALUES (?1, ?2, COALESCE(?3, ?8), COALESCE(?4, ?9), ?5, ?6, ?7, ?10, ?10)
                     ON CONFLICT(line_user_id) DO UPDATE SET
                         display_name = COALESCE(excluded.display_name, display_name),
                         note = COALESCE(excluded.note, note),
                         vip_type = excluded.vip_type,
                         vip_level = excluded.vip_level,
                         role = excluded.role,
                         permissions = excluded.permissions,
                         updated_at = excluded.updated_at",
                    rusqlite::params![
                        user.line_user_id,
                        user.display_name,
                        user.vip_type,
                        user.vip_level,
                        user.role,
                        permissions_json,
                        user.note,
                        DEFAULT_VIP_TYPE,
                        DEFAULT_VIP_LEVEL,
                        now,
                    ],
                )?;

                let id: i64 = conn.query_row(
                    "SELECT id FROM vip_users WHERE line_user_id = ?1",
                    rusqlite::params![user.line_user_id],
                    |row| row.get(0),
                )?;

                debug!(line_user_id = %user.line_user_id, id, changes, "vip upserted");
                Ok((id, changes))
            })
            .await
    }

    /// Delete a VIP by the external user identifier. Idempotent; returns
    /// the affected-row count.
    #[instrument(skip(self))]
    pub async fn delete(&self, line_user_id: &str) -> StoreResult<usize> {
        let line_user_id = line_user_id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM vip_users WHERE line_user_id = ?1",
                    rusqlite::params![line_user_id],
                )?;
                debug!(line_user_id = %line_user_id, deleted, "vip deleted");
                Ok(deleted)
            })
            .await
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VipUser> {
    let raw_permissions: Option<String> = row.get(6)?;
    Ok(VipUser {
        id: row.get(0)?,
        line_user_id: row.get(1)?,
        display_name: row.get(2)?,
        vip_type: row.get(3)?,
        vip_level: row.get(4)?,
        role: row.get(5)?,
        permissions: codec::decode_permissions(raw_permissions.as_deref()),
        note: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> VipStore {
        let db = Database::open_in_memory().unwrap();
        db.init_schema().await.unwrap();
        VipStore::new(db)
    }

    fn named(line_user_id: &str) -> NewVipUser {
        NewVipUser {
            line_user_id: line_user_id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let store = setup_store().await;
        assert!(store.get("U404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_applies_defaults() {
        let store = setup_store().await;

        let (id, changes) = store.add(named("U1")).await.unwrap();
        assert!(id > 0);
        assert_eq!(changes, 1);

        let user = store.get("U1").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.vip_type, "guest");
        assert_eq!(user.vip_level, 1);
        assert!(user.permissions.is_empty());
        assert!(user.created_at.is_some());
    }

    #[tokio::test]
    async fn add_returns_existing_surrogate_id() {
        let store = setup_store().await;

        let (first_id, _) = store.add(named("U2")).await.unwrap();
        let (second_id, _) = store.add(named("U2")).await.unwrap();
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn merge_asymmetry() {
        let store = setup_store().await;

        store
            .add(NewVipUser {
                display_name: Some("Ann".into()),
                note: Some("x".into()),
                ..named("U3")
            })
            .await
            .unwrap();

        store
            .add(NewVipUser {
                vip_type: Some("internal".into()),
                vip_level: Some(2),
                ..named("U3")
            })
            .await
            .unwrap();

        let user = store.get("U3").await.unwrap().unwrap();
        // Preserved on null.
        assert_eq!(user.display_name.as_deref(), Some("Ann"));
        assert_eq!(user.note.as_deref(), Some("x"));
        // Overwritten unconditionally.
        assert_eq!(user.vip_type, "internal");
        assert_eq!(user.vip_level, 2);
    }

    #[tokio::test]
    async fn role_and_permissions_always_overwrite() {
        let store = setup_store().await;

        store
            .add(NewVipUser {
                role: Some("manager".into()),
                permissions: Some(vec!["query_booking".into(), "push_notify".into()]),
                ..named("U4")
            })
            .await
            .unwrap();

        // Re-registering without them clears both.
        store.add(named("U4")).await.unwrap();

        let user = store.get("U4").await.unwrap().unwrap();
        assert_eq!(user.role, None);
        assert!(user.permissions.is_empty());
    }

    #[tokio::test]
    async fn permissions_round_trip() {
        let store = setup_store().await;

        store
            .add(NewVipUser {
                vip_type: Some("internal".into()),
                permissions: Some(vec!["query_booking".into(), "broadcast".into()]),
                ..named("U5")
            })
            .await
            .unwrap();

        let user = store.get("U5").await.unwrap().unwrap();
        assert_eq!(user.permissions, vec!["query_booking", "broadcast"]);
    }

    #[tokio::test]
    async fn corrupted_permissions_decode_to_empty() {
        let store = setup_store().await;

        store.add(named("U6")).await.unwrap();
        store
            .db
            .execute(|conn| {
                conn.execute(
                    "UPDATE vip_users SET permissions = 'not-json' WHERE line_user_id = 'U6'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let user = store.get("U6").await.unwrap().unwrap();
        assert!(user.permissions.is_empty());
    }

    #[tokio::test]
    async fn list_all_orders_by_type_then_level_desc() {
        let store = setup_store().await;

        store
            .add(NewVipUser {
                vip_type: Some("guest".into()),
                vip_level: Some(1),
                ..named("G1")
            })
            .await
            .unwrap();
        store
            .add(NewVipUser {
                vip_type: Some("internal".into()),
                vip_level: Some(3),
                ..named("S1")
            })
            .await
            .unwrap();
        store
            .add(NewVipUser {
                vip_type: Some("guest".into()),
                vip_level: Some(5),
                ..named("G2")
            })
            .await
            .unwrap();
        store
            .add(NewVipUser {
                vip_type: Some("internal".into()),
                vip_level: Some(1),
                ..named("S2")
            })
            .await
            .unwrap();

        let all = store.list_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|u| u.line_user_id.as_str()).collect();
        assert_eq!(ids, vec!["G2", "G1", "S1", "S2"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = setup_store().await;

        store.add(named("U7")).await.unwrap();
        assert_eq!(store.delete("U7").await.unwrap(), 1);
        assert!(store.get("U7").await.unwrap().is_none());
        assert_eq!(store.delete("U7").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn surrogate_ids_increase() {
        let store = setup_store().await;

        let (a, _) = store.add(named("A")).await.unwrap();
        let (b, _) = store.add(named("B")).await.unwrap();
        assert!(b > a);
    }
}
