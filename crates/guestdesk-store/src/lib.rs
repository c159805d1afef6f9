//! # guestdesk-store
//!
//! Persistence layer for the Guestdesk hotel messaging assistant.
//!
//! One embedded SQLite database holds three entities: per-booking guest
//! supplements, per-user bot sessions, and the tiered VIP registry. The
//! schema is ensured at startup (create-if-absent plus additive column
//! migration) and each entity store multiplexes over a single shared
//! connection handle with async methods.
//!
//! Each entity has its own upsert policy, expressed as one atomic
//! `INSERT ... ON CONFLICT DO UPDATE` statement:
//!
//! - [`SupplementStore::update`] merges — later non-null wins, null never
//!   erases.
//! - [`SessionStore::update`] replaces every field except `created_at`.
//! - [`VipStore::add`] mixes both: name and note are preserved on null,
//!   type, level, role, and permissions always overwrite.
//!
//! ## Quick start
//!
//! ```ignore
//! use guestdesk_store::{Database, SessionStore, SupplementStore, VipStore};
//!
//! let db = Database::open_default().await?;
//! let supplements = SupplementStore::new(db.clone());
//! let sessions = SessionStore::new(db.clone());
//! let vips = VipStore::new(db);
//! ```

pub mod codec;
pub mod db;
pub mod error;
pub mod schema;
pub mod session;
pub mod supplement;
pub mod vip;

// ── re-exports ───────────────────────────────────────────────────────

pub use codec::DataMap;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use session::{Session, SessionData, SessionStore};
pub use supplement::{Supplement, SupplementPatch, SupplementStore};
pub use vip::{NewVipUser, VipStore, VipUser};
