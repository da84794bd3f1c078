//! Data model structs for every business entity (spec §3).
//!
//! Every entity shares the immutable-audit trailer documented on
//! [`AuditMeta`]. Stores embed the trailer fields directly on each struct
//! (mirroring the flat-row shape rusqlite hands back) rather than nesting
//! an `AuditMeta` value, but the contract is the same: `version` starts at
//! 1 and increments on every logical update, `deleted_at` is null for the
//! current row.

pub mod broker;
pub mod delivery;
pub mod event;
pub mod exit;
pub mod instrument;
pub mod intent;
pub mod mtf_config;
pub mod portfolio;
pub mod signal;
pub mod trade;
pub mod watchlist;

pub use broker::*;
pub use delivery::*;
pub use event::*;
pub use exit::*;
pub use instrument::*;
pub use intent::*;
pub use mtf_config::*;
pub use portfolio::*;
pub use signal::*;
pub use trade::*;
pub use watchlist::*;

use chrono::{DateTime, Utc};

/// Fields every business table carries. Not embedded structurally (each
/// entity flattens these alongside its own columns) but documented once
/// here as the shared contract.
#[derive(Debug, Clone, Copy)]
pub struct AuditMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
