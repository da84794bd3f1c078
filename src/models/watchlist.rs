use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistTemplate {
    pub template_id: Uuid,
    pub name: String,
    pub symbols: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistSelected {
    pub selected_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub symbols: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Per-user-broker watchlist row (L4, spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub watchlist_id: Uuid,
    pub user_broker_id: Uuid,
    pub symbol: String,
    pub lot_size: Option<Decimal>,
    pub tick_size: Option<Decimal>,
    pub is_custom: bool,
    pub enabled: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_price: Option<Decimal>,
    pub last_tick_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
