use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::signal::TimeframeZones;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Created,
    Pending,
    Open,
    Exiting,
    Closed,
    Rejected,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Created => "CREATED",
            TradeStatus::Pending => "PENDING",
            TradeStatus::Open => "OPEN",
            TradeStatus::Exiting => "EXITING",
            TradeStatus::Closed => "CLOSED",
            TradeStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PENDING" => TradeStatus::Pending,
            "OPEN" => TradeStatus::Open,
            "EXITING" => TradeStatus::Exiting,
            "CLOSED" => TradeStatus::Closed,
            "REJECTED" => TradeStatus::Rejected,
            _ => TradeStatus::Created,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrailingStop {
    pub active: bool,
    pub highest_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

/// Fields supplied when upserting a trade; `None` means "preserve prior
/// value" on the merge path (spec §4.1, COALESCE-style upsert).
#[derive(Debug, Clone, Default)]
pub struct TradeUpsert {
    pub intent_id: Uuid,
    pub signal_id: Option<Uuid>,
    pub user_broker_id: Option<Uuid>,
    pub status: Option<TradeStatus>,
    pub quantity: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub entry_value: Option<Decimal>,
    pub product_type: Option<String>,
    pub zones: Option<TimeframeZones>,
    pub entry_band_low: Option<Decimal>,
    pub entry_band_high: Option<Decimal>,
    pub log_impact: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub current_log_return: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub trailing_stop: Option<TrailingStop>,
    pub exit_price: Option<Decimal>,
    pub exit_at: Option<DateTime<Utc>>,
    pub exit_trigger: Option<String>,
    pub exit_order_id: Option<String>,
    pub realized_pnl: Option<Decimal>,
    pub realized_log_return: Option<Decimal>,
    pub holding_days: Option<i64>,
    pub broker_order_id: Option<String>,
    pub broker_trade_id: Option<String>,
    pub client_order_id: Option<String>,
}

impl TradeUpsert {
    pub fn new(intent_id: Uuid) -> Self {
        Self {
            intent_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub intent_id: Uuid,
    pub signal_id: Option<Uuid>,
    pub user_broker_id: Option<Uuid>,
    pub status: TradeStatus,
    pub quantity: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub entry_value: Option<Decimal>,
    pub product_type: Option<String>,
    pub zones: Option<TimeframeZones>,
    pub entry_band_low: Option<Decimal>,
    pub entry_band_high: Option<Decimal>,
    pub log_impact: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub current_log_return: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub trailing_stop: TrailingStop,
    pub exit_price: Option<Decimal>,
    pub exit_at: Option<DateTime<Utc>>,
    pub exit_trigger: Option<String>,
    pub exit_order_id: Option<String>,
    pub realized_pnl: Option<Decimal>,
    pub realized_log_return: Option<Decimal>,
    pub holding_days: Option<i64>,
    pub broker_order_id: Option<String>,
    pub broker_trade_id: Option<String>,
    pub client_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
