use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Pending,
    Approved,
    Rejected,
    Placed,
    Filled,
    Failed,
    Cancelled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "PENDING",
            IntentStatus::Approved => "APPROVED",
            IntentStatus::Rejected => "REJECTED",
            IntentStatus::Placed => "PLACED",
            IntentStatus::Filled => "FILLED",
            IntentStatus::Failed => "FAILED",
            IntentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "APPROVED" => IntentStatus::Approved,
            "REJECTED" => IntentStatus::Rejected,
            "PLACED" => IntentStatus::Placed,
            "FILLED" => IntentStatus::Filled,
            "FAILED" => IntentStatus::Failed,
            "CANCELLED" => IntentStatus::Cancelled,
            _ => IntentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "LIMIT" => OrderType::Limit,
            _ => OrderType::Market,
        }
    }
}

/// Note: entry intents do not carry an episode id — episodes are an
/// exit-only concept (SPEC_FULL.md Open Question #1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub intent_id: Uuid,
    pub signal_id: Uuid,
    pub user_broker_id: Uuid,
    pub delivery_id: Uuid,
    pub validation_passed: bool,
    pub validation_errors: Vec<ValidationError>,
    pub calculated_qty: Decimal,
    pub calculated_value: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub product_type: String,
    pub log_impact: Decimal,
    pub portfolio_exposure_after: Decimal,
    pub status: IntentStatus,
    pub order_id: Option<String>,
    pub trade_id: Option<Uuid>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub placed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
