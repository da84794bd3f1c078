use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitReason {
    TargetHit,
    StopHit,
    TrailingStop,
    Manual,
    Timeout,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TargetHit => "TARGET_HIT",
            ExitReason::StopHit => "STOP_HIT",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::Manual => "MANUAL",
            ExitReason::Timeout => "TIMEOUT",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "STOP_HIT" => ExitReason::StopHit,
            "TRAILING_STOP" => ExitReason::TrailingStop,
            "MANUAL" => ExitReason::Manual,
            "TIMEOUT" => ExitReason::Timeout,
            _ => ExitReason::TargetHit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitSignalStatus {
    Detected,
    Actioned,
}

impl ExitSignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitSignalStatus::Detected => "DETECTED",
            ExitSignalStatus::Actioned => "ACTIONED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ACTIONED" => ExitSignalStatus::Actioned,
            _ => ExitSignalStatus::Detected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignal {
    pub exit_signal_id: Uuid,
    pub trade_id: Uuid,
    pub exit_reason: ExitReason,
    pub episode_id: i64,
    pub status: ExitSignalStatus,
    pub detected_price: Decimal,
    pub brick_movement: Option<Decimal>,
    pub favorable_movement: Option<Decimal>,
    pub highest_since_entry: Option<Decimal>,
    pub lowest_since_entry: Option<Decimal>,
    pub trailing_stop_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitIntentStatus {
    Pending,
    Approved,
    Rejected,
    Placed,
    Filled,
    Failed,
    Cancelled,
}

impl ExitIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitIntentStatus::Pending => "PENDING",
            ExitIntentStatus::Approved => "APPROVED",
            ExitIntentStatus::Rejected => "REJECTED",
            ExitIntentStatus::Placed => "PLACED",
            ExitIntentStatus::Filled => "FILLED",
            ExitIntentStatus::Failed => "FAILED",
            ExitIntentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "APPROVED" => ExitIntentStatus::Approved,
            "REJECTED" => ExitIntentStatus::Rejected,
            "PLACED" => ExitIntentStatus::Placed,
            "FILLED" => ExitIntentStatus::Filled,
            "FAILED" => ExitIntentStatus::Failed,
            "CANCELLED" => ExitIntentStatus::Cancelled,
            _ => ExitIntentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitIntent {
    pub exit_intent_id: Uuid,
    pub exit_signal_id: Uuid,
    pub trade_id: Uuid,
    pub user_broker_id: Uuid,
    pub exit_reason: ExitReason,
    pub episode_id: i64,
    pub status: ExitIntentStatus,
    pub broker_order_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub placed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
