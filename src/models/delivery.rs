use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Created,
    Delivered,
    Consumed,
    Expired,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Created => "CREATED",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Consumed => "CONSUMED",
            DeliveryStatus::Expired => "EXPIRED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "DELIVERED" => DeliveryStatus::Delivered,
            "CONSUMED" => DeliveryStatus::Consumed,
            "EXPIRED" => DeliveryStatus::Expired,
            "CANCELLED" => DeliveryStatus::Cancelled,
            _ => DeliveryStatus::Created,
        }
    }

    /// CREATED or DELIVERED are the only states `consume_delivery` accepts
    /// (spec §4.4).
    pub fn is_non_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Created | DeliveryStatus::Delivered)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDelivery {
    pub delivery_id: Uuid,
    pub signal_id: Uuid,
    pub user_broker_id: Uuid,
    pub status: DeliveryStatus,
    pub intent_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub user_action: Option<String>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
