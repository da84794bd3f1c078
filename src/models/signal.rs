use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Active,
    Published,
    Expired,
    Stale,
    Superseded,
    Cancelled,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "ACTIVE",
            SignalStatus::Published => "PUBLISHED",
            SignalStatus::Expired => "EXPIRED",
            SignalStatus::Stale => "STALE",
            SignalStatus::Superseded => "SUPERSEDED",
            SignalStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PUBLISHED" => SignalStatus::Published,
            "EXPIRED" => SignalStatus::Expired,
            "STALE" => SignalStatus::Stale,
            "SUPERSEDED" => SignalStatus::Superseded,
            "CANCELLED" => SignalStatus::Cancelled,
            _ => SignalStatus::Active,
        }
    }

    /// Terminal: EXPIRED, STALE, SUPERSEDED, CANCELLED (spec §4.3).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalStatus::Expired
                | SignalStatus::Stale
                | SignalStatus::Superseded
                | SignalStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "SHORT" => Direction::Short,
            _ => Direction::Long,
        }
    }
}

/// A band (`low`..`high`) on one timeframe tier (spec §3: HTF/ITF/LTF).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneBand {
    pub low: Decimal,
    pub high: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeZones {
    pub htf: ZoneBand,
    pub itf: ZoneBand,
    pub ltf: ZoneBand,
}

/// Inputs a caller supplies to `SignalStore::upsert`; the dedupe key is
/// `(symbol, confluence_type, signal_day, effective_floor, effective_ceiling)`
/// where `effective_floor`/`effective_ceiling` are the half-up-rounded
/// values (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalUpsert {
    pub symbol: String,
    pub confluence_type: String,
    pub direction: Direction,
    pub signal_type: String,
    pub zones: TimeframeZones,
    pub p_win: Decimal,
    pub p_fill: Decimal,
    pub kelly: Decimal,
    pub reference_price: Decimal,
    pub entry_band: ZoneBand,
    pub effective_floor: Decimal,
    pub effective_ceiling: Decimal,
    pub confidence: Decimal,
    pub tags: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Uuid,
    pub symbol: String,
    pub confluence_type: String,
    pub signal_day: NaiveDate,
    pub direction: Direction,
    pub signal_type: String,
    pub zones: TimeframeZones,
    pub p_win: Decimal,
    pub p_fill: Decimal,
    pub kelly: Decimal,
    pub reference_price: Decimal,
    pub entry_band: ZoneBand,
    pub effective_floor: Decimal,
    pub effective_ceiling: Decimal,
    pub confidence: Decimal,
    pub tags: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
