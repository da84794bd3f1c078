use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortfolioStatus {
    Active,
    Closed,
}

impl PortfolioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioStatus::Active => "ACTIVE",
            PortfolioStatus::Closed => "CLOSED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "CLOSED" => PortfolioStatus::Closed,
            _ => PortfolioStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    Equal,
    Kelly,
    FixedFraction,
}

impl AllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMode::Equal => "equal",
            AllocationMode::Kelly => "kelly",
            AllocationMode::FixedFraction => "fixed_fraction",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "kelly" => AllocationMode::Kelly,
            "fixed_fraction" => AllocationMode::FixedFraction,
            _ => AllocationMode::Equal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub portfolio_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub total_capital: Decimal,
    pub reserved_capital: Decimal,
    pub max_portfolio_log_loss: Decimal,
    pub max_symbol_weight: Decimal,
    pub max_symbols: i64,
    pub allocation_mode: AllocationMode,
    pub status: PortfolioStatus,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Portfolio {
    /// Capital still free to deploy before hitting `total_capital`.
    pub fn available_capital(&self) -> Decimal {
        (self.total_capital - self.reserved_capital).max(Decimal::ZERO)
    }
}
