use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrokerStatus {
    Active,
    Disabled,
}

impl BrokerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerStatus::Active => "ACTIVE",
            BrokerStatus::Disabled => "DISABLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "DISABLED" => BrokerStatus::Disabled,
            _ => BrokerStatus::Active,
        }
    }
}

/// Capability config nested under `Broker` (spec §3): supported exchanges,
/// products, per-symbol lot sizes, margin rules, rate limits. Stored as a
/// JSON blob column, deserialized on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerCapabilities {
    #[serde(default)]
    pub supported_exchanges: Vec<String>,
    #[serde(default)]
    pub supported_products: Vec<String>,
    #[serde(default)]
    pub lot_sizes: std::collections::HashMap<String, Decimal>,
    #[serde(default)]
    pub margin_rules: serde_json::Value,
    #[serde(default)]
    pub rate_limit_per_sec: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broker {
    pub broker_id: Uuid,
    pub broker_code: String,
    pub broker_name: String,
    pub adapter_class: String,
    pub capabilities: BrokerCapabilities,
    pub status: BrokerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserBrokerRole {
    Data,
    Exec,
}

impl UserBrokerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserBrokerRole::Data => "DATA",
            UserBrokerRole::Exec => "EXEC",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "DATA" => UserBrokerRole::Data,
            _ => UserBrokerRole::Exec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserBrokerStatus {
    Active,
    Disabled,
    Errored,
}

impl UserBrokerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserBrokerStatus::Active => "ACTIVE",
            UserBrokerStatus::Disabled => "DISABLED",
            UserBrokerStatus::Errored => "ERRORED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "DISABLED" => UserBrokerStatus::Disabled,
            "ERRORED" => UserBrokerStatus::Errored,
            _ => UserBrokerStatus::Active,
        }
    }
}

/// Risk policy nested under `UserBroker` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub capital_allocated: Decimal,
    pub max_exposure: Decimal,
    pub per_trade_cap: Decimal,
    pub max_open_trades: i64,
    #[serde(default)]
    pub allow_symbols: Option<Vec<String>>,
    #[serde(default)]
    pub block_symbols: Vec<String>,
    #[serde(default)]
    pub allowed_product_types: Vec<String>,
    pub daily_loss_cap: Decimal,
    pub weekly_loss_cap: Decimal,
    pub cooldown_minutes: i64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            capital_allocated: Decimal::ZERO,
            max_exposure: Decimal::ZERO,
            per_trade_cap: Decimal::ZERO,
            max_open_trades: 0,
            allow_symbols: None,
            block_symbols: Vec::new(),
            allowed_product_types: Vec::new(),
            daily_loss_cap: Decimal::ZERO,
            weekly_loss_cap: Decimal::ZERO,
            cooldown_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBroker {
    pub user_broker_id: Uuid,
    pub user_id: Uuid,
    pub broker_id: Uuid,
    pub role: UserBrokerRole,
    /// Opaque credentials blob (API key, secret, request token, etc). Never
    /// rendered in logs or events.
    pub credentials: String,
    pub connected: bool,
    pub last_connected: Option<DateTime<Utc>>,
    pub connection_error: Option<String>,
    pub risk_policy: RiskPolicy,
    pub status: UserBrokerStatus,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Expired => "EXPIRED",
            SessionStatus::Revoked => "REVOKED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "EXPIRED" => SessionStatus::Expired,
            "REVOKED" => SessionStatus::Revoked,
            _ => SessionStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBrokerSession {
    pub session_id: Uuid,
    pub user_broker_id: Uuid,
    pub access_token: String,
    pub token_valid_till: DateTime<Utc>,
    pub session_status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// The broker auth-code used for this exchange; retained so a repeated
    /// OAuth callback with the same code can be recognised as a no-op.
    pub auth_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}
