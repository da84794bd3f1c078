use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global row keyed by a fixed singleton id (spec §4.10).
pub const GLOBAL_CONFIG_ID: &str = "global";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfGlobalConfig {
    pub htf_candle_count: i64,
    pub htf_candle_minutes: i64,
    pub itf_candle_count: i64,
    pub itf_candle_minutes: i64,
    pub ltf_candle_count: i64,
    pub ltf_candle_minutes: i64,
    pub htf_weight: Decimal,
    pub itf_weight: Decimal,
    pub ltf_weight: Decimal,
    pub buy_zone_pct_tier1: Decimal,
    pub buy_zone_pct_tier2: Decimal,
    pub buy_zone_pct_tier3: Decimal,
    pub confluence_threshold: Decimal,
    pub confluence_multiplier: Decimal,
    pub position_log_loss_cap: Decimal,
    pub portfolio_log_loss_cap: Decimal,
    pub kelly_fraction: Decimal,
    pub trailing_stop_activation_pct: Decimal,
    pub trailing_stop_trail_pct: Decimal,
    pub velocity_throttle_low: Decimal,
    pub velocity_throttle_high: Decimal,
    pub utility_asymmetry_ratio: Decimal,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Default for MtfGlobalConfig {
    fn default() -> Self {
        Self {
            htf_candle_count: 50,
            htf_candle_minutes: 60,
            itf_candle_count: 50,
            itf_candle_minutes: 15,
            ltf_candle_count: 50,
            ltf_candle_minutes: 5,
            htf_weight: Decimal::new(50, 2),
            itf_weight: Decimal::new(30, 2),
            ltf_weight: Decimal::new(20, 2),
            buy_zone_pct_tier1: Decimal::new(25, 3),
            buy_zone_pct_tier2: Decimal::new(50, 3),
            buy_zone_pct_tier3: Decimal::new(75, 3),
            confluence_threshold: Decimal::new(60, 2),
            confluence_multiplier: Decimal::ONE,
            position_log_loss_cap: Decimal::new(2, 2),
            portfolio_log_loss_cap: Decimal::new(6, 2),
            kelly_fraction: Decimal::new(25, 2),
            trailing_stop_activation_pct: Decimal::new(1, 2),
            trailing_stop_trail_pct: Decimal::new(5, 3),
            velocity_throttle_low: Decimal::new(5, 1),
            velocity_throttle_high: Decimal::new(2, 0),
            utility_asymmetry_ratio: Decimal::new(15, 1),
            updated_at: Utc::now(),
            version: 1,
        }
    }
}

/// Per `(symbol, user_broker_id)` override; `None` means "inherit global"
/// (spec §3, §4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtfSymbolConfig {
    pub symbol: String,
    pub user_broker_id: Uuid,
    pub confluence_threshold: Option<Decimal>,
    pub confluence_multiplier: Option<Decimal>,
    pub position_log_loss_cap: Option<Decimal>,
    pub kelly_fraction: Option<Decimal>,
    pub trailing_stop_activation_pct: Option<Decimal>,
    pub trailing_stop_trail_pct: Option<Decimal>,
    pub velocity_throttle_low: Option<Decimal>,
    pub velocity_throttle_high: Option<Decimal>,
    pub utility_asymmetry_ratio: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Field-wise override of `global` by any non-null override fields
/// (spec §3: `resolveEffective(global)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveMtfConfig {
    pub confluence_threshold: Decimal,
    pub confluence_multiplier: Decimal,
    pub position_log_loss_cap: Decimal,
    pub kelly_fraction: Decimal,
    pub trailing_stop_activation_pct: Decimal,
    pub trailing_stop_trail_pct: Decimal,
    pub velocity_throttle_low: Decimal,
    pub velocity_throttle_high: Decimal,
    pub utility_asymmetry_ratio: Decimal,
}

impl MtfGlobalConfig {
    pub fn resolve_effective(&self, overrides: Option<&MtfSymbolConfig>) -> EffectiveMtfConfig {
        let o = overrides;
        EffectiveMtfConfig {
            confluence_threshold: o
                .and_then(|c| c.confluence_threshold)
                .unwrap_or(self.confluence_threshold),
            confluence_multiplier: o
                .and_then(|c| c.confluence_multiplier)
                .unwrap_or(self.confluence_multiplier),
            position_log_loss_cap: o
                .and_then(|c| c.position_log_loss_cap)
                .unwrap_or(self.position_log_loss_cap),
            kelly_fraction: o.and_then(|c| c.kelly_fraction).unwrap_or(self.kelly_fraction),
            trailing_stop_activation_pct: o
                .and_then(|c| c.trailing_stop_activation_pct)
                .unwrap_or(self.trailing_stop_activation_pct),
            trailing_stop_trail_pct: o
                .and_then(|c| c.trailing_stop_trail_pct)
                .unwrap_or(self.trailing_stop_trail_pct),
            velocity_throttle_low: o
                .and_then(|c| c.velocity_throttle_low)
                .unwrap_or(self.velocity_throttle_low),
            velocity_throttle_high: o
                .and_then(|c| c.velocity_throttle_high)
                .unwrap_or(self.velocity_throttle_high),
            utility_asymmetry_ratio: o
                .and_then(|c| c.utility_asymmetry_ratio)
                .unwrap_or(self.utility_asymmetry_ratio),
        }
    }
}
