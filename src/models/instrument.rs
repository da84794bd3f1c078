use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub broker_code: String,
    pub exchange: String,
    pub trading_symbol: String,
    pub name: String,
    pub instrument_type: String,
    pub token: String,
    pub lot_size: Decimal,
    pub tick_size: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
