//! Broker adapter trait and the paper (simulated) implementation, adapted
//! from the teacher's `vault::execution::ExecutionAdapter` /
//! `PaperExecutionAdapter`: same shape (an `OrderRequest` in, an
//! `OrderAck` or rejection out, with injected latency/slippage/rejection
//! for deterministic tests), generalized from vault share transactions to
//! the entry/exit order placement primitives spec §4.5/§4.6 need.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::intent::OrderType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub broker_order_id: String,
    pub accepted_at: chrono::DateTime<chrono::Utc>,
    pub fill_price: Option<Decimal>,
}

/// Every concrete broker integration (Zerodha, Upstox, ...) implements
/// this at the adapter layer; pipelines never hold a broker-specific
/// type (spec §4.7).
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, AppError>;
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), AppError>;
    async fn exchange_auth_code(&self, auth_code: &str) -> Result<String, AppError>;
}

#[derive(Debug, Clone)]
pub struct PaperBrokerConfig {
    pub simulated_latency_ms: u64,
    pub slippage_bps: Decimal,
    pub rejection_rate_pct: Decimal,
}

impl PaperBrokerConfig {
    pub fn from_env() -> Self {
        let simulated_latency_ms = std::env::var("PAPER_BROKER_LATENCY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50);
        let slippage_bps = std::env::var("PAPER_BROKER_SLIPPAGE_BPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Decimal::new(5, 0));
        let rejection_rate_pct = std::env::var("PAPER_BROKER_REJECTION_PCT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Decimal::ZERO);
        Self {
            simulated_latency_ms,
            slippage_bps,
            rejection_rate_pct,
        }
    }
}

/// Simulated broker used by the paper-trading profile and by tests:
/// accepts every order after a fixed latency, applies a deterministic
/// slippage to the requested limit price (or a fallback reference price
/// for market orders), and fails deterministically once every
/// `1 / rejection_rate_pct` orders via an internal counter rather than
/// real randomness, so test runs stay reproducible.
pub struct PaperBrokerAdapter {
    config: PaperBrokerConfig,
    order_counter: AtomicU64,
}

impl PaperBrokerAdapter {
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self {
            config,
            order_counter: AtomicU64::new(0),
        }
    }

    fn should_reject(&self, seq: u64) -> bool {
        if self.config.rejection_rate_pct <= Decimal::ZERO {
            return false;
        }
        let denom = (Decimal::ONE_HUNDRED / self.config.rejection_rate_pct)
            .round()
            .to_string()
            .parse::<u64>()
            .unwrap_or(u64::MAX);
        denom > 0 && seq % denom == 0
    }
}

#[async_trait]
impl BrokerAdapter for PaperBrokerAdapter {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, AppError> {
        tokio::time::sleep(std::time::Duration::from_millis(self.config.simulated_latency_ms)).await;

        let seq = self.order_counter.fetch_add(1, Ordering::SeqCst);
        if self.should_reject(seq) {
            return Err(AppError::AdapterRejected {
                code: "PAPER_SIMULATED_REJECTION".to_string(),
                message: "paper broker simulated a rejection".to_string(),
            });
        }

        let base_price = request.limit_price.unwrap_or(Decimal::ZERO);
        let slippage = base_price * self.config.slippage_bps / Decimal::new(10_000, 0);
        let fill_price = match request.side {
            OrderSide::Buy => base_price + slippage,
            OrderSide::Sell => base_price - slippage,
        };

        Ok(OrderAck {
            broker_order_id: format!("PAPER-{}", Uuid::new_v4()),
            accepted_at: chrono::Utc::now(),
            fill_price: if fill_price.is_zero() { None } else { Some(fill_price) },
        })
    }

    async fn cancel_order(&self, _broker_order_id: &str) -> Result<(), AppError> {
        tokio::time::sleep(std::time::Duration::from_millis(self.config.simulated_latency_ms)).await;
        Ok(())
    }

    async fn exchange_auth_code(&self, auth_code: &str) -> Result<String, AppError> {
        Ok(format!("paper-access-token-{auth_code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn place_order_applies_buy_side_slippage() {
        let adapter = PaperBrokerAdapter::new(PaperBrokerConfig {
            simulated_latency_ms: 0,
            slippage_bps: Decimal::new(10, 0),
            rejection_rate_pct: Decimal::ZERO,
        });
        let ack = adapter
            .place_order(OrderRequest {
                client_order_id: Uuid::new_v4(),
                symbol: "TCS".to_string(),
                side: OrderSide::Buy,
                quantity: Decimal::new(10, 0),
                order_type: OrderType::Limit,
                limit_price: Some(Decimal::new(1000, 0)),
            })
            .await
            .unwrap();
        assert!(ack.fill_price.unwrap() > Decimal::new(1000, 0));
    }

    #[tokio::test]
    async fn exchange_auth_code_is_deterministic() {
        let adapter = PaperBrokerAdapter::new(PaperBrokerConfig {
            simulated_latency_ms: 0,
            slippage_bps: Decimal::ZERO,
            rejection_rate_pct: Decimal::ZERO,
        });
        let t1 = adapter.exchange_auth_code("code-1").await.unwrap();
        let t2 = adapter.exchange_auth_code("code-1").await.unwrap();
        assert_eq!(t1, t2);
    }
}
