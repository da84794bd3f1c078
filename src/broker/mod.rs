//! Broker Connectivity (spec §4.7): the `BrokerAdapter` trait every
//! concrete broker integration implements, a paper adapter for tests and
//! demo deployments, the reconnection/backoff policy, and OAuth exchange.

pub mod adapter;
pub mod oauth;
pub mod reconnect;
pub mod registry;

pub use adapter::{BrokerAdapter, OrderAck, OrderRequest, OrderSide, PaperBrokerAdapter, PaperBrokerConfig};
pub use reconnect::ReconnectionPolicy;
pub use registry::UserBrokerInput;
