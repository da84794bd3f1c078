//! Confluence Backend
//!
//! Core state-machine engine that turns market observations into orders and
//! orders into reconciled positions: signal ingest, per-user-broker fan-out,
//! entry/exit intent pipelines, and the broker connectivity substrate that
//! backs them. HTTP routing lives in `api`; everything else is reachable
//! directly for tests and background tasks.

pub mod api;
pub mod broker;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod events;
pub mod instruments;
pub mod intents;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod mtf_config;
pub mod portfolio;
pub mod signals;
pub mod time_util;
pub mod watchlist;

pub use config::Config;
pub use db::Store;
pub use error::AppError;
