//! HTTP middleware, adapted from the teacher's `middleware::logging` and
//! `middleware::rate_limit`.

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{RateLimitConfig, RateLimitLayer};
