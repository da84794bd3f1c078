//! Timestamp and rounding helpers shared across stores.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};

/// `signal_day` is the calendar date of `generated_at` in the system
/// timezone (spec §3), used as part of the signal dedupe key.
pub fn signal_day(generated_at: DateTime<Utc>, tz_name: &str) -> NaiveDate {
    let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    generated_at.with_timezone(&tz).date_naive()
}

/// Price band endpoints are stored at 2-decimal scale, half-up rounded, to
/// align with the dedupe key (spec §3, §9).
pub fn round_price_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up_not_bankers() {
        assert_eq!(round_price_half_up(dec!(2500.005)), dec!(2500.01));
        assert_eq!(round_price_half_up(dec!(2510.994)), dec!(2510.99));
    }

    #[test]
    fn signal_day_uses_system_timezone() {
        let ts = DateTime::parse_from_rfc3339("2025-01-15T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // 09:30 UTC == 15:00 IST, still 2025-01-15 in both.
        assert_eq!(
            signal_day(ts, "Asia/Kolkata"),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
    }
}
