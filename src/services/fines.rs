//! Late fine computation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct FinePolicy {
    daily_rate: Decimal,
}

impl FinePolicy {
    pub fn new(daily_rate: Decimal) -> Self {
        Self {
            daily_rate: daily_rate.max(Decimal::ZERO),
        }
    }

    /// Full days elapsed past `due_at`, never negative
    pub fn days_late(due_at: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
        (until - due_at).num_days().max(0)
    }

    /// Fine owed for a loan due at `due_at` and settled (or observed) at `until`
    pub fn fine_for(&self, due_at: DateTime<Utc>, until: DateTime<Utc>) -> Decimal {
        self.daily_rate * Decimal::from(Self::days_late(due_at, until))
    }
}
