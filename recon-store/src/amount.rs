//! Amount representation at the storage edge
//!
//! Amounts are `Decimal` in the domain and integer cents in SQLite so that
//! SQL aggregates stay exact.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Convert a domain amount to integer cents (rounded to cent precision)
pub fn to_cents(amount: Decimal) -> Result<i64> {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| Error::AmountRange(amount.to_string()))
}

/// Convert stored cents back to a domain amount
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Optional variant of [`to_cents`]
pub fn opt_to_cents(amount: Option<Decimal>) -> Result<Option<i64>> {
    amount.map(to_cents).transpose()
}

/// Optional variant of [`from_cents`]
pub fn opt_from_cents(cents: Option<i64>) -> Option<Decimal> {
    cents.map(from_cents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_cent_amounts() {
        for cents in [0i64, 1, 99, 450_000, -12_345] {
            assert_eq!(to_cents(from_cents(cents)).unwrap(), cents);
        }
    }

    #[test]
    fn rounds_to_cent_precision() {
        assert_eq!(to_cents(dec!(10.005)).unwrap(), 1001);
        assert_eq!(to_cents(dec!(10.004)).unwrap(), 1000);
    }

    #[test]
    fn rejects_out_of_range() {
        let huge = Decimal::MAX;
        assert!(to_cents(huge).is_err());
    }
}
