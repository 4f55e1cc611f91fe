//! Money helpers for SAR-denominated amounts
//!
//! All amounts are `rust_decimal::Decimal` with two fractional digits and are
//! serialized as decimal strings. Binary floats never enter a money path.

use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};

/// Fractional digits carried by every money amount
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to the money scale
pub fn round(amount: Decimal) -> Decimal {
    amount.round_dp(MONEY_SCALE)
}

/// Reject non-positive amounts before any write
pub fn require_positive(amount: Decimal, field: &str) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "{} must be greater than 0, got {}",
            field, amount
        )));
    }
    Ok(())
}

/// Percentage ratio `numerator / denominator * 100`, zero when the
/// denominator is zero. A zero limit or zero outstanding yields 0, never a
/// division error or NaN.
pub fn ratio_pct(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    (numerator / denominator * Decimal::ONE_HUNDRED).round_dp(MONEY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive(dec("100.00"), "amount").is_ok());
        assert!(require_positive(Decimal::ZERO, "amount").is_err());
        assert!(require_positive(dec("-5"), "amount").is_err());
    }

    #[test]
    fn test_ratio_pct() {
        assert_eq!(ratio_pct(dec("400000"), dec("1000000")), dec("40.00"));
        assert_eq!(ratio_pct(dec("1"), dec("3")), dec("33.33"));
    }

    #[test]
    fn test_ratio_pct_zero_denominator_is_zero() {
        assert_eq!(ratio_pct(dec("500"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ratio_pct(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_round() {
        assert_eq!(round(dec("10.005")), dec("10.00"));
        assert_eq!(round(dec("10.015")), dec("10.02"));
    }
}
