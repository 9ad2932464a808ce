use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::ServiceError;

/// Provider amounts arrive in minor units.
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn optional_cents(cents: Option<i64>) -> Decimal {
    cents.map(cents_to_decimal).unwrap_or(Decimal::ZERO)
}

/// Parses a provider quantity string such as `"2"` or `"1.5"`.
pub fn parse_quantity(raw: &str) -> Result<Decimal, ServiceError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .map_err(|_| ServiceError::ValidationError(format!("invalid quantity '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(1250, dec!(12.50))]
    #[case(0, dec!(0))]
    #[case(-399, dec!(-3.99))]
    #[case(5, dec!(0.05))]
    fn converts_minor_units(#[case] cents: i64, #[case] expected: Decimal) {
        assert_eq!(cents_to_decimal(cents), expected);
    }

    #[test]
    fn missing_amount_is_zero() {
        assert_eq!(optional_cents(None), Decimal::ZERO);
        assert_eq!(optional_cents(Some(100)), dec!(1));
    }

    #[test]
    fn parses_decimal_quantities() {
        assert_eq!(parse_quantity(" 1.5 ").unwrap(), dec!(1.5));
        assert_eq!(parse_quantity("3").unwrap(), dec!(3));
        assert_matches!(parse_quantity("two"), Err(ServiceError::ValidationError(_)));
    }
}
