//! Pure variance rules: usage math, severity classification and the ledger approval rule.
//!
//! Nothing in here touches storage. The engine and the ledger feed plain values in and
//! persist whatever comes out.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::entities::inventory_item;
use crate::entities::inventory_transaction::TransactionType;
use crate::entities::theoretical_usage_analysis::VariancePriority;

/// Named, overridable constants of the variance rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceThresholds {
    /// Any variance above `dollar threshold × this` is critical, flag or not
    pub critical_dollar_multiplier: Decimal,
    /// A quantity breach above `quantity threshold × this` alone is medium
    pub medium_quantity_multiplier: Decimal,
    /// Single-analysis dollar impact that produces a financial-impact insight
    pub large_impact_threshold: Decimal,
    /// Closed periods averaged by the historical method
    pub historical_periods: u64,
    /// Confidence assigned to recipe-based estimates
    pub recipe_confidence: Decimal,
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            critical_dollar_multiplier: dec!(2),
            medium_quantity_multiplier: dec!(1.5),
            large_impact_threshold: dec!(500),
            historical_periods: 6,
            recipe_confidence: dec!(0.90),
        }
    }
}

/// Per-item tolerances the classification compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarianceTolerance {
    pub quantity: Decimal,
    pub dollar: Decimal,
    pub high_value: bool,
}

impl From<&inventory_item::Model> for VarianceTolerance {
    fn from(item: &inventory_item::Model) -> Self {
        Self {
            quantity: item.variance_threshold_quantity,
            dollar: item.variance_threshold_dollar,
            high_value: item.high_value_flag,
        }
    }
}

/// Computed variance columns of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VarianceFigures {
    pub theoretical_quantity: Decimal,
    pub actual_quantity: Decimal,
    pub variance_quantity: Decimal,
    pub variance_percentage: Decimal,
    pub variance_dollar: Decimal,
}

/// `beginning + purchases − ending`, never below zero.
pub fn actual_usage(beginning: Decimal, purchases: Decimal, ending: Decimal) -> Decimal {
    (beginning + purchases - ending).max(Decimal::ZERO)
}

pub fn compute_variance(theoretical: Decimal, actual: Decimal, unit_cost: Decimal) -> VarianceFigures {
    let variance_quantity = actual - theoretical;
    let variance_percentage = if theoretical.is_zero() {
        Decimal::ZERO
    } else {
        (variance_quantity / theoretical * dec!(100)).round_dp(2)
    };

    VarianceFigures {
        theoretical_quantity: theoretical,
        actual_quantity: actual,
        variance_quantity,
        variance_percentage,
        variance_dollar: (variance_quantity * unit_cost).round_dp(2),
    }
}

/// Ordered rule table, first match wins.
pub fn classify(
    figures: &VarianceFigures,
    tolerance: &VarianceTolerance,
    thresholds: &VarianceThresholds,
) -> VariancePriority {
    let dollar = figures.variance_dollar.abs();
    let quantity = figures.variance_quantity.abs();

    if (tolerance.high_value && dollar > tolerance.dollar)
        || dollar > tolerance.dollar * thresholds.critical_dollar_multiplier
    {
        VariancePriority::Critical
    } else if quantity > tolerance.quantity && dollar > tolerance.dollar {
        VariancePriority::High
    } else if quantity > tolerance.quantity * thresholds.medium_quantity_multiplier {
        VariancePriority::Medium
    } else {
        VariancePriority::Low
    }
}

/// Waste and adjustments need sign-off when they move more money than the item
/// tolerates, or when a high-value item moves more units than it tolerates.
pub fn requires_approval(
    transaction_type: TransactionType,
    quantity: Decimal,
    unit_cost: Decimal,
    tolerance: &VarianceTolerance,
) -> bool {
    if !matches!(
        transaction_type,
        TransactionType::Waste | TransactionType::Adjustment
    ) {
        return false;
    }
    let impact = (quantity * unit_cost).abs();
    impact > tolerance.dollar || (tolerance.high_value && quantity.abs() > tolerance.quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn figures(quantity: Decimal, dollar: Decimal) -> VarianceFigures {
        VarianceFigures {
            theoretical_quantity: Decimal::ZERO,
            actual_quantity: quantity,
            variance_quantity: quantity,
            variance_percentage: Decimal::ZERO,
            variance_dollar: dollar,
        }
    }

    fn tolerance(quantity: Decimal, dollar: Decimal, high_value: bool) -> VarianceTolerance {
        VarianceTolerance {
            quantity,
            dollar,
            high_value,
        }
    }

    #[rstest]
    #[case::flagged_item_over_dollar_threshold(dec!(1), dec!(74), tolerance(dec!(5), dec!(50), true), VariancePriority::Critical)]
    #[case::double_threshold_without_flag(dec!(1), dec!(-101), tolerance(dec!(5), dec!(50), false), VariancePriority::Critical)]
    #[case::both_thresholds_breached(dec!(3.5), dec!(18), tolerance(dec!(3), dec!(15), false), VariancePriority::High)]
    #[case::quantity_well_past_threshold(dec!(14), dec!(5), tolerance(dec!(8), dec!(50), false), VariancePriority::Medium)]
    #[case::quantity_between_one_and_one_and_a_half(dec!(11), dec!(5), tolerance(dec!(8), dec!(50), false), VariancePriority::Low)]
    #[case::small_variance(dec!(0.5), dec!(2), tolerance(dec!(5), dec!(50), true), VariancePriority::Low)]
    fn priority_rules_apply_in_order(
        #[case] quantity: Decimal,
        #[case] dollar: Decimal,
        #[case] limits: VarianceTolerance,
        #[case] expected: VariancePriority,
    ) {
        let result = classify(
            &figures(quantity, dollar),
            &limits,
            &VarianceThresholds::default(),
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn multipliers_are_overridable() {
        let thresholds = VarianceThresholds {
            medium_quantity_multiplier: dec!(1.2),
            ..Default::default()
        };
        let result = classify(
            &figures(dec!(10), dec!(1)),
            &tolerance(dec!(8), dec!(50), false),
            &thresholds,
        );
        assert_eq!(result, VariancePriority::Medium);
    }

    #[test]
    fn purchase_scenario_yields_fifteen_units_of_usage() {
        assert_eq!(actual_usage(dec!(50), dec!(10), dec!(45)), dec!(15));
    }

    #[test]
    fn zero_theoretical_has_zero_percentage() {
        let result = compute_variance(Decimal::ZERO, dec!(5), dec!(1.25));
        assert_eq!(result.variance_percentage, Decimal::ZERO);
        assert_eq!(result.variance_dollar, dec!(6.25));
        assert_eq!(result.variance_quantity, dec!(5));
    }

    #[test]
    fn percentage_is_relative_to_theoretical() {
        let result = compute_variance(dec!(20), dec!(25), dec!(2));
        assert_eq!(result.variance_percentage, dec!(25));
        assert_eq!(result.variance_dollar, dec!(10));
    }

    #[rstest]
    #[case(TransactionType::Waste, dec!(-10), dec!(6), false, true)]
    #[case(TransactionType::Waste, dec!(-2), dec!(6), false, false)]
    #[case(TransactionType::Adjustment, dec!(-6), dec!(1), true, true)]
    #[case(TransactionType::Adjustment, dec!(-6), dec!(1), false, false)]
    #[case(TransactionType::Purchase, dec!(500), dec!(10), true, false)]
    #[case(TransactionType::Usage, dec!(-500), dec!(10), true, false)]
    fn approval_only_for_large_waste_and_adjustments(
        #[case] kind: TransactionType,
        #[case] quantity: Decimal,
        #[case] unit_cost: Decimal,
        #[case] high_value: bool,
        #[case] expected: bool,
    ) {
        let limits = tolerance(dec!(5), dec!(50), high_value);
        assert_eq!(requires_approval(kind, quantity, unit_cost, &limits), expected);
    }

    fn amount() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|v| Decimal::new(v, 4))
    }

    proptest! {
        #[test]
        fn actual_usage_is_never_negative(b in amount(), p in amount(), e in amount()) {
            prop_assert!(actual_usage(b, p, e) >= Decimal::ZERO);
        }

        #[test]
        fn dollar_variance_matches_quantity_times_cost(
            theoretical in amount(),
            actual in amount(),
            cost in (0i64..100_000).prop_map(|v| Decimal::new(v, 2)),
        ) {
            let result = compute_variance(theoretical, actual, cost);
            prop_assert_eq!(
                result.variance_dollar,
                ((actual - theoretical) * cost).round_dp(2)
            );
        }

        #[test]
        fn classification_is_deterministic(
            quantity in amount(),
            dollar in amount(),
            high_value in any::<bool>(),
        ) {
            let input = figures(quantity, dollar);
            let limits = tolerance(dec!(5), dec!(50), high_value);
            let thresholds = VarianceThresholds::default();
            prop_assert_eq!(
                classify(&input, &limits, &thresholds),
                classify(&input, &limits, &thresholds)
            );
        }
    }
}
