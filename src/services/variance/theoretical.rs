use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::inventory_item::Model as ItemModel;
use crate::entities::inventory_period::Model as PeriodModel;
use crate::entities::theoretical_usage_analysis::CalculationMethod;
use crate::errors::ServiceError;
use crate::repositories::{AnalysisRepository, PeriodRepository, RecipeRepository, SalesRepository};
use crate::services::AdditionalAttributes;

use super::classification::VarianceThresholds;
use super::reporting::trend_direction;

const NO_HISTORY_CONFIDENCE: Decimal = dec!(0.20);
const NEW_ITEM_CONFIDENCE: Decimal = dec!(0.30);
const CONFIDENCE_PER_SAMPLE: Decimal = dec!(0.10);
const MAX_HISTORICAL_CONFIDENCE: Decimal = dec!(0.80);
const PREDICTIVE_DISCOUNT: Decimal = dec!(0.9);

/// Expected consumption of one item over one period.
#[derive(Debug, Clone, PartialEq)]
pub struct TheoreticalUsage {
    pub quantity: Decimal,
    pub confidence: Decimal,
    pub metadata: AdditionalAttributes,
}

/// Actual quantities of prior closed periods, per item, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistoricalBaseline {
    pub closed_periods: usize,
    pub samples: HashMap<Uuid, Vec<Decimal>>,
}

/// Per-request state shared by every item of one calculation.
#[derive(Debug, Clone)]
pub enum MethodContext {
    RecipeBased,
    Historical(HistoricalBaseline),
    Predictive(HistoricalBaseline),
}

pub struct TheoreticalUsageCalculator {
    periods: Arc<dyn PeriodRepository>,
    recipes: Arc<dyn RecipeRepository>,
    sales: Arc<dyn SalesRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    thresholds: VarianceThresholds,
}

impl TheoreticalUsageCalculator {
    pub fn new(
        periods: Arc<dyn PeriodRepository>,
        recipes: Arc<dyn RecipeRepository>,
        sales: Arc<dyn SalesRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        thresholds: VarianceThresholds,
    ) -> Self {
        Self {
            periods,
            recipes,
            sales,
            analyses,
            thresholds,
        }
    }

    /// Loads whatever the method needs once per request. `manual` has no source here.
    pub async fn prepare(
        &self,
        method: CalculationMethod,
        period: &PeriodModel,
        item_ids: &[Uuid],
    ) -> Result<MethodContext, ServiceError> {
        match method {
            CalculationMethod::RecipeBased => Ok(MethodContext::RecipeBased),
            CalculationMethod::HistoricalAverage => Ok(MethodContext::Historical(
                self.load_baseline(period, item_ids).await?,
            )),
            CalculationMethod::AiPredicted => Ok(MethodContext::Predictive(
                self.load_baseline(period, item_ids).await?,
            )),
            CalculationMethod::Manual => Err(ServiceError::UnsupportedMethod(
                "manual theoretical quantities must be supplied externally".into(),
            )),
        }
    }

    pub async fn estimate(
        &self,
        context: &MethodContext,
        period: &PeriodModel,
        item: &ItemModel,
    ) -> Result<TheoreticalUsage, ServiceError> {
        match context {
            MethodContext::RecipeBased => self.recipe_based(period, item).await,
            MethodContext::Historical(baseline) => Ok(historical_estimate(baseline, item.id)),
            MethodContext::Predictive(baseline) => Ok(predictive_estimate(baseline, item.id)),
        }
    }

    async fn recipe_based(
        &self,
        period: &PeriodModel,
        item: &ItemModel,
    ) -> Result<TheoreticalUsage, ServiceError> {
        if item.theoretical_yield_factor <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "item {} has a non-positive yield factor",
                item.id
            )));
        }

        let mut required = Decimal::ZERO;
        let mut breakdown = Vec::new();
        for (ingredient, recipe) in self.recipes.recipes_using_item(item.id).await? {
            let units_sold = self
                .sales
                .units_sold(recipe.menu_item_id, period.starts_at(), period.ends_before())
                .await?;
            required += ingredient.quantity_per_serving * units_sold;
            breakdown.push(json!({
                "recipe_id": recipe.id,
                "recipe_name": recipe.name,
                "quantity_per_serving": ingredient.quantity_per_serving,
                "units_sold": units_sold,
            }));
        }
        debug!(item_id = %item.id, recipes = breakdown.len(), "recipe usage computed");

        let mut metadata = AdditionalAttributes::new();
        metadata.insert("recipes".into(), json!(breakdown));
        metadata.insert("yield_factor".into(), json!(item.theoretical_yield_factor));

        Ok(TheoreticalUsage {
            quantity: (required / item.theoretical_yield_factor).round_dp(4),
            confidence: self.thresholds.recipe_confidence,
            metadata,
        })
    }

    async fn load_baseline(
        &self,
        period: &PeriodModel,
        item_ids: &[Uuid],
    ) -> Result<HistoricalBaseline, ServiceError> {
        let closed = self
            .periods
            .recent_closed_periods(
                period.restaurant_id,
                Some(period.period_start),
                self.thresholds.historical_periods,
            )
            .await?;
        if closed.is_empty() {
            return Ok(HistoricalBaseline::default());
        }

        let position: HashMap<Uuid, usize> = closed
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id, idx))
            .collect();
        let analyses = self
            .analyses
            .list_for_periods(
                closed.iter().map(|p| p.id).collect(),
                Some(item_ids.to_vec()),
            )
            .await?;

        // `closed` is newest first; samples are kept oldest first.
        let mut keyed: HashMap<Uuid, Vec<(usize, Decimal)>> = HashMap::new();
        for analysis in analyses {
            if let Some(idx) = position.get(&analysis.period_id) {
                keyed
                    .entry(analysis.inventory_item_id)
                    .or_default()
                    .push((*idx, analysis.actual_quantity));
            }
        }
        let samples = keyed
            .into_iter()
            .map(|(item_id, mut points)| {
                points.sort_by(|a, b| b.0.cmp(&a.0));
                (item_id, points.into_iter().map(|(_, q)| q).collect())
            })
            .collect();

        Ok(HistoricalBaseline {
            closed_periods: closed.len(),
            samples,
        })
    }
}

/// Mean actual usage over the baseline. Confidence grows with the number of samples.
pub fn historical_estimate(baseline: &HistoricalBaseline, item_id: Uuid) -> TheoreticalUsage {
    let mut metadata = AdditionalAttributes::new();

    if baseline.closed_periods == 0 {
        metadata.insert("basis".into(), json!("no_history"));
        metadata.insert("sample_count".into(), json!(0));
        return TheoreticalUsage {
            quantity: Decimal::ZERO,
            confidence: NO_HISTORY_CONFIDENCE,
            metadata,
        };
    }

    let samples = baseline
        .samples
        .get(&item_id)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if samples.is_empty() {
        metadata.insert("basis".into(), json!("new_item"));
        metadata.insert("sample_count".into(), json!(0));
        return TheoreticalUsage {
            quantity: Decimal::ZERO,
            confidence: NEW_ITEM_CONFIDENCE,
            metadata,
        };
    }

    let count = Decimal::from(samples.len());
    let mean = samples.iter().copied().sum::<Decimal>() / count;
    let confidence =
        (NO_HISTORY_CONFIDENCE + CONFIDENCE_PER_SAMPLE * count).min(MAX_HISTORICAL_CONFIDENCE);

    metadata.insert("basis".into(), json!("historical_average"));
    metadata.insert("sample_count".into(), json!(samples.len()));

    TheoreticalUsage {
        quantity: mean.round_dp(4),
        confidence,
        metadata,
    }
}

/// Historical estimate tagged with predictive factors.
pub fn predictive_estimate(baseline: &HistoricalBaseline, item_id: Uuid) -> TheoreticalUsage {
    let base = historical_estimate(baseline, item_id);
    let samples = baseline
        .samples
        .get(&item_id)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut metadata = base.metadata;
    metadata.insert(
        "base_method".into(),
        json!(CalculationMethod::HistoricalAverage.to_string()),
    );
    metadata.insert("trend".into(), json!(trend_direction(samples).to_string()));
    metadata.insert("base_confidence".into(), json!(base.confidence));

    TheoreticalUsage {
        quantity: base.quantity,
        confidence: (base.confidence * PREDICTIVE_DISCOUNT)
            .round_dp(4)
            .max(NO_HISTORY_CONFIDENCE),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(closed: usize, item: Uuid, samples: &[Decimal]) -> HistoricalBaseline {
        let mut map = HashMap::new();
        if !samples.is_empty() {
            map.insert(item, samples.to_vec());
        }
        HistoricalBaseline {
            closed_periods: closed,
            samples: map,
        }
    }

    #[test]
    fn no_closed_periods_means_low_confidence_zero_quantity() {
        let item = Uuid::new_v4();
        let estimate = historical_estimate(&HistoricalBaseline::default(), item);
        assert_eq!(estimate.quantity, Decimal::ZERO);
        assert_eq!(estimate.confidence, dec!(0.20));
    }

    #[test]
    fn untracked_item_gets_new_item_confidence() {
        let item = Uuid::new_v4();
        let estimate = historical_estimate(&baseline(3, Uuid::new_v4(), &[dec!(4)]), item);
        assert_eq!(estimate.quantity, Decimal::ZERO);
        assert_eq!(estimate.confidence, dec!(0.30));
        assert_eq!(estimate.metadata.get("basis"), Some(&json!("new_item")));
    }

    #[test]
    fn mean_of_samples_with_scaled_confidence() {
        let item = Uuid::new_v4();
        let estimate = historical_estimate(&baseline(4, item, &[dec!(10), dec!(12), dec!(14)]), item);
        assert_eq!(estimate.quantity, dec!(12));
        assert_eq!(estimate.confidence, dec!(0.50));
    }

    #[test]
    fn confidence_is_capped() {
        let item = Uuid::new_v4();
        let samples = vec![dec!(1); 9];
        let estimate = historical_estimate(&baseline(9, item, &samples), item);
        assert_eq!(estimate.confidence, dec!(0.80));
    }

    #[test]
    fn predictive_keeps_quantity_and_floors_confidence() {
        let item = Uuid::new_v4();
        let none = predictive_estimate(&HistoricalBaseline::default(), item);
        assert_eq!(none.confidence, dec!(0.20));

        let rising = predictive_estimate(&baseline(4, item, &[dec!(2), dec!(4), dec!(8), dec!(10)]), item);
        assert_eq!(rising.quantity, dec!(6));
        assert_eq!(rising.confidence, dec!(0.54));
        assert_eq!(rising.metadata.get("trend"), Some(&json!("increasing")));
        assert_eq!(
            rising.metadata.get("base_method"),
            Some(&json!("historical_average"))
        );
    }
}
