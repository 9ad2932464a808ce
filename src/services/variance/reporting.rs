use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::theoretical_usage_analysis::{
    InvestigationStatus, Model as AnalysisModel, VariancePriority,
};
use crate::errors::ServiceError;
use crate::repositories::{AnalysisRepository, PeriodRepository};

use super::classification::VarianceThresholds;

const TREND_BAND: Decimal = dec!(0.10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Compares the mean of the newer half of `series` (oldest first) against the older half.
/// Differences within 10 % of the older mean are stable.
pub fn trend_direction(series: &[Decimal]) -> TrendDirection {
    if series.len() < 2 {
        return TrendDirection::Stable;
    }
    let half = series.len() / 2;
    let mean = |values: &[Decimal]| values.iter().copied().sum::<Decimal>() / Decimal::from(values.len());
    let older = mean(&series[..half]);
    let newer = mean(&series[series.len() - half..]);

    let band = older.abs() * TREND_BAND;
    let delta = newer - older;
    if delta > band {
        TrendDirection::Increasing
    } else if -delta > band {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VarianceFilter {
    pub priority: Option<VariancePriority>,
    pub status: Option<InvestigationStatus>,
    pub min_dollar_impact: Option<Decimal>,
}

impl VarianceFilter {
    fn matches(&self, analysis: &AnalysisModel) -> bool {
        self.priority.map_or(true, |p| analysis.priority == p)
            && self.status.map_or(true, |s| analysis.investigation_status == s)
            && self
                .min_dollar_impact
                .map_or(true, |min| analysis.variance_dollar_value.abs() >= min)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VarianceTotals {
    pub count: usize,
    pub by_priority: BTreeMap<String, usize>,
    pub total_absolute_dollar: Decimal,
    pub net_dollar: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodVarianceReport {
    pub period_id: Uuid,
    pub analyses: Vec<AnalysisModel>,
    pub totals: VarianceTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityBucket {
    pub priority: VariancePriority,
    pub count: usize,
    pub unresolved: usize,
    pub total_absolute_dollar: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecommendationKind {
    CriticalInvestigation,
    HighPriorityReview,
    AssignPending,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
    pub analysis_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InsightKind {
    FinancialImpact,
    InvestigationProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityVarianceSummary {
    pub period_id: Uuid,
    pub buckets: Vec<PriorityBucket>,
    pub recommendations: Vec<Recommendation>,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrendQuery {
    pub item_ids: Option<Vec<Uuid>>,
    /// Closed periods to look back over; the configured history depth when absent
    pub periods: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub period_id: Uuid,
    pub period_start: NaiveDate,
    pub variance_quantity: Decimal,
    pub variance_dollar: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemVarianceTrend {
    pub item_id: Uuid,
    pub points: Vec<TrendPoint>,
    pub average_variance_quantity: Decimal,
    pub average_variance_dollar: Decimal,
    pub direction: TrendDirection,
}

fn unresolved(analysis: &AnalysisModel) -> bool {
    matches!(
        analysis.investigation_status,
        InvestigationStatus::Pending | InvestigationStatus::Investigating
    )
}

fn ids_where(analyses: &[AnalysisModel], pred: impl Fn(&AnalysisModel) -> bool) -> Vec<Uuid> {
    analyses.iter().filter(|a| pred(a)).map(|a| a.id).collect()
}

/// Pure aggregation behind `priority_variance_summary`.
pub fn summarize(
    period_id: Uuid,
    analyses: &[AnalysisModel],
    thresholds: &VarianceThresholds,
) -> PriorityVarianceSummary {
    let priorities = [
        VariancePriority::Critical,
        VariancePriority::High,
        VariancePriority::Medium,
        VariancePriority::Low,
    ];
    let buckets = priorities
        .iter()
        .map(|priority| {
            let matching: Vec<&AnalysisModel> =
                analyses.iter().filter(|a| a.priority == *priority).collect();
            PriorityBucket {
                priority: *priority,
                count: matching.len(),
                unresolved: matching.iter().filter(|a| unresolved(a)).count(),
                total_absolute_dollar: matching.iter().map(|a| a.variance_dollar_value.abs()).sum(),
            }
        })
        .collect();

    let mut recommendations = Vec::new();
    let critical_open = ids_where(analyses, |a| {
        a.priority == VariancePriority::Critical && unresolved(a)
    });
    if !critical_open.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::CriticalInvestigation,
            message: format!(
                "{} critical variance(s) still open; investigate immediately",
                critical_open.len()
            ),
            analysis_ids: critical_open,
        });
    }
    let high_open = ids_where(analyses, |a| a.priority == VariancePriority::High && unresolved(a));
    if !high_open.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::HighPriorityReview,
            message: format!("{} high priority variance(s) awaiting review", high_open.len()),
            analysis_ids: high_open,
        });
    }
    let unassigned = ids_where(analyses, |a| {
        a.investigation_status == InvestigationStatus::Pending
            && a.assigned_to.is_none()
            && matches!(a.priority, VariancePriority::Critical | VariancePriority::High)
    });
    if !unassigned.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::AssignPending,
            message: format!("{} significant variance(s) have no investigator", unassigned.len()),
            analysis_ids: unassigned,
        });
    }

    let mut insights: Vec<Insight> = analyses
        .iter()
        .filter(|a| a.variance_dollar_value.abs() > thresholds.large_impact_threshold)
        .map(|a| Insight {
            kind: InsightKind::FinancialImpact,
            message: format!(
                "Item {} varies by ${} this period",
                a.inventory_item_id, a.variance_dollar_value
            ),
            analysis_id: Some(a.id),
            amount: Some(a.variance_dollar_value),
        })
        .collect();

    if !analyses.is_empty() {
        let closed = analyses.iter().filter(|a| !unresolved(a)).count();
        insights.push(Insight {
            kind: InsightKind::InvestigationProgress,
            message: format!("{} of {} variances closed out", closed, analyses.len()),
            analysis_id: None,
            amount: None,
        });
    }

    PriorityVarianceSummary {
        period_id,
        buckets,
        recommendations,
        insights,
    }
}

/// Read-side views over computed analyses.
pub struct VarianceReportingService {
    periods: Arc<dyn PeriodRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    thresholds: VarianceThresholds,
}

impl VarianceReportingService {
    pub fn new(
        periods: Arc<dyn PeriodRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        thresholds: VarianceThresholds,
    ) -> Self {
        Self {
            periods,
            analyses,
            thresholds,
        }
    }

    async fn require_period(&self, period_id: Uuid) -> Result<(), ServiceError> {
        self.periods
            .find_period(period_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Period {} not found", period_id)))
    }

    /// Filtered analyses of a period, largest dollar impact first.
    #[instrument(skip(self, filter))]
    pub async fn analyze_period_variance(
        &self,
        period_id: Uuid,
        filter: VarianceFilter,
    ) -> Result<PeriodVarianceReport, ServiceError> {
        self.require_period(period_id).await?;

        let mut analyses: Vec<AnalysisModel> = self
            .analyses
            .list_for_period(period_id)
            .await?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();
        analyses.sort_by(|a, b| {
            b.variance_dollar_value
                .abs()
                .cmp(&a.variance_dollar_value.abs())
        });

        let mut by_priority = BTreeMap::new();
        for analysis in &analyses {
            *by_priority.entry(analysis.priority.to_string()).or_insert(0) += 1;
        }
        let totals = VarianceTotals {
            count: analyses.len(),
            by_priority,
            total_absolute_dollar: analyses.iter().map(|a| a.variance_dollar_value.abs()).sum(),
            net_dollar: analyses.iter().map(|a| a.variance_dollar_value).sum(),
        };

        Ok(PeriodVarianceReport {
            period_id,
            analyses,
            totals,
        })
    }

    #[instrument(skip(self))]
    pub async fn priority_variance_summary(
        &self,
        period_id: Uuid,
    ) -> Result<PriorityVarianceSummary, ServiceError> {
        self.require_period(period_id).await?;
        let analyses = self.analyses.list_for_period(period_id).await?;
        Ok(summarize(period_id, &analyses, &self.thresholds))
    }

    /// Per-item variance over the most recent closed or locked periods, oldest first.
    #[instrument(skip(self, query))]
    pub async fn historical_variance_trends(
        &self,
        restaurant_id: Uuid,
        query: TrendQuery,
    ) -> Result<Vec<ItemVarianceTrend>, ServiceError> {
        let limit = query.periods.unwrap_or(self.thresholds.historical_periods);
        let closed = self
            .periods
            .recent_closed_periods(restaurant_id, None, limit)
            .await?;
        if closed.is_empty() {
            return Ok(Vec::new());
        }

        let starts: HashMap<Uuid, NaiveDate> =
            closed.iter().map(|p| (p.id, p.period_start)).collect();
        let analyses = self
            .analyses
            .list_for_periods(closed.iter().map(|p| p.id).collect(), query.item_ids)
            .await?;

        let mut per_item: BTreeMap<Uuid, Vec<TrendPoint>> = BTreeMap::new();
        for analysis in analyses {
            let Some(start) = starts.get(&analysis.period_id) else {
                continue;
            };
            per_item
                .entry(analysis.inventory_item_id)
                .or_default()
                .push(TrendPoint {
                    period_id: analysis.period_id,
                    period_start: *start,
                    variance_quantity: analysis.variance_quantity,
                    variance_dollar: analysis.variance_dollar_value,
                });
        }

        Ok(per_item
            .into_iter()
            .map(|(item_id, mut points)| {
                points.sort_by_key(|p| p.period_start);
                let n = Decimal::from(points.len());
                let magnitudes: Vec<Decimal> =
                    points.iter().map(|p| p.variance_dollar.abs()).collect();
                ItemVarianceTrend {
                    item_id,
                    average_variance_quantity: (points
                        .iter()
                        .map(|p| p.variance_quantity)
                        .sum::<Decimal>()
                        / n)
                        .round_dp(4),
                    average_variance_dollar: (points
                        .iter()
                        .map(|p| p.variance_dollar)
                        .sum::<Decimal>()
                        / n)
                        .round_dp(2),
                    direction: trend_direction(&magnitudes),
                    points,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::theoretical_usage_analysis::CalculationMethod;
    use chrono::Utc;
    use rstest::rstest;

    fn analysis(
        priority: VariancePriority,
        status: InvestigationStatus,
        dollar: Decimal,
    ) -> AnalysisModel {
        let now = Utc::now();
        AnalysisModel {
            id: Uuid::new_v4(),
            period_id: Uuid::nil(),
            inventory_item_id: Uuid::new_v4(),
            restaurant_id: Uuid::nil(),
            theoretical_quantity: Decimal::ZERO,
            actual_quantity: Decimal::ZERO,
            unit_cost: Decimal::ONE,
            variance_quantity: dollar,
            variance_percentage: Decimal::ZERO,
            variance_dollar_value: dollar,
            priority,
            calculation_method: CalculationMethod::RecipeBased,
            confidence: dec!(0.9),
            investigation_status: status,
            assigned_to: None,
            assigned_at: None,
            investigated_by: None,
            investigation_notes: None,
            explanation: None,
            resolved_at: None,
            recipe_data: None,
            calculated_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case(&[], TrendDirection::Stable)]
    #[case(&[dec!(10)], TrendDirection::Stable)]
    #[case(&[dec!(10), dec!(10.5)], TrendDirection::Stable)]
    #[case(&[dec!(10), dec!(12)], TrendDirection::Increasing)]
    #[case(&[dec!(20), dec!(18), dec!(99), dec!(10), dec!(8)], TrendDirection::Decreasing)]
    #[case(&[dec!(0), dec!(0), dec!(1)], TrendDirection::Increasing)]
    fn trend_compares_newer_half_to_older_half(
        #[case] series: &[Decimal],
        #[case] expected: TrendDirection,
    ) {
        assert_eq!(trend_direction(series), expected);
    }

    #[test]
    fn open_critical_items_produce_investigation_recommendation() {
        let analyses = vec![
            analysis(VariancePriority::Critical, InvestigationStatus::Pending, dec!(-620)),
            analysis(VariancePriority::Critical, InvestigationStatus::Resolved, dec!(80)),
            analysis(VariancePriority::Low, InvestigationStatus::Pending, dec!(3)),
        ];
        let summary = summarize(Uuid::nil(), &analyses, &VarianceThresholds::default());

        let critical = &summary.buckets[0];
        assert_eq!(critical.count, 2);
        assert_eq!(critical.unresolved, 1);
        assert_eq!(critical.total_absolute_dollar, dec!(700));

        let kinds: Vec<_> = summary.recommendations.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::CriticalInvestigation,
                RecommendationKind::AssignPending
            ]
        );
        assert_eq!(summary.recommendations[0].analysis_ids, vec![analyses[0].id]);

        let impact: Vec<_> = summary
            .insights
            .iter()
            .filter(|i| i.kind == InsightKind::FinancialImpact)
            .collect();
        assert_eq!(impact.len(), 1);
        assert_eq!(impact[0].amount, Some(dec!(-620)));
    }

    #[test]
    fn fully_resolved_period_has_no_recommendations() {
        let analyses = vec![
            analysis(VariancePriority::High, InvestigationStatus::Accepted, dec!(40)),
            analysis(VariancePriority::Medium, InvestigationStatus::Escalated, dec!(10)),
        ];
        let summary = summarize(Uuid::nil(), &analyses, &VarianceThresholds::default());
        assert!(summary.recommendations.is_empty());
        assert_eq!(summary.insights.len(), 1);
        assert_eq!(summary.insights[0].message, "2 of 2 variances closed out");
    }

    #[test]
    fn filter_applies_every_criterion() {
        let filter = VarianceFilter {
            priority: Some(VariancePriority::High),
            status: None,
            min_dollar_impact: Some(dec!(25)),
        };
        assert!(filter.matches(&analysis(
            VariancePriority::High,
            InvestigationStatus::Pending,
            dec!(-30)
        )));
        assert!(!filter.matches(&analysis(
            VariancePriority::High,
            InvestigationStatus::Pending,
            dec!(20)
        )));
        assert!(!filter.matches(&analysis(
            VariancePriority::Low,
            InvestigationStatus::Pending,
            dec!(30)
        )));
    }
}
