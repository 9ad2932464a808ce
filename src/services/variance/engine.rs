use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::inventory_item::Model as ItemModel;
use crate::entities::inventory_period::{Model as PeriodModel, PeriodStatus};
use crate::entities::period_inventory_snapshot::{Model as SnapshotModel, SnapshotType};
use crate::entities::theoretical_usage_analysis::{
    CalculationMethod, InvestigationStatus, Model as AnalysisModel,
};
use crate::errors::{ItemError, ServiceError};
use crate::events::{Event, EventSender};
use crate::repositories::Repositories;
use crate::services::attributes_to_json;

use super::classification::{
    actual_usage, classify, compute_variance, VarianceThresholds, VarianceTolerance,
};
use super::theoretical::{MethodContext, TheoreticalUsageCalculator};

#[derive(Debug, Clone, Deserialize)]
pub struct CalculationRequest {
    /// One of `recipe_based`, `historical_average`, `manual`, `ai_predicted`
    pub method: String,
    /// Restrict to these items; every item counted in the period otherwise
    #[serde(default)]
    pub item_ids: Option<Vec<Uuid>>,
    /// Overwrite analyses that already exist for the period
    #[serde(default)]
    pub recalculate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageCalculationOutcome {
    pub period_id: Uuid,
    pub method: CalculationMethod,
    pub analyses: Vec<AnalysisModel>,
    /// Items whose existing analysis was kept because `recalculate` was off
    pub skipped: Vec<Uuid>,
    pub errors: Vec<ItemError>,
}

/// Theoretical-vs-actual usage per item for one period.
pub struct UsageCalculationEngine {
    repos: Repositories,
    calculator: TheoreticalUsageCalculator,
    thresholds: VarianceThresholds,
    event_sender: Option<EventSender>,
}

impl UsageCalculationEngine {
    pub fn new(
        repos: Repositories,
        thresholds: VarianceThresholds,
        event_sender: Option<EventSender>,
    ) -> Self {
        let calculator = TheoreticalUsageCalculator::new(
            repos.periods.clone(),
            repos.recipes.clone(),
            repos.sales.clone(),
            repos.analyses.clone(),
            thresholds.clone(),
        );
        Self {
            repos,
            calculator,
            thresholds,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(method = %request.method, recalculate = request.recalculate))]
    pub async fn calculate_usage_for_period(
        &self,
        period_id: Uuid,
        request: CalculationRequest,
    ) -> Result<UsageCalculationOutcome, ServiceError> {
        let started = Instant::now();
        let method = CalculationMethod::from_str(&request.method)
            .map_err(|_| ServiceError::UnknownCalculationMethod(request.method.clone()))?;

        let period = self
            .repos
            .periods
            .find_period(period_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Period {} not found", period_id)))?;
        if !matches!(period.status, PeriodStatus::Active | PeriodStatus::Closed) {
            return Err(ServiceError::InvalidOperation(format!(
                "variance can only be calculated for active or closed periods, period is {}",
                period.status
            )));
        }

        let snapshots = self.repos.periods.find_snapshots(period_id).await?;
        let item_ids: Vec<Uuid> = match &request.item_ids {
            Some(ids) => ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect(),
            None => snapshots
                .iter()
                .map(|s| s.inventory_item_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        let context = self.calculator.prepare(method, &period, &item_ids).await?;

        let mut counts: HashMap<(Uuid, SnapshotType), &SnapshotModel> = HashMap::new();
        for snapshot in &snapshots {
            counts.insert((snapshot.inventory_item_id, snapshot.snapshot_type), snapshot);
        }
        let items: HashMap<Uuid, ItemModel> = self
            .repos
            .items
            .find_by_ids(&item_ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut outcome = UsageCalculationOutcome {
            period_id,
            method,
            analyses: Vec::with_capacity(item_ids.len()),
            skipped: Vec::new(),
            errors: Vec::new(),
        };

        for item_id in &item_ids {
            let Some(item) = items.get(item_id) else {
                let err = ServiceError::NotFound(format!("Inventory item {} not found", item_id));
                outcome.errors.push(ItemError::for_item(*item_id, &err));
                continue;
            };

            if !request.recalculate {
                if let Some(existing) = self.repos.analyses.find_for_item(period_id, *item_id).await? {
                    outcome.skipped.push(*item_id);
                    outcome.analyses.push(existing);
                    continue;
                }
            }

            match self
                .analyze_item(&period, item, &counts, method, &context)
                .await
            {
                Ok(analysis) => outcome.analyses.push(analysis),
                Err(err) if !err.is_request_fatal() => {
                    warn!(item_id = %item_id, error = %err, "Skipping item in variance calculation");
                    outcome.errors.push(ItemError::for_item(*item_id, &err));
                }
                Err(err) => return Err(err),
            }
        }

        if outcome.errors.is_empty() && self.covers_counted_items(period_id, &snapshots).await? {
            self.repos.periods.set_analysis_completed(period_id, true).await?;
        }

        counter!("variance.analyses.computed", outcome.analyses.len() as u64);
        counter!("variance.analyses.errors", outcome.errors.len() as u64);
        histogram!("variance.calculation.duration", started.elapsed().as_secs_f64());
        info!(
            period_id = %period_id,
            analyses = outcome.analyses.len(),
            skipped = outcome.skipped.len(),
            errors = outcome.errors.len(),
            "Variance calculation finished"
        );

        if let Some(sender) = &self.event_sender {
            let event = Event::VarianceCalculated {
                period_id,
                method: method.to_string(),
                analyses: outcome.analyses.len(),
                errors: outcome.errors.len(),
            };
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish variance event: {}", e);
            }
        }

        Ok(outcome)
    }

    /// Every counted item has an analysis calculated after its latest count.
    async fn covers_counted_items(
        &self,
        period_id: Uuid,
        snapshots: &[SnapshotModel],
    ) -> Result<bool, ServiceError> {
        let mut last_counted: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for snapshot in snapshots {
            let counted_at = last_counted
                .entry(snapshot.inventory_item_id)
                .or_insert(snapshot.updated_at);
            if snapshot.updated_at > *counted_at {
                *counted_at = snapshot.updated_at;
            }
        }

        let calculated: HashMap<Uuid, DateTime<Utc>> = self
            .repos
            .analyses
            .list_for_period(period_id)
            .await?
            .into_iter()
            .map(|analysis| (analysis.inventory_item_id, analysis.calculated_at))
            .collect();

        Ok(last_counted.iter().all(|(item_id, counted_at)| {
            calculated
                .get(item_id)
                .is_some_and(|calculated_at| calculated_at >= counted_at)
        }))
    }

    async fn analyze_item(
        &self,
        period: &PeriodModel,
        item: &ItemModel,
        counts: &HashMap<(Uuid, SnapshotType), &SnapshotModel>,
        method: CalculationMethod,
        context: &MethodContext,
    ) -> Result<AnalysisModel, ServiceError> {
        let snapshot = |kind: SnapshotType| {
            counts
                .get(&(item.id, kind))
                .copied()
                .ok_or_else(|| ServiceError::MissingSnapshot {
                    item_id: item.id,
                    snapshot_type: kind.to_string(),
                })
        };
        let beginning = snapshot(SnapshotType::Beginning)?;
        let ending = snapshot(SnapshotType::Ending)?;

        let purchases = self
            .repos
            .ledger
            .sum_purchases(item.id, period.starts_at(), period.ends_before())
            .await?;
        let actual = actual_usage(beginning.quantity, purchases, ending.quantity);

        let theoretical = self.calculator.estimate(context, period, item).await?;
        let figures = compute_variance(theoretical.quantity, actual, item.unit_cost);
        let priority = classify(&figures, &VarianceTolerance::from(item), &self.thresholds);

        let now = Utc::now();
        let analysis = AnalysisModel {
            id: Uuid::new_v4(),
            period_id: period.id,
            inventory_item_id: item.id,
            restaurant_id: period.restaurant_id,
            theoretical_quantity: figures.theoretical_quantity,
            actual_quantity: figures.actual_quantity,
            unit_cost: item.unit_cost,
            variance_quantity: figures.variance_quantity,
            variance_percentage: figures.variance_percentage,
            variance_dollar_value: figures.variance_dollar,
            priority,
            calculation_method: method,
            confidence: theoretical.confidence,
            investigation_status: InvestigationStatus::Pending,
            assigned_to: None,
            assigned_at: None,
            investigated_by: None,
            investigation_notes: None,
            explanation: None,
            resolved_at: None,
            recipe_data: attributes_to_json(&theoretical.metadata),
            calculated_at: now,
            created_at: now,
            updated_at: now,
        };

        self.repos.analyses.upsert_computed(analysis).await
    }
}
