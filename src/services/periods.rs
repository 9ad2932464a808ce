use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::inventory_period::{Model as PeriodModel, PeriodStatus, PeriodType};
use crate::entities::period_inventory_snapshot::{Model as SnapshotModel, SnapshotType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{ItemRepository, PeriodRepository};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePeriodRequest {
    pub restaurant_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordSnapshotRequest {
    pub inventory_item_id: Uuid,
    pub snapshot_type: SnapshotType,
    pub quantity: Decimal,
    /// Defaults to the item's current unit cost
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub counted_by: Option<Uuid>,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub notes: Option<String>,
}

/// Period lifecycle: `draft → active → closed → locked`.
pub struct PeriodService {
    periods: Arc<dyn PeriodRepository>,
    items: Arc<dyn ItemRepository>,
    event_sender: Option<EventSender>,
}

impl PeriodService {
    pub fn new(
        periods: Arc<dyn PeriodRepository>,
        items: Arc<dyn ItemRepository>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            periods,
            items,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(restaurant_id = %request.restaurant_id))]
    pub async fn create_period(
        &self,
        request: CreatePeriodRequest,
    ) -> Result<PeriodModel, ServiceError> {
        request.validate()?;
        if request.period_start >= request.period_end {
            return Err(ServiceError::ValidationError(format!(
                "period start {} must be before end {}",
                request.period_start, request.period_end
            )));
        }

        let now = Utc::now();
        let period = self
            .periods
            .insert_period(PeriodModel {
                id: Uuid::new_v4(),
                restaurant_id: request.restaurant_id,
                name: request.name,
                period_type: request.period_type,
                period_start: request.period_start,
                period_end: request.period_end,
                status: PeriodStatus::Draft,
                beginning_snapshot_completed: false,
                ending_snapshot_completed: false,
                variance_analysis_completed: false,
                closed_at: None,
                locked_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(period_id = %period.id, "Inventory period created");
        Ok(period)
    }

    pub async fn get_period(&self, period_id: Uuid) -> Result<PeriodModel, ServiceError> {
        self.periods
            .find_period(period_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Period {} not found", period_id)))
    }

    pub async fn list_periods(
        &self,
        restaurant_id: Uuid,
        status: Option<PeriodStatus>,
    ) -> Result<Vec<PeriodModel>, ServiceError> {
        self.periods.list_periods(restaurant_id, status).await
    }

    /// `draft → active`. The range must not overlap another active, closed or locked
    /// period of the restaurant; the overlap check and the status change are one write.
    #[instrument(skip(self))]
    pub async fn activate_period(&self, period_id: Uuid) -> Result<PeriodModel, ServiceError> {
        let period = self.get_period(period_id).await?;
        if period.status != PeriodStatus::Draft {
            return Err(ServiceError::InvalidTransition {
                from: period.status.to_string(),
                to: PeriodStatus::Active.to_string(),
            });
        }

        let moved = self
            .periods
            .activate_if_clear(
                period.id,
                period.restaurant_id,
                period.period_start,
                period.period_end,
            )
            .await?;
        let fresh = self.get_period(period.id).await?;
        if moved == 0 {
            if fresh.status != PeriodStatus::Draft {
                return Err(ServiceError::InvalidTransition {
                    from: fresh.status.to_string(),
                    to: PeriodStatus::Active.to_string(),
                });
            }
            let overlapping = self
                .periods
                .find_overlapping(
                    period.restaurant_id,
                    period.period_start,
                    period.period_end,
                    period.id,
                )
                .await?;
            return Err(match overlapping.first() {
                Some(other) => ServiceError::InvalidOperation(format!(
                    "period overlaps {} period '{}' ({} to {})",
                    other.status, other.name, other.period_start, other.period_end
                )),
                None => ServiceError::ConcurrentModification(period.id),
            });
        }

        self.publish_transition(&fresh, PeriodStatus::Draft, PeriodStatus::Active)
            .await;
        Ok(fresh)
    }

    /// Upserts the count for `(period, item, type)`. A re-count clears verification and
    /// marks the period's variance analysis as outstanding again.
    #[instrument(skip(self, request), fields(item_id = %request.inventory_item_id, snapshot_type = %request.snapshot_type))]
    pub async fn record_snapshot(
        &self,
        period_id: Uuid,
        request: RecordSnapshotRequest,
    ) -> Result<SnapshotModel, ServiceError> {
        request.validate()?;
        if request.quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "snapshot quantity cannot be negative".into(),
            ));
        }

        let period = self.get_period(period_id).await?;
        ensure_open(&period)?;

        let item = self
            .items
            .find_by_id(request.inventory_item_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Inventory item {} not found",
                    request.inventory_item_id
                ))
            })?;
        if item.restaurant_id != period.restaurant_id {
            return Err(ServiceError::ValidationError(format!(
                "item {} belongs to another restaurant",
                item.id
            )));
        }

        let now = Utc::now();
        let snapshot = self
            .periods
            .upsert_snapshot(SnapshotModel {
                id: Uuid::new_v4(),
                period_id,
                inventory_item_id: item.id,
                snapshot_type: request.snapshot_type,
                quantity: request.quantity,
                unit_cost: request.unit_cost.unwrap_or(item.unit_cost),
                verified: false,
                verified_by: None,
                counted_by: request.counted_by,
                notes: request.notes,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.periods.set_analysis_completed(period_id, false).await?;
        if period.variance_analysis_completed {
            info!(period_id = %period_id, "Recount invalidated the variance analysis");
        }
        Ok(snapshot)
    }

    pub async fn verify_snapshot(
        &self,
        snapshot_id: Uuid,
        verified_by: Uuid,
    ) -> Result<SnapshotModel, ServiceError> {
        let snapshot = self
            .periods
            .find_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Snapshot {} not found", snapshot_id)))?;
        let period = self.get_period(snapshot.period_id).await?;
        if period.status == PeriodStatus::Locked {
            return Err(ServiceError::InvalidOperation(
                "locked periods are immutable".into(),
            ));
        }
        self.periods.mark_snapshot_verified(snapshot_id, verified_by).await
    }

    /// Marks the beginning or ending count as done. At least one snapshot of the type
    /// must exist.
    #[instrument(skip(self))]
    pub async fn complete_snapshots(
        &self,
        period_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<PeriodModel, ServiceError> {
        let period = self.get_period(period_id).await?;
        ensure_open(&period)?;

        let count = self.periods.count_snapshots(period_id, snapshot_type).await?;
        if count == 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "no {} snapshots recorded for period {}",
                snapshot_type, period_id
            )));
        }
        self.periods
            .set_snapshot_completed(period_id, snapshot_type)
            .await?;
        info!(period_id = %period_id, snapshots = count, "Snapshots completed");
        self.get_period(period_id).await
    }

    /// `active → closed`, once both counts and the variance analysis are done.
    #[instrument(skip(self))]
    pub async fn close_period(&self, period_id: Uuid) -> Result<PeriodModel, ServiceError> {
        let period = self.get_period(period_id).await?;
        let mut missing = Vec::new();
        if !period.beginning_snapshot_completed {
            missing.push("beginning snapshot");
        }
        if !period.ending_snapshot_completed {
            missing.push("ending snapshot");
        }
        if !period.variance_analysis_completed {
            missing.push("variance analysis");
        }
        if !missing.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "period cannot be closed before: {}",
                missing.join(", ")
            )));
        }

        self.transition(&period, PeriodStatus::Active, PeriodStatus::Closed)
            .await
    }

    /// `closed → locked`. Nothing changes a locked period afterwards.
    #[instrument(skip(self))]
    pub async fn lock_period(&self, period_id: Uuid) -> Result<PeriodModel, ServiceError> {
        let period = self.get_period(period_id).await?;
        self.transition(&period, PeriodStatus::Closed, PeriodStatus::Locked)
            .await
    }

    async fn transition(
        &self,
        period: &PeriodModel,
        from: PeriodStatus,
        to: PeriodStatus,
    ) -> Result<PeriodModel, ServiceError> {
        if period.status != from {
            return Err(ServiceError::InvalidTransition {
                from: period.status.to_string(),
                to: to.to_string(),
            });
        }

        let moved = self.periods.transition_status(period.id, from, to).await?;
        let fresh = self.get_period(period.id).await?;
        if moved == 0 {
            return Err(ServiceError::InvalidTransition {
                from: fresh.status.to_string(),
                to: to.to_string(),
            });
        }

        self.publish_transition(&fresh, from, to).await;
        Ok(fresh)
    }

    async fn publish_transition(&self, period: &PeriodModel, from: PeriodStatus, to: PeriodStatus) {
        info!(period_id = %period.id, from = %from, to = %to, "Period status changed");
        if let Some(sender) = &self.event_sender {
            let event = Event::PeriodStatusChanged {
                period_id: period.id,
                old_status: from.to_string(),
                new_status: to.to_string(),
                at: period.updated_at,
            };
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish period event: {}", e);
            }
        }
    }
}

fn ensure_open(period: &PeriodModel) -> Result<(), ServiceError> {
    match period.status {
        PeriodStatus::Draft | PeriodStatus::Active => Ok(()),
        status => Err(ServiceError::InvalidOperation(format!(
            "snapshots cannot change once a period is {}",
            status
        ))),
    }
}
