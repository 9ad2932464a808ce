use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    sea_query::{Alias, Expr, OnConflict, Query},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::inventory_period::{
    self, Entity as InventoryPeriod, Model as PeriodModel, PeriodStatus,
};
use crate::entities::period_inventory_snapshot::{
    self, Entity as Snapshot, Model as SnapshotModel, SnapshotType,
};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Periods and their physical-count snapshots.
#[async_trait]
pub trait PeriodRepository: Send + Sync {
    async fn insert_period(&self, period: PeriodModel) -> Result<PeriodModel, ServiceError>;
    async fn find_period(&self, id: Uuid) -> Result<Option<PeriodModel>, ServiceError>;
    async fn list_periods(
        &self,
        restaurant_id: Uuid,
        status: Option<PeriodStatus>,
    ) -> Result<Vec<PeriodModel>, ServiceError>;
    /// Range-occupying periods of the restaurant that overlap `[start, end)`.
    async fn find_overlapping(
        &self,
        restaurant_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Uuid,
    ) -> Result<Vec<PeriodModel>, ServiceError>;
    /// `draft → active` in one conditional write that also requires no other active,
    /// closed or locked period of the restaurant to overlap `[start, end)`. Returns the
    /// number of rows moved.
    async fn activate_if_clear(
        &self,
        id: Uuid,
        restaurant_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, ServiceError>;
    /// Compare-and-set status change. Returns the number of rows moved.
    async fn transition_status(
        &self,
        id: Uuid,
        from: PeriodStatus,
        to: PeriodStatus,
    ) -> Result<u64, ServiceError>;
    async fn set_snapshot_completed(
        &self,
        id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<(), ServiceError>;
    async fn set_analysis_completed(&self, id: Uuid, completed: bool) -> Result<(), ServiceError>;
    /// Most recent closed or locked periods, newest first. With `before`, only those
    /// ending on or before that day.
    async fn recent_closed_periods(
        &self,
        restaurant_id: Uuid,
        before: Option<NaiveDate>,
        limit: u64,
    ) -> Result<Vec<PeriodModel>, ServiceError>;

    async fn upsert_snapshot(&self, snapshot: SnapshotModel) -> Result<SnapshotModel, ServiceError>;
    async fn find_snapshot(&self, id: Uuid) -> Result<Option<SnapshotModel>, ServiceError>;
    async fn find_snapshots(&self, period_id: Uuid) -> Result<Vec<SnapshotModel>, ServiceError>;
    async fn count_snapshots(
        &self,
        period_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<u64, ServiceError>;
    async fn mark_snapshot_verified(
        &self,
        id: Uuid,
        verified_by: Uuid,
    ) -> Result<SnapshotModel, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmPeriodRepository {
    base: BaseRepository,
}

impl SeaOrmPeriodRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmPeriodRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl PeriodRepository for SeaOrmPeriodRepository {
    async fn insert_period(&self, period: PeriodModel) -> Result<PeriodModel, ServiceError> {
        Ok(period.into_active_model().insert(self.get_db()).await?)
    }

    async fn find_period(&self, id: Uuid) -> Result<Option<PeriodModel>, ServiceError> {
        Ok(InventoryPeriod::find_by_id(id).one(self.get_db()).await?)
    }

    async fn list_periods(
        &self,
        restaurant_id: Uuid,
        status: Option<PeriodStatus>,
    ) -> Result<Vec<PeriodModel>, ServiceError> {
        let mut query = InventoryPeriod::find()
            .filter(inventory_period::Column::RestaurantId.eq(restaurant_id));
        if let Some(status) = status {
            query = query.filter(inventory_period::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(inventory_period::Column::PeriodStart)
            .all(self.get_db())
            .await?)
    }

    async fn find_overlapping(
        &self,
        restaurant_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Uuid,
    ) -> Result<Vec<PeriodModel>, ServiceError> {
        Ok(InventoryPeriod::find()
            .filter(inventory_period::Column::RestaurantId.eq(restaurant_id))
            .filter(inventory_period::Column::Id.ne(exclude))
            .filter(inventory_period::Column::Status.is_in([
                PeriodStatus::Active,
                PeriodStatus::Closed,
                PeriodStatus::Locked,
            ]))
            .filter(inventory_period::Column::PeriodStart.lt(end))
            .filter(inventory_period::Column::PeriodEnd.gt(start))
            .all(self.get_db())
            .await?)
    }

    async fn activate_if_clear(
        &self,
        id: Uuid,
        restaurant_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, ServiceError> {
        let other = Alias::new("other");
        let overlapping = Query::select()
            .expr(Expr::val(1))
            .from_as(InventoryPeriod, other.clone())
            .and_where(
                Expr::col((other.clone(), inventory_period::Column::RestaurantId)).eq(restaurant_id),
            )
            .and_where(Expr::col((other.clone(), inventory_period::Column::Id)).ne(id))
            .and_where(Expr::col((other.clone(), inventory_period::Column::Status)).is_in([
                PeriodStatus::Active,
                PeriodStatus::Closed,
                PeriodStatus::Locked,
            ]))
            .and_where(Expr::col((other.clone(), inventory_period::Column::PeriodStart)).lt(end))
            .and_where(Expr::col((other, inventory_period::Column::PeriodEnd)).gt(start))
            .to_owned();

        let result = InventoryPeriod::update_many()
            .col_expr(inventory_period::Column::Status, Expr::value(PeriodStatus::Active))
            .col_expr(inventory_period::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_period::Column::Id.eq(id))
            .filter(inventory_period::Column::Status.eq(PeriodStatus::Draft))
            .filter(Condition::all().add(Expr::exists(overlapping)).not())
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: PeriodStatus,
        to: PeriodStatus,
    ) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let mut update = InventoryPeriod::update_many()
            .col_expr(inventory_period::Column::Status, Expr::value(to))
            .col_expr(inventory_period::Column::UpdatedAt, Expr::value(now));
        match to {
            PeriodStatus::Closed => {
                update = update.col_expr(inventory_period::Column::ClosedAt, Expr::value(Some(now)));
            }
            PeriodStatus::Locked => {
                update = update.col_expr(inventory_period::Column::LockedAt, Expr::value(Some(now)));
            }
            _ => {}
        }
        let result = update
            .filter(inventory_period::Column::Id.eq(id))
            .filter(inventory_period::Column::Status.eq(from))
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }

    async fn set_snapshot_completed(
        &self,
        id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<(), ServiceError> {
        let column = match snapshot_type {
            SnapshotType::Beginning => inventory_period::Column::BeginningSnapshotCompleted,
            SnapshotType::Ending => inventory_period::Column::EndingSnapshotCompleted,
        };
        InventoryPeriod::update_many()
            .col_expr(column, Expr::value(true))
            .col_expr(inventory_period::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_period::Column::Id.eq(id))
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    async fn set_analysis_completed(&self, id: Uuid, completed: bool) -> Result<(), ServiceError> {
        InventoryPeriod::update_many()
            .col_expr(
                inventory_period::Column::VarianceAnalysisCompleted,
                Expr::value(completed),
            )
            .col_expr(inventory_period::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_period::Column::Id.eq(id))
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    async fn recent_closed_periods(
        &self,
        restaurant_id: Uuid,
        before: Option<NaiveDate>,
        limit: u64,
    ) -> Result<Vec<PeriodModel>, ServiceError> {
        let mut query = InventoryPeriod::find()
            .filter(inventory_period::Column::RestaurantId.eq(restaurant_id))
            .filter(
                inventory_period::Column::Status
                    .is_in([PeriodStatus::Closed, PeriodStatus::Locked]),
            );
        if let Some(before) = before {
            query = query.filter(inventory_period::Column::PeriodEnd.lte(before));
        }
        Ok(query
            .order_by_desc(inventory_period::Column::PeriodEnd)
            .limit(limit)
            .all(self.get_db())
            .await?)
    }

    async fn upsert_snapshot(&self, snapshot: SnapshotModel) -> Result<SnapshotModel, ServiceError> {
        let key = (snapshot.period_id, snapshot.inventory_item_id, snapshot.snapshot_type);
        let active = snapshot.into_active_model();
        Snapshot::insert(active)
            .on_conflict(
                OnConflict::columns([
                    period_inventory_snapshot::Column::PeriodId,
                    period_inventory_snapshot::Column::InventoryItemId,
                    period_inventory_snapshot::Column::SnapshotType,
                ])
                .update_columns([
                    period_inventory_snapshot::Column::Quantity,
                    period_inventory_snapshot::Column::UnitCost,
                    period_inventory_snapshot::Column::Verified,
                    period_inventory_snapshot::Column::VerifiedBy,
                    period_inventory_snapshot::Column::CountedBy,
                    period_inventory_snapshot::Column::Notes,
                    period_inventory_snapshot::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.get_db())
            .await?;

        Snapshot::find()
            .filter(period_inventory_snapshot::Column::PeriodId.eq(key.0))
            .filter(period_inventory_snapshot::Column::InventoryItemId.eq(key.1))
            .filter(period_inventory_snapshot::Column::SnapshotType.eq(key.2))
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::InternalError("snapshot vanished after upsert".into()))
    }

    async fn find_snapshot(&self, id: Uuid) -> Result<Option<SnapshotModel>, ServiceError> {
        Ok(Snapshot::find_by_id(id).one(self.get_db()).await?)
    }

    async fn find_snapshots(&self, period_id: Uuid) -> Result<Vec<SnapshotModel>, ServiceError> {
        Ok(Snapshot::find()
            .filter(period_inventory_snapshot::Column::PeriodId.eq(period_id))
            .all(self.get_db())
            .await?)
    }

    async fn count_snapshots(
        &self,
        period_id: Uuid,
        snapshot_type: SnapshotType,
    ) -> Result<u64, ServiceError> {
        Ok(Snapshot::find()
            .filter(period_inventory_snapshot::Column::PeriodId.eq(period_id))
            .filter(period_inventory_snapshot::Column::SnapshotType.eq(snapshot_type))
            .count(self.get_db())
            .await?)
    }

    async fn mark_snapshot_verified(
        &self,
        id: Uuid,
        verified_by: Uuid,
    ) -> Result<SnapshotModel, ServiceError> {
        let snapshot = Snapshot::find_by_id(id)
            .one(self.get_db())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Snapshot {} not found", id)))?;

        let mut active: period_inventory_snapshot::ActiveModel = snapshot.into();
        active.verified = Set(true);
        active.verified_by = Set(Some(verified_by));
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.get_db()).await?)
    }
}
