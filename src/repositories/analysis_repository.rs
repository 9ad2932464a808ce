use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::theoretical_usage_analysis::{
    self, Entity as UsageAnalysis, InvestigationStatus, Model as AnalysisModel,
};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Column values written by one investigation state change.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTransition {
    pub to: InvestigationStatus,
    pub assigned_to: Option<Uuid>,
    pub investigated_by: Option<Uuid>,
    pub notes: Option<String>,
    pub explanation: Option<String>,
    pub at: DateTime<Utc>,
}

/// Theoretical usage analyses, owned by the usage calculation engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisModel>, ServiceError>;
    async fn find_for_item(
        &self,
        period_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<AnalysisModel>, ServiceError>;
    async fn list_for_period(&self, period_id: Uuid) -> Result<Vec<AnalysisModel>, ServiceError>;
    async fn list_for_periods(
        &self,
        period_ids: Vec<Uuid>,
        item_ids: Option<Vec<Uuid>>,
    ) -> Result<Vec<AnalysisModel>, ServiceError>;
    /// Insert, or overwrite the computed columns of the existing `(period, item)` row.
    /// Investigation fields of an existing row are left untouched.
    async fn upsert_computed(&self, analysis: AnalysisModel) -> Result<AnalysisModel, ServiceError>;
    /// Compare-and-set on `investigation_status`. Returns rows changed (0 or 1).
    async fn transition(
        &self,
        id: Uuid,
        from: InvestigationStatus,
        change: AnalysisTransition,
    ) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmAnalysisRepository {
    base: BaseRepository,
}

impl SeaOrmAnalysisRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmAnalysisRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl AnalysisRepository for SeaOrmAnalysisRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisModel>, ServiceError> {
        Ok(UsageAnalysis::find_by_id(id).one(self.get_db()).await?)
    }

    async fn find_for_item(
        &self,
        period_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<AnalysisModel>, ServiceError> {
        Ok(UsageAnalysis::find()
            .filter(theoretical_usage_analysis::Column::PeriodId.eq(period_id))
            .filter(theoretical_usage_analysis::Column::InventoryItemId.eq(item_id))
            .one(self.get_db())
            .await?)
    }

    async fn list_for_period(&self, period_id: Uuid) -> Result<Vec<AnalysisModel>, ServiceError> {
        Ok(UsageAnalysis::find()
            .filter(theoretical_usage_analysis::Column::PeriodId.eq(period_id))
            .order_by_asc(theoretical_usage_analysis::Column::InventoryItemId)
            .all(self.get_db())
            .await?)
    }

    async fn list_for_periods(
        &self,
        period_ids: Vec<Uuid>,
        item_ids: Option<Vec<Uuid>>,
    ) -> Result<Vec<AnalysisModel>, ServiceError> {
        if period_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = UsageAnalysis::find()
            .filter(theoretical_usage_analysis::Column::PeriodId.is_in(period_ids));
        if let Some(item_ids) = item_ids {
            query = query.filter(theoretical_usage_analysis::Column::InventoryItemId.is_in(item_ids));
        }
        Ok(query.all(self.get_db()).await?)
    }

    async fn upsert_computed(&self, analysis: AnalysisModel) -> Result<AnalysisModel, ServiceError> {
        let (period_id, item_id) = (analysis.period_id, analysis.inventory_item_id);

        UsageAnalysis::insert(analysis.into_active_model())
            .on_conflict(
                OnConflict::columns([
                    theoretical_usage_analysis::Column::PeriodId,
                    theoretical_usage_analysis::Column::InventoryItemId,
                ])
                .update_columns([
                    theoretical_usage_analysis::Column::TheoreticalQuantity,
                    theoretical_usage_analysis::Column::ActualQuantity,
                    theoretical_usage_analysis::Column::UnitCost,
                    theoretical_usage_analysis::Column::VarianceQuantity,
                    theoretical_usage_analysis::Column::VariancePercentage,
                    theoretical_usage_analysis::Column::VarianceDollarValue,
                    theoretical_usage_analysis::Column::Priority,
                    theoretical_usage_analysis::Column::CalculationMethod,
                    theoretical_usage_analysis::Column::Confidence,
                    theoretical_usage_analysis::Column::RecipeData,
                    theoretical_usage_analysis::Column::CalculatedAt,
                    theoretical_usage_analysis::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.get_db())
            .await?;

        self.find_for_item(period_id, item_id)
            .await?
            .ok_or_else(|| ServiceError::InternalError("analysis vanished after upsert".into()))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InvestigationStatus,
        change: AnalysisTransition,
    ) -> Result<u64, ServiceError> {
        use theoretical_usage_analysis::Column;

        let mut update = UsageAnalysis::update_many()
            .col_expr(Column::InvestigationStatus, Expr::value(change.to))
            .col_expr(Column::UpdatedAt, Expr::value(change.at));

        if let Some(assignee) = change.assigned_to {
            update = update
                .col_expr(Column::AssignedTo, Expr::value(Some(assignee)))
                .col_expr(Column::AssignedAt, Expr::value(Some(change.at)));
        }
        if let Some(investigator) = change.investigated_by {
            update = update
                .col_expr(Column::InvestigatedBy, Expr::value(Some(investigator)))
                .col_expr(Column::ResolvedAt, Expr::value(Some(change.at)));
        }
        if let Some(notes) = change.notes {
            update = update.col_expr(Column::InvestigationNotes, Expr::value(Some(notes)));
        }
        if let Some(explanation) = change.explanation {
            update = update.col_expr(Column::Explanation, Expr::value(Some(explanation)));
        }

        let result = update
            .filter(Column::Id.eq(id))
            .filter(Column::InvestigationStatus.eq(from))
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }
}
