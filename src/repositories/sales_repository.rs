use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::sales_transaction::{self, Entity as SalesTransaction, Model as SaleModel};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Tier-2 unified sales lines.
#[async_trait]
pub trait SalesRepository: Send + Sync {
    async fn find_by_source_line(
        &self,
        provider: &str,
        line_item_id: &str,
    ) -> Result<Option<SaleModel>, ServiceError>;
    /// Atomic insert-or-update on `(source_pos_provider, source_pos_line_item_id)`.
    /// A line already owned by another restaurant is left untouched and reported as
    /// `ReconciliationConflict`.
    async fn upsert_by_source_line(&self, sale: SaleModel) -> Result<SaleModel, ServiceError>;
    /// Units of `item_id` sold within `[from, until)`.
    async fn units_sold(
        &self,
        item_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError>;
    async fn count_for_restaurant(&self, restaurant_id: Uuid) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmSalesRepository {
    base: BaseRepository,
}

impl SeaOrmSalesRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmSalesRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl SalesRepository for SeaOrmSalesRepository {
    async fn find_by_source_line(
        &self,
        provider: &str,
        line_item_id: &str,
    ) -> Result<Option<SaleModel>, ServiceError> {
        Ok(SalesTransaction::find()
            .filter(sales_transaction::Column::SourcePosProvider.eq(provider))
            .filter(sales_transaction::Column::SourcePosLineItemId.eq(line_item_id))
            .one(self.get_db())
            .await?)
    }

    async fn upsert_by_source_line(&self, sale: SaleModel) -> Result<SaleModel, ServiceError> {
        let provider = sale.source_pos_provider.clone();
        let line_item_id = sale.source_pos_line_item_id.clone();
        let restaurant_id = sale.restaurant_id;

        let written = SalesTransaction::insert(sale.into_active_model())
            .on_conflict(
                OnConflict::columns([
                    sales_transaction::Column::SourcePosProvider,
                    sales_transaction::Column::SourcePosLineItemId,
                ])
                .update_columns([
                    sales_transaction::Column::InventoryItemId,
                    sales_transaction::Column::ItemName,
                    sales_transaction::Column::Quantity,
                    sales_transaction::Column::UnitPrice,
                    sales_transaction::Column::TotalAmount,
                    sales_transaction::Column::TransactionDate,
                    sales_transaction::Column::SourcePosOrderId,
                    sales_transaction::Column::SourcePosData,
                    sales_transaction::Column::UpdatedAt,
                ])
                .action_and_where(Condition::all().add(
                    Expr::col((SalesTransaction, sales_transaction::Column::RestaurantId))
                        .eq(restaurant_id),
                ).into())
                .to_owned(),
            )
            .exec_without_returning(self.get_db())
            .await?;
        if written == 0 {
            return Err(ServiceError::ReconciliationConflict(format!(
                "{} line {} belongs to another restaurant",
                provider, line_item_id
            )));
        }

        self.find_by_source_line(&provider, &line_item_id)
            .await?
            .ok_or_else(|| ServiceError::InternalError("sale vanished after upsert".into()))
    }

    async fn units_sold(
        &self,
        item_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        let sales = SalesTransaction::find()
            .filter(sales_transaction::Column::InventoryItemId.eq(item_id))
            .filter(sales_transaction::Column::TransactionDate.gte(from))
            .filter(sales_transaction::Column::TransactionDate.lt(until))
            .all(self.get_db())
            .await?;
        Ok(sales.iter().map(|s| s.quantity).sum())
    }

    async fn count_for_restaurant(&self, restaurant_id: Uuid) -> Result<u64, ServiceError> {
        Ok(SalesTransaction::find()
            .filter(sales_transaction::Column::RestaurantId.eq(restaurant_id))
            .count(self.get_db())
            .await?)
    }
}
