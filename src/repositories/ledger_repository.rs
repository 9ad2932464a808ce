use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::inventory_transaction::{
    self, Entity as InventoryTransaction, Model as TransactionModel, TransactionType,
};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Append-only inventory ledger.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn append(&self, entry: TransactionModel) -> Result<TransactionModel, ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionModel>, ServiceError>;
    async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<TransactionModel>, ServiceError>;
    /// Sum of purchase quantities dated within `[from, until)`.
    async fn sum_purchases(
        &self,
        item_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError>;
    /// Writes approval metadata on a flagged entry that has not been approved yet.
    async fn mark_approved(
        &self,
        id: Uuid,
        approved_by: Uuid,
        approved_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmLedgerRepository {
    base: BaseRepository,
}

impl SeaOrmLedgerRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmLedgerRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl LedgerRepository for SeaOrmLedgerRepository {
    async fn append(&self, entry: TransactionModel) -> Result<TransactionModel, ServiceError> {
        Ok(entry.into_active_model().insert(self.get_db()).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionModel>, ServiceError> {
        Ok(InventoryTransaction::find_by_id(id).one(self.get_db()).await?)
    }

    async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<TransactionModel>, ServiceError> {
        Ok(InventoryTransaction::find()
            .filter(inventory_transaction::Column::InventoryItemId.eq(item_id))
            .order_by_asc(inventory_transaction::Column::TransactionDate)
            .all(self.get_db())
            .await?)
    }

    async fn sum_purchases(
        &self,
        item_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        // Summed in Rust: SQLite aggregates decimals through floating point.
        let purchases = InventoryTransaction::find()
            .filter(inventory_transaction::Column::InventoryItemId.eq(item_id))
            .filter(inventory_transaction::Column::TransactionType.eq(TransactionType::Purchase))
            .filter(inventory_transaction::Column::TransactionDate.gte(from))
            .filter(inventory_transaction::Column::TransactionDate.lt(until))
            .all(self.get_db())
            .await?;
        Ok(purchases.iter().map(|t| t.quantity).sum())
    }

    async fn mark_approved(
        &self,
        id: Uuid,
        approved_by: Uuid,
        approved_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = InventoryTransaction::update_many()
            .col_expr(
                inventory_transaction::Column::ApprovedBy,
                Expr::value(Some(approved_by)),
            )
            .col_expr(
                inventory_transaction::Column::ApprovedAt,
                Expr::value(Some(approved_at)),
            )
            .filter(inventory_transaction::Column::Id.eq(id))
            .filter(inventory_transaction::Column::RequiresApproval.eq(true))
            .filter(inventory_transaction::Column::ApprovedBy.is_null())
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }
}
