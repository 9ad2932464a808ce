use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::inventory_item::{self, Entity as InventoryItem, Model as ItemModel};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Tier-2 inventory items.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn insert(&self, item: ItemModel) -> Result<ItemModel, ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemModel>, ServiceError>;
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ItemModel>, ServiceError>;
    async fn find_by_source_key(
        &self,
        restaurant_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ItemModel>, ServiceError>;
    /// Atomic insert-or-update on `(restaurant_id, source_pos_provider, source_pos_item_id)`.
    /// Stock and variance tolerances are never overwritten by a re-sync.
    async fn upsert_by_source_key(&self, item: ItemModel) -> Result<ItemModel, ServiceError>;
    /// Sets `current_stock` unless it already holds `quantity`. Returns rows changed.
    async fn update_current_stock(&self, id: Uuid, quantity: Decimal) -> Result<u64, ServiceError>;
    async fn count_for_restaurant(&self, restaurant_id: Uuid) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmItemRepository {
    base: BaseRepository,
}

impl SeaOrmItemRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmItemRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl ItemRepository for SeaOrmItemRepository {
    async fn insert(&self, item: ItemModel) -> Result<ItemModel, ServiceError> {
        Ok(item.into_active_model().insert(self.get_db()).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemModel>, ServiceError> {
        Ok(InventoryItem::find_by_id(id).one(self.get_db()).await?)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ItemModel>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(InventoryItem::find()
            .filter(inventory_item::Column::Id.is_in(ids.iter().copied()))
            .order_by_asc(inventory_item::Column::Name)
            .all(self.get_db())
            .await?)
    }

    async fn find_by_source_key(
        &self,
        restaurant_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ItemModel>, ServiceError> {
        Ok(InventoryItem::find()
            .filter(inventory_item::Column::RestaurantId.eq(restaurant_id))
            .filter(inventory_item::Column::SourcePosProvider.eq(provider))
            .filter(inventory_item::Column::SourcePosItemId.eq(external_id))
            .one(self.get_db())
            .await?)
    }

    async fn upsert_by_source_key(&self, item: ItemModel) -> Result<ItemModel, ServiceError> {
        let (Some(provider), Some(external_id)) =
            (item.source_pos_provider.clone(), item.source_pos_item_id.clone())
        else {
            return Err(ServiceError::ValidationError(
                "source-keyed upsert requires provider and external id".into(),
            ));
        };
        let restaurant_id = item.restaurant_id;

        InventoryItem::insert(item.into_active_model())
            .on_conflict(
                OnConflict::columns([
                    inventory_item::Column::RestaurantId,
                    inventory_item::Column::SourcePosProvider,
                    inventory_item::Column::SourcePosItemId,
                ])
                .update_columns([
                    inventory_item::Column::Name,
                    inventory_item::Column::Unit,
                    inventory_item::Column::Category,
                    inventory_item::Column::UnitCost,
                    inventory_item::Column::SourcePosData,
                    inventory_item::Column::IsActive,
                    inventory_item::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.get_db())
            .await?;

        self.find_by_source_key(restaurant_id, &provider, &external_id)
            .await?
            .ok_or_else(|| ServiceError::InternalError("item vanished after upsert".into()))
    }

    async fn update_current_stock(&self, id: Uuid, quantity: Decimal) -> Result<u64, ServiceError> {
        let result = InventoryItem::update_many()
            .col_expr(inventory_item::Column::CurrentStock, Expr::value(quantity))
            .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_item::Column::Id.eq(id))
            .filter(inventory_item::Column::CurrentStock.ne(quantity))
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }

    async fn count_for_restaurant(&self, restaurant_id: Uuid) -> Result<u64, ServiceError> {
        Ok(InventoryItem::find()
            .filter(inventory_item::Column::RestaurantId.eq(restaurant_id))
            .count(self.get_db())
            .await?)
    }
}
