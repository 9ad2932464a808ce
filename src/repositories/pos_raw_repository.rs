use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::pos::{
    square_inventory_count, square_menu_item, square_order_item, toast_menu_item,
    toast_order_item,
};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Read access to the Tier-1 raw provider tables. Transformation never writes here.
#[async_trait]
pub trait PosRawRepository: Send + Sync {
    async fn square_menu_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<square_menu_item::Model>, ServiceError>;
    async fn square_inventory_counts(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<square_inventory_count::Model>, ServiceError>;
    async fn square_order_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<square_order_item::Model>, ServiceError>;
    async fn toast_menu_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<toast_menu_item::Model>, ServiceError>;
    async fn toast_order_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<toast_order_item::Model>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmPosRawRepository {
    base: BaseRepository,
}

impl SeaOrmPosRawRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmPosRawRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl PosRawRepository for SeaOrmPosRawRepository {
    async fn square_menu_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<square_menu_item::Model>, ServiceError> {
        Ok(square_menu_item::Entity::find()
            .filter(square_menu_item::Column::RestaurantId.eq(restaurant_id))
            .order_by_asc(square_menu_item::Column::SquareVariationId)
            .all(self.get_db())
            .await?)
    }

    async fn square_inventory_counts(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<square_inventory_count::Model>, ServiceError> {
        Ok(square_inventory_count::Entity::find()
            .filter(square_inventory_count::Column::RestaurantId.eq(restaurant_id))
            .order_by_asc(square_inventory_count::Column::CalculatedAt)
            .all(self.get_db())
            .await?)
    }

    async fn square_order_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<square_order_item::Model>, ServiceError> {
        Ok(square_order_item::Entity::find()
            .filter(square_order_item::Column::RestaurantId.eq(restaurant_id))
            .order_by_asc(square_order_item::Column::OrderCreatedAt)
            .all(self.get_db())
            .await?)
    }

    async fn toast_menu_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<toast_menu_item::Model>, ServiceError> {
        Ok(toast_menu_item::Entity::find()
            .filter(toast_menu_item::Column::RestaurantId.eq(restaurant_id))
            .order_by_asc(toast_menu_item::Column::ToastItemGuid)
            .all(self.get_db())
            .await?)
    }

    async fn toast_order_items(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Vec<toast_order_item::Model>, ServiceError> {
        Ok(toast_order_item::Entity::find()
            .filter(toast_order_item::Column::RestaurantId.eq(restaurant_id))
            .order_by_asc(toast_order_item::Column::BusinessDate)
            .all(self.get_db())
            .await?)
    }
}
