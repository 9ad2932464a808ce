use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One line of a Square order. Quantity is a decimal string in the Square API.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "square_order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub square_order_id: String,
    pub square_line_item_uid: String,
    /// Variation id; absent for custom amounts
    pub catalog_object_id: Option<String>,
    pub name: String,
    pub quantity: String,
    pub base_price_money_amount: Option<i64>,
    pub total_money_amount: Option<i64>,
    pub order_state: String,
    pub order_created_at: DateTime<Utc>,
    #[sea_orm(column_type = "Json")]
    pub raw_data: Json,
    pub synced_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
