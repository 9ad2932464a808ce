use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Square catalog ITEM_VARIATION flattened with its parent item.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "square_menu_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub square_item_id: String,
    pub square_variation_id: String,
    pub name: String,
    pub variation_name: Option<String>,
    pub category_name: Option<String>,
    /// Minor units (cents)
    pub price_money_amount: Option<i64>,
    pub price_money_currency: Option<String>,
    pub is_deleted: bool,
    #[sea_orm(column_type = "Json")]
    pub raw_data: Json,
    pub synced_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
