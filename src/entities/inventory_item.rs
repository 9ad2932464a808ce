use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tier-2 inventory item. POS- and CSV-sourced rows are unique per
/// `(restaurant_id, source_pos_provider, source_pos_item_id)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub unit: String,
    pub category: Option<String>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub current_stock: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub variance_threshold_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub variance_threshold_dollar: Decimal,
    pub high_value_flag: bool,
    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub theoretical_yield_factor: Decimal,
    pub source_pos_provider: Option<String>,
    pub source_pos_item_id: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub source_pos_data: Option<Json>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::period_inventory_snapshot::Entity")]
    Snapshots,
    #[sea_orm(has_many = "super::inventory_transaction::Entity")]
    Transactions,
}

impl Related<super::period_inventory_snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshots.def()
    }
}

impl Related<super::inventory_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
