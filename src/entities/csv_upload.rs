use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Metadata of one validated CSV file.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "csv_uploads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub filename: String,
    pub upload_type: CsvUploadType,
    pub status: CsvUploadStatus,
    pub rows_total: i32,
    pub rows_valid: i32,
    pub rows_invalid: i32,
    pub batch_count: i32,
    #[sea_orm(column_type = "Json", nullable)]
    pub validation_errors: Option<Json>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::csv_upload_batch::Entity")]
    Batches,
    #[sea_orm(has_many = "super::csv_transform::Entity")]
    Transforms,
}

impl Related<super::csv_upload_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batches.def()
    }
}

impl Related<super::csv_transform::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transforms.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CsvUploadType {
    #[sea_orm(string_value = "inventory")]
    Inventory,
    #[sea_orm(string_value = "sales")]
    Sales,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CsvUploadStatus {
    #[sea_orm(string_value = "validated")]
    Validated,
    #[sea_orm(string_value = "failed")]
    Failed,
}
