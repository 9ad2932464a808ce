use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A slice of validated rows. `rows` holds the typed rows, `errors` the row-level
/// validation failures that fell inside this slice.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "csv_upload_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub upload_id: Uuid,
    pub batch_number: i32,
    pub row_count: i32,
    #[sea_orm(column_type = "Json")]
    pub rows: Json,
    #[sea_orm(column_type = "Json")]
    pub errors: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::csv_upload::Entity",
        from = "Column::UploadId",
        to = "super::csv_upload::Column::Id"
    )]
    Upload,
}

impl Related<super::csv_upload::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Upload.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
