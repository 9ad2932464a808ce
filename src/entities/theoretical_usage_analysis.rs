use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Computed theoretical-vs-actual usage for one item in one period. Unique per
/// `(period_id, inventory_item_id)`; recalculation overwrites the computed columns.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "theoretical_usage_analysis")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub period_id: Uuid,
    pub inventory_item_id: Uuid,
    pub restaurant_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub theoretical_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub actual_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub variance_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub variance_percentage: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub variance_dollar_value: Decimal,
    pub priority: VariancePriority,
    pub calculation_method: CalculationMethod,
    #[sea_orm(column_type = "Decimal(Some((5, 4)))")]
    pub confidence: Decimal,
    pub investigation_status: InvestigationStatus,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub investigated_by: Option<Uuid>,
    pub investigation_notes: Option<String>,
    pub explanation: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Calculation-specific extras (recipe breakdown, predictive factors)
    #[sea_orm(column_type = "Json", nullable)]
    pub recipe_data: Option<Json>,
    pub calculated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_period::Entity",
        from = "Column::PeriodId",
        to = "super::inventory_period::Column::Id"
    )]
    Period,
}

impl Related<super::inventory_period::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Period.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariancePriority {
    #[sea_orm(string_value = "critical")]
    Critical,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "low")]
    Low,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalculationMethod {
    #[sea_orm(string_value = "recipe_based")]
    RecipeBased,
    #[sea_orm(string_value = "historical_average")]
    HistoricalAverage,
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "ai_predicted")]
    AiPredicted,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvestigationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "investigating")]
    Investigating,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "escalated")]
    Escalated,
}

impl InvestigationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Accepted | Self::Escalated)
    }
}
