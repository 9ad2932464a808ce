use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Bounded date range over which snapshots and variance analysis are scoped.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_periods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: PeriodStatus,
    pub beginning_snapshot_completed: bool,
    pub ending_snapshot_completed: bool,
    pub variance_analysis_completed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::period_inventory_snapshot::Entity")]
    Snapshots,
    #[sea_orm(has_many = "super::theoretical_usage_analysis::Entity")]
    Analyses,
}

impl Related<super::period_inventory_snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshots.def()
    }
}

impl Related<super::theoretical_usage_analysis::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Analyses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Two periods overlap when each starts before the other ends.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.period_start < end && start < self.period_end
    }

    /// Start of the first day, inclusive.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.period_start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_default()
    }

    /// Start of `period_end`, exclusive. Periods are half-open so back-to-back
    /// periods never count the same transaction twice.
    pub fn ends_before(&self) -> DateTime<Utc> {
        self.period_end
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeriodStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "locked")]
    Locked,
}

impl PeriodStatus {
    /// Statuses that claim their date range exclusively for the restaurant.
    pub fn occupies_range(self) -> bool {
        matches!(self, Self::Active | Self::Closed | Self::Locked)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display, EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeriodType {
    #[sea_orm(string_value = "daily")]
    Daily,
    #[sea_orm(string_value = "weekly")]
    Weekly,
    #[sea_orm(string_value = "monthly")]
    Monthly,
    #[sea_orm(string_value = "custom")]
    Custom,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(start: NaiveDate, end: NaiveDate) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
            name: "Week".into(),
            period_type: PeriodType::Weekly,
            period_start: start,
            period_end: end,
            status: PeriodStatus::Active,
            beginning_snapshot_completed: false,
            ending_snapshot_completed: false,
            variance_analysis_completed: false,
            closed_at: None,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn adjacent_periods_do_not_overlap() {
        let p = period(date(2024, 1, 1), date(2024, 1, 7));
        assert!(!p.overlaps(date(2024, 1, 7), date(2024, 1, 14)));
        assert!(p.overlaps(date(2024, 1, 6), date(2024, 1, 14)));
        assert!(p.overlaps(date(2023, 12, 25), date(2024, 1, 2)));
    }

    #[test]
    fn period_window_is_half_open() {
        let p = period(date(2024, 1, 1), date(2024, 1, 8));
        assert_eq!(p.starts_at().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(p.ends_before().to_rfc3339(), "2024-01-08T00:00:00+00:00");
    }

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(PeriodStatus::Locked.to_string(), "locked");
        assert_eq!("closed".parse::<PeriodStatus>().ok(), Some(PeriodStatus::Closed));
        assert!(!PeriodStatus::Draft.occupies_range());
    }
}
