//! Typed rows of the two upload formats and the header lookup used to build them.

use chrono::{DateTime, NaiveDate, Utc};
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use validator::Validate;

use crate::errors::ServiceError;

pub const INVENTORY_COLUMNS: &[&str] = &["sku", "name", "unit_cost"];
pub const SALES_COLUMNS: &[&str] = &[
    "order_id",
    "line_id",
    "item_name",
    "quantity",
    "unit_price",
    "transaction_date",
];

const DEFAULT_UNIT: &str = "each";

/// Column positions by trimmed, lower-cased header name.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect();
        Self { index }
    }

    /// Required columns absent from the header row.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.index.contains_key(**name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Trimmed cell value; empty cells read as absent.
    pub fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index
            .get(name)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn required<'r>(&self, record: &'r StringRecord, name: &str) -> Result<&'r str, ServiceError> {
        self.get(record, name)
            .ok_or_else(|| ServiceError::ValidationError(format!("{} is required", name)))
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, ServiceError> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim_start_matches('$');
    Decimal::from_str(cleaned).map_err(|_| {
        ServiceError::ValidationError(format!("{} '{}' is not a number", column, raw))
    })
}

/// RFC 3339 timestamps, or plain `YYYY-MM-DD` dates read as UTC midnight.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "transaction_date '{}' must be RFC 3339 or YYYY-MM-DD",
                raw
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct InventoryCsvRow {
    pub row_number: u64,
    #[validate(length(min = 1, max = 100))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub unit: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub unit_cost: Decimal,
    pub current_stock: Option<Decimal>,
}

impl InventoryCsvRow {
    pub fn parse(
        headers: &HeaderMap,
        record: &StringRecord,
        row_number: u64,
    ) -> Result<Self, ServiceError> {
        let row = Self {
            row_number,
            sku: headers.required(record, "sku")?.to_string(),
            name: headers.required(record, "name")?.to_string(),
            unit: headers
                .get(record, "unit")
                .unwrap_or(DEFAULT_UNIT)
                .to_string(),
            category: headers.get(record, "category").map(String::from),
            unit_cost: parse_decimal("unit_cost", headers.required(record, "unit_cost")?)?,
            current_stock: headers
                .get(record, "current_stock")
                .map(|v| parse_decimal("current_stock", v))
                .transpose()?,
        };
        row.validate()?;
        Ok(row)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SalesCsvRow {
    pub row_number: u64,
    #[validate(length(min = 1, max = 100))]
    pub order_id: String,
    #[validate(length(min = 1, max = 100))]
    pub line_id: String,
    /// Matches an inventory row's `sku` when the line sells a tracked item
    #[validate(length(max = 100))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub transaction_date: DateTime<Utc>,
}

impl SalesCsvRow {
    pub fn parse(
        headers: &HeaderMap,
        record: &StringRecord,
        row_number: u64,
    ) -> Result<Self, ServiceError> {
        let quantity = parse_decimal("quantity", headers.required(record, "quantity")?)?;
        let unit_price = parse_decimal("unit_price", headers.required(record, "unit_price")?)?;
        let total_amount = match headers.get(record, "total_amount") {
            Some(v) => parse_decimal("total_amount", v)?,
            None => (quantity * unit_price).round_dp(2),
        };

        let row = Self {
            row_number,
            order_id: headers.required(record, "order_id")?.to_string(),
            line_id: headers.required(record, "line_id")?.to_string(),
            sku: headers.get(record, "sku").map(String::from),
            item_name: headers.required(record, "item_name")?.to_string(),
            quantity,
            unit_price,
            total_amount,
            transaction_date: parse_timestamp(headers.required(record, "transaction_date")?)?,
        };
        row.validate()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn headers(names: &[&str]) -> HeaderMap {
        HeaderMap::new(&StringRecord::from(names.to_vec()))
    }

    #[test]
    fn headers_are_trimmed_and_case_insensitive() {
        let map = headers(&[" SKU ", "Name", "Unit_Cost"]);
        assert!(map.missing(INVENTORY_COLUMNS).is_empty());
        assert_eq!(map.missing(&["sku", "unit"]), vec!["unit".to_string()]);
    }

    #[test]
    fn inventory_row_defaults_unit_and_reads_optional_stock() {
        let map = headers(&["sku", "name", "unit_cost", "current_stock"]);
        let record = StringRecord::from(vec!["TOM-1", "Tomatoes", "$2.50", ""]);
        let row = InventoryCsvRow::parse(&map, &record, 3).unwrap();
        assert_eq!(row.unit, "each");
        assert_eq!(row.unit_cost, dec!(2.50));
        assert_eq!(row.current_stock, None);
        assert_eq!(row.row_number, 3);
    }

    #[test]
    fn inventory_row_keeps_negative_numbers_for_the_transform_to_reject() {
        let map = headers(&["sku", "name", "unit_cost"]);
        let record = StringRecord::from(vec!["TOM-1", "Tomatoes", "-1"]);
        assert_eq!(
            InventoryCsvRow::parse(&map, &record, 1).unwrap().unit_cost,
            dec!(-1)
        );
    }

    #[test]
    fn missing_required_cell_is_a_validation_error() {
        let map = headers(&["sku", "name", "unit_cost"]);
        let record = StringRecord::from(vec!["", "Tomatoes", "1"]);
        assert_matches!(
            InventoryCsvRow::parse(&map, &record, 1),
            Err(ServiceError::ValidationError(msg)) if msg.contains("sku")
        );
    }

    #[test]
    fn overlong_name_fails_length_rule() {
        let map = headers(&["sku", "name", "unit_cost"]);
        let long = "x".repeat(256);
        let record = StringRecord::from(vec!["A", long.as_str(), "1"]);
        assert_matches!(
            InventoryCsvRow::parse(&map, &record, 1),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn sales_row_derives_total_and_accepts_plain_dates() {
        let map = headers(&[
            "order_id",
            "line_id",
            "item_name",
            "quantity",
            "unit_price",
            "transaction_date",
        ]);
        let record = StringRecord::from(vec!["O1", "L1", "Burger", "2", "12.5", "2024-03-02"]);
        let row = SalesCsvRow::parse(&map, &record, 1).unwrap();
        assert_eq!(row.total_amount, dec!(25.00));
        assert_eq!(row.transaction_date.to_rfc3339(), "2024-03-02T00:00:00+00:00");
        assert_eq!(row.sku, None);
    }

    #[test]
    fn bad_dates_and_numbers_are_rejected() {
        assert_matches!(parse_timestamp("03/02/2024"), Err(ServiceError::ValidationError(_)));
        assert_eq!(
            parse_timestamp("2024-03-02T18:30:00-05:00").unwrap().to_rfc3339(),
            "2024-03-02T23:30:00+00:00"
        );
        assert_matches!(parse_decimal("quantity", "two"), Err(ServiceError::ValidationError(_)));
        assert_eq!(parse_decimal("unit_price", "1,250.00").unwrap(), dec!(1250.00));
    }
}
