use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::entities::pos::{square_inventory_count, square_menu_item, square_order_item};
use crate::errors::ServiceError;
use crate::repositories::PosRawRepository;
use crate::services::reconciliation::{UnifiedItem, UnifiedSale, UnifiedStockLevel};
use crate::services::AdditionalAttributes;

use super::money::{cents_to_decimal, optional_cents, parse_quantity};
use super::{wrong_record, PosProvider, PosTransformer, RawPosRecord, UnifiedRecord};

const COMPLETED_STATE: &str = "COMPLETED";
const IN_STOCK_STATE: &str = "IN_STOCK";
const DEFAULT_VARIATION: &str = "Regular";

/// Square line item uids are only unique within their order.
pub fn line_key(order_id: &str, uid: &str) -> String {
    format!("{}:{}", order_id, uid)
}

pub struct SquareTransformer;

impl SquareTransformer {
    fn menu_item(&self, row: &square_menu_item::Model) -> UnifiedItem {
        let name = match row.variation_name.as_deref() {
            Some(variation) if !variation.is_empty() && variation != DEFAULT_VARIATION => {
                format!("{} ({})", row.name, variation)
            }
            _ => row.name.clone(),
        };

        let mut attributes = AdditionalAttributes::new();
        attributes.insert("square_item_id".into(), json!(row.square_item_id));
        if let Some(cents) = row.price_money_amount {
            attributes.insert("menu_price".into(), json!(cents_to_decimal(cents)));
        }
        if let Some(currency) = &row.price_money_currency {
            attributes.insert("currency".into(), json!(currency));
        }

        UnifiedItem {
            restaurant_id: row.restaurant_id,
            provider: PosProvider::Square,
            external_id: row.square_variation_id.clone(),
            name,
            unit: "each".into(),
            category: row.category_name.clone(),
            unit_cost: None,
            is_active: !row.is_deleted,
            attributes,
        }
    }

    /// On-hand stock is the `IN_STOCK` quantity across locations. Counts only in other
    /// states (sold, waste) mean nothing is on hand.
    fn stock(
        &self,
        restaurant_id: Uuid,
        catalog_object_id: &str,
        counts: &[square_inventory_count::Model],
    ) -> Result<UnifiedStockLevel, ServiceError> {
        let mut quantity = Decimal::ZERO;
        for count in counts.iter().filter(|count| count.state == IN_STOCK_STATE) {
            quantity += parse_quantity(&count.quantity)?;
        }
        Ok(UnifiedStockLevel {
            restaurant_id,
            provider: PosProvider::Square,
            external_item_id: catalog_object_id.to_string(),
            quantity,
        })
    }

    fn order_item(
        &self,
        row: &square_order_item::Model,
    ) -> Result<Option<UnifiedSale>, ServiceError> {
        if row.order_state != COMPLETED_STATE {
            return Ok(None);
        }

        let quantity = parse_quantity(&row.quantity)?;
        let unit_price = optional_cents(row.base_price_money_amount);
        let total_amount = match row.total_money_amount {
            Some(cents) => cents_to_decimal(cents),
            None => (unit_price * quantity).round_dp(2),
        };

        let mut attributes = AdditionalAttributes::new();
        attributes.insert("line_uid".into(), json!(row.square_line_item_uid));

        Ok(Some(UnifiedSale {
            restaurant_id: row.restaurant_id,
            provider: PosProvider::Square,
            order_id: row.square_order_id.clone(),
            line_item_id: line_key(&row.square_order_id, &row.square_line_item_uid),
            external_item_id: row.catalog_object_id.clone(),
            item_name: row.name.clone(),
            quantity,
            unit_price,
            total_amount,
            transaction_date: row.order_created_at,
            attributes,
        }))
    }
}

#[async_trait]
impl PosTransformer for SquareTransformer {
    fn provider(&self) -> PosProvider {
        PosProvider::Square
    }

    async fn fetch_raw(
        &self,
        raw: &dyn PosRawRepository,
        restaurant_id: Uuid,
    ) -> Result<Vec<RawPosRecord>, ServiceError> {
        let mut records: Vec<RawPosRecord> = raw
            .square_menu_items(restaurant_id)
            .await?
            .into_iter()
            .map(RawPosRecord::SquareMenuItem)
            .collect();

        let mut counted: BTreeMap<String, Vec<square_inventory_count::Model>> = BTreeMap::new();
        for count in raw.square_inventory_counts(restaurant_id).await? {
            counted
                .entry(count.catalog_object_id.clone())
                .or_default()
                .push(count);
        }
        records.extend(counted.into_iter().map(|(catalog_object_id, counts)| {
            RawPosRecord::SquareStock {
                restaurant_id,
                catalog_object_id,
                counts,
            }
        }));

        records.extend(
            raw.square_order_items(restaurant_id)
                .await?
                .into_iter()
                .map(RawPosRecord::SquareOrderItem),
        );
        Ok(records)
    }

    fn transform(&self, record: &RawPosRecord) -> Result<Option<UnifiedRecord>, ServiceError> {
        match record {
            RawPosRecord::SquareMenuItem(row) => Ok(Some(UnifiedRecord::Item(self.menu_item(row)))),
            RawPosRecord::SquareStock {
                restaurant_id,
                catalog_object_id,
                counts,
            } => Ok(Some(UnifiedRecord::StockLevel(self.stock(
                *restaurant_id,
                catalog_object_id,
                counts,
            )?))),
            RawPosRecord::SquareOrderItem(row) => {
                Ok(self.order_item(row)?.map(UnifiedRecord::Sale))
            }
            other => Err(wrong_record(PosProvider::Square, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn order_line(state: &str, quantity: &str, total: Option<i64>) -> square_order_item::Model {
        square_order_item::Model {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
            square_order_id: "ORD1".into(),
            square_line_item_uid: "L1".into(),
            catalog_object_id: Some("VAR1".into()),
            name: "Burger".into(),
            quantity: quantity.into(),
            base_price_money_amount: Some(1250),
            total_money_amount: total,
            order_state: state.into(),
            order_created_at: Utc.with_ymd_and_hms(2024, 3, 2, 18, 30, 0).unwrap(),
            raw_data: json!({}),
            synced_at: Utc::now(),
        }
    }

    fn menu_row(variation: Option<&str>, deleted: bool) -> square_menu_item::Model {
        square_menu_item::Model {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
            square_item_id: "ITEM1".into(),
            square_variation_id: "VAR1".into(),
            name: "Burger".into(),
            variation_name: variation.map(String::from),
            category_name: Some("Mains".into()),
            price_money_amount: Some(1250),
            price_money_currency: Some("USD".into()),
            is_deleted: deleted,
            raw_data: json!({}),
            synced_at: Utc::now(),
        }
    }

    fn count(quantity: &str) -> square_inventory_count::Model {
        count_in(IN_STOCK_STATE, quantity)
    }

    fn count_in(state: &str, quantity: &str) -> square_inventory_count::Model {
        square_inventory_count::Model {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
            catalog_object_id: "VAR1".into(),
            location_id: "LOC".into(),
            state: state.into(),
            quantity: quantity.into(),
            calculated_at: Utc::now(),
            raw_data: json!({}),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn completed_line_becomes_a_sale_in_currency_units() {
        let row = order_line("COMPLETED", "2", Some(2500));
        let record = SquareTransformer
            .transform(&RawPosRecord::SquareOrderItem(row))
            .unwrap();

        let sale = assert_matches!(record, Some(UnifiedRecord::Sale(sale)) => sale);
        assert_eq!(sale.line_item_id, "ORD1:L1");
        assert_eq!(sale.quantity, dec!(2));
        assert_eq!(sale.unit_price, dec!(12.50));
        assert_eq!(sale.total_amount, dec!(25.00));
        assert_eq!(sale.external_item_id.as_deref(), Some("VAR1"));
    }

    #[test]
    fn missing_total_is_derived_from_price() {
        let row = order_line("COMPLETED", "1.5", None);
        let sale = SquareTransformer.order_item(&row).unwrap().unwrap();
        assert_eq!(sale.total_amount, dec!(18.75));
    }

    #[test]
    fn open_orders_are_skipped() {
        let row = order_line("OPEN", "1", Some(1250));
        assert_eq!(SquareTransformer.order_item(&row).unwrap(), None);
    }

    #[test]
    fn malformed_quantity_is_a_validation_error() {
        let row = order_line("COMPLETED", "lots", Some(1250));
        assert_matches!(
            SquareTransformer.order_item(&row),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn named_variations_are_part_of_the_item_name() {
        assert_eq!(SquareTransformer.menu_item(&menu_row(Some("Large"), false)).name, "Burger (Large)");
        assert_eq!(SquareTransformer.menu_item(&menu_row(Some("Regular"), false)).name, "Burger");

        let deleted = SquareTransformer.menu_item(&menu_row(None, true));
        assert!(!deleted.is_active);
        assert_eq!(deleted.unit_cost, None);
        assert_eq!(deleted.attributes.get("currency"), Some(&json!("USD")));
    }

    #[test]
    fn stock_sums_all_locations() {
        let level = SquareTransformer
            .stock(Uuid::new_v4(), "VAR1", &[count("3"), count("4.5")])
            .unwrap();
        assert_eq!(level.quantity, dec!(7.5));
        assert_eq!(level.external_item_id, "VAR1");
    }

    #[test]
    fn stock_ignores_other_states() {
        let mixed = SquareTransformer
            .stock(Uuid::new_v4(), "VAR1", &[count("3"), count_in("SOLD", "9")])
            .unwrap();
        assert_eq!(mixed.quantity, dec!(3));

        let sold_out = SquareTransformer
            .stock(Uuid::new_v4(), "VAR1", &[count_in("SOLD", "12"), count_in("WASTE", "1")])
            .unwrap();
        assert_eq!(sold_out.quantity, Decimal::ZERO);
    }
}
