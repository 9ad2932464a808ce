use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::entities::pos::{toast_menu_item, toast_order_item};
use crate::errors::ServiceError;
use crate::repositories::PosRawRepository;
use crate::services::reconciliation::{UnifiedItem, UnifiedSale};
use crate::services::AdditionalAttributes;

use super::money::{cents_to_decimal, optional_cents};
use super::{wrong_record, PosProvider, PosTransformer, RawPosRecord, UnifiedRecord};

pub struct ToastTransformer;

impl ToastTransformer {
    fn menu_item(&self, row: &toast_menu_item::Model) -> UnifiedItem {
        let mut attributes = AdditionalAttributes::new();
        if let Some(cents) = row.price_cents {
            attributes.insert("menu_price".into(), json!(cents_to_decimal(cents)));
        }

        UnifiedItem {
            restaurant_id: row.restaurant_id,
            provider: PosProvider::Toast,
            external_id: row.toast_item_guid.clone(),
            name: row.name.clone(),
            unit: "each".into(),
            category: row.menu_group_name.clone(),
            unit_cost: None,
            is_active: row.visible,
            attributes,
        }
    }

    fn selection(&self, row: &toast_order_item::Model) -> Option<UnifiedSale> {
        if row.voided {
            return None;
        }
        let unit_price = optional_cents(row.price_cents);

        Some(UnifiedSale {
            restaurant_id: row.restaurant_id,
            provider: PosProvider::Toast,
            order_id: row.toast_order_guid.clone(),
            line_item_id: row.toast_selection_guid.clone(),
            external_item_id: row.item_guid.clone(),
            item_name: row.display_name.clone(),
            quantity: row.quantity,
            unit_price,
            total_amount: (unit_price * row.quantity).round_dp(2),
            transaction_date: row.business_date,
            attributes: AdditionalAttributes::new(),
        })
    }
}

#[async_trait]
impl PosTransformer for ToastTransformer {
    fn provider(&self) -> PosProvider {
        PosProvider::Toast
    }

    async fn fetch_raw(
        &self,
        raw: &dyn PosRawRepository,
        restaurant_id: Uuid,
    ) -> Result<Vec<RawPosRecord>, ServiceError> {
        let mut records: Vec<RawPosRecord> = raw
            .toast_menu_items(restaurant_id)
            .await?
            .into_iter()
            .map(RawPosRecord::ToastMenuItem)
            .collect();
        records.extend(
            raw.toast_order_items(restaurant_id)
                .await?
                .into_iter()
                .map(RawPosRecord::ToastOrderItem),
        );
        Ok(records)
    }

    fn transform(&self, record: &RawPosRecord) -> Result<Option<UnifiedRecord>, ServiceError> {
        match record {
            RawPosRecord::ToastMenuItem(row) => Ok(Some(UnifiedRecord::Item(self.menu_item(row)))),
            RawPosRecord::ToastOrderItem(row) => Ok(self.selection(row).map(UnifiedRecord::Sale)),
            other => Err(wrong_record(PosProvider::Toast, other)),
        }
    }
}
