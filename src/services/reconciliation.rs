//! Tier-2 write path shared by the POS transformers and the CSV pipeline.
//!
//! Every write goes through a reconciliation key: `(restaurant, provider, external id)`
//! for items and `(provider, line item id)` for sales. Both paths use the same keys so
//! re-syncs and re-uploads update in place. A [`Reconciler`] stages the effect of each
//! write so later records in the same run see earlier ones, which is also what makes a
//! dry run classify exactly like a real one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::inventory_item::Model as ItemModel;
use crate::entities::sales_transaction::Model as SaleModel;
use crate::errors::ServiceError;
use crate::repositories::{ItemRepository, SalesRepository};
use crate::services::pos::PosProvider;
use crate::services::{attributes_to_json, AdditionalAttributes};

const DEFAULT_THRESHOLD_QUANTITY: Decimal = dec!(5);
const DEFAULT_THRESHOLD_DOLLAR: Decimal = dec!(50);
const DEFAULT_YIELD_FACTOR: Decimal = dec!(1);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedItem {
    pub restaurant_id: Uuid,
    pub provider: PosProvider,
    pub external_id: String,
    pub name: String,
    pub unit: String,
    pub category: Option<String>,
    /// `None` keeps the cost already on file
    pub unit_cost: Option<Decimal>,
    pub is_active: bool,
    pub attributes: AdditionalAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedSale {
    pub restaurant_id: Uuid,
    pub provider: PosProvider,
    pub order_id: String,
    pub line_item_id: String,
    /// Provider id of the sold item, resolved to a Tier-2 item when one exists
    pub external_item_id: Option<String>,
    pub item_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub attributes: AdditionalAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedStockLevel {
    pub restaurant_id: Uuid,
    pub provider: PosProvider,
    pub external_item_id: String,
    pub quantity: Decimal,
}

/// What a single reconciled write did to Tier-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    /// Combines the outcomes of two writes made for one source record.
    pub fn merge(self, other: UpsertOutcome) -> UpsertOutcome {
        match (self, other) {
            (UpsertOutcome::Created, _) | (_, UpsertOutcome::Created) => UpsertOutcome::Created,
            (UpsertOutcome::Updated, _) | (_, UpsertOutcome::Updated) => UpsertOutcome::Updated,
            _ => UpsertOutcome::Unchanged,
        }
    }
}

type ItemKey = (Uuid, String, String);
type SaleKey = (String, String);

/// Amounts come back from some backends through a float, so compare at storage scale.
fn same_amount(a: Decimal, b: Decimal) -> bool {
    a.round_dp(4) == b.round_dp(4)
}

pub struct Reconciler {
    items: Arc<dyn ItemRepository>,
    sales: Arc<dyn SalesRepository>,
    dry_run: bool,
    staged_items: HashMap<ItemKey, ItemModel>,
    staged_sales: HashMap<SaleKey, SaleModel>,
}

impl Reconciler {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        sales: Arc<dyn SalesRepository>,
        dry_run: bool,
    ) -> Self {
        Self {
            items,
            sales,
            dry_run,
            staged_items: HashMap::new(),
            staged_sales: HashMap::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn current_item(
        &self,
        restaurant_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ItemModel>, ServiceError> {
        let key = (restaurant_id, provider.to_string(), external_id.to_string());
        if let Some(staged) = self.staged_items.get(&key) {
            return Ok(Some(staged.clone()));
        }
        self.items
            .find_by_source_key(restaurant_id, provider, external_id)
            .await
    }

    pub async fn apply_item(&mut self, item: &UnifiedItem) -> Result<UpsertOutcome, ServiceError> {
        if item.external_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "item external id cannot be empty".into(),
            ));
        }
        if matches!(item.unit_cost, Some(cost) if cost < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(format!(
                "item {} has a negative unit cost",
                item.external_id
            )));
        }

        let provider = item.provider.to_string();
        let existing = self
            .current_item(item.restaurant_id, &provider, &item.external_id)
            .await?;
        let source_data = attributes_to_json(&item.attributes);
        let now = Utc::now();

        let (candidate, outcome) = match existing {
            Some(current) => {
                let unit_cost = item.unit_cost.unwrap_or(current.unit_cost);
                let unchanged = current.name == item.name
                    && current.unit == item.unit
                    && current.category == item.category
                    && same_amount(current.unit_cost, unit_cost)
                    && current.is_active == item.is_active
                    && current.source_pos_data == source_data;
                if unchanged {
                    return Ok(UpsertOutcome::Unchanged);
                }
                let updated = ItemModel {
                    name: item.name.clone(),
                    unit: item.unit.clone(),
                    category: item.category.clone(),
                    unit_cost,
                    is_active: item.is_active,
                    source_pos_data: source_data,
                    updated_at: now,
                    ..current
                };
                (updated, UpsertOutcome::Updated)
            }
            None => {
                let created = ItemModel {
                    id: Uuid::new_v4(),
                    restaurant_id: item.restaurant_id,
                    name: item.name.clone(),
                    unit: item.unit.clone(),
                    category: item.category.clone(),
                    category_id: None,
                    supplier_id: None,
                    unit_cost: item.unit_cost.unwrap_or(Decimal::ZERO),
                    current_stock: Decimal::ZERO,
                    variance_threshold_quantity: DEFAULT_THRESHOLD_QUANTITY,
                    variance_threshold_dollar: DEFAULT_THRESHOLD_DOLLAR,
                    high_value_flag: false,
                    theoretical_yield_factor: DEFAULT_YIELD_FACTOR,
                    source_pos_provider: Some(provider.clone()),
                    source_pos_item_id: Some(item.external_id.clone()),
                    source_pos_data: source_data,
                    is_active: item.is_active,
                    created_at: now,
                    updated_at: now,
                };
                (created, UpsertOutcome::Created)
            }
        };

        let stored = if self.dry_run {
            candidate
        } else {
            self.items.upsert_by_source_key(candidate).await?
        };
        debug!(external_id = %item.external_id, ?outcome, dry_run = self.dry_run, "item reconciled");
        self.staged_items.insert(
            (item.restaurant_id, provider, item.external_id.clone()),
            stored,
        );
        Ok(outcome)
    }

    pub async fn apply_sale(&mut self, sale: &UnifiedSale) -> Result<UpsertOutcome, ServiceError> {
        if sale.line_item_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "sale line item id cannot be empty".into(),
            ));
        }
        if sale.quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "sale line {} has a negative quantity",
                sale.line_item_id
            )));
        }
        if sale.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "sale line {} has a negative unit price",
                sale.line_item_id
            )));
        }

        let provider = sale.provider.to_string();
        let key = (provider.clone(), sale.line_item_id.clone());
        let existing = match self.staged_sales.get(&key) {
            Some(staged) => Some(staged.clone()),
            None => {
                self.sales
                    .find_by_source_line(&provider, &sale.line_item_id)
                    .await?
            }
        };

        let inventory_item_id = match &sale.external_item_id {
            Some(external_id) => self
                .current_item(sale.restaurant_id, &provider, external_id)
                .await?
                .map(|item| item.id),
            None => None,
        };
        let source_data = attributes_to_json(&sale.attributes);
        let now = Utc::now();

        let (candidate, outcome) = match existing {
            Some(current) if current.restaurant_id != sale.restaurant_id => {
                return Err(ServiceError::ReconciliationConflict(format!(
                    "{} line {} already belongs to restaurant {}",
                    provider, sale.line_item_id, current.restaurant_id
                )));
            }
            Some(current) => {
                let unchanged = current.inventory_item_id == inventory_item_id
                    && current.item_name == sale.item_name
                    && same_amount(current.quantity, sale.quantity)
                    && same_amount(current.unit_price, sale.unit_price)
                    && same_amount(current.total_amount, sale.total_amount)
                    && current.transaction_date == sale.transaction_date
                    && current.source_pos_order_id == sale.order_id
                    && current.source_pos_data == source_data;
                if unchanged {
                    return Ok(UpsertOutcome::Unchanged);
                }
                let updated = SaleModel {
                    inventory_item_id,
                    item_name: sale.item_name.clone(),
                    quantity: sale.quantity,
                    unit_price: sale.unit_price,
                    total_amount: sale.total_amount,
                    transaction_date: sale.transaction_date,
                    source_pos_order_id: sale.order_id.clone(),
                    source_pos_data: source_data,
                    updated_at: now,
                    ..current
                };
                (updated, UpsertOutcome::Updated)
            }
            None => {
                let created = SaleModel {
                    id: Uuid::new_v4(),
                    restaurant_id: sale.restaurant_id,
                    inventory_item_id,
                    item_name: sale.item_name.clone(),
                    quantity: sale.quantity,
                    unit_price: sale.unit_price,
                    total_amount: sale.total_amount,
                    transaction_date: sale.transaction_date,
                    source_pos_provider: provider.clone(),
                    source_pos_order_id: sale.order_id.clone(),
                    source_pos_line_item_id: sale.line_item_id.clone(),
                    source_pos_data: source_data,
                    created_at: now,
                    updated_at: now,
                };
                (created, UpsertOutcome::Created)
            }
        };

        let stored = if self.dry_run {
            candidate
        } else {
            self.sales.upsert_by_source_line(candidate).await?
        };
        self.staged_sales.insert(key, stored);
        Ok(outcome)
    }

    /// Sets `current_stock` of the matching item. There must be one.
    pub async fn apply_stock_level(
        &mut self,
        level: &UnifiedStockLevel,
    ) -> Result<UpsertOutcome, ServiceError> {
        if level.quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "stock level for {} is negative",
                level.external_item_id
            )));
        }

        let provider = level.provider.to_string();
        let item = self
            .current_item(level.restaurant_id, &provider, &level.external_item_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no {} item {} for stock level",
                    provider, level.external_item_id
                ))
            })?;
        if same_amount(item.current_stock, level.quantity) {
            return Ok(UpsertOutcome::Unchanged);
        }

        if !self.dry_run {
            self.items
                .update_current_stock(item.id, level.quantity)
                .await?;
        }
        self.staged_items.insert(
            (level.restaurant_id, provider, level.external_item_id.clone()),
            ItemModel {
                current_stock: level.quantity,
                ..item
            },
        );
        Ok(UpsertOutcome::Updated)
    }
}
