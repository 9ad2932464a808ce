#![allow(dead_code)]

use std::sync::Arc;

use backoffice_variance::{
    db::{self, DbConfig, DbPool},
    entities::{
        inventory_item::Model as ItemModel,
        inventory_period::{Model as PeriodModel, PeriodType},
        period_inventory_snapshot::SnapshotType,
        pos::{square_inventory_count, square_menu_item, square_order_item, toast_order_item},
        recipe::Model as RecipeModel,
        recipe_ingredient::Model as IngredientModel,
        sales_transaction::Model as SaleModel,
    },
    events::{self, Event},
    repositories::Repositories,
    services::{
        factory::{ServiceContainer, ServiceFactory},
        periods::{CreatePeriodRequest, RecordSnapshotRequest},
        variance::VarianceThresholds,
    },
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, IntoActiveModel};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Small batches so multi-batch behaviour shows up with a handful of rows.
pub const TEST_BATCH_SIZE: usize = 2;

/// Services wired against a fresh in-memory SQLite database.
pub struct TestContext {
    pub db: Arc<DbPool>,
    pub repos: Repositories,
    pub services: ServiceContainer,
    pub restaurant_id: Uuid,
    events: mpsc::Receiver<Event>,
}

impl TestContext {
    pub async fn new() -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool).await.expect("migrations should apply");

        let db = Arc::new(pool);
        let repos = Repositories::sea_orm(db.clone());
        let (sender, events) = events::channel(1024);
        let factory = ServiceFactory::new(
            repos.clone(),
            VarianceThresholds::default(),
            TEST_BATCH_SIZE,
            Some(sender),
        );
        let services = ServiceContainer::new(&factory);

        Self {
            db,
            repos,
            services,
            restaurant_id: Uuid::new_v4(),
            events,
        }
    }

    /// Everything published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn create_item(&self, name: &str, unit_cost: Decimal) -> ItemModel {
        self.create_item_with(ItemSeed {
            name: name.to_string(),
            unit_cost,
            ..ItemSeed::default()
        })
        .await
    }

    pub async fn create_item_with(&self, seed: ItemSeed) -> ItemModel {
        let now = Utc::now();
        self.repos
            .items
            .insert(ItemModel {
                id: Uuid::new_v4(),
                restaurant_id: seed.restaurant_id.unwrap_or(self.restaurant_id),
                name: seed.name,
                unit: "lb".into(),
                category: None,
                category_id: None,
                supplier_id: None,
                unit_cost: seed.unit_cost,
                current_stock: Decimal::ZERO,
                variance_threshold_quantity: seed.threshold_quantity,
                variance_threshold_dollar: seed.threshold_dollar,
                high_value_flag: seed.high_value,
                theoretical_yield_factor: seed.yield_factor,
                source_pos_provider: None,
                source_pos_item_id: None,
                source_pos_data: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("item insert")
    }

    pub async fn create_period(&self, start: NaiveDate, end: NaiveDate) -> PeriodModel {
        self.services
            .periods
            .create_period(CreatePeriodRequest {
                restaurant_id: self.restaurant_id,
                name: format!("Week of {start}"),
                period_type: PeriodType::Weekly,
                period_start: start,
                period_end: end,
            })
            .await
            .expect("period create")
    }

    pub async fn active_period(&self, start: NaiveDate, end: NaiveDate) -> PeriodModel {
        let period = self.create_period(start, end).await;
        self.services
            .periods
            .activate_period(period.id)
            .await
            .expect("period activate")
    }

    pub async fn count(
        &self,
        period_id: Uuid,
        item_id: Uuid,
        snapshot_type: SnapshotType,
        quantity: Decimal,
    ) {
        self.services
            .periods
            .record_snapshot(
                period_id,
                RecordSnapshotRequest {
                    inventory_item_id: item_id,
                    snapshot_type,
                    quantity,
                    unit_cost: None,
                    counted_by: None,
                    notes: None,
                },
            )
            .await
            .expect("snapshot record");
    }

    /// A one-ingredient recipe for `menu_item_id`.
    pub async fn create_recipe(
        &self,
        menu_item_id: Uuid,
        ingredient_id: Uuid,
        per_serving: Decimal,
    ) -> RecipeModel {
        let now = Utc::now();
        let recipe_id = Uuid::new_v4();
        let (recipe, _) = self
            .repos
            .recipes
            .insert_recipe(
                RecipeModel {
                    id: recipe_id,
                    restaurant_id: self.restaurant_id,
                    name: "House burger".into(),
                    menu_item_id,
                    recipe_data: None,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                },
                vec![IngredientModel {
                    id: Uuid::new_v4(),
                    recipe_id,
                    inventory_item_id: ingredient_id,
                    quantity_per_serving: per_serving,
                    unit: "lb".into(),
                }],
            )
            .await
            .expect("recipe insert");
        recipe
    }

    pub async fn record_sale(
        &self,
        menu_item_id: Uuid,
        line_id: &str,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> SaleModel {
        let now = Utc::now();
        self.repos
            .sales
            .upsert_by_source_line(SaleModel {
                id: Uuid::new_v4(),
                restaurant_id: self.restaurant_id,
                inventory_item_id: Some(menu_item_id),
                item_name: "House burger".into(),
                quantity,
                unit_price: Decimal::new(1200, 2),
                total_amount: Decimal::new(1200, 2) * quantity,
                transaction_date: at,
                source_pos_provider: "csv".into(),
                source_pos_order_id: "order-1".into(),
                source_pos_line_item_id: line_id.to_string(),
                source_pos_data: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("sale upsert")
    }

    pub async fn seed_square_menu_item(
        &self,
        item_id: &str,
        variation_id: &str,
        name: &str,
        price_cents: i64,
    ) {
        square_menu_item::Model {
            id: Uuid::new_v4(),
            restaurant_id: self.restaurant_id,
            square_item_id: item_id.to_string(),
            square_variation_id: variation_id.to_string(),
            name: name.to_string(),
            variation_name: Some("Regular".into()),
            category_name: Some("Mains".into()),
            price_money_amount: Some(price_cents),
            price_money_currency: Some("USD".into()),
            is_deleted: false,
            raw_data: json!({ "id": item_id }),
            synced_at: Utc::now(),
        }
        .into_active_model()
        .insert(self.db.as_ref())
        .await
        .expect("square menu item insert");
    }

    pub async fn seed_square_count(&self, catalog_object_id: &str, location: &str, quantity: &str) {
        self.seed_square_count_in(catalog_object_id, location, quantity, "IN_STOCK")
            .await;
    }

    pub async fn seed_square_count_in(
        &self,
        catalog_object_id: &str,
        location: &str,
        quantity: &str,
        state: &str,
    ) {
        square_inventory_count::Model {
            id: Uuid::new_v4(),
            restaurant_id: self.restaurant_id,
            catalog_object_id: catalog_object_id.to_string(),
            location_id: location.to_string(),
            state: state.to_string(),
            quantity: quantity.to_string(),
            calculated_at: Utc::now(),
            raw_data: json!({}),
            synced_at: Utc::now(),
        }
        .into_active_model()
        .insert(self.db.as_ref())
        .await
        .expect("square count insert");
    }

    pub async fn seed_square_order_line(
        &self,
        order_id: &str,
        uid: &str,
        catalog_object_id: Option<&str>,
        quantity: &str,
        state: &str,
    ) {
        square_order_item::Model {
            id: Uuid::new_v4(),
            restaurant_id: self.restaurant_id,
            square_order_id: order_id.to_string(),
            square_line_item_uid: uid.to_string(),
            catalog_object_id: catalog_object_id.map(str::to_string),
            name: "Burger".into(),
            quantity: quantity.to_string(),
            base_price_money_amount: Some(1250),
            total_money_amount: None,
            order_state: state.to_string(),
            order_created_at: at(2024, 3, 5),
            raw_data: json!({ "uid": uid }),
            synced_at: Utc::now(),
        }
        .into_active_model()
        .insert(self.db.as_ref())
        .await
        .expect("square order line insert");
    }

    pub async fn seed_toast_selection(&self, selection: &str, item_guid: Option<&str>, voided: bool) {
        toast_order_item::Model {
            id: Uuid::new_v4(),
            restaurant_id: self.restaurant_id,
            toast_order_guid: "toast-order-1".into(),
            toast_selection_guid: selection.to_string(),
            item_guid: item_guid.map(str::to_string),
            display_name: "Fries".into(),
            quantity: Decimal::from(2),
            price_cents: Some(450),
            voided,
            business_date: at(2024, 3, 5),
            raw_data: json!({ "guid": selection }),
            synced_at: Utc::now(),
        }
        .into_active_model()
        .insert(self.db.as_ref())
        .await
        .expect("toast selection insert");
    }
}

pub struct ItemSeed {
    pub restaurant_id: Option<Uuid>,
    pub name: String,
    pub unit_cost: Decimal,
    pub threshold_quantity: Decimal,
    pub threshold_dollar: Decimal,
    pub high_value: bool,
    pub yield_factor: Decimal,
}

impl Default for ItemSeed {
    fn default() -> Self {
        Self {
            restaurant_id: None,
            name: "Ground beef".into(),
            unit_cost: Decimal::ONE,
            threshold_quantity: Decimal::from(5),
            threshold_dollar: Decimal::from(50),
            high_value: false,
            yield_factor: Decimal::ONE,
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}
