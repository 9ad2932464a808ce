mod common;

use assert_matches::assert_matches;
use backoffice_variance::{
    entities::pos::square_inventory_count,
    errors::ServiceError,
    events::Event,
    services::pos::{square::line_key, PosProvider},
};
use common::TestContext;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

async fn seed_square(ctx: &TestContext) {
    ctx.seed_square_menu_item("ITEM1", "VAR1", "Classic burger", 1250)
        .await;
    ctx.seed_square_count("VAR1", "LOC-A", "10").await;
    ctx.seed_square_count("VAR1", "LOC-B", "2.5").await;
    ctx.seed_square_order_line("ORD1", "L1", Some("VAR1"), "2", "COMPLETED")
        .await;
    ctx.seed_square_order_line("ORD1", "L2", None, "1", "COMPLETED")
        .await;
    ctx.seed_square_order_line("ORD2", "L1", Some("VAR1"), "3", "OPEN")
        .await;
}

#[tokio::test]
async fn square_data_lands_in_the_unified_schema() {
    let mut ctx = TestContext::new().await;
    seed_square(&ctx).await;

    let outcome = ctx
        .services
        .pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("transform");

    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert_eq!(outcome.processed, 5);
    // menu item and two completed lines
    assert_eq!(outcome.created, 3);
    // stock level on the new item
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.skipped, 1);

    let item = ctx
        .repos
        .items
        .find_by_source_key(ctx.restaurant_id, "square", "VAR1")
        .await
        .expect("lookup")
        .expect("item created");
    assert_eq!(item.name, "Classic burger");
    assert_eq!(item.unit, "each");
    assert_eq!(item.current_stock.round_dp(4), dec!(12.5));
    assert!(item.is_active);

    let sale = ctx
        .repos
        .sales
        .find_by_source_line("square", &line_key("ORD1", "L1"))
        .await
        .expect("lookup")
        .expect("sale created");
    assert_eq!(sale.inventory_item_id, Some(item.id));
    assert_eq!(sale.quantity, dec!(2));
    assert_eq!(sale.total_amount.round_dp(2), dec!(25.00));

    let ad_hoc = ctx
        .repos
        .sales
        .find_by_source_line("square", &line_key("ORD1", "L2"))
        .await
        .expect("lookup")
        .expect("ad-hoc sale created");
    assert_eq!(ad_hoc.inventory_item_id, None);

    let open_order = ctx
        .repos
        .sales
        .find_by_source_line("square", &line_key("ORD2", "L1"))
        .await
        .expect("lookup");
    assert!(open_order.is_none());

    assert!(ctx.drain_events().iter().any(|event| matches!(
        event,
        Event::PosTransformCompleted { processed: 5, errors: 0, .. }
    )));
}

#[tokio::test]
async fn rerunning_over_unchanged_data_writes_nothing() {
    let ctx = TestContext::new().await;
    seed_square(&ctx).await;
    let pos = &ctx.services.pos;

    pos.transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("first run");
    let items_before = ctx
        .repos
        .items
        .count_for_restaurant(ctx.restaurant_id)
        .await
        .expect("count");
    let sales_before = ctx
        .repos
        .sales
        .count_for_restaurant(ctx.restaurant_id)
        .await
        .expect("count");

    let rerun = pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("second run");
    assert_eq!(rerun.created, 0);
    assert_eq!(rerun.updated, 0);
    assert_eq!(rerun.unchanged, 4);

    assert_eq!(
        ctx.repos
            .items
            .count_for_restaurant(ctx.restaurant_id)
            .await
            .expect("count"),
        items_before
    );
    assert_eq!(
        ctx.repos
            .sales
            .count_for_restaurant(ctx.restaurant_id)
            .await
            .expect("count"),
        sales_before
    );
}

#[tokio::test]
async fn new_stock_counts_update_the_existing_item() {
    let ctx = TestContext::new().await;
    seed_square(&ctx).await;
    let pos = &ctx.services.pos;
    pos.transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("first run");

    ctx.seed_square_count("VAR1", "LOC-C", "4").await;
    let rerun = pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("second run");
    assert_eq!(rerun.created, 0);
    assert_eq!(rerun.updated, 1);

    let item = ctx
        .repos
        .items
        .find_by_source_key(ctx.restaurant_id, "square", "VAR1")
        .await
        .expect("lookup")
        .expect("item");
    assert_eq!(item.current_stock.round_dp(4), dec!(16.5));
}

#[tokio::test]
async fn sold_out_items_drop_to_zero_stock() {
    let ctx = TestContext::new().await;
    seed_square(&ctx).await;
    let pos = &ctx.services.pos;
    pos.transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("first run");

    square_inventory_count::Entity::delete_many()
        .filter(square_inventory_count::Column::State.eq("IN_STOCK"))
        .exec(ctx.db.as_ref())
        .await
        .expect("clear in-stock counts");
    ctx.seed_square_count_in("VAR1", "LOC-A", "12.5", "SOLD").await;

    let rerun = pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("second run");
    assert!(rerun.errors.is_empty(), "{:?}", rerun.errors);
    assert_eq!(rerun.updated, 1);

    let item = ctx
        .repos
        .items
        .find_by_source_key(ctx.restaurant_id, "square", "VAR1")
        .await
        .expect("lookup")
        .expect("item");
    assert_eq!(item.current_stock.round_dp(4), Decimal::ZERO);
}

#[tokio::test]
async fn malformed_square_quantities_are_collected() {
    let ctx = TestContext::new().await;
    ctx.seed_square_menu_item("ITEM1", "VAR1", "Classic burger", 1250)
        .await;
    ctx.seed_square_order_line("ORD1", "L1", Some("VAR1"), "two", "COMPLETED")
        .await;

    let outcome = ctx
        .services
        .pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Square)
        .await
        .expect("partial success");
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "validation_error");
}

#[tokio::test]
async fn voided_toast_selections_are_skipped() {
    let ctx = TestContext::new().await;
    ctx.seed_toast_selection("SEL1", Some("TOAST-ITEM"), false).await;
    ctx.seed_toast_selection("SEL2", Some("TOAST-ITEM"), true).await;

    let outcome = ctx
        .services
        .pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Toast)
        .await
        .expect("transform");
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 1);

    let sale = ctx
        .repos
        .sales
        .find_by_source_line("toast", "SEL1")
        .await
        .expect("lookup")
        .expect("sale");
    // No Toast menu item has been synced for this guid.
    assert_eq!(sale.inventory_item_id, None);
    assert_eq!(sale.total_amount.round_dp(2), dec!(9.00));
}

#[tokio::test]
async fn csv_is_not_a_pos_transformer() {
    let ctx = TestContext::new().await;
    let result = ctx
        .services
        .pos
        .transform_restaurant(ctx.restaurant_id, PosProvider::Csv)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
}
