mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use assert_matches::assert_matches;
use async_trait::async_trait;
use backoffice_variance::{
    entities::{
        csv_transform::CsvTransformStatus,
        csv_upload::{CsvUploadStatus, CsvUploadType},
        inventory_item::Model as ItemModel,
        sales_transaction::Model as SaleModel,
    },
    errors::ServiceError,
    events::Event,
    repositories::ItemRepository,
    services::csv::{CsvTransformService, TransformOptions, TransformResult, UploadValidation},
};
use chrono::Utc;
use common::{at, TestContext, TEST_BATCH_SIZE};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::DbErr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const INVENTORY: &str = "\
sku,name,unit_cost,current_stock
BEEF,Ground beef,4.50,20
BUN,Brioche bun,$0.40,
OIL,Fryer oil,-1,3
";

async fn upload(ctx: &TestContext, kind: CsvUploadType, body: &str) -> UploadValidation {
    ctx.services
        .csv_upload
        .validate_upload(ctx.restaurant_id, "upload.csv", kind, body.as_bytes())
        .await
        .expect("validation")
}

async fn transform(
    ctx: &TestContext,
    upload_id: Uuid,
    kind: CsvUploadType,
    dry_run: bool,
    max_error_rate: Option<f64>,
) -> TransformResult {
    ctx.services
        .csv_transform
        .transform(
            upload_id,
            TransformOptions {
                transform_type: kind,
                dry_run,
                max_error_rate,
            },
            CancellationToken::new(),
        )
        .await
        .expect("transform")
}

/// Real item storage whose upserts start failing once `allowed` have gone through.
struct FailingItems {
    inner: Arc<dyn ItemRepository>,
    allowed: AtomicUsize,
}

#[async_trait]
impl ItemRepository for FailingItems {
    async fn insert(&self, item: ItemModel) -> Result<ItemModel, ServiceError> {
        self.inner.insert(item).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemModel>, ServiceError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ItemModel>, ServiceError> {
        self.inner.find_by_ids(ids).await
    }

    async fn find_by_source_key(
        &self,
        restaurant_id: Uuid,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ItemModel>, ServiceError> {
        self.inner
            .find_by_source_key(restaurant_id, provider, external_id)
            .await
    }

    async fn upsert_by_source_key(&self, item: ItemModel) -> Result<ItemModel, ServiceError> {
        let remaining = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_err() {
            return Err(ServiceError::DatabaseError(DbErr::Custom(
                "connection reset".into(),
            )));
        }
        self.inner.upsert_by_source_key(item).await
    }

    async fn update_current_stock(&self, id: Uuid, quantity: Decimal) -> Result<u64, ServiceError> {
        self.inner.update_current_stock(id, quantity).await
    }

    async fn count_for_restaurant(&self, restaurant_id: Uuid) -> Result<u64, ServiceError> {
        self.inner.count_for_restaurant(restaurant_id).await
    }
}

async fn item_count(ctx: &TestContext) -> u64 {
    ctx.repos
        .items
        .count_for_restaurant(ctx.restaurant_id)
        .await
        .expect("count")
}

#[tokio::test]
async fn validation_persists_rows_in_batches() {
    let mut ctx = TestContext::new().await;
    let body = "sku,name,unit_cost\nA,Apples,1\nB,Bananas,abc\nC,Cherries,3\n";
    let validation = upload(&ctx, CsvUploadType::Inventory, body).await;

    let stored = &validation.upload;
    assert_eq!(stored.status, CsvUploadStatus::Validated);
    assert_eq!(stored.rows_total, 3);
    assert_eq!(stored.rows_valid, 2);
    assert_eq!(stored.rows_invalid, 1);
    assert_eq!(validation.errors.len(), 1);
    assert_eq!(validation.errors[0].row_number, Some(2));

    let batches = ctx
        .repos
        .csv
        .batches_for_upload(stored.id)
        .await
        .expect("batches");
    assert_eq!(batches.len(), 3_usize.div_ceil(TEST_BATCH_SIZE));
    assert_eq!(stored.batch_count as usize, batches.len());
    assert_eq!(batches[0].batch_number, 1);
    assert_eq!(batches[0].row_count, 1);
    assert_eq!(batches[1].row_count, 1);

    // Validation never touches the unified schema.
    assert_eq!(item_count(&ctx).await, 0);
    assert!(ctx.drain_events().iter().any(|event| matches!(
        event,
        Event::CsvUploadValidated { total_rows: 3, invalid_rows: 1, .. }
    )));
}

#[tokio::test]
async fn missing_columns_fail_the_upload() {
    let ctx = TestContext::new().await;
    let validation = upload(&ctx, CsvUploadType::Inventory, "sku,name\nA,Apples\n").await;

    assert_eq!(validation.upload.status, CsvUploadStatus::Failed);
    assert_eq!(validation.upload.batch_count, 0);
    assert_eq!(validation.errors.len(), 1);
    assert!(validation.errors[0].message.contains("unit_cost"));

    let result = transform(&ctx, validation.upload.id, CsvUploadType::Inventory, false, None).await;
    assert_eq!(result.status, CsvTransformStatus::Failed);
    assert_eq!(result.summary.processed, 0);
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let ctx = TestContext::new().await;
    let validation = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;

    let preview = transform(&ctx, validation.upload.id, CsvUploadType::Inventory, true, None).await;
    assert!(preview.dry_run);
    assert_eq!(preview.status, CsvTransformStatus::Completed);
    assert_eq!(preview.summary.processed, 3);
    assert_eq!(preview.summary.created, 2);
    assert_eq!(preview.summary.skipped, 1);
    assert_eq!(preview.summary.error_count, 1);
    assert_eq!(preview.errors[0].row_number, Some(3));
    assert_eq!(item_count(&ctx).await, 0);
}

#[tokio::test]
async fn transform_writes_once_and_reruns_are_no_ops() {
    let ctx = TestContext::new().await;
    let validation = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;

    let first = transform(&ctx, validation.upload.id, CsvUploadType::Inventory, false, None).await;
    assert_eq!(first.status, CsvTransformStatus::Completed);
    assert_eq!(first.summary.created, 2);
    assert_eq!(first.summary.updated, 0);
    assert_eq!(first.summary.skipped, 1);
    assert_eq!(first.summary.batches_processed, 2);
    assert_eq!(first.error_rate.round_dp(4), dec!(0.3333));
    assert_eq!(item_count(&ctx).await, 2);

    let beef = ctx
        .repos
        .items
        .find_by_source_key(ctx.restaurant_id, "csv", "BEEF")
        .await
        .expect("lookup")
        .expect("beef");
    assert_eq!(beef.unit_cost.round_dp(2), dec!(4.50));
    assert_eq!(beef.current_stock.round_dp(4), dec!(20));

    let rerun = transform(&ctx, validation.upload.id, CsvUploadType::Inventory, false, None).await;
    assert_eq!(rerun.summary.created, 0);
    assert_eq!(rerun.summary.updated, 0);
    assert_eq!(rerun.summary.skipped, 3);
    assert_eq!(item_count(&ctx).await, 2);

    let runs = ctx
        .services
        .csv_transform
        .list_runs(validation.upload.id)
        .await
        .expect("runs");
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.completed_at.is_some()));
}

#[tokio::test]
async fn later_upload_updates_existing_items() {
    let ctx = TestContext::new().await;
    let first = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;
    transform(&ctx, first.upload.id, CsvUploadType::Inventory, false, None).await;

    let revised = "sku,name,unit_cost\nBEEF,Ground beef,4.75\nBUN,Brioche bun,0.40\n";
    let second = upload(&ctx, CsvUploadType::Inventory, revised).await;
    let result = transform(&ctx, second.upload.id, CsvUploadType::Inventory, false, None).await;
    assert_eq!(result.summary.created, 0);
    assert_eq!(result.summary.updated, 1);
    assert_eq!(result.summary.skipped, 1);

    let beef = ctx
        .repos
        .items
        .find_by_source_key(ctx.restaurant_id, "csv", "BEEF")
        .await
        .expect("lookup")
        .expect("beef");
    assert_eq!(beef.unit_cost.round_dp(2), dec!(4.75));
    // No current_stock column: the stock level stays as it was.
    assert_eq!(beef.current_stock.round_dp(4), dec!(20));
}

#[tokio::test]
async fn error_rate_gate_rejects_before_writing() {
    let ctx = TestContext::new().await;
    let validation = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;

    let rejected = transform(&ctx, validation.upload.id, CsvUploadType::Inventory, false, Some(0.2)).await;
    assert_eq!(rejected.status, CsvTransformStatus::Failed);
    assert_eq!(rejected.error_rate.round_dp(4), dec!(0.3333));
    assert_eq!(item_count(&ctx).await, 0);

    let accepted = transform(&ctx, validation.upload.id, CsvUploadType::Inventory, false, Some(0.5)).await;
    assert_eq!(accepted.status, CsvTransformStatus::Completed);
    assert_eq!(accepted.summary.preflight_error_rate.map(|r| r.round_dp(4)), Some(dec!(0.3333)));
    assert_eq!(item_count(&ctx).await, 2);
}

#[tokio::test]
async fn cancelled_transform_stops_between_batches() {
    let ctx = TestContext::new().await;
    let validation = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = ctx
        .services
        .csv_transform
        .transform(
            validation.upload.id,
            TransformOptions {
                transform_type: CsvUploadType::Inventory,
                dry_run: false,
                max_error_rate: None,
            },
            cancel,
        )
        .await
        .expect("cancelled run is still a result");
    assert_eq!(result.status, CsvTransformStatus::Cancelled);
    assert_eq!(result.summary.batches_processed, 0);
    assert_eq!(result.summary.batches_total, 2);
    assert_eq!(item_count(&ctx).await, 0);
}

#[tokio::test]
async fn mismatched_or_missing_uploads_are_rejected() {
    let ctx = TestContext::new().await;
    let validation = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;

    let mismatched = transform(&ctx, validation.upload.id, CsvUploadType::Sales, false, None).await;
    assert_eq!(mismatched.status, CsvTransformStatus::Failed);
    assert_eq!(mismatched.errors[0].code, "validation_error");

    let missing = ctx
        .services
        .csv_transform
        .transform(
            Uuid::new_v4(),
            TransformOptions {
                transform_type: CsvUploadType::Inventory,
                dry_run: false,
                max_error_rate: None,
            },
            CancellationToken::new(),
        )
        .await;
    assert_matches!(missing, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn sales_rows_link_to_csv_items() {
    let ctx = TestContext::new().await;
    let items = upload(&ctx, CsvUploadType::Inventory, INVENTORY).await;
    transform(&ctx, items.upload.id, CsvUploadType::Inventory, false, None).await;

    let sales = "\
order_id,line_id,sku,item_name,quantity,unit_price,transaction_date
O-1,1,BEEF,Ground beef,2,4.50,2024-03-05
O-1,2,,Special,1,9.99,2024-03-05T18:30:00Z
";
    let validation = upload(&ctx, CsvUploadType::Sales, sales).await;
    assert_eq!(validation.upload.rows_valid, 2);

    let result = transform(&ctx, validation.upload.id, CsvUploadType::Sales, false, None).await;
    assert_eq!(result.summary.created, 2);
    assert!(result.errors.is_empty());

    let beef = ctx
        .repos
        .items
        .find_by_source_key(ctx.restaurant_id, "csv", "BEEF")
        .await
        .expect("lookup")
        .expect("beef");
    let linked = ctx
        .repos
        .sales
        .find_by_source_line("csv", "1")
        .await
        .expect("lookup")
        .expect("sale");
    assert_eq!(linked.inventory_item_id, Some(beef.id));
    assert_eq!(linked.total_amount.round_dp(2), dec!(9.00));

    let special = ctx
        .repos
        .sales
        .find_by_source_line("csv", "2")
        .await
        .expect("lookup")
        .expect("sale");
    assert_eq!(special.inventory_item_id, None);
}

#[tokio::test]
async fn storage_failure_mid_run_keeps_partial_counts() {
    let ctx = TestContext::new().await;
    let body = "sku,name,unit_cost\nA,Apples,1\nB,Bananas,2\nC,Cherries,3\nD,Dates,4\n";
    let validation = upload(&ctx, CsvUploadType::Inventory, body).await;

    let service = CsvTransformService::new(
        ctx.repos.csv.clone(),
        Arc::new(FailingItems {
            inner: ctx.repos.items.clone(),
            allowed: AtomicUsize::new(TEST_BATCH_SIZE),
        }),
        ctx.repos.sales.clone(),
        None,
    );
    let result = service
        .transform(
            validation.upload.id,
            TransformOptions {
                transform_type: CsvUploadType::Inventory,
                dry_run: false,
                max_error_rate: None,
            },
            CancellationToken::new(),
        )
        .await;
    assert_matches!(result, Err(ServiceError::DatabaseError(_)));

    // The first batch was committed before the failure.
    assert_eq!(item_count(&ctx).await, 2);
    let runs = ctx
        .services
        .csv_transform
        .list_runs(validation.upload.id)
        .await
        .expect("runs");
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, CsvTransformStatus::Failed);
    assert_eq!(run.created_count, 2);
    assert_eq!(run.processed_count, 3);
    assert!(run.completed_at.is_some());
    let summary = run.summary.clone().expect("summary");
    assert_eq!(summary["batches_processed"], 1);
    assert_eq!(summary["batches_total"], 2);
}

const SHARED_LINE: &str = "\
order_id,line_id,sku,item_name,quantity,unit_price,transaction_date
O-1,SHARED-1,,Special,1,9.99,2024-03-05
";

#[tokio::test]
async fn sale_lines_owned_by_another_restaurant_are_not_merged() {
    let ctx = TestContext::new().await;
    let ours = upload(&ctx, CsvUploadType::Sales, SHARED_LINE).await;
    let first = transform(&ctx, ours.upload.id, CsvUploadType::Sales, false, None).await;
    assert_eq!(first.summary.created, 1);

    let other_restaurant = Uuid::new_v4();
    let theirs = ctx
        .services
        .csv_upload
        .validate_upload(
            other_restaurant,
            "other.csv",
            CsvUploadType::Sales,
            "order_id,line_id,sku,item_name,quantity,unit_price,transaction_date\n\
             O-9,SHARED-1,,Other special,4,2.00,2024-03-06\n"
                .as_bytes(),
        )
        .await
        .expect("validation");
    assert_eq!(theirs.upload.rows_valid, 1);

    let result = transform(&ctx, theirs.upload.id, CsvUploadType::Sales, false, None).await;
    assert_eq!(result.status, CsvTransformStatus::Completed);
    assert_eq!(result.summary.created, 0);
    assert_eq!(result.summary.updated, 0);
    assert_eq!(result.summary.skipped, 1);
    assert_eq!(result.summary.error_count, 1);
    assert_eq!(result.errors[0].code, "reconciliation_conflict");
    assert_eq!(result.errors[0].row_number, Some(1));

    let stored = ctx
        .repos
        .sales
        .find_by_source_line("csv", "SHARED-1")
        .await
        .expect("lookup")
        .expect("sale");
    assert_eq!(stored.restaurant_id, ctx.restaurant_id);
    assert_eq!(stored.item_name, "Special");
    assert_eq!(stored.total_amount.round_dp(2), dec!(9.99));
}

#[tokio::test]
async fn sale_upsert_refuses_another_restaurants_line() {
    let ctx = TestContext::new().await;
    let ours = upload(&ctx, CsvUploadType::Sales, SHARED_LINE).await;
    transform(&ctx, ours.upload.id, CsvUploadType::Sales, false, None).await;

    // Straight to storage, as a concurrent sync that missed the ownership read would.
    let now = Utc::now();
    let intruder = SaleModel {
        id: Uuid::new_v4(),
        restaurant_id: Uuid::new_v4(),
        inventory_item_id: None,
        item_name: "Other special".into(),
        quantity: dec!(4),
        unit_price: dec!(2),
        total_amount: dec!(8),
        transaction_date: at(2024, 3, 6),
        source_pos_provider: "csv".into(),
        source_pos_order_id: "O-9".into(),
        source_pos_line_item_id: "SHARED-1".into(),
        source_pos_data: None,
        created_at: now,
        updated_at: now,
    };
    let written = ctx.repos.sales.upsert_by_source_line(intruder).await;
    assert_matches!(written, Err(ServiceError::ReconciliationConflict(_)));

    let stored = ctx
        .repos
        .sales
        .find_by_source_line("csv", "SHARED-1")
        .await
        .expect("lookup")
        .expect("sale");
    assert_eq!(stored.restaurant_id, ctx.restaurant_id);
    assert_eq!(stored.quantity.round_dp(4), dec!(1));
    assert_eq!(stored.total_amount.round_dp(2), dec!(9.99));
}
