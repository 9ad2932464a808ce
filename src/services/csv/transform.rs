use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::csv_transform::{CsvTransformStatus, Model as TransformModel};
use crate::entities::csv_upload::{CsvUploadStatus, CsvUploadType, Model as UploadModel};
use crate::entities::csv_upload_batch::Model as BatchModel;
use crate::errors::{ItemError, ServiceError};
use crate::events::{Event, EventSender};
use crate::repositories::{CsvRepository, ItemRepository, SalesRepository};
use crate::services::pos::PosProvider;
use crate::services::reconciliation::{
    Reconciler, UnifiedItem, UnifiedSale, UnifiedStockLevel, UpsertOutcome,
};
use crate::services::AdditionalAttributes;

use super::rows::{InventoryCsvRow, SalesCsvRow};

#[derive(Debug, Clone, Deserialize)]
pub struct TransformOptions {
    pub transform_type: CsvUploadType,
    #[serde(default)]
    pub dry_run: bool,
    /// Fraction of failing rows above which the run is rejected before any write
    #[serde(default)]
    pub max_error_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    /// Unchanged rows plus rows rejected by a business rule
    pub skipped: u64,
    pub error_count: u64,
    pub batches_processed: u64,
    pub batches_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_error_rate: Option<Decimal>,
}

impl TransformSummary {
    pub fn error_rate(&self) -> Decimal {
        if self.processed == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(self.error_count) / Decimal::from(self.processed)).round_dp(4)
        }
    }
}

/// What a transform call hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct TransformResult {
    pub transform_id: Uuid,
    pub upload_id: Uuid,
    pub restaurant_id: Uuid,
    pub status: CsvTransformStatus,
    pub dry_run: bool,
    pub error_rate: Decimal,
    pub summary: TransformSummary,
    pub errors: Vec<ItemError>,
}

#[derive(Default)]
struct Pass {
    summary: TransformSummary,
    errors: Vec<ItemError>,
    cancelled: bool,
}

/// A run stopped by an error, with whatever the pass had reached. Batches before the
/// failure are already committed.
struct Aborted {
    error: ServiceError,
    pass: Pass,
}

impl From<ServiceError> for Aborted {
    fn from(error: ServiceError) -> Self {
        Self {
            error,
            pass: Pass::default(),
        }
    }
}

/// Transform phase: replays validated batches into Tier-2 through the shared reconciler.
pub struct CsvTransformService {
    csv: Arc<dyn CsvRepository>,
    items: Arc<dyn ItemRepository>,
    sales: Arc<dyn SalesRepository>,
    event_sender: Option<EventSender>,
}

impl CsvTransformService {
    pub fn new(
        csv: Arc<dyn CsvRepository>,
        items: Arc<dyn ItemRepository>,
        sales: Arc<dyn SalesRepository>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            csv,
            items,
            sales,
            event_sender,
        }
    }

    /// Runs one transform of a validated upload and records it as a new run.
    ///
    /// A missing upload is an error with no side effects. Every other outcome, including
    /// rejection and cancellation, is persisted on the run record.
    #[instrument(skip(self, options, cancel), fields(transform_type = %options.transform_type, dry_run = options.dry_run))]
    pub async fn transform(
        &self,
        upload_id: Uuid,
        options: TransformOptions,
        cancel: CancellationToken,
    ) -> Result<TransformResult, ServiceError> {
        let started = Instant::now();
        let upload = self
            .csv
            .find_upload(upload_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Upload {} not found", upload_id)))?;

        let run = self
            .csv
            .insert_transform(TransformModel {
                id: Uuid::new_v4(),
                upload_id,
                restaurant_id: upload.restaurant_id,
                transform_type: options.transform_type,
                status: CsvTransformStatus::Processing,
                dry_run: options.dry_run,
                processed_count: 0,
                created_count: 0,
                updated_count: 0,
                skipped_count: 0,
                error_count: 0,
                error_rate: Decimal::ZERO,
                summary: None,
                errors: None,
                started_at: Utc::now(),
                completed_at: None,
            })
            .await?;

        let result = match self.execute(&upload, &options, &cancel).await {
            Ok(outcome) => outcome,
            Err(Aborted { error, mut pass }) if error.is_request_fatal() => {
                // Record the failure and the partial counts on the run before surfacing it.
                pass.errors.push(ItemError {
                    item_id: None,
                    row_number: None,
                    code: error.code().to_string(),
                    message: error.response_message(),
                });
                warn!(
                    upload_id = %upload_id,
                    processed = pass.summary.processed,
                    batches_processed = pass.summary.batches_processed,
                    error = %error,
                    "CSV transform aborted"
                );
                if let Err(finish_err) = self.finish(run, CsvTransformStatus::Failed, pass).await {
                    warn!(error = %finish_err, "Failed to record failed transform run");
                }
                return Err(error);
            }
            Err(Aborted { error, mut pass }) => {
                pass.errors.push(ItemError {
                    item_id: None,
                    row_number: None,
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
                (CsvTransformStatus::Failed, pass)
            }
        };

        let (status, pass) = result;
        let finished = self.finish(run, status, pass).await?;

        counter!("csv.transform.rows", finished.summary.processed, "dry_run" => options.dry_run.to_string());
        histogram!("csv.transform.duration", started.elapsed().as_secs_f64());
        info!(
            transform_id = %finished.transform_id,
            status = %finished.status,
            processed = finished.summary.processed,
            created = finished.summary.created,
            updated = finished.summary.updated,
            skipped = finished.summary.skipped,
            errors = finished.summary.error_count,
            "CSV transform finished"
        );

        if let Some(sender) = &self.event_sender {
            let event = Event::CsvTransformCompleted {
                upload_id,
                transform_id: finished.transform_id,
                status: finished.status.to_string(),
                dry_run: finished.dry_run,
            };
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish CSV transform event: {}", e);
            }
        }

        Ok(finished)
    }

    pub async fn list_runs(&self, upload_id: Uuid) -> Result<Vec<TransformModel>, ServiceError> {
        self.csv.transforms_for_upload(upload_id).await
    }

    async fn execute(
        &self,
        upload: &UploadModel,
        options: &TransformOptions,
        cancel: &CancellationToken,
    ) -> Result<(CsvTransformStatus, Pass), Aborted> {
        if upload.status != CsvUploadStatus::Validated {
            return Err(ServiceError::ValidationError(format!(
                "upload {} is {} and cannot be transformed",
                upload.id, upload.status
            ))
            .into());
        }
        if upload.upload_type != options.transform_type {
            return Err(ServiceError::ValidationError(format!(
                "upload {} holds {} rows, not {}",
                upload.id, upload.upload_type, options.transform_type
            ))
            .into());
        }

        let batches = self.csv.batches_for_upload(upload.id).await?;

        if let Some(limit) = options.max_error_rate {
            let limit = Decimal::from_f64(limit).unwrap_or(Decimal::ONE);
            let preflight = self.run_pass(upload, &batches, options, true, cancel).await?;
            if preflight.cancelled {
                return Ok((CsvTransformStatus::Cancelled, preflight));
            }
            let rate = preflight.summary.error_rate();
            if rate > limit {
                warn!(upload_id = %upload.id, %rate, %limit, "CSV transform rejected by error rate");
                return Ok((CsvTransformStatus::Failed, preflight));
            }
            if options.dry_run {
                return Ok((CsvTransformStatus::Completed, preflight));
            }

            let mut pass = self
                .run_pass(upload, &batches, options, false, cancel)
                .await
                .map_err(|mut aborted| {
                    aborted.pass.summary.preflight_error_rate = Some(rate);
                    aborted
                })?;
            pass.summary.preflight_error_rate = Some(rate);
            return Ok((pass_status(&pass), pass));
        }

        let pass = self
            .run_pass(upload, &batches, options, options.dry_run, cancel)
            .await?;
        Ok((pass_status(&pass), pass))
    }

    async fn run_pass(
        &self,
        upload: &UploadModel,
        batches: &[BatchModel],
        options: &TransformOptions,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<Pass, Aborted> {
        let mut reconciler = Reconciler::new(self.items.clone(), self.sales.clone(), dry_run);
        let mut pass = Pass {
            summary: TransformSummary {
                batches_total: batches.len() as u64,
                ..Default::default()
            },
            ..Default::default()
        };

        for batch in batches {
            if cancel.is_cancelled() {
                pass.cancelled = true;
                break;
            }
            if let Err(error) =
                apply_batch(&mut reconciler, &mut pass, upload.restaurant_id, batch, options).await
            {
                return Err(Aborted { error, pass });
            }
            pass.summary.batches_processed += 1;
        }
        Ok(pass)
    }

    async fn finish(
        &self,
        run: TransformModel,
        status: CsvTransformStatus,
        pass: Pass,
    ) -> Result<TransformResult, ServiceError> {
        let error_rate = pass.summary.error_rate();
        let stored = self
            .csv
            .finish_transform(TransformModel {
                status,
                processed_count: pass.summary.processed as i32,
                created_count: pass.summary.created as i32,
                updated_count: pass.summary.updated as i32,
                skipped_count: pass.summary.skipped as i32,
                error_count: pass.summary.error_count as i32,
                error_rate,
                summary: Some(serde_json::to_value(&pass.summary)?),
                errors: Some(serde_json::to_value(&pass.errors)?),
                completed_at: Some(Utc::now()),
                ..run
            })
            .await?;

        Ok(TransformResult {
            transform_id: stored.id,
            upload_id: stored.upload_id,
            restaurant_id: stored.restaurant_id,
            status: stored.status,
            dry_run: stored.dry_run,
            error_rate,
            summary: pass.summary,
            errors: pass.errors,
        })
    }
}

fn pass_status(pass: &Pass) -> CsvTransformStatus {
    if pass.cancelled {
        CsvTransformStatus::Cancelled
    } else {
        CsvTransformStatus::Completed
    }
}

async fn apply_batch(
    reconciler: &mut Reconciler,
    pass: &mut Pass,
    restaurant_id: Uuid,
    batch: &BatchModel,
    options: &TransformOptions,
) -> Result<(), ServiceError> {
    match options.transform_type {
        CsvUploadType::Inventory => {
            let rows: Vec<InventoryCsvRow> = serde_json::from_value(batch.rows.clone())?;
            for row in rows {
                let applied = apply_inventory_row(reconciler, restaurant_id, &row).await;
                record(pass, row.row_number, applied)?;
            }
        }
        CsvUploadType::Sales => {
            let rows: Vec<SalesCsvRow> = serde_json::from_value(batch.rows.clone())?;
            for row in rows {
                let applied = apply_sales_row(reconciler, restaurant_id, &row).await;
                record(pass, row.row_number, applied)?;
            }
        }
    }
    Ok(())
}

fn record(
    pass: &mut Pass,
    row_number: u64,
    applied: Result<UpsertOutcome, ServiceError>,
) -> Result<(), ServiceError> {
    pass.summary.processed += 1;
    match applied {
        Ok(UpsertOutcome::Created) => pass.summary.created += 1,
        Ok(UpsertOutcome::Updated) => pass.summary.updated += 1,
        Ok(UpsertOutcome::Unchanged) => pass.summary.skipped += 1,
        Err(err) if !err.is_request_fatal() => {
            pass.summary.skipped += 1;
            pass.summary.error_count += 1;
            pass.errors.push(ItemError::for_row(row_number, &err));
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

async fn apply_inventory_row(
    reconciler: &mut Reconciler,
    restaurant_id: Uuid,
    row: &InventoryCsvRow,
) -> Result<UpsertOutcome, ServiceError> {
    if row.unit_cost < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "unit_cost {} is negative",
            row.unit_cost
        )));
    }
    if matches!(row.current_stock, Some(stock) if stock < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "current_stock is negative".into(),
        ));
    }

    let item = reconciler
        .apply_item(&UnifiedItem {
            restaurant_id,
            provider: PosProvider::Csv,
            external_id: row.sku.clone(),
            name: row.name.clone(),
            unit: row.unit.clone(),
            category: row.category.clone(),
            unit_cost: Some(row.unit_cost),
            is_active: true,
            attributes: AdditionalAttributes::new(),
        })
        .await?;

    match row.current_stock {
        Some(quantity) => {
            let stock = reconciler
                .apply_stock_level(&UnifiedStockLevel {
                    restaurant_id,
                    provider: PosProvider::Csv,
                    external_item_id: row.sku.clone(),
                    quantity,
                })
                .await?;
            Ok(item.merge(stock))
        }
        None => Ok(item),
    }
}

async fn apply_sales_row(
    reconciler: &mut Reconciler,
    restaurant_id: Uuid,
    row: &SalesCsvRow,
) -> Result<UpsertOutcome, ServiceError> {
    if row.total_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "total_amount {} is negative",
            row.total_amount
        )));
    }

    reconciler
        .apply_sale(&UnifiedSale {
            restaurant_id,
            provider: PosProvider::Csv,
            order_id: row.order_id.clone(),
            line_item_id: row.line_id.clone(),
            external_item_id: row.sku.clone(),
            item_name: row.item_name.clone(),
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_amount: row.total_amount,
            transaction_date: row.transaction_date,
            attributes: AdditionalAttributes::new(),
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_rate_is_errors_over_processed() {
        let summary = TransformSummary {
            processed: 3,
            error_count: 1,
            ..Default::default()
        };
        assert_eq!(summary.error_rate(), dec!(0.3333));
        assert_eq!(TransformSummary::default().error_rate(), Decimal::ZERO);
    }

    #[test]
    fn rejected_rows_count_as_skipped_errors() {
        let mut pass = Pass::default();
        record(&mut pass, 1, Ok(UpsertOutcome::Created)).unwrap();
        record(&mut pass, 2, Ok(UpsertOutcome::Unchanged)).unwrap();
        record(
            &mut pass,
            3,
            Err(ServiceError::ValidationError("negative".into())),
        )
        .unwrap();
        assert!(record(&mut pass, 4, Err(ServiceError::InternalError("boom".into()))).is_err());

        assert_eq!(pass.summary.processed, 4);
        assert_eq!(pass.summary.created, 1);
        assert_eq!(pass.summary.skipped, 2);
        assert_eq!(pass.summary.error_count, 1);
        assert_eq!(pass.errors[0].row_number, Some(3));
        assert_eq!(pass_status(&pass), CsvTransformStatus::Completed);
    }
}
