use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::csv_upload::{CsvUploadStatus, CsvUploadType, Model as UploadModel};
use crate::entities::csv_upload_batch::Model as BatchModel;
use crate::errors::{ItemError, ServiceError};
use crate::events::{Event, EventSender};
use crate::repositories::CsvRepository;

use super::rows::{HeaderMap, InventoryCsvRow, SalesCsvRow, INVENTORY_COLUMNS, SALES_COLUMNS};

#[derive(Debug, Clone, Serialize)]
pub struct UploadValidation {
    pub upload: UploadModel,
    pub errors: Vec<ItemError>,
}

/// Rows and errors of one batch-sized slice of the file.
#[derive(Default)]
struct PendingBatch {
    rows: Vec<Value>,
    errors: Vec<ItemError>,
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.errors.is_empty()
    }
}

/// Validate phase: parses a file into typed rows and persists them in batches.
/// Nothing here writes Tier-2.
pub struct CsvUploadService {
    csv: Arc<dyn CsvRepository>,
    batch_size: usize,
    event_sender: Option<EventSender>,
}

impl CsvUploadService {
    pub fn new(
        csv: Arc<dyn CsvRepository>,
        batch_size: usize,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            csv,
            batch_size: batch_size.max(1),
            event_sender,
        }
    }

    fn parse_row(
        upload_type: CsvUploadType,
        headers: &HeaderMap,
        record: &StringRecord,
        row_number: u64,
    ) -> Result<Value, ServiceError> {
        let value = match upload_type {
            CsvUploadType::Inventory => {
                serde_json::to_value(InventoryCsvRow::parse(headers, record, row_number)?)?
            }
            CsvUploadType::Sales => {
                serde_json::to_value(SalesCsvRow::parse(headers, record, row_number)?)?
            }
        };
        Ok(value)
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn validate_upload(
        &self,
        restaurant_id: Uuid,
        filename: &str,
        upload_type: CsvUploadType,
        data: &[u8],
    ) -> Result<UploadValidation, ServiceError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(data);

        let header_record = reader.headers()?.clone();
        let headers = HeaderMap::new(&header_record);
        let required = match upload_type {
            CsvUploadType::Inventory => INVENTORY_COLUMNS,
            CsvUploadType::Sales => SALES_COLUMNS,
        };
        let missing = headers.missing(required);

        let mut errors = Vec::new();
        let mut batches: Vec<PendingBatch> = Vec::new();
        let mut rows_total = 0u64;
        let mut rows_valid = 0u64;

        if missing.is_empty() {
            let mut current = PendingBatch::default();
            for (index, result) in reader.records().enumerate() {
                let row_number = index as u64 + 1;
                rows_total += 1;

                let parsed = result
                    .map_err(ServiceError::from)
                    .and_then(|record| Self::parse_row(upload_type, &headers, &record, row_number));
                match parsed {
                    Ok(row) => {
                        rows_valid += 1;
                        current.rows.push(row);
                    }
                    Err(err) => {
                        let error = ItemError::for_row(row_number, &err);
                        current.errors.push(error.clone());
                        errors.push(error);
                    }
                }

                if row_number % self.batch_size as u64 == 0 {
                    batches.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                batches.push(current);
            }
        } else {
            errors.push(ItemError {
                item_id: None,
                row_number: None,
                code: "validation_error".into(),
                message: format!("missing required columns: {}", missing.join(", ")),
            });
        }

        let status = if rows_valid > 0 {
            CsvUploadStatus::Validated
        } else {
            CsvUploadStatus::Failed
        };
        if status == CsvUploadStatus::Failed {
            batches.clear();
        }

        let now = Utc::now();
        let upload = self
            .csv
            .insert_upload(UploadModel {
                id: Uuid::new_v4(),
                restaurant_id,
                filename: filename.to_string(),
                upload_type,
                status,
                rows_total: rows_total as i32,
                rows_valid: rows_valid as i32,
                rows_invalid: (rows_total - rows_valid) as i32,
                batch_count: batches.len() as i32,
                validation_errors: if errors.is_empty() {
                    None
                } else {
                    Some(serde_json::to_value(&errors)?)
                },
                validated_at: Some(now),
                created_at: now,
            })
            .await?;

        for (index, batch) in batches.into_iter().enumerate() {
            self.csv
                .insert_batch(BatchModel {
                    id: Uuid::new_v4(),
                    upload_id: upload.id,
                    batch_number: index as i32 + 1,
                    row_count: batch.rows.len() as i32,
                    rows: Value::Array(batch.rows),
                    errors: serde_json::to_value(&batch.errors)?,
                    created_at: now,
                })
                .await?;
        }

        if status == CsvUploadStatus::Failed {
            warn!(upload_id = %upload.id, errors = errors.len(), "CSV upload has no valid rows");
        } else {
            info!(
                upload_id = %upload.id,
                rows_valid,
                rows_invalid = rows_total - rows_valid,
                batches = upload.batch_count,
                "CSV upload validated"
            );
        }

        if let Some(sender) = &self.event_sender {
            let event = Event::CsvUploadValidated {
                upload_id: upload.id,
                status: status.to_string(),
                total_rows: rows_total,
                invalid_rows: rows_total - rows_valid,
            };
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish CSV upload event: {}", e);
            }
        }

        Ok(UploadValidation { upload, errors })
    }
}
