use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::inventory_transaction::{Model as TransactionModel, TransactionType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{ItemRepository, LedgerRepository};
use crate::services::variance::classification::{requires_approval, VarianceTolerance};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordTransactionRequest {
    pub inventory_item_id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed; receipts positive, consumption negative
    pub quantity: Decimal,
    /// Defaults to the item's unit cost
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    /// Defaults to now
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub reference: Option<String>,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

pub struct LedgerService {
    ledger: Arc<dyn LedgerRepository>,
    items: Arc<dyn ItemRepository>,
    event_sender: Option<EventSender>,
}

impl LedgerService {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        items: Arc<dyn ItemRepository>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            ledger,
            items,
            event_sender,
        }
    }

    /// Appends a ledger entry, flagging large waste and adjustments for approval.
    #[instrument(skip(self, request), fields(item_id = %request.inventory_item_id, kind = %request.transaction_type))]
    pub async fn record_transaction(
        &self,
        request: RecordTransactionRequest,
    ) -> Result<TransactionModel, ServiceError> {
        request.validate()?;
        if request.quantity.is_zero() {
            return Err(ServiceError::ValidationError(
                "transaction quantity cannot be zero".into(),
            ));
        }
        if matches!(request.unit_cost, Some(cost) if cost < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(
                "unit cost cannot be negative".into(),
            ));
        }

        let item = self
            .items
            .find_by_id(request.inventory_item_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Inventory item {} not found",
                    request.inventory_item_id
                ))
            })?;

        let unit_cost = request.unit_cost.unwrap_or(item.unit_cost);
        let flagged = requires_approval(
            request.transaction_type,
            request.quantity,
            unit_cost,
            &VarianceTolerance::from(&item),
        );

        let now = Utc::now();
        let entry = self
            .ledger
            .append(TransactionModel {
                id: Uuid::new_v4(),
                restaurant_id: item.restaurant_id,
                inventory_item_id: item.id,
                transaction_type: request.transaction_type,
                quantity: request.quantity,
                unit_cost,
                transaction_date: request.transaction_date.unwrap_or(now),
                reference: request.reference,
                reason: request.reason,
                requires_approval: flagged,
                approved_by: None,
                approved_at: None,
                created_by: request.created_by,
                created_at: now,
            })
            .await?;

        if flagged {
            warn!(transaction_id = %entry.id, "Transaction exceeds variance tolerance, approval required");
        } else {
            info!(transaction_id = %entry.id, "Transaction recorded");
        }
        if let Some(sender) = &self.event_sender {
            let event = Event::TransactionRecorded {
                transaction_id: entry.id,
                item_id: item.id,
                requires_approval: flagged,
            };
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish ledger event: {}", e);
            }
        }
        Ok(entry)
    }

    /// Only flagged, unapproved entries accept approval metadata.
    #[instrument(skip(self))]
    pub async fn approve_transaction(
        &self,
        transaction_id: Uuid,
        approved_by: Uuid,
    ) -> Result<TransactionModel, ServiceError> {
        let entry = self
            .ledger
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
            })?;
        if !entry.requires_approval {
            return Err(ServiceError::InvalidOperation(format!(
                "transaction {} does not require approval",
                transaction_id
            )));
        }

        let moved = self
            .ledger
            .mark_approved(transaction_id, approved_by, Utc::now())
            .await?;
        if moved == 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "transaction {} is already approved",
                transaction_id
            )));
        }

        info!(transaction_id = %transaction_id, approved_by = %approved_by, "Transaction approved");
        self.ledger
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", transaction_id)))
    }

    pub async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<TransactionModel>, ServiceError> {
        self.ledger.list_for_item(item_id).await
    }
}
