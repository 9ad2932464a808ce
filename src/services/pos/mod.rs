//! Tier-1 → Tier-2 transformation, one transformer per POS provider.
//!
//! Transformers are pure: they turn a raw provider row into a [`UnifiedRecord`] (or
//! `None` for rows that carry no Tier-2 meaning, such as voided lines). All writes go
//! through the shared [`Reconciler`], so adding a provider never touches the write path.

pub mod money;
pub mod square;
pub mod toast;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::pos::{
    square_inventory_count, square_menu_item, square_order_item, toast_menu_item,
    toast_order_item,
};
use crate::errors::{ItemError, ServiceError};
use crate::events::{Event, EventSender};
use crate::repositories::{ItemRepository, PosRawRepository, SalesRepository};
use crate::services::reconciliation::{
    Reconciler, UnifiedItem, UnifiedSale, UnifiedStockLevel, UpsertOutcome,
};

pub use square::SquareTransformer;
pub use toast::ToastTransformer;

/// Provider tag stored in `source_pos_provider`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PosProvider {
    Square,
    Toast,
    Csv,
}

/// A Tier-1 row handed to a transformer.
#[derive(Debug, Clone)]
pub enum RawPosRecord {
    SquareMenuItem(square_menu_item::Model),
    /// In-stock counts of one catalog object across all locations
    SquareStock {
        restaurant_id: Uuid,
        catalog_object_id: String,
        counts: Vec<square_inventory_count::Model>,
    },
    SquareOrderItem(square_order_item::Model),
    ToastMenuItem(toast_menu_item::Model),
    ToastOrderItem(toast_order_item::Model),
}

impl RawPosRecord {
    /// Provider-side identifier, used to label row errors.
    pub fn source_id(&self) -> String {
        match self {
            RawPosRecord::SquareMenuItem(row) => row.square_variation_id.clone(),
            RawPosRecord::SquareStock {
                catalog_object_id, ..
            } => catalog_object_id.clone(),
            RawPosRecord::SquareOrderItem(row) => {
                square::line_key(&row.square_order_id, &row.square_line_item_uid)
            }
            RawPosRecord::ToastMenuItem(row) => row.toast_item_guid.clone(),
            RawPosRecord::ToastOrderItem(row) => row.toast_selection_guid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnifiedRecord {
    Item(UnifiedItem),
    Sale(UnifiedSale),
    StockLevel(UnifiedStockLevel),
}

#[async_trait]
pub trait PosTransformer: Send + Sync {
    fn provider(&self) -> PosProvider;

    /// Raw rows of the restaurant, menu items first, then stock, then order lines.
    async fn fetch_raw(
        &self,
        raw: &dyn PosRawRepository,
        restaurant_id: Uuid,
    ) -> Result<Vec<RawPosRecord>, ServiceError>;

    /// `Ok(None)` for rows that are deliberately not carried into Tier-2.
    fn transform(&self, record: &RawPosRecord) -> Result<Option<UnifiedRecord>, ServiceError>;
}

pub(crate) fn wrong_record(provider: PosProvider, record: &RawPosRecord) -> ServiceError {
    ServiceError::InvalidOperation(format!(
        "{} transformer cannot handle record {}",
        provider,
        record.source_id()
    ))
}

/// Transformers selected by provider tag.
#[derive(Clone)]
pub struct TransformerRegistry {
    transformers: HashMap<PosProvider, Arc<dyn PosTransformer>>,
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SquareTransformer));
        registry.register(Arc::new(ToastTransformer));
        registry
    }
}

impl TransformerRegistry {
    pub fn empty() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    pub fn register(&mut self, transformer: Arc<dyn PosTransformer>) {
        self.transformers.insert(transformer.provider(), transformer);
    }

    pub fn get(&self, provider: PosProvider) -> Result<Arc<dyn PosTransformer>, ServiceError> {
        self.transformers.get(&provider).cloned().ok_or_else(|| {
            ServiceError::InvalidOperation(format!("no POS transformer registered for {}", provider))
        })
    }

    pub fn providers(&self) -> Vec<PosProvider> {
        let mut providers: Vec<_> = self.transformers.keys().copied().collect();
        providers.sort_by_key(|p| p.to_string());
        providers
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PosTransformOutcome {
    pub restaurant_id: Uuid,
    pub provider: PosProvider,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

impl PosTransformOutcome {
    fn new(restaurant_id: Uuid, provider: PosProvider) -> Self {
        Self {
            restaurant_id,
            provider,
            processed: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

pub struct PosTransformService {
    items: Arc<dyn ItemRepository>,
    sales: Arc<dyn SalesRepository>,
    raw: Arc<dyn PosRawRepository>,
    registry: TransformerRegistry,
    event_sender: Option<EventSender>,
}

impl PosTransformService {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        sales: Arc<dyn SalesRepository>,
        raw: Arc<dyn PosRawRepository>,
        registry: TransformerRegistry,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            items,
            sales,
            raw,
            registry,
            event_sender,
        }
    }

    /// Re-derives the restaurant's Tier-2 rows from its Tier-1 data for one provider.
    /// Running it twice over unchanged raw data creates and updates nothing.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn transform_restaurant(
        &self,
        restaurant_id: Uuid,
        provider: PosProvider,
    ) -> Result<PosTransformOutcome, ServiceError> {
        let transformer = self.registry.get(provider)?;
        let records = transformer
            .fetch_raw(self.raw.as_ref(), restaurant_id)
            .await?;

        let mut reconciler = Reconciler::new(self.items.clone(), self.sales.clone(), false);
        let mut outcome = PosTransformOutcome::new(restaurant_id, provider);

        for (index, record) in records.iter().enumerate() {
            outcome.processed += 1;
            let applied = match transformer.transform(record) {
                Ok(None) => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(Some(UnifiedRecord::Item(item))) => reconciler.apply_item(&item).await,
                Ok(Some(UnifiedRecord::Sale(sale))) => reconciler.apply_sale(&sale).await,
                Ok(Some(UnifiedRecord::StockLevel(level))) => {
                    reconciler.apply_stock_level(&level).await
                }
                Err(err) => Err(err),
            };

            match applied {
                Ok(result) => outcome.count(result),
                Err(err) if !err.is_request_fatal() => {
                    warn!(source_id = %record.source_id(), error = %err, "POS record rejected");
                    outcome.errors.push(ItemError {
                        item_id: None,
                        row_number: Some(index as u64 + 1),
                        code: err.code().to_string(),
                        message: format!("{}: {}", record.source_id(), err),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        counter!("pos.transform.records", outcome.processed as u64, "provider" => provider.to_string());
        info!(
            restaurant_id = %restaurant_id,
            processed = outcome.processed,
            created = outcome.created,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            skipped = outcome.skipped,
            errors = outcome.errors.len(),
            "POS transform finished"
        );

        if let Some(sender) = &self.event_sender {
            let event = Event::PosTransformCompleted {
                restaurant_id,
                provider: provider.to_string(),
                processed: outcome.processed,
                errors: outcome.errors.len(),
            };
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish POS transform event: {}", e);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_square_and_toast() {
        let registry = TransformerRegistry::default();
        assert_eq!(
            registry.providers(),
            vec![PosProvider::Square, PosProvider::Toast]
        );
        assert!(registry.get(PosProvider::Csv).is_err());
    }

    #[test]
    fn provider_tags_are_snake_case() {
        assert_eq!(PosProvider::Square.to_string(), "square");
        assert_eq!("toast".parse::<PosProvider>().ok(), Some(PosProvider::Toast));
        assert_eq!(PosProvider::Csv.to_string(), "csv");
    }
}
