use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Sender plus the receiving end to hand to [`process_events`].
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Domain events emitted after state changes are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PeriodStatusChanged {
        period_id: Uuid,
        old_status: String,
        new_status: String,
        at: DateTime<Utc>,
    },
    VarianceCalculated {
        period_id: Uuid,
        method: String,
        analyses: usize,
        errors: usize,
    },
    InvestigationStarted {
        analysis_id: Uuid,
        assigned_to: Uuid,
    },
    InvestigationResolved {
        analysis_id: Uuid,
        resolution: String,
        resolved_by: Uuid,
    },
    TransactionRecorded {
        transaction_id: Uuid,
        item_id: Uuid,
        requires_approval: bool,
    },
    PosTransformCompleted {
        restaurant_id: Uuid,
        provider: String,
        processed: usize,
        errors: usize,
    },
    CsvUploadValidated {
        upload_id: Uuid,
        status: String,
        total_rows: u64,
        invalid_rows: u64,
    },
    CsvTransformCompleted {
        upload_id: Uuid,
        transform_id: Uuid,
        status: String,
        dry_run: bool,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PeriodStatusChanged { .. } => "period_status_changed",
            Event::VarianceCalculated { .. } => "variance_calculated",
            Event::InvestigationStarted { .. } => "investigation_started",
            Event::InvestigationResolved { .. } => "investigation_resolved",
            Event::TransactionRecorded { .. } => "transaction_recorded",
            Event::PosTransformCompleted { .. } => "pos_transform_completed",
            Event::CsvUploadValidated { .. } => "csv_upload_validated",
            Event::CsvTransformCompleted { .. } => "csv_transform_completed",
        }
    }
}

// Drains the channel and logs every event. Runs until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::InvestigationResolved {
                analysis_id,
                resolution,
                ..
            } if resolution == "escalated" => {
                warn!(analysis_id = %analysis_id, "Variance investigation escalated");
            }
            Event::VarianceCalculated {
                period_id, errors, ..
            } if *errors > 0 => {
                warn!(period_id = %period_id, errors, "Variance calculation finished with item errors");
            }
            Event::TransactionRecorded {
                transaction_id,
                requires_approval: true,
                ..
            } => {
                info!(transaction_id = %transaction_id, "Transaction awaiting approval");
            }
            _ => {}
        }
        info!(event = event.name(), payload = ?event, "Event received");
    }

    warn!("Event processing loop has ended");
}
