use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type shared by every repository and service in the crate.
///
/// Request-level failures (bad method, missing upload, invalid transition) are returned
/// as `Err(ServiceError)`. Item- and row-level failures are converted into [`ItemError`]
/// and collected in the outcome payloads instead of aborting the whole operation.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing {snapshot_type} snapshot for item {item_id}")]
    MissingSnapshot { item_id: Uuid, snapshot_type: String },

    #[error("Unknown calculation method: {0}")]
    UnknownCalculationMethod(String),

    #[error("Unsupported calculation method: {0}")]
    UnsupportedMethod(String),

    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("CSV error: {0}")]
    CsvError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for ServiceError {
    fn from(err: csv::Error) -> Self {
        ServiceError::CsvError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Stable machine-readable code, used in collected item errors and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::MissingSnapshot { .. } => "missing_snapshot",
            Self::UnknownCalculationMethod(_) => "unknown_calculation_method",
            Self::UnsupportedMethod(_) => "unsupported_method",
            Self::ReconciliationConflict(_) => "reconciliation_conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::SerializationError(_) => "serialization_error",
            Self::CsvError(_) => "csv_error",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Whether this error must abort the surrounding request rather than being
    /// collected against a single item or row.
    pub fn is_request_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ValidationError(_)
                | Self::MissingSnapshot { .. }
                | Self::ReconciliationConflict(_)
                | Self::NotFound(_)
        )
    }

    /// Message suitable for callers. Storage failures are not echoed verbatim.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// A per-item or per-row failure collected alongside partial success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_number: Option<u64>,
    pub code: String,
    pub message: String,
}

impl ItemError {
    pub fn for_item(item_id: Uuid, error: &ServiceError) -> Self {
        Self {
            item_id: Some(item_id),
            row_number: None,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    pub fn for_row(row_number: u64, error: &ServiceError) -> Self {
        Self {
            item_id: None,
            row_number: Some(row_number),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    pub fn validation(row_number: u64, message: impl Into<String>) -> Self {
        Self {
            item_id: None,
            row_number: Some(row_number),
            code: "validation_error".to_string(),
            message: message.into(),
        }
    }
}
