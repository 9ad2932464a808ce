//! Inventory usage variance and multi-source reconciliation engine
//!
//! Unifies point-of-sale and CSV data into a provider-agnostic inventory schema,
//! computes theoretical-vs-actual usage variance per period and drives the
//! investigation workflow over the results.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod repositories;
pub mod services;

use chrono::Utc;
use serde::Serialize;

use crate::errors::{ItemError, ServiceError};

/// Payloads that carry per-item or per-row failures next to their partial success.
pub trait CollectedErrors {
    fn collected_errors(&self) -> Vec<ItemError>;
}

impl CollectedErrors for services::variance::UsageCalculationOutcome {
    fn collected_errors(&self) -> Vec<ItemError> {
        self.errors.clone()
    }
}

impl CollectedErrors for services::pos::PosTransformOutcome {
    fn collected_errors(&self) -> Vec<ItemError> {
        self.errors.clone()
    }
}

impl CollectedErrors for services::csv::TransformResult {
    fn collected_errors(&self) -> Vec<ItemError> {
        self.errors.clone()
    }
}

impl CollectedErrors for services::csv::UploadValidation {
    fn collected_errors(&self) -> Vec<ItemError> {
        self.errors.clone()
    }
}

// Common result envelope
#[derive(Debug, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub errors: Vec<ItemError>,
    pub meta: ResultMeta,
}

#[derive(Debug, Serialize)]
pub struct ResultMeta {
    pub timestamp: String,
}

impl ResultMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> OperationResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: Vec::new(),
            meta: ResultMeta::capture(),
        }
    }

    /// Success that still carries collected item errors ("completed with errors").
    pub fn partial(data: T, errors: Vec<ItemError>) -> Self {
        Self {
            errors,
            ..Self::success(data)
        }
    }

    pub fn failure(error: &ServiceError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.response_message()),
            errors: vec![ItemError {
                item_id: None,
                row_number: None,
                code: error.code().to_string(),
                message: error.response_message(),
            }],
            meta: ResultMeta::capture(),
        }
    }

    pub fn from_result(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(&err),
        }
    }
}

impl<T: CollectedErrors> OperationResult<T> {
    /// Like [`OperationResult::from_result`] but lifts the payload's collected errors.
    pub fn collect(result: Result<T, ServiceError>) -> Self {
        match result {
            Ok(data) => {
                let errors = data.collected_errors();
                Self::partial(data, errors)
            }
            Err(err) => Self::failure(&err),
        }
    }
}
