//! Usage variance: calculation, classification, investigation and reporting.

pub mod classification;
pub mod engine;
pub mod investigation;
pub mod reporting;
pub mod theoretical;

pub use classification::{VarianceThresholds, VarianceTolerance};
pub use engine::{CalculationRequest, UsageCalculationEngine, UsageCalculationOutcome};
pub use investigation::{InvestigateRequest, InvestigationService, Resolution, ResolveRequest};
pub use reporting::{TrendQuery, VarianceFilter, VarianceReportingService};
