//! Two-phase CSV ingestion: validate a file into typed batches, then transform the
//! batches into Tier-2 rows (optionally as a dry run).

pub mod rows;
pub mod transform;
pub mod upload;

pub use rows::{InventoryCsvRow, SalesCsvRow};
pub use transform::{CsvTransformService, TransformOptions, TransformResult, TransformSummary};
pub use upload::{CsvUploadService, UploadValidation};
