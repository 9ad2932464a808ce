// Period & snapshot aggregate
pub mod inventory_period;
pub mod period_inventory_snapshot;

// Tier-2 unified schema
pub mod inventory_item;
pub mod inventory_transaction;
pub mod recipe;
pub mod recipe_ingredient;
pub mod sales_transaction;

// Variance analysis
pub mod theoretical_usage_analysis;

// CSV pipeline
pub mod csv_transform;
pub mod csv_upload;
pub mod csv_upload_batch;

// Tier-1 raw POS data
pub mod pos;
