//! Tier-1 raw point-of-sale tables, one family per provider.
//!
//! Rows keep the full provider payload in `raw_data` plus the denormalized fields the
//! Tier-2 transformers read. Sync writes these tables; transformation only reads them.

pub mod square_inventory_count;
pub mod square_menu_item;
pub mod square_order_item;
pub mod toast_menu_item;
pub mod toast_order_item;
