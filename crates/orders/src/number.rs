//! Order number formatting.
//!
//! Format: `ORD-YYYYMMDD-NNNN`. The counter is per date prefix and resets
//! daily; assignment is done by the sequence counter in the infrastructure
//! layer, exactly once at first persist.

use chrono::NaiveDate;

/// Date-based prefix, e.g. `ORD-20260828`.
pub fn order_number_prefix(date: NaiveDate) -> String {
    format!("ORD-{}", date.format("%Y%m%d"))
}

/// Full order number for the given date and per-prefix counter.
pub fn format_order_number(date: NaiveDate, counter: u64) -> String {
    format!("{}-{:04}", order_number_prefix(date), counter)
}
