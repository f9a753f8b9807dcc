//! Invoice number formatting.
//!
//! Format: `INV-YYYY-NNNN`. The counter is per year prefix; assignment is
//! done by the sequence counter in the infrastructure layer.

/// Year-based prefix, e.g. `INV-2026`.
pub fn invoice_number_prefix(year: i32) -> String {
    format!("INV-{year}")
}

/// Full invoice number for the given year and per-prefix counter.
pub fn format_invoice_number(year: i32, counter: u64) -> String {
    format!("{}-{:04}", invoice_number_prefix(year), counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padded_counter() {
        assert_eq!(format_invoice_number(2026, 1), "INV-2026-0001");
        assert_eq!(format_invoice_number(2026, 999), "INV-2026-0999");
    }
}
