//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_db, config, ledger index) and init
//! - `search` - One-shot search and the interactive browse session
//! - `history` - Save, summary and history list/export/import
//! - `status` - Database, config and ledger status

pub mod core;
pub mod history;
pub mod search;
pub mod status;

// Re-export command functions for main.rs
pub use core::*;
pub use history::*;
pub use search::*;
pub use status::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format an amount as whole currency units with dot thousands: `$1.234`
pub fn format_money(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    if rounded < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// Format a quantity with two decimals
pub fn format_quantity(quantity: f64) -> String {
    format!("{:.2}", quantity)
}
