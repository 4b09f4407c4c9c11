//! History command implementations (save, summary, list, export, import)

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use restock_core::session::product_summary;
use restock_core::{
    export_history_csv, import_history_csv, normalize, Database, HistoryStore, PurchaseIndex,
    SaveOutcome, Summary, UpsertCoordinator,
};

use super::{format_money, format_quantity, truncate};

/// Status line shown after a save attempt
pub fn save_message(outcome: &SaveOutcome, product: &str, transaction_id: &str) -> String {
    match outcome {
        SaveOutcome::Created { handle } => format!(
            "✅ Saved '{}' for transaction {} ({})",
            product, transaction_id, handle
        ),
        SaveOutcome::Updated { handle } => format!(
            "✏️  Updated '{}' for transaction {} ({})",
            product, transaction_id, handle
        ),
        SaveOutcome::RejectedDuplicate { handle } => format!(
            "⚠️  '{}' is already saved for transaction {} ({}). Overwrite to modify it.",
            product, transaction_id, handle
        ),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_save(
    db: &Database,
    index: &PurchaseIndex,
    product: &str,
    transaction_id: &str,
    price: f64,
    quantity: f64,
    unit: &str,
    overwrite: bool,
) -> Result<()> {
    let entry = index.entry_for(transaction_id, price, quantity, unit)?;
    let outcome = UpsertCoordinator::new(db)
        .save(product, transaction_id, &entry, overwrite)
        .context("Failed to save purchase")?;

    println!(
        "{}",
        save_message(&outcome, &normalize(product), transaction_id.trim())
    );
    if let SaveOutcome::RejectedDuplicate { .. } = outcome {
        println!("   Pass --overwrite to replace it.");
    }
    Ok(())
}

pub fn cmd_summary(
    db: &Database,
    product: &str,
    unit: Option<&str>,
    exclude_latest: bool,
    json: bool,
) -> Result<()> {
    let history = db.read_all().context("Failed to read history")?;
    let summary = product_summary(&history, product, unit, exclude_latest);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match &summary {
        Some(summary) => print_summary(summary),
        None => println!(
            "No valid history for '{}'{}.",
            normalize(product),
            unit.map(|u| format!(" in {}", u)).unwrap_or_default()
        ),
    }
    Ok(())
}

/// Render summary statistics
pub fn print_summary(summary: &Summary) {
    println!();
    println!("📈 Summary ({})", summary.unit);
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Period: {} → {} ({} purchases)",
        summary.period_start, summary.period_end, summary.purchases
    );
    println!(
        "   Price: min {} · max {} · avg {}",
        format_money(summary.price_min),
        format_money(summary.price_max),
        format_money(summary.price_avg)
    );
    println!(
        "   Consumption: {} {} → {} {}/month{}",
        format_quantity(summary.consumed_units),
        summary.unit,
        format_quantity(summary.monthly_consumption),
        summary.unit,
        if summary.excludes_latest {
            " (latest purchase excluded)"
        } else {
            ""
        }
    );
}

pub fn cmd_history_list(db: &Database, product: Option<&str>) -> Result<()> {
    let rows = db.read_all().context("Failed to read history")?;
    let key = product.map(normalize);
    let rows: Vec<_> = rows
        .iter()
        .filter(|s| key.as_deref().map_or(true, |k| normalize(&s.record.product) == k))
        .collect();

    if rows.is_empty() {
        println!("No saved purchases.");
        return Ok(());
    }

    println!();
    println!(
        "   {:<6} {:<16} {:<10} {:<10} {:>10} {:>8} {:<5} {}",
        "ROW", "PRODUCT", "TX", "DATE", "PRICE", "QTY", "UNIT", "NOTE"
    );
    println!("   {}", "─".repeat(90));
    for stored in &rows {
        let r = &stored.record;
        println!(
            "   {:<6} {:<16} {:<10} {:<10} {:>10} {:>8} {:<5} {}",
            stored.handle.to_string(),
            truncate(&r.product, 16),
            truncate(&r.transaction_id, 10),
            r.purchase_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            r.unit_price.map(format_money).unwrap_or_else(|| "-".to_string()),
            r.quantity
                .map(format_quantity)
                .unwrap_or_else(|| "-".to_string()),
            r.unit,
            truncate(&r.note, 30)
        );
    }
    println!();
    println!("   {} record(s)", rows.len());
    Ok(())
}

pub fn cmd_history_export(db: &Database, output: &Path) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let rows = export_history_csv(db, BufWriter::new(file)).context("Failed to export history")?;
    println!("✅ Exported {} record(s) to {}", rows, output.display());
    Ok(())
}

pub fn cmd_history_import(db: &Database, file: &Path, overwrite: bool) -> Result<()> {
    let reader = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let stats = import_history_csv(db, BufReader::new(reader), overwrite)
        .context("Failed to import history")?;

    println!("📥 Imported {}", file.display());
    println!("   Created: {}", stats.created);
    println!("   Updated: {}", stats.updated);
    if stats.duplicates > 0 {
        println!(
            "   Already saved: {} (use --overwrite to replace)",
            stats.duplicates
        );
    }
    if stats.skipped > 0 {
        println!("   Skipped (missing key, price or quantity): {}", stats.skipped);
    }
    Ok(())
}
