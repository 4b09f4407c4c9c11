//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the history database
//! - `load_config` / `open_index` / `open_receipt_store` - Config and ledger loading
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{bail, Context, Result};
use restock_core::history::parse_number;
use restock_core::ledger::{resolve_snapshot_path, LedgerSnapshot};
use restock_core::{Config, Database, LocalReceiptStore, MatchEngine, PlanOptions, PurchaseIndex};
use tracing::debug;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load configuration from --config, the user config dir, or built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

/// Read the configured ledger snapshot and build its purchase index
pub fn open_index(config: &Config) -> Result<PurchaseIndex> {
    let configured = config.ledger_path()?;
    let path = resolve_snapshot_path(configured)
        .with_context(|| format!("Failed to locate ledger snapshot in {}", configured.display()))?;
    debug!(path = %path.display(), "Using ledger snapshot");
    let snapshot = LedgerSnapshot::open(&path)
        .with_context(|| format!("Failed to read ledger snapshot {}", path.display()))?;
    Ok(PurchaseIndex::new(
        snapshot,
        MatchEngine::new(config.search.fuzzy_threshold),
    ))
}

/// Receipt store for the configured picture directory, if any
pub fn open_receipt_store(config: &Config) -> Option<LocalReceiptStore> {
    config.receipts.dir.as_ref().map(LocalReceiptStore::new)
}

/// Projection options from config, overridden by command-line flags
pub fn plan_options(config: &Config, all: bool, limit: Option<usize>) -> PlanOptions {
    PlanOptions {
        receipts_only: config.search.receipts_only && !all,
        max_count: limit
            .unwrap_or(config.search.max_results)
            .clamp(1, restock_core::config::MAX_RESULTS_LIMIT),
        exclude_latest: config.summary.exclude_latest,
    }
}

/// Parse price and quantity as typed by the user; both must be positive
pub fn parse_price_quantity(price: &str, quantity: &str) -> Result<(f64, f64)> {
    let Some(price) = parse_number(price) else {
        bail!("Invalid price: '{}'", price);
    };
    let Some(quantity) = parse_number(quantity) else {
        bail!("Invalid quantity: '{}'", quantity);
    };
    if price <= 0.0 || quantity <= 0.0 {
        bail!("Price and quantity must be greater than zero");
    }
    Ok((price, quantity))
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let records = db.count_history().context("Failed to read history")?;
    println!("   History records: {}", records);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Point [ledger] path at your snapshot (or set RESTOCK_LEDGER)");
    println!("  2. Look up a product: restock search leche");

    Ok(())
}
