//! Status command implementation

use std::path::Path;

use anyhow::Result;
use restock_core::config::default_config_path;
use restock_core::db::DB_KEY_ENV;
use restock_core::ledger::resolve_snapshot_path;
use restock_core::Config;

use super::{open_db, open_index};

/// Describe where the configuration came from
pub fn config_source(explicit: Option<&Path>) -> String {
    match explicit {
        Some(path) => format!("{} (--config)", path.display()),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => path.display().to_string(),
            None => "built-in defaults".to_string(),
        },
    }
}

pub fn cmd_status(
    db_path: &Path,
    no_encrypt: bool,
    config: &Config,
    config_path: Option<&Path>,
) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Restock Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let (Ok(records), Ok(products)) =
                    (db.count_history(), db.list_history_products())
                {
                    println!("   History records: {}", records);
                    println!("   Products: {}", products.len());
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    println!("   Config: {}", config_source(config_path));
    println!(
        "   Search: {} result(s), receipts only: {}, fuzzy threshold: {}",
        config.search.max_results, config.search.receipts_only, config.search.fuzzy_threshold
    );

    match &config.receipts.dir {
        Some(dir) if dir.is_dir() => println!("   Receipts: {}", dir.display()),
        Some(dir) => println!("   ⚠️  Receipts: {} (not found)", dir.display()),
        None => println!("   Receipts: (not configured)"),
    }

    match config.ledger.path.as_deref() {
        None => println!("   Ledger: (not configured)"),
        Some(path) => match resolve_snapshot_path(path) {
            Ok(snapshot) => {
                println!("   Ledger: {}", snapshot.display());
                match open_index(config) {
                    Ok(index) => {
                        println!(
                            "   Transactions: {} · receipts: {} · purchase groups: {}",
                            index.snapshot().transactions.len(),
                            index.snapshot().attachments.len(),
                            index.groups().group_count()
                        );
                    }
                    Err(e) => println!("   ❌ Error reading ledger: {:#}", e),
                }
            }
            Err(e) => println!("   ❌ Ledger: {}", e),
        },
    }

    println!();
    Ok(())
}
