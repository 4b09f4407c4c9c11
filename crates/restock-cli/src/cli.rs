//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Restock - Have I bought this before, and should I buy more?
#[derive(Parser)]
#[command(name = "restock")]
#[command(about = "Household purchase history from receipt-backed ledger transactions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// History database path
    #[arg(long, default_value = "restock.db", global = true)]
    pub db: PathBuf,

    /// Config file (defaults to ~/.config/restock/config.toml, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption
    ///
    /// By default, the history database is encrypted using SQLCipher.
    /// Set RESTOCK_DB_KEY environment variable with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the history database
    Init,

    /// Show the purchases matching a product, with receipts and history summary
    Search {
        /// Product to look for in transaction notes
        query: String,

        /// Include purchases without a receipt
        #[arg(long)]
        all: bool,

        /// Maximum purchases to show (defaults to search.max_results)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Hide a purchase group by id (repeatable)
        #[arg(long = "discard", value_name = "GROUP")]
        discard: Vec<String>,

        /// Print the display plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Browse purchases interactively: discard, save, redraw
    Browse {
        /// Product to look for in transaction notes
        query: String,

        /// Include purchases without a receipt
        #[arg(long)]
        all: bool,

        /// Maximum purchases to show (defaults to search.max_results)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Save the price paid for a product in one ledger transaction
    Save {
        /// Product name (stored normalized)
        product: String,

        /// Ledger transaction id
        transaction_id: String,

        /// Unit price (accepts 1.234,5 or 1234.5)
        #[arg(long)]
        price: String,

        /// Quantity bought
        #[arg(long, default_value = "1")]
        quantity: String,

        /// Unit of measure (kg, lt, un, ...)
        #[arg(long, default_value = "")]
        unit: String,

        /// Replace an existing record for this product and transaction
        #[arg(long)]
        overwrite: bool,
    },

    /// Price statistics and monthly consumption for a product
    Summary {
        /// Product name
        product: String,

        /// Unit of measure (defaults to the most frequent one)
        #[arg(long)]
        unit: Option<String>,

        /// Count the most recent purchase in the consumption estimate
        #[arg(long)]
        include_latest: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the purchase history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show database, config and ledger status
    Status,
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List saved purchases
    List {
        /// Only this product
        #[arg(short, long)]
        product: Option<String>,
    },

    /// Export the history to CSV
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Import history rows from CSV
    Import {
        /// CSV file with product, transaction_id, date, unit_price, quantity, unit, ...
        file: PathBuf,

        /// Replace existing records with the same product and transaction
        #[arg(long)]
        overwrite: bool,
    },
}
