//! Restock CLI - Household purchase history
//!
//! Usage:
//!   restock init                      Initialize the history database
//!   restock search leche              Show matching purchases and summary
//!   restock browse leche              Discard and save interactively
//!   restock save leche 1234 --price 990 --quantity 6 --unit lt
//!   restock summary leche             Price and consumption statistics

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Search {
            query,
            all,
            limit,
            discard,
            json,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let index = commands::open_index(&config)?;
            let options = commands::plan_options(&config, all, limit);
            commands::cmd_search(&db, &index, &config, &query, options, &discard, json)
        }
        Commands::Browse { query, all, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let index = commands::open_index(&config)?;
            let options = commands::plan_options(&config, all, limit);
            let stdin = std::io::stdin();
            commands::cmd_browse(&db, &index, &config, &query, options, stdin.lock())
        }
        Commands::Save {
            product,
            transaction_id,
            price,
            quantity,
            unit,
            overwrite,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let index = commands::open_index(&config)?;
            let (price, quantity) = commands::parse_price_quantity(&price, &quantity)?;
            commands::cmd_save(
                &db,
                &index,
                &product,
                &transaction_id,
                price,
                quantity,
                &unit,
                overwrite,
            )
        }
        Commands::Summary {
            product,
            unit,
            include_latest,
            json,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let exclude_latest = config.summary.exclude_latest && !include_latest;
            commands::cmd_summary(&db, &product, unit.as_deref(), exclude_latest, json)
        }
        Commands::History { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                HistoryAction::List { product } => {
                    commands::cmd_history_list(&db, product.as_deref())
                }
                HistoryAction::Export { output } => commands::cmd_history_export(&db, &output),
                HistoryAction::Import { file, overwrite } => {
                    commands::cmd_history_import(&db, &file, overwrite)
                }
            }
        }
        Commands::Status => {
            commands::cmd_status(&cli.db, cli.no_encrypt, &config, cli.config.as_deref())
        }
    }
}
