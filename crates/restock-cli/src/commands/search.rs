//! Search and browse command implementations
//!
//! Both render a `DisplayPlan`. `browse` keeps a session open on stdin so
//! discards backfill the list and saves refresh the form defaults and summary.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use restock_core::{
    fetch_receipt, BrowseSession, Config, Database, DiscardSet, DisplayPlan, HistoryStore,
    MatchKind, PlanOptions, PlanState, PurchaseIndex, ReceiptContent, ReceiptStore,
};

use super::{
    format_money, format_quantity, open_receipt_store, parse_price_quantity, print_summary,
    save_message, truncate,
};

pub fn cmd_search(
    db: &Database,
    index: &PurchaseIndex,
    config: &Config,
    query: &str,
    options: PlanOptions,
    discard: &[String],
    json: bool,
) -> Result<()> {
    let discarded: DiscardSet = discard.iter().cloned().collect();
    let history = db.read_all().context("Failed to read history")?;
    let plan = index.plan(query, options, &discarded, &history);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let store = open_receipt_store(config);
    print_plan(&plan, store.as_ref().map(|s| s as &dyn ReceiptStore));
    Ok(())
}

/// A line typed during a browse session
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseCommand {
    Discard(usize),
    Save {
        position: usize,
        price: f64,
        quantity: f64,
        /// Falls back to the form default when omitted
        unit: Option<String>,
        overwrite: bool,
    },
    Redraw,
    Help,
    Quit,
}

/// Parse one browse line: `d <n>`, `s <n> <price> <qty> [unit] [!]`, `r`, `h`, `q`
pub fn parse_browse_command(line: &str) -> Result<BrowseCommand> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&verb) = tokens.first() else {
        return Ok(BrowseCommand::Redraw);
    };

    let position = |token: Option<&&str>| -> Result<usize> {
        let token = token.context("Missing purchase number")?;
        let n: usize = token
            .parse()
            .with_context(|| format!("Invalid purchase number: '{}'", token))?;
        if n == 0 {
            bail!("Purchase numbers start at 1");
        }
        Ok(n)
    };

    match verb {
        "d" | "discard" => Ok(BrowseCommand::Discard(position(tokens.get(1))?)),
        "s" | "save" => {
            let overwrite = tokens.last() == Some(&"!");
            if overwrite {
                tokens.pop();
            }
            if tokens.len() < 4 || tokens.len() > 5 {
                bail!("Usage: s <n> <price> <qty> [unit] [!]");
            }
            let (price, quantity) = parse_price_quantity(tokens[2], tokens[3])?;
            Ok(BrowseCommand::Save {
                position: position(tokens.get(1))?,
                price,
                quantity,
                unit: tokens.get(4).map(|u| u.to_string()),
                overwrite,
            })
        }
        "r" | "redraw" => Ok(BrowseCommand::Redraw),
        "h" | "help" | "?" => Ok(BrowseCommand::Help),
        "q" | "quit" | "exit" => Ok(BrowseCommand::Quit),
        other => bail!("Unknown command '{}' (h for help)", other),
    }
}

fn print_browse_help() {
    println!("   d <n>                        hide purchase n and show the next one");
    println!("   s <n> <price> <qty> [unit]   save purchase n (append ! to overwrite)");
    println!("   r                            redraw");
    println!("   q                            quit");
}

pub fn cmd_browse<R: BufRead>(
    db: &Database,
    index: &PurchaseIndex,
    config: &Config,
    query: &str,
    options: PlanOptions,
    input: R,
) -> Result<()> {
    let store = open_receipt_store(config);
    let receipts = store.as_ref().map(|s| s as &dyn ReceiptStore);
    let mut session = BrowseSession::start(index, query, options, db)?;

    print_plan(session.plan(), receipts);
    if session.plan().groups.is_empty() {
        return Ok(());
    }
    print_browse_help();

    for line in input.lines() {
        let line = line.context("Failed to read input")?;
        let command = match parse_browse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("   ❌ {}", e);
                continue;
            }
        };

        match command {
            BrowseCommand::Quit => break,
            BrowseCommand::Help => print_browse_help(),
            BrowseCommand::Redraw => {
                session.refresh(db)?;
                print_plan(session.plan(), receipts);
            }
            BrowseCommand::Discard(position) => match session.discard(position, db) {
                Ok(plan) => print_plan(plan, receipts),
                Err(e) => println!("   ❌ {}", e),
            },
            BrowseCommand::Save {
                position,
                price,
                quantity,
                unit,
                overwrite,
            } => {
                let Some(group) = session.plan().group(position) else {
                    println!("   ❌ No purchase at position {}", position);
                    continue;
                };
                let transaction_id = group.transaction_id.clone();
                let unit = unit.unwrap_or_else(|| group.form.unit.clone());

                match session.save(position, price, quantity, &unit, overwrite, db) {
                    Ok(outcome) => {
                        println!(
                            "   {}",
                            save_message(&outcome, &session.plan().product, &transaction_id)
                        );
                        if let Some(summary) = &session.plan().summary {
                            print_summary(summary);
                        }
                    }
                    Err(e) => println!("   ❌ {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Render a display plan
pub fn print_plan(plan: &DisplayPlan, receipts: Option<&dyn ReceiptStore>) {
    println!();
    match plan.state {
        PlanState::EmptyQuery => {
            println!("   Type a product to search for.");
            return;
        }
        PlanState::EmptyCorpus => {
            println!("   📭 The ledger snapshot has no transactions.");
        }
        PlanState::NoMatches => {
            println!("   🔍 No purchases match '{}'. Try a different term.", plan.product);
        }
        PlanState::NoReceiptedMatches { matched_groups } => {
            println!(
                "   🧾 {} purchase(s) match '{}' but none has a receipt. Use --all to include them.",
                matched_groups, plan.product
            );
        }
        PlanState::Ready => {
            let how = match plan.match_kind {
                Some(MatchKind::Fuzzy) => " (approximate matches)",
                _ => "",
            };
            println!("🛒 Purchases for '{}'{}", plan.product, how);
            if plan.discarded > 0 {
                println!("   ({} hidden this session)", plan.discarded);
            }
            println!("   ─────────────────────────────────────────────────────────────");
        }
    }

    for group in &plan.groups {
        println!(
            "   [{}] {}  {}",
            group.position,
            group.date.format("%Y-%m-%d %H:%M"),
            truncate(&group.note, 50)
        );
        println!(
            "       tx {} · group {} · {}{}",
            group.transaction_id,
            group.comp_id,
            group.merchant.as_deref().unwrap_or("unknown merchant"),
            if group.matched > 1 {
                format!(" · {} matching entries", group.matched)
            } else {
                String::new()
            }
        );

        if group.receipts.is_empty() {
            println!("       🧾 no receipt");
        }
        for receipt in &group.receipts {
            match receipts.map(|store| fetch_receipt(store, &receipt.file_name)) {
                Some(ReceiptContent::Available { kind, bytes }) => println!(
                    "       📎 {} ({}, {:.1} KB)",
                    receipt.file_name,
                    kind.as_str(),
                    bytes.len() as f64 / 1024.0
                ),
                Some(ReceiptContent::Unavailable { reason }) => println!(
                    "       ⚠️  {} referenced but unavailable ({})",
                    receipt.file_name, reason
                ),
                None => println!("       📎 {}", receipt.file_name),
            }
        }

        let form = &group.form;
        let marker = match form.existing {
            Some(handle) => format!("saved {}", handle),
            None => "not saved".to_string(),
        };
        println!(
            "       💲 {} × {} {}  ({})",
            format_money(form.unit_price),
            format_quantity(form.quantity),
            form.unit,
            marker
        );
    }

    match &plan.summary {
        Some(summary) => print_summary(summary),
        None => {
            println!();
            println!("   No saved history for '{}' yet.", plan.product);
        }
    }
}
