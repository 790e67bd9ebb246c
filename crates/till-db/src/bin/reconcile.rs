//! # Reconcile
//!
//! Lists and resolves inventory discrepancies left behind by sales whose
//! stock decrement failed.
//!
//! ## Usage
//! ```bash
//! # Show open discrepancies (oldest first)
//! cargo run -p till-db --bin reconcile -- list
//!
//! # Mark one as corrected after counting the shelf
//! cargo run -p till-db --bin reconcile -- resolve <ID> --note "recounted"
//!
//! # Specify database path
//! cargo run -p till-db --bin reconcile -- --db ./data/till.db list
//! ```

use std::env;
use till_db::{Database, DbConfig, Discrepancy};
use tracing_subscriber::EnvFilter;

enum Command {
    List { limit: u32 },
    Resolve { id: String, note: Option<String> },
    Help,
}

fn print_help() {
    println!("Till POS Reconcile");
    println!();
    println!("Usage: reconcile [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  list                 Show open discrepancies");
    println!("  resolve <ID>         Mark a discrepancy as corrected");
    println!();
    println!("Options:");
    println!("  -d, --db <PATH>      Database file path (default: ./till.db)");
    println!("  -l, --limit <N>      Rows to show with `list` (default: 50)");
    println!("  -n, --note <TEXT>    Note stored with `resolve`");
    println!("  -h, --help           Show this help message");
}

fn print_discrepancy(d: &Discrepancy) {
    println!(
        "{}  {}  tx={} receipt={}",
        d.id,
        d.created_at.format("%Y-%m-%d %H:%M"),
        d.transaction_id,
        d.receipt_id.as_deref().unwrap_or("-"),
    );
    for delta in &d.deltas {
        match &delta.size {
            Some(size) => println!("    -{} {} [{}]", delta.quantity, delta.product_id, size),
            None => println!("    -{} {}", delta.quantity, delta.product_id),
        }
    }
    println!("    error: {}", d.error);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./till.db");
    let mut limit: u32 = 50;
    let mut note: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--limit" | "-l" => {
                if i + 1 < args.len() {
                    limit = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--note" | "-n" => {
                if i + 1 < args.len() {
                    note = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => positional.insert(0, "help".to_string()),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("list") | None => Command::List { limit },
        Some("resolve") => match positional.get(1) {
            Some(id) => Command::Resolve {
                id: id.clone(),
                note,
            },
            None => Command::Help,
        },
        Some(_) => Command::Help,
    };

    if matches!(command, Command::Help) {
        print_help();
        return Ok(());
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;

    match command {
        Command::List { limit } => {
            let open = db.reconciliation().list_open(limit).await?;
            if open.is_empty() {
                println!("✓ No open discrepancies");
            } else {
                println!("⚠ {} open discrepancies", db.reconciliation().count_open().await?);
                println!();
                for discrepancy in &open {
                    print_discrepancy(discrepancy);
                }
            }
        }
        Command::Resolve { id, note } => {
            db.reconciliation().mark_resolved(&id, note.as_deref()).await?;
            println!("✓ Resolved {}", id);
        }
        Command::Help => {}
    }

    db.close().await;
    Ok(())
}
