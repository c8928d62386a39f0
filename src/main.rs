use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::EnvFilter;

use expense_ledger::{
    get_expenses_by_currency, get_expenses_in_range, get_recent_events, group_by_month,
    monthly_outgoing, process_paths, remove_expense, setup_database, store_batch, verify_count,
    Currency, ExpenseRecord, RuleEngine, Settings, VERSION,
};

/// Import bank statements (Itaú, Scotiabank, Santander) into a local expense ledger
#[derive(Debug, Parser)]
#[command(name = "expense-ledger", author, version = VERSION, about, long_about = None)]
struct Cli {
    /// Settings JSON file (defaults to ./expense-ledger.json when present)
    #[arg(long = "settings")]
    settings: Option<PathBuf>,

    /// SQLite database path
    #[arg(long = "db", env = "EXPENSE_LEDGER_DB")]
    db_path: Option<PathBuf>,

    /// Log filter (RUST_LOG still wins)
    #[arg(long = "log", env = "EXPENSE_LEDGER_LOG")]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse, reconcile and store one batch of statement files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List stored records of one currency
    List {
        #[arg(long)]
        currency: Currency,
        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Records grouped by month
    Months {
        #[arg(long)]
        currency: Currency,
    },
    /// Monthly outgoing totals
    Stats {
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Remove one stored record by id
    Remove { id: String },
    /// Write one currency's records to CSV
    Export {
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        out: PathBuf,
    },
    /// Recent import batches from the audit log
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.settings.as_deref())?
        .with_overrides(cli.db_path.clone(), cli.log_filter.clone());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut conn = Connection::open(&settings.database_path)
        .with_context(|| format!("Failed to open database: {:?}", settings.database_path))?;
    setup_database(&conn)?;

    match cli.command {
        Command::Import { files } => run_import(&mut conn, &settings, &files),
        Command::List { currency, from, to } => run_list(&conn, currency, from, to),
        Command::Months { currency } => run_months(&conn, currency),
        Command::Stats { currency, from, to } => run_stats(&conn, currency, from, to),
        Command::Remove { id } => run_remove(&conn, &id),
        Command::Export { currency, out } => run_export(&conn, currency, &out),
        Command::History { limit } => run_history(&conn, limit),
    }
}

fn load_rules(settings: &Settings) -> Result<RuleEngine> {
    match &settings.rules_path {
        Some(path) => RuleEngine::from_file(path),
        None => Ok(RuleEngine::new()),
    }
}

fn run_import(conn: &mut Connection, settings: &Settings, paths: &[PathBuf]) -> Result<()> {
    println!("📥 Importing {} statement file(s)", paths.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let rules = load_rules(settings)?;
    println!("✓ Classification rules: {}", rules.rule_count());

    let outcome = process_paths(paths, &rules);

    for file in &outcome.files {
        println!(
            "✓ {} → {} {} ({} rows)",
            file.file_name,
            file.bank.name(),
            file.currency,
            file.extracted
        );
    }
    for rejected in &outcome.rejected {
        println!("❌ {}: {}", rejected.file_name, rejected.reason);
    }

    println!("\n⚖️  Reconciliation");
    println!("✓ Extracted: {}", outcome.extracted);
    println!("✓ Merged with REDIVA: {}", outcome.merged);
    println!("✓ Unmatched REDIVA dropped: {}", outcome.unmatched_adjustments);
    println!("✓ Records to store: {}", outcome.records.len());
    for currency in [Currency::Uyu, Currency::Usd] {
        println!("  {}: {}", currency, outcome.records_for(currency).count());
    }

    match store_batch(conn, &outcome) {
        Ok(stored) => {
            let count = verify_count(conn)?;
            println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("✅ Stored {} records ({} in database)", stored, count);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "store write failed, batch rolled back");
            eprintln!("❌ Store write failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn fetch(
    conn: &Connection,
    currency: Currency,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ExpenseRecord>> {
    match (from, to) {
        (Some(from), Some(to)) => get_expenses_in_range(conn, currency, from, to),
        _ => {
            let records = get_expenses_by_currency(conn, currency)?;
            Ok(records
                .into_iter()
                .filter(|r| from.map_or(true, |f| r.date >= f) && to.map_or(true, |t| r.date <= t))
                .collect())
        }
    }
}

fn print_record(record: &ExpenseRecord) {
    println!(
        "{}  {:>12.2}  {:<14} {:<10} {}",
        record.date,
        record.amount,
        record.transaction_type.as_str(),
        record.bank.code(),
        record.concept
    );
}

fn run_list(
    conn: &Connection,
    currency: Currency,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let records = fetch(conn, currency, from, to)?;

    println!("📊 {} records ({})", records.len(), currency);
    for record in &records {
        print_record(record);
    }

    Ok(())
}

fn run_months(conn: &Connection, currency: Currency) -> Result<()> {
    let records = get_expenses_by_currency(conn, currency)?;
    let groups = group_by_month(&records, currency);

    for group in &groups {
        println!("\n📅 {} ({}, {} records)", group.key, group.currency, group.records.len());
        for record in &group.records {
            print_record(record);
        }
    }

    Ok(())
}

fn run_stats(
    conn: &Connection,
    currency: Currency,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let records = get_expenses_by_currency(conn, currency)?;
    let stats = monthly_outgoing(&records, from, to);

    println!("📈 Monthly outgoing ({})", currency);
    for month in &stats.months {
        println!("{}  {:>12.2}", month.year_month, month.total_outgoing);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", stats.summary());

    Ok(())
}

fn run_remove(conn: &Connection, id: &str) -> Result<()> {
    if remove_expense(conn, id)? {
        println!("✅ Removed {}", id);
    } else {
        println!("⚠️  No record with id {}", id);
    }
    Ok(())
}

fn run_history(conn: &Connection, limit: usize) -> Result<()> {
    let events = get_recent_events(conn, "import_batch", limit)?;

    println!("🕘 expense-ledger {}: last {} import batch(es)", VERSION, events.len());
    for event in &events {
        let files = event.data["files"].as_array().map_or(0, |f| f.len());
        let rejected = event.data["rejected"].as_array().map_or(0, |r| r.len());
        println!(
            "{}  {}  {} file(s), {} rejected, {} stored",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.entity_id,
            files,
            rejected,
            event.data["stored"].as_u64().unwrap_or(0)
        );
    }

    Ok(())
}

/// Flat CSV row
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    date: String,
    amount: f64,
    concept: &'a str,
    concept_canonical: &'a str,
    bank: &'a str,
    currency: &'a str,
    #[serde(rename = "type")]
    transaction_type: &'a str,
}

fn run_export(conn: &Connection, currency: Currency, out: &Path) -> Result<()> {
    let records = get_expenses_by_currency(conn, currency)?;

    let mut writer = csv::Writer::from_path(out)
        .with_context(|| format!("Failed to create CSV file: {:?}", out))?;

    for record in &records {
        writer.serialize(ExportRow {
            id: record.id.as_deref().unwrap_or_default(),
            date: record.date.format("%Y-%m-%d").to_string(),
            amount: record.amount,
            concept: &record.concept,
            concept_canonical: &record.concept_canonical,
            bank: record.bank.code(),
            currency: record.currency.code(),
            transaction_type: record.transaction_type.as_str(),
        })?;
    }
    writer.flush()?;

    println!("✅ Exported {} {} records to {:?}", records.len(), currency, out);
    Ok(())
}
