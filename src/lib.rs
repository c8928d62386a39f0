// Expense Ledger - Core Library
// Bank statement import (Itaú, Scotiabank, Santander) → normalized expenses
// Exposes all modules for use in the CLI and tests

pub mod config;
pub mod db;
pub mod error;
pub mod grouping;
pub mod identity;
pub mod import;
pub mod model;
pub mod parser;
pub mod prefix;
pub mod reconciliation;
pub mod rules;
pub mod sheet;

// Re-export commonly used types
pub use config::Settings;
pub use db::{
    Event,
    setup_database, upsert_expenses, get_expenses_by_currency, get_expenses_in_range,
    remove_expense, verify_count, insert_event, get_recent_events,
};
pub use error::StatementError;
pub use grouping::{group_by_month, monthly_outgoing, MonthGroup, MonthlyOutgoing, OutgoingStats};
pub use identity::{assign_ids, compute_expense_id};
pub use import::{
    BatchOutcome, FileSummary, RejectedFile, UploadedFile,
    file_fingerprint, import_files, process_paths, process_uploads, reconcile_batch, store_batch,
};
pub use model::{Bank, Currency, ExpenseRecord, TransactionType};
pub use parser::{
    BankLayout, ParsedStatement, StatementParser,
    ItauParser, ScotiabankParser, SantanderParser,
    discriminate_bank, get_parser, parse_sheet, parse_statement,
};
pub use prefix::{remove_prefix, CanonicalConcept};
pub use reconciliation::{join_tax_adjustments, ReconciliationReport};
pub use rules::{ClassificationRule, Matcher, RuleEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
