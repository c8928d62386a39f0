// 📥 Import Pipeline - Files in, reconciled records out
//
// bytes → parse (per file) → concatenate → reconcile once → ids → store
//
// A file that cannot be parsed is rejected on its own; the rest of the batch
// goes on. REDIVA/COMPRA pairs split across files still merge because
// reconciliation runs over the combined list.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::db::{insert_event, upsert_expenses, Event};
use crate::identity::assign_ids;
use crate::model::{Bank, Currency, ExpenseRecord};
use crate::parser::{parse_statement, ParsedStatement};
use crate::reconciliation::join_tax_adjustments;
use crate::rules::RuleEngine;

/// One uploaded statement: raw bytes plus the name it was uploaded with
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        UploadedFile {
            name: name.into(),
            bytes,
        }
    }

    /// Read a statement from disk, keeping only the file name
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read statement: {:?}", path))?;

        Ok(UploadedFile::new(display_name(path), bytes))
    }

    pub fn fingerprint(&self) -> String {
        file_fingerprint(&self.bytes)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// SHA-256 of the file bytes, hex encoded
pub fn file_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// BATCH OUTCOME
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_name: String,
    pub bank: Bank,
    pub currency: Currency,
    pub extracted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub files: Vec<FileSummary>,
    pub rejected: Vec<RejectedFile>,

    /// Records extracted before reconciliation
    pub extracted: usize,

    /// Reconciled records, ids assigned
    pub records: Vec<ExpenseRecord>,

    pub merged: usize,
    pub duplicates_removed: usize,
    pub unmatched_adjustments: usize,
}

impl BatchOutcome {
    pub fn summary(&self) -> String {
        format!(
            "{} files parsed, {} rejected, {} extracted, {} after reconciliation ({} merged, {} REDIVA dropped)",
            self.files.len(),
            self.rejected.len(),
            self.extracted,
            self.records.len(),
            self.merged,
            self.unmatched_adjustments
        )
    }

    pub fn records_for(&self, currency: Currency) -> impl Iterator<Item = &ExpenseRecord> {
        self.records.iter().filter(move |r| r.currency == currency)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Reconcile already-parsed statements as one batch and assign ids.
pub fn reconcile_batch(statements: Vec<ParsedStatement>, rejected: Vec<RejectedFile>) -> BatchOutcome {
    let files: Vec<FileSummary> = statements
        .iter()
        .map(|st| FileSummary {
            file_name: st.file_name.clone(),
            bank: st.bank,
            currency: st.currency,
            extracted: st.records.len(),
            fingerprint: None,
        })
        .collect();

    let combined: Vec<ExpenseRecord> = statements.into_iter().flat_map(|st| st.records).collect();
    let extracted = combined.len();

    let report = join_tax_adjustments(&combined);

    BatchOutcome {
        files,
        rejected,
        extracted,
        merged: report.merged,
        duplicates_removed: report.duplicates_removed,
        unmatched_adjustments: report.unmatched_adjustments.len(),
        records: assign_ids(report.records),
    }
}

/// Parse every upload independently, then reconcile the survivors together.
pub fn process_uploads(files: &[UploadedFile], rules: &RuleEngine) -> BatchOutcome {
    parse_uploads(files, Vec::new(), rules)
}

/// Read and process statements from disk. A path that cannot be read is
/// rejected like an unparsable file; the other files still import.
pub fn process_paths<P: AsRef<Path>>(paths: &[P], rules: &RuleEngine) -> BatchOutcome {
    let mut files = Vec::new();
    let mut rejected = Vec::new();

    for path in paths {
        let path = path.as_ref();
        match UploadedFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!(path = ?path, error = %e, "rejecting unreadable statement");
                rejected.push(RejectedFile {
                    file_name: display_name(path),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    parse_uploads(&files, rejected, rules)
}

fn parse_uploads(
    files: &[UploadedFile],
    mut rejected: Vec<RejectedFile>,
    rules: &RuleEngine,
) -> BatchOutcome {
    let mut statements = Vec::new();
    let mut fingerprints = Vec::new();

    for file in files {
        match parse_statement(&file.bytes, &file.name, rules) {
            Ok(statement) => {
                fingerprints.push(file.fingerprint());
                statements.push(statement);
            }
            Err(e) => {
                warn!(file = file.name.as_str(), error = %e, "rejecting statement");
                rejected.push(RejectedFile {
                    file_name: file.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut outcome = reconcile_batch(statements, rejected);
    for (summary, fingerprint) in outcome.files.iter_mut().zip(fingerprints) {
        summary.fingerprint = Some(fingerprint);
    }

    info!("{}", outcome.summary());
    outcome
}

/// Upsert the batch and record an `import_batch` event in one transaction.
/// Either both land or neither does. Returns rows written.
pub fn store_batch(conn: &mut Connection, outcome: &BatchOutcome) -> Result<usize> {
    let tx = conn.transaction()?;

    let stored = upsert_expenses(&tx, &outcome.records).context("Failed to store import batch")?;

    let batch_id = uuid::Uuid::new_v4().to_string();
    let event = Event::new(
        "import_batch",
        "batch",
        &batch_id,
        serde_json::json!({
            "files": outcome.files,
            "rejected": outcome.rejected,
            "extracted": outcome.extracted,
            "reconciled": outcome.records.len(),
            "merged": outcome.merged,
            "unmatched_adjustments": outcome.unmatched_adjustments,
            "stored": stored,
        }),
        "importer",
    );
    insert_event(&tx, &event).context("Failed to log import batch")?;

    tx.commit().context("Failed to commit import batch")?;

    info!(batch = batch_id.as_str(), stored, "import batch stored");
    Ok(stored)
}

/// Full pipeline for one batch of uploads
pub fn import_files(
    conn: &mut Connection,
    files: &[UploadedFile],
    rules: &RuleEngine,
) -> Result<BatchOutcome> {
    let outcome = process_uploads(files, rules);
    store_batch(conn, &outcome)?;
    Ok(outcome)
}

// ============================================================================
// TESTS
// ============================================================================
