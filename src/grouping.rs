// 📅 Grouping & Monthly Stats - Read-side partitioning by YYYY-MM
//
// Groups keep the order in which each month first appears; members keep
// their input order. Stats only count money going out (compras and outgoing
// transfers), reported as positive totals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::model::{Currency, ExpenseRecord, TransactionType};

// ============================================================================
// GROUPER
// ============================================================================

/// One month of records for one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthGroup {
    /// `YYYY-MM`
    pub key: String,
    pub currency: Currency,
    pub records: Vec<ExpenseRecord>,
}

/// Partition records by year-month, tagging every group with `currency`.
pub fn group_by_month(records: &[ExpenseRecord], currency: Currency) -> Vec<MonthGroup> {
    let mut groups: Vec<MonthGroup> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = record.year_month();
        let idx = *position.entry(key.clone()).or_insert_with(|| {
            groups.push(MonthGroup {
                key,
                currency,
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].records.push(record.clone());
    }

    groups
}

// ============================================================================
// MONTHLY OUTGOING STATS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyOutgoing {
    pub year_month: String,
    pub total_outgoing: f64,
}

/// Statistics response for one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingStats {
    /// Chronological
    pub months: Vec<MonthlyOutgoing>,
    pub total: f64,
    pub average: f64,
    pub count: usize,
}

impl OutgoingStats {
    pub fn summary(&self) -> String {
        format!(
            "{} months, total {:.2}, average {:.2}/month",
            self.count, self.total, self.average
        )
    }
}

/// Compras always count; transfers only when money leaves the account.
fn counts_as_outgoing(record: &ExpenseRecord) -> bool {
    match record.transaction_type {
        TransactionType::Compra => true,
        TransactionType::Transferencia => record.is_outgoing(),
        TransactionType::CambioMoneda | TransactionType::Inversion => false,
    }
}

fn in_range(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |from| date >= from) && to.map_or(true, |to| date <= to)
}

/// Outgoing totals per month, within an optional inclusive date range.
pub fn monthly_outgoing(
    records: &[ExpenseRecord],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> OutgoingStats {
    let mut per_month: BTreeMap<String, f64> = BTreeMap::new();

    for record in records
        .iter()
        .filter(|r| in_range(r.date, from, to))
        .filter(|r| counts_as_outgoing(r))
    {
        *per_month.entry(record.year_month()).or_insert(0.0) += record.amount;
    }

    let months: Vec<MonthlyOutgoing> = per_month
        .into_iter()
        .map(|(year_month, sum)| MonthlyOutgoing {
            year_month,
            total_outgoing: sum.abs(),
        })
        .collect();

    let total: f64 = months.iter().map(|m| m.total_outgoing).sum();
    let count = months.len();
    let average = if count == 0 { 0.0 } else { total / count as f64 };

    OutgoingStats {
        months,
        total,
        average,
        count,
    }
}

// ============================================================================
// TESTS
// ============================================================================
