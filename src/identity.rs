// 🔑 Record Identity - Content-derived primary key
//
// Same statement imported twice → same ids → upsert overwrites instead of
// duplicating. The key uses the RAW concept, so two merged records that share
// a canonical concept but came from different lines stay distinct.

use crate::model::ExpenseRecord;

/// Midnight UTC rendering of the record date, millisecond precision
fn iso_timestamp(record: &ExpenseRecord) -> String {
    format!("{}T00:00:00.000Z", record.date.format("%Y-%m-%d"))
}

/// `{currency}-{date ISO}-{bank}-{concept}-{amount}`
pub fn compute_expense_id(record: &ExpenseRecord) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        record.currency.code(),
        iso_timestamp(record),
        record.bank.code(),
        record.concept,
        record.amount
    )
}

/// Attach ids to every record (storage boundary)
pub fn assign_ids(records: Vec<ExpenseRecord>) -> Vec<ExpenseRecord> {
    records
        .into_iter()
        .map(|record| {
            let id = compute_expense_id(&record);
            record.with_id(id)
        })
        .collect()
}
