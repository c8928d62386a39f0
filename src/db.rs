// 🗄️ Expense Store - SQLite + WAL
//
// Records are keyed by their content-derived id (see `identity`), so the
// write path is an upsert: importing the same statement twice leaves the
// store unchanged. Each batch is written in a single transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::identity::compute_expense_id;
use crate::model::{Currency, ExpenseRecord};

const STORED_DATE_FORMAT: &str = "%Y-%m-%d";

const EXPENSE_COLUMNS: &str =
    "id, date, amount, concept, concept_canonical, prefix, bank, currency, type";

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Expenses Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY NOT NULL,
            date TEXT NOT NULL,
            amount REAL NOT NULL,
            concept TEXT NOT NULL,
            concept_canonical TEXT NOT NULL,
            prefix TEXT NOT NULL,
            bank TEXT NOT NULL,
            currency TEXT NOT NULL,
            type TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_currency_date ON expenses(currency, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type)",
        [],
    )?;

    Ok(())
}

/// Insert or overwrite records by id inside the caller's transaction.
///
/// Nothing is visible until the caller commits, so the batch is
/// all-or-nothing together with whatever else the caller writes.
/// Records arriving without an id get one computed here.
pub fn upsert_expenses(tx: &Transaction, records: &[ExpenseRecord]) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT INTO expenses (
            id, date, amount, concept, concept_canonical, prefix, bank, currency, type
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            date = excluded.date,
            amount = excluded.amount,
            concept = excluded.concept,
            concept_canonical = excluded.concept_canonical,
            prefix = excluded.prefix,
            bank = excluded.bank,
            currency = excluded.currency,
            type = excluded.type",
    )?;

    for record in records {
        let id = match &record.id {
            Some(id) => id.clone(),
            None => compute_expense_id(record),
        };

        stmt.execute(params![
            id,
            record.date.format(STORED_DATE_FORMAT).to_string(),
            record.amount,
            record.concept,
            record.concept_canonical,
            record.prefix,
            record.bank.code(),
            record.currency.code(),
            record.transaction_type.as_str(),
        ])
        .with_context(|| format!("Failed to upsert expense {}", id))?;
    }

    info!("Upserted {} expenses", records.len());
    Ok(records.len())
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn parse_column<T>(row: &Row, column: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|e| conversion_error(column, e))
}

fn expense_from_row(row: &Row) -> rusqlite::Result<ExpenseRecord> {
    let date_str: String = row.get(1)?;
    let date = NaiveDate::parse_from_str(&date_str, STORED_DATE_FORMAT)
        .map_err(|e| conversion_error(1, e))?;

    Ok(ExpenseRecord {
        id: Some(row.get(0)?),
        date,
        amount: row.get(2)?,
        concept: row.get(3)?,
        concept_canonical: row.get(4)?,
        prefix: row.get(5)?,
        bank: parse_column(row, 6)?,
        currency: parse_column(row, 7)?,
        transaction_type: parse_column(row, 8)?,
    })
}

/// All records of one currency, oldest first
pub fn get_expenses_by_currency(conn: &Connection, currency: Currency) -> Result<Vec<ExpenseRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM expenses
         WHERE currency = ?1
         ORDER BY date ASC, rowid ASC",
        EXPENSE_COLUMNS
    ))?;

    let expenses = stmt
        .query_map(params![currency.code()], expense_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read expenses")?;

    Ok(expenses)
}

/// Records of one currency with `from <= date <= to`
pub fn get_expenses_in_range(
    conn: &Connection,
    currency: Currency,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ExpenseRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM expenses
         WHERE currency = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date ASC, rowid ASC",
        EXPENSE_COLUMNS
    ))?;

    let expenses = stmt
        .query_map(
            params![
                currency.code(),
                from.format(STORED_DATE_FORMAT).to_string(),
                to.format(STORED_DATE_FORMAT).to_string(),
            ],
            expense_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read expenses")?;

    Ok(expenses)
}

/// Delete one record. Returns false when no record had that id.
pub fn remove_expense(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM expenses WHERE id = ?1", params![id])
        .with_context(|| format!("Failed to remove expense {}", id))?;

    Ok(deleted > 0)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;

    Ok(count)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    let timestamp_str: String = row.get(1)?;
    let data_json: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| conversion_error(1, e))?
            .with_timezone(&Utc),
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
        actor: row.get(6)?,
    })
}

/// Latest events of one type, newest first
pub fn get_recent_events(conn: &Connection, event_type: &str, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE event_type = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let events = stmt
        .query_map(params![event_type, limit as i64], event_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read events")?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::assign_ids;
    use crate::model::{Bank, TransactionType};

    fn create_test_record(
        date: (i32, u32, u32),
        concept: &str,
        amount: f64,
        currency: Currency,
    ) -> ExpenseRecord {
        ExpenseRecord {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            amount,
            concept: concept.to_string(),
            concept_canonical: concept.to_string(),
            prefix: String::new(),
            bank: Bank::Scotiabank,
            currency,
            transaction_type: TransactionType::Compra,
            id: None,
        }
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn upsert_committed(conn: &mut Connection, records: &[ExpenseRecord]) -> usize {
        let tx = conn.transaction().unwrap();
        let written = upsert_expenses(&tx, records).unwrap();
        tx.commit().unwrap();
        written
    }

    #[test]
    fn test_idempotency_import_twice() {
        let mut conn = test_db();

        let records = assign_ids(vec![
            create_test_record((2024, 12, 31), "SUPERMERCADO", -45.99, Currency::Uyu),
            create_test_record((2024, 12, 30), "FARMACIA", -120.50, Currency::Uyu),
            create_test_record((2024, 12, 29), "GIRO REC 1", 2000.00, Currency::Usd),
        ]);

        upsert_committed(&mut conn, &records);
        let count1 = verify_count(&conn).unwrap();

        upsert_committed(&mut conn, &records);
        let count2 = verify_count(&conn).unwrap();

        assert_eq!(count1, 3);
        assert_eq!(count2, 3, "Second import must not add rows");

        println!("✅ Idempotency test PASSED: store unchanged after second import");
    }

    #[test]
    fn test_upsert_computes_missing_ids() {
        let mut conn = test_db();
        let record = create_test_record((2024, 1, 5), "KIOSCO", -10.0, Currency::Uyu);

        upsert_committed(&mut conn, &[record.clone()]);

        let stored = get_expenses_by_currency(&conn, Currency::Uyu).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.as_deref(), Some(compute_expense_id(&record).as_str()));
    }

    #[test]
    fn test_upsert_overwrites_same_id() {
        let mut conn = test_db();
        let record = create_test_record((2024, 1, 5), "KIOSCO", -10.0, Currency::Uyu)
            .with_id("fixed-id".to_string());
        upsert_committed(&mut conn, &[record.clone()]);

        let mut updated = record.clone();
        updated.transaction_type = TransactionType::Transferencia;
        upsert_committed(&mut conn, &[updated]);

        let stored = get_expenses_by_currency(&conn, Currency::Uyu).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].transaction_type, TransactionType::Transferencia);
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let mut conn = test_db();
        let mut record = create_test_record((2024, 2, 29), "SUPERMERCADO", -1220.0, Currency::Uyu);
        record.concept = "COMPRA SUPERMERCADO".to_string();
        record.prefix = "COMPRA ".to_string();
        record.bank = Bank::Itau;
        record.transaction_type = TransactionType::CambioMoneda;
        let record = assign_ids(vec![record]).remove(0);

        upsert_committed(&mut conn, &[record.clone()]);

        let stored = get_expenses_by_currency(&conn, Currency::Uyu).unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[test]
    fn test_query_by_currency_and_range() {
        let mut conn = test_db();
        let records = assign_ids(vec![
            create_test_record((2024, 3, 1), "A", -1.0, Currency::Uyu),
            create_test_record((2024, 1, 15), "B", -2.0, Currency::Uyu),
            create_test_record((2024, 2, 10), "C", -3.0, Currency::Usd),
            create_test_record((2024, 3, 31), "D", -4.0, Currency::Uyu),
            create_test_record((2024, 4, 1), "E", -5.0, Currency::Uyu),
        ]);
        upsert_committed(&mut conn, &records);

        let uyu = get_expenses_by_currency(&conn, Currency::Uyu).unwrap();
        let concepts: Vec<&str> = uyu.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(concepts, vec!["B", "A", "D", "E"]);

        let march = get_expenses_in_range(
            &conn,
            Currency::Uyu,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        let concepts: Vec<&str> = march.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(concepts, vec!["A", "D"]);

        let usd = get_expenses_by_currency(&conn, Currency::Usd).unwrap();
        assert_eq!(usd.len(), 1);
    }

    #[test]
    fn test_remove_expense() {
        let mut conn = test_db();
        let records = assign_ids(vec![
            create_test_record((2024, 3, 1), "A", -1.0, Currency::Uyu),
            create_test_record((2024, 3, 2), "B", -2.0, Currency::Uyu),
        ]);
        upsert_committed(&mut conn, &records);

        let id = records[0].id.clone().unwrap();
        assert!(remove_expense(&conn, &id).unwrap());
        assert!(!remove_expense(&conn, &id).unwrap());
        assert_eq!(verify_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_uncommitted_upsert_leaves_store_empty() {
        let mut conn = test_db();
        let records = assign_ids(vec![
            create_test_record((2024, 3, 1), "A", -1.0, Currency::Uyu),
        ]);

        {
            let tx = conn.transaction().unwrap();
            upsert_expenses(&tx, &records).unwrap();
            // Dropped without commit → rolled back
        }

        assert_eq!(verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        for files in [["a.xls"], ["b.xls"]] {
            let event = Event::new(
                "import_batch",
                "batch",
                &uuid::Uuid::new_v4().to_string(),
                serde_json::json!({ "files": files }),
                "test_actor",
            );
            insert_event(&conn, &event).unwrap();
        }
        insert_event(
            &conn,
            &Event::new("other", "batch", "x", serde_json::json!({}), "test_actor"),
        )
        .unwrap();

        let events = get_recent_events(&conn, "import_batch", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data["files"][0], "b.xls", "newest first");
        assert_eq!(events[1].actor, "test_actor");

        assert_eq!(get_recent_events(&conn, "import_batch", 1).unwrap().len(), 1);

        println!("✅ Event log test PASSED");
    }
}
