// 🧪 Workbook import - real .xlsx bytes through calamine, into SQLite

use rusqlite::Connection;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use expense_ledger::{
    get_expenses_by_currency, import_files, parse_statement, process_paths, setup_database,
    verify_count, Bank, Currency, RuleEngine, TransactionType, UploadedFile,
};

/// A statement row: date cell, concept, debit, credit
enum DateCell<'a> {
    Text(&'a str),
    /// Excel serial number with a date format
    Serial(f64),
}

struct Row<'a> {
    date: DateCell<'a>,
    concept: &'a str,
    debit: f64,
    credit: f64,
}

fn row<'a>(date: DateCell<'a>, concept: &'a str, debit: f64, credit: f64) -> Row<'a> {
    Row { date, concept, debit, credit }
}

fn write_rows(sheet: &mut Worksheet, first: u32, cols: [u16; 4], rows: &[Row]) {
    let date_format = Format::new().set_num_format("dd/mm/yyyy");

    for (i, r) in rows.iter().enumerate() {
        let line = first + i as u32;
        match r.date {
            DateCell::Text(text) => {
                sheet.write_string(line, cols[0], text).unwrap();
            }
            DateCell::Serial(serial) => {
                sheet.write_number_with_format(line, cols[0], serial, &date_format).unwrap();
            }
        }
        sheet.write_string(line, cols[1], r.concept).unwrap();
        sheet.write_number(line, cols[2], r.debit).unwrap();
        sheet.write_number(line, cols[3], r.credit).unwrap();
    }
}

/// Itaú: "Estado de Cuenta", account currency in F5, header on row 7
fn itau_xlsx(account: &str, rows: &[Row]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Estado de Cuenta").unwrap();
    sheet.write_string(4, 5, account).unwrap();
    for (col, title) in [(1, "Fecha"), (2, "Concepto"), (4, "Débito"), (5, "Crédito")] {
        sheet.write_string(6, col, title).unwrap();
    }
    write_rows(sheet, 7, [1, 2, 4, 5], rows);
    workbook.save_to_buffer().unwrap()
}

/// Scotiabank: "Hoja1", header on row 3, currency from the file name
fn scotiabank_xlsx(rows: &[Row]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Hoja1").unwrap();
    for (col, title) in [(1, "Fecha"), (3, "Descripción"), (5, "Débito"), (6, "Crédito")] {
        sheet.write_string(2, col, title).unwrap();
    }
    write_rows(sheet, 3, [1, 3, 5, 6], rows);
    workbook.save_to_buffer().unwrap()
}

/// Santander: "AccountMovementsExtended", currency in E10, header on row 15
fn santander_xlsx(currency: &str, rows: &[Row]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("AccountMovementsExtended").unwrap();
    sheet.write_string(9, 4, currency).unwrap();
    for (col, title) in [(1, "Fecha"), (3, "Concepto"), (6, "Débito"), (8, "Crédito")] {
        sheet.write_string(14, col, title).unwrap();
    }
    write_rows(sheet, 15, [1, 3, 6, 8], rows);
    workbook.save_to_buffer().unwrap()
}

fn itau_upload() -> UploadedFile {
    let bytes = itau_xlsx(
        "Pesos",
        &[
            // 45356 → 05/03/2024 as a native date cell
            row(DateCell::Serial(45356.0), "COMPRA SUPERMERCADO", 1000.0, 0.0),
            row(DateCell::Text("05/03/2024"), "REDIVA 19210 SUPERMERCADO", 220.0, 0.0),
            row(DateCell::Text("06/03/2024"), "TRASPASO DE 1234567", 0.0, 5000.0),
        ],
    );
    UploadedFile::new("itau-marzo.xlsx", bytes)
}

fn batch() -> Vec<UploadedFile> {
    vec![
        itau_upload(),
        UploadedFile::new(
            "statement-usd-2024.xlsx",
            scotiabank_xlsx(&[
                row(DateCell::Text("02/04/2024"), "GIRO REC 5521", 0.0, 300.0),
                row(DateCell::Text("03/04/2024"), "SUPERMERCADO", 45.5, 0.0),
            ]),
        ),
        UploadedFile::new(
            "santander.xlsx",
            santander_xlsx(
                "UYU",
                &[
                    row(DateCell::Text("10/05/2024"), "PAGO CJPPU 0001", 3500.0, 0.0),
                    row(DateCell::Text("11/05/2024"), "Credito por operacion 8812", 0.0, 12000.0),
                ],
            ),
        ),
    ]
}

#[test]
fn test_itau_workbook_with_native_date_cell() {
    let upload = itau_upload();
    let statement = parse_statement(&upload.bytes, &upload.name, &RuleEngine::new()).unwrap();

    assert_eq!(statement.bank, Bank::Itau);
    assert_eq!(statement.currency, Currency::Uyu);
    assert_eq!(statement.records.len(), 3);

    let compra = &statement.records[0];
    assert_eq!(compra.date, chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    assert_eq!(compra.amount, -1000.0);
    assert_eq!(compra.transaction_type, TransactionType::Compra);
}

#[test]
fn test_each_bank_label_is_recognized_in_real_workbooks() {
    let rules = RuleEngine::new();
    let files = batch();

    let banks: Vec<(Bank, Currency)> = files
        .iter()
        .map(|f| {
            let statement = parse_statement(&f.bytes, &f.name, &rules).unwrap();
            (statement.bank, statement.currency)
        })
        .collect();

    assert_eq!(
        banks,
        vec![
            (Bank::Itau, Currency::Uyu),
            (Bank::Scotiabank, Currency::Usd),
            (Bank::Santander, Currency::Uyu),
        ]
    );
}

#[test]
fn test_import_workbooks_twice_keeps_ids_and_count() {
    let mut conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    let rules = RuleEngine::new();

    let first = import_files(&mut conn, &batch(), &rules).unwrap();
    let count1 = verify_count(&conn).unwrap();

    let second = import_files(&mut conn, &batch(), &rules).unwrap();
    let count2 = verify_count(&conn).unwrap();

    assert!(first.rejected.is_empty());
    assert_eq!(first.merged, 1);
    assert_eq!(count1, 6);
    assert_eq!(count2, count1);

    let ids1: Vec<_> = first.records.iter().map(|r| r.id.clone()).collect();
    let ids2: Vec<_> = second.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids1, ids2);
    assert!(ids1.contains(&Some(
        "UYU-2024-03-05T00:00:00.000Z-ITAU-COMPRA SUPERMERCADO--1220".to_string()
    )));

    let usd = get_expenses_by_currency(&conn, Currency::Usd).unwrap();
    assert_eq!(usd.len(), 2);
    assert!(usd.iter().all(|r| r.bank == Bank::Scotiabank));

    println!("✅ Workbook import twice test PASSED: {} records", count2);
}

#[test]
fn test_missing_path_next_to_good_file() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("itau-marzo.xlsx");
    std::fs::write(&good, itau_upload().bytes).unwrap();
    let missing = dir.path().join("no-such-statement.xlsx");

    let outcome = process_paths(&[missing, good], &RuleEngine::new());

    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].file_name, "no-such-statement.xlsx");
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].bank, Bank::Itau);
    assert_eq!(outcome.records.len(), 2, "COMPRA + REDIVA merged, TRASPASO kept");
}
