// 🏗️ Parser Framework - Statement layouts for 3 banks
// Polymorphic parser system: one StatementParser per bank, one BankLayout each
//
// Flow: bytes → first sheet label → Bank → parser (layout + currency rule)
//       → one ExpenseRecord per valid row

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;
use tracing::{debug, info};

use crate::error::{Result, StatementError};
use crate::model::{Bank, Currency, ExpenseRecord};
use crate::prefix::remove_prefix;
use crate::rules::RuleEngine;
use crate::sheet::{cell_date, cell_number, cell_str, last_row, CellAddress};

// ============================================================================
// BANK DISCRIMINATOR
// ============================================================================

/// First-sheet labels and the bank that produces them.
///
/// Scotiabank exports keep the spreadsheet default sheet name, which depends
/// on the locale of the exporting machine ("Hoja1" / "Sheet1").
const BANK_LABELS: [(&str, Bank); 4] = [
    ("Estado de Cuenta", Bank::Itau),
    ("Hoja1", Bank::Scotiabank),
    ("Sheet1", Bank::Scotiabank),
    ("AccountMovementsExtended", Bank::Santander),
];

/// Map the first sheet's label to a bank. Exact match, fails for anything else.
pub fn discriminate_bank(sheet_label: &str) -> Result<Bank> {
    BANK_LABELS
        .iter()
        .find(|(label, _)| *label == sheet_label)
        .map(|(_, bank)| *bank)
        .ok_or_else(|| StatementError::UnknownBank(sheet_label.to_string()))
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Fixed coordinates of one bank's statement.
///
/// Each address points at the column HEADER; data rows start on the next row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankLayout {
    pub bank: Bank,
    pub debit: CellAddress,
    pub credit: CellAddress,
    pub date: CellAddress,
    pub concept: CellAddress,
}

impl BankLayout {
    pub fn header_row(&self) -> u32 {
        self.debit.row
    }

    pub fn first_data_row(&self) -> u32 {
        self.header_row() + 1
    }
}

/// Itaú: header on row 7 (B date, C concept, E debit, F credit)
pub const ITAU_LAYOUT: BankLayout = BankLayout {
    bank: Bank::Itau,
    debit: CellAddress::new(6, 4),
    credit: CellAddress::new(6, 5),
    date: CellAddress::new(6, 1),
    concept: CellAddress::new(6, 2),
};

/// Scotiabank: header on row 3 (B date, D concept, F debit, G credit)
pub const SCOTIABANK_LAYOUT: BankLayout = BankLayout {
    bank: Bank::Scotiabank,
    debit: CellAddress::new(2, 5),
    credit: CellAddress::new(2, 6),
    date: CellAddress::new(2, 1),
    concept: CellAddress::new(2, 3),
};

/// Santander: header on row 15 (B date, D concept, G debit, I credit)
pub const SANTANDER_LAYOUT: BankLayout = BankLayout {
    bank: Bank::Santander,
    debit: CellAddress::new(14, 6),
    credit: CellAddress::new(14, 8),
    date: CellAddress::new(14, 1),
    concept: CellAddress::new(14, 3),
};

/// Itaú currency cell (F5): "Dólares" for USD accounts
const ITAU_CURRENCY_CELL: CellAddress = CellAddress::new(4, 5);
const ITAU_USD_LABEL: &str = "Dólares";

/// Santander currency cell (E10): "UYU" for peso accounts
const SANTANDER_CURRENCY_CELL: CellAddress = CellAddress::new(9, 4);

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// StatementParser - One implementation per bank
///
/// Agregar un banco = nuevo layout + nuevo parser + fila en BANK_LABELS.
pub trait StatementParser: Send + Sync {
    fn bank(&self) -> Bank;

    fn layout(&self) -> &BankLayout;

    /// Bank-specific currency detection. `file_name` is only consulted by
    /// banks without an in-sheet indicator.
    fn currency(&self, sheet: &Range<Data>, file_name: &str) -> Currency;

    /// Extract every valid row, in sheet order, tagged with the
    /// already-detected `currency`
    fn parse(&self, sheet: &Range<Data>, currency: Currency, rules: &RuleEngine) -> Vec<ExpenseRecord> {
        extract_records(sheet, self.layout(), currency, rules)
    }
}

pub struct ItauParser;

impl StatementParser for ItauParser {
    fn bank(&self) -> Bank {
        Bank::Itau
    }

    fn layout(&self) -> &BankLayout {
        &ITAU_LAYOUT
    }

    fn currency(&self, sheet: &Range<Data>, _file_name: &str) -> Currency {
        match cell_str(sheet, ITAU_CURRENCY_CELL) {
            Some(label) if label == ITAU_USD_LABEL => Currency::Usd,
            _ => Currency::Uyu,
        }
    }
}

pub struct ScotiabankParser;

impl StatementParser for ScotiabankParser {
    fn bank(&self) -> Bank {
        Bank::Scotiabank
    }

    fn layout(&self) -> &BankLayout {
        &SCOTIABANK_LAYOUT
    }

    /// Scotiabank files have no currency indication inside the sheet
    fn currency(&self, _sheet: &Range<Data>, file_name: &str) -> Currency {
        if file_name.to_lowercase().contains("usd") {
            Currency::Usd
        } else {
            Currency::Uyu
        }
    }
}

pub struct SantanderParser;

impl StatementParser for SantanderParser {
    fn bank(&self) -> Bank {
        Bank::Santander
    }

    fn layout(&self) -> &BankLayout {
        &SANTANDER_LAYOUT
    }

    fn currency(&self, sheet: &Range<Data>, _file_name: &str) -> Currency {
        match cell_str(sheet, SANTANDER_CURRENCY_CELL) {
            Some(code) if code == "UYU" => Currency::Uyu,
            _ => Currency::Usd,
        }
    }
}

/// Factory: parser for a bank
pub fn get_parser(bank: Bank) -> Box<dyn StatementParser> {
    match bank {
        Bank::Itau => Box::new(ItauParser),
        Bank::Scotiabank => Box::new(ScotiabankParser),
        Bank::Santander => Box::new(SantanderParser),
    }
}

// ============================================================================
// ROW EXTRACTION
// ============================================================================

/// Extract one data row. None = no transaction on this row (blank trailer,
/// malformed date, both amounts empty/zero, missing concept).
pub fn extract_row(
    sheet: &Range<Data>,
    layout: &BankLayout,
    row: u32,
    currency: Currency,
    rules: &RuleEngine,
) -> Option<ExpenseRecord> {
    let Some(date) = cell_date(sheet, layout.date.at_row(row)) else {
        debug!(row = row + 1, "skipping row without a valid date");
        return None;
    };

    let debit = cell_number(sheet, layout.debit.at_row(row)).map(|v| -v.abs());
    let credit = cell_number(sheet, layout.credit.at_row(row)).map(f64::abs);

    let amount = match (debit, credit) {
        (Some(d), _) if d != 0.0 => d,
        (_, Some(c)) if c != 0.0 => c,
        _ => {
            debug!(row = row + 1, "skipping row without debit or credit");
            return None;
        }
    };

    let Some(concept) = cell_str(sheet, layout.concept.at_row(row)) else {
        debug!(row = row + 1, "skipping row without concept");
        return None;
    };

    let canonical = remove_prefix(&concept);
    let transaction_type = rules.classify(&concept, layout.bank);

    Some(ExpenseRecord {
        date,
        amount,
        concept,
        concept_canonical: canonical.concept_canonical,
        prefix: canonical.prefix,
        bank: layout.bank,
        currency,
        transaction_type,
        id: None,
    })
}

/// Walk every row below the header up to the last populated row
pub fn extract_records(
    sheet: &Range<Data>,
    layout: &BankLayout,
    currency: Currency,
    rules: &RuleEngine,
) -> Vec<ExpenseRecord> {
    let Some(last) = last_row(sheet) else {
        return Vec::new();
    };

    (layout.first_data_row()..=last)
        .filter_map(|row| extract_row(sheet, layout, row, currency, rules))
        .collect()
}

// ============================================================================
// WORKBOOK ENTRY POINT
// ============================================================================

/// Output of parsing one uploaded file
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub file_name: String,
    pub bank: Bank,
    pub currency: Currency,
    pub records: Vec<ExpenseRecord>,
}

/// Parse an already-loaded first sheet
pub fn parse_sheet(
    sheet_label: &str,
    sheet: &Range<Data>,
    file_name: &str,
    rules: &RuleEngine,
) -> Result<ParsedStatement> {
    let bank = discriminate_bank(sheet_label)?;
    let parser = get_parser(bank);
    let currency = parser.currency(sheet, file_name);
    let records = parser.parse(sheet, currency, rules);

    info!(
        file = file_name,
        bank = bank.code(),
        currency = currency.code(),
        records = records.len(),
        "parsed statement"
    );

    Ok(ParsedStatement {
        file_name: file_name.to_string(),
        bank,
        currency,
        records,
    })
}

/// Parse raw file bytes (.xls or .xlsx). Only the first sheet is read.
pub fn parse_statement(bytes: &[u8], file_name: &str, rules: &RuleEngine) -> Result<ParsedStatement> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let sheet_label = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(StatementError::EmptyWorkbook)?;

    // Reject unknown banks before reading any cell
    discriminate_bank(&sheet_label)?;

    let range = workbook
        .worksheet_range(&sheet_label)
        .map_err(|source| StatementError::Sheet {
            sheet: sheet_label.clone(),
            source,
        })?;

    parse_sheet(&sheet_label, &range, file_name, rules)
}

// ============================================================================
// TESTS
// ============================================================================
