// 📋 Cell Accessor - Read single cells out of a worksheet range
//
// All addresses are ABSOLUTE (row, column), zero-based, exactly like the
// fixed coordinates printed on the bank statements ("E7" = row 6, col 4).
// calamine ranges do not necessarily start at A1, so every read goes through
// Range::get_value with absolute positions.

use calamine::{Data, DataType, Range};
use chrono::NaiveDate;
use std::fmt;

use crate::error::{Result, StatementError};

/// Absolute, zero-based cell position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub const fn new(row: u32, col: u32) -> Self {
        CellAddress { row, col }
    }

    /// Same column, another row
    pub const fn at_row(&self, row: u32) -> Self {
        CellAddress { row, col: self.col }
    }
}

impl fmt::Display for CellAddress {
    /// Spreadsheet notation, e.g. `E7`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.col + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let column: String = letters.into_iter().rev().collect();
        write!(f, "{}{}", column, self.row + 1)
    }
}

/// Raw value at an address. Empty cells count as absent.
pub fn cell_value(range: &Range<Data>, addr: CellAddress) -> Option<&Data> {
    match range.get_value((addr.row, addr.col)) {
        None | Some(Data::Empty) => None,
        Some(value) => Some(value),
    }
}

/// Cell coerced to a string ("missing" policy: absent → None)
pub fn cell_str(range: &Range<Data>, addr: CellAddress) -> Option<String> {
    let value = cell_value(range, addr)?;

    let s = match value {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    };

    Some(s)
}

/// Cell coerced to a string ("fail loudly" policy: absent → error)
pub fn required_cell_str(range: &Range<Data>, addr: CellAddress) -> Result<String> {
    cell_str(range, addr).ok_or(StatementError::MissingCell {
        address: addr.to_string(),
    })
}

/// Numeric reading of a cell. Unparseable text is absent, not an error.
pub fn cell_number(range: &Range<Data>, addr: CellAddress) -> Option<f64> {
    let n = match cell_value(range, addr)? {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if n.is_finite() {
        Some(n)
    } else {
        None
    }
}

/// Calendar date of a cell.
///
/// Statements carry dates as "DD/MM/YYYY" text; some exports store a real
/// spreadsheet date instead, which is accepted too.
pub fn cell_date(range: &Range<Data>, addr: CellAddress) -> Option<NaiveDate> {
    match cell_value(range, addr)? {
        value @ (Data::DateTime(_) | Data::DateTimeIso(_)) => value.as_date(),
        Data::String(s) => parse_day_month_year(s),
        _ => None,
    }
}

/// Parse "DD/MM/YYYY" (leading zeros optional)
pub fn parse_day_month_year(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Last populated row of the sheet's declared range
pub fn last_row(range: &Range<Data>) -> Option<u32> {
    range.end().map(|(row, _)| row)
}

// ============================================================================
// TESTS
// ============================================================================
