// 🧾 Expense Model - The normalized unit of output
//
// Every parser produces ExpenseRecord values. Records are immutable once
// built: reconciliation creates new records instead of editing extracted ones.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// BANK
// ============================================================================

/// Bank - Identifica de qué banco viene el estado de cuenta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bank {
    Itau,
    Scotiabank,
    Santander,
}

impl Bank {
    pub const ALL: [Bank; 3] = [Bank::Itau, Bank::Scotiabank, Bank::Santander];

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            Bank::Itau => "Itaú",
            Bank::Scotiabank => "Scotiabank",
            Bank::Santander => "Santander",
        }
    }

    /// Stored code (also used inside record ids)
    pub fn code(&self) -> &'static str {
        match self {
            Bank::Itau => "ITAU",
            Bank::Scotiabank => "SCOTIABANK",
            Bank::Santander => "SANTANDER",
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Bank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bank::ALL
            .into_iter()
            .find(|bank| bank.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown bank code: {}", s))
    }
}

// ============================================================================
// CURRENCY
// ============================================================================

/// Currencies are kept as separate record sets and never converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Uyu,
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Uyu => "UYU",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UYU" => Ok(Currency::Uyu),
            "USD" => Ok(Currency::Usd),
            other => Err(format!("unknown currency: {} (expected UYU or USD)", other)),
        }
    }
}

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Purchase (COMPRA). Also the classifier default.
    #[default]
    Compra,
    Transferencia,
    CambioMoneda,
    /// Investment movement
    Inversion,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Compra => "compra",
            TransactionType::Transferencia => "transferencia",
            TransactionType::CambioMoneda => "cambio-moneda",
            TransactionType::Inversion => "inversion",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compra" => Ok(TransactionType::Compra),
            "transferencia" => Ok(TransactionType::Transferencia),
            "cambio-moneda" => Ok(TransactionType::CambioMoneda),
            "inversion" => Ok(TransactionType::Inversion),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

// ============================================================================
// EXPENSE RECORD
// ============================================================================

/// ExpenseRecord - Normalized statement line
///
/// `amount` is signed: negative = outgoing, positive = incoming, never zero.
/// `id` is only filled at the storage boundary (see `identity`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub date: NaiveDate,
    pub amount: f64,

    /// Raw description as given by the bank
    pub concept: String,

    /// Concept without the recognized prefix (join key for REDIVA/COMPRA)
    pub concept_canonical: String,

    /// Recognized prefix, empty when none matched
    pub prefix: String,

    pub bank: Bank,
    pub currency: Currency,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ExpenseRecord {
    /// Record equality used by reconciliation: amount, bank, concept and date.
    ///
    /// Currency, type and id are not compared.
    pub fn record_eq(&self, other: &ExpenseRecord) -> bool {
        self.amount == other.amount
            && self.bank == other.bank
            && self.concept == other.concept
            && self.date == other.date
    }

    /// New record with a different amount, everything else copied
    pub fn with_amount(&self, amount: f64) -> ExpenseRecord {
        ExpenseRecord {
            amount,
            ..self.clone()
        }
    }

    /// New record carrying a storage id
    pub fn with_id(self, id: String) -> ExpenseRecord {
        ExpenseRecord {
            id: Some(id),
            ..self
        }
    }

    /// `YYYY-MM` key used for monthly grouping
    pub fn year_month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    pub fn is_outgoing(&self) -> bool {
        self.amount < 0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
