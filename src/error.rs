// 🚨 Statement Errors - What can make a whole file unusable
//
// Row-level problems are NOT errors: a bad row is simply dropped by the
// extractor. Only failures that reject an entire uploaded file live here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatementError {
    /// First sheet label does not belong to any supported bank
    #[error("Unknown bank: sheet label '{0}' is not a recognized statement layout")]
    UnknownBank(String),

    #[error("Workbook has no sheets")]
    EmptyWorkbook,

    #[error("Cannot read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Required cell {address} is empty")]
    MissingCell { address: String },

    #[error("Cannot read sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: calamine::Error,
    },
}

pub type Result<T> = std::result::Result<T, StatementError>;
