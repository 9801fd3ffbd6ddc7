use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Error type covering the different failure cases that can occur while the
/// report is discovered, loaded, aggregated, or written.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when the settings file is not valid JSON for [`crate::settings::Settings`].
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a workbook does not contain the expected sheet or header row.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a source file lacks columns named in the column mapping.
    #[error("{file}: missing source columns {columns:?}")]
    MissingSourceColumns { file: String, columns: Vec<String> },

    /// Raised when no file matches the configured source pattern.
    #[error("no source files match pattern '{pattern}'")]
    NoSourceFiles { pattern: String },

    /// Raised when the file-name part of the source pattern is not a valid glob.
    #[error("invalid source pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Raised when every discovered file failed to load or was empty.
    #[error("no data could be loaded from the source files")]
    NoDataLoaded,

    /// Raised when required canonical columns are absent after concatenation.
    #[error("required columns missing after loading: {0:?}")]
    MissingColumns(Vec<String>),

    /// Raised when aggregation produced no period rows.
    #[error("report is empty: no rows survived filtering and cleaning")]
    EmptyReport,

    /// Raised when the settings fail validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the destination could not be written, typically because it
    /// is still open in a spreadsheet application.
    #[error("failed to write {path}: {source} (close the file if it is open in Excel)")]
    OutputLocked {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
