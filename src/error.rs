use thiserror::Error;

/// Failure to turn uploaded bytes into a table. The decoder never returns a
/// partial table alongside one of these.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed delimited text: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "xlsx")]
    #[error("unreadable workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("workbook has no sheets")]
    EmptyWorkbook,

    #[cfg(not(feature = "xlsx"))]
    #[error("unsupported format: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("File could not be parsed: {0}")]
    Decode(#[from] DecodeError),

    #[error(
        "Some tax IDs were not found among patients: {}. Import or update patients first.",
        .missing.join(", ")
    )]
    UnresolvedReference { missing: Vec<String> },

    #[error("Patient lookup failed: {0}")]
    Lookup(String),

    #[error("Nothing was saved, the batch was rejected: {0}")]
    Persistence(String),

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
