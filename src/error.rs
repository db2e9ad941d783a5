use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgingError {
    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("Row {index} is out of range (forecast has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Invalid correction pattern '{pattern}': {source}")]
    InvalidCorrectionPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid column targets: {0}")]
    InvalidTargets(String),

    #[error("Invalid carry threshold {0}: must be between 0.0 and 1.0")]
    InvalidCarryThreshold(f64),

    #[error("Target month {requested} is before the first available month {minimum}")]
    TargetMonthTooEarly { requested: String, minimum: String },

    #[error("Snapshot {month} total_amount ({reported}) != sum of record totals ({computed})")]
    SnapshotTotalMismatch {
        month: String,
        reported: f64,
        computed: f64,
    },

    #[error("Column '{0}' not found in header")]
    MissingColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "backend")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "backend")]
    #[error("Backend returned status {status}: {body}")]
    Backend { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, AgingError>;
