use std::path::PathBuf;

/// Errors raised by the observable pipeline.
///
/// Each variant is fatal for the unit of work that produced it (one run, one
/// aggregation call, one sweep append). The caller decides whether to skip that
/// unit or abort the batch.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// An expected run directory or artifact does not exist.
    #[error("not found: {what} ({})", .path.display())]
    NotFound { what: String, path: PathBuf },

    /// An artifact exists but its shape or content is inconsistent.
    #[error("malformed data in {}: {reason}", .path.display())]
    MalformedData { path: PathBuf, reason: String },

    /// Series handed to the aggregator disagree in length or time axis.
    #[error("alignment error: {0}")]
    Alignment(String),

    /// A sweep row's field set differs from the dataset's established header.
    #[error(
        "schema mismatch in {}: expected [{}], found [{}]",
        .path.display(),
        .expected.join(","),
        .found.join(",")
    )]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A caller-supplied argument is outside its valid domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AnalysisError {
    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        AnalysisError::NotFound { what: what.into(), path: path.into() }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedData { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
