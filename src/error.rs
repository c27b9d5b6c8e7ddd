use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("History store error: {0}")]
    History(String),

    #[error(
        "snapshot integrity check failed: candidate has {candidate_rows} rows, \
         previous snapshot has {previous_rows}"
    )]
    Integrity {
        candidate_rows: usize,
        previous_rows: usize,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
