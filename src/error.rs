use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("No data: no Parquet partitions found under {}", .0.display())]
    NoData(PathBuf),

    #[error("Row count mismatch across representations: {0}")]
    RowCountMismatch(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

/// Error taxonomy used by the orchestrator when reporting a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    FatalInput,
    FatalIntegrity,
}

impl ProcessingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProcessingError::RowCountMismatch(_) => ErrorClass::FatalIntegrity,
            _ => ErrorClass::FatalInput,
        }
    }
}
