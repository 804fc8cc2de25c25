use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("Property not found: {0}")]
    PropertyNotFound(String),
    #[error("Invoice already paid: {0}")]
    AlreadyPaid(String),
    #[error("Invoice cancelled: {0}")]
    Cancelled(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("External service error: {0}")]
    ExternalService(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::ExternalService(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
