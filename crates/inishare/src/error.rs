use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("No cached document for {}", .0.display())]
    NotCached(PathBuf),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(#[from] confique::Error),
}

impl StoreError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        StoreError::Format {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
