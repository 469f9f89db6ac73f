//! Error taxonomy for the portfolio pipeline

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every failure the pipeline can surface. None of them are retried.
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("failed to load dataset {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("invalid value {value:?} in column {column} at row {row}")]
    Parse {
        column: String,
        row: usize,
        value: String,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("failed to write {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("data processing error: {0}")]
    Data(#[from] polars::prelude::PolarsError),
}

impl PortfolioError {
    pub(crate) fn load(path: &Path, reason: impl ToString) -> Self {
        Self::Load {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing_column(name: &str) -> Self {
        Self::Schema(format!("required column {name} is missing"))
    }

    pub(crate) fn persistence(path: &Path, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, PortfolioError>;
