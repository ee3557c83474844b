// src/error.rs

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use thiserror::Error;

/// Errors raised by the table and analysis layers.
///
/// Missing data is never an error here: countries without observations are
/// omitted and undefined ratios come back as `None`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("column `{column}` has type {actual:?}, expected {expected:?}")]
    ColumnType {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
