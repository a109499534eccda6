// src/services/error.rs
use std::fmt;

/// Failure kinds of the rate engine. Each is local to one evaluation or one
/// ingestion attempt; callers isolate and continue.
#[derive(Debug, Clone, PartialEq)]
pub enum RateError {
    InvalidArgument(String),
    CalculationError(String),
    ExtractionFailed(String),
}

impl RateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RateError::InvalidArgument(message.into())
    }

    pub fn calculation(message: impl Into<String>) -> Self {
        RateError::CalculationError(message.into())
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        RateError::ExtractionFailed(message.into())
    }
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RateError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            RateError::CalculationError(msg) => write!(f, "calculation error: {}", msg),
            RateError::ExtractionFailed(msg) => write!(f, "rate extraction failed: {}", msg),
        }
    }
}

impl std::error::Error for RateError {}

pub type RateResult<T> = std::result::Result<T, RateError>;
