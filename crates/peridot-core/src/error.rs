//! Error types for peridot domain values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An enum-coded value fell outside its domain. Callers that prefer to
    /// ignore the bad value can fall back to the enum's `Default`.
    #[error("invalid {domain} value: {value}")]
    InvalidDomainValue { domain: &'static str, value: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("failed to encode: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
