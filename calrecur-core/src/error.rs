//! Error types for calrecur.

use thiserror::Error;

use crate::rule::RuleParseError;

/// Errors that can occur in calrecur operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("Invalid recurrence rule: {0}")]
    RuleParse(#[from] RuleParseError),

    #[error("Failed to expand recurrence of '{uid}': {reason}")]
    Expansion { uid: String, reason: String },

    #[error("Event '{0}' does not recur")]
    NotRecurring(String),

    #[error("Event '{0}' is not an exception instance")]
    NotAnException(String),

    #[error("No occurrence of '{uid}' starts at {at}")]
    NotAnOccurrence { uid: String, at: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for calrecur operations.
pub type CoreResult<T> = Result<T, CoreError>;
