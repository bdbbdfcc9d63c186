pub mod types;
pub mod aggregate;
pub mod summary;
pub mod prompt;
pub mod request;
pub mod parser;
pub mod validation;
pub mod client;
pub mod orchestrator;


pub use types::*;
pub use aggregate::*;
pub use summary::*;
pub use prompt::*;
pub use request::*;
pub use parser::*;
pub use validation::*;
pub use client::*;
pub use orchestrator::*;

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::config::MAX_HORIZON_DAYS;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Insufficient history: {available} usable day(s), need at least {required}")]
    InsufficientData { available: usize, required: usize },

    #[error(
        "Invalid forecast horizon {0}: must be between 1 and {max} days",
        max = MAX_HORIZON_DAYS
    )]
    InvalidHorizon(i64),

    #[error("Malformed forecast response: {0}")]
    MalformedResponse(String),

    #[error("Forecast response failed schema validation: {}", join_display(.fields))]
    SchemaValidation { fields: Vec<FieldIssue> },

    #[error("Forecast returned {actual} prediction(s), expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Prediction {index} is dated {found}, expected {expected}")]
    DateSequence {
        index: usize,
        expected: NaiveDate,
        found: NaiveDate,
    },

    #[error("Prediction bounds violated: {}", join_display(.points))]
    BoundsViolation { points: Vec<BoundsIssue> },

    #[error("Invalid accuracy metric {metric}: {reason}")]
    MetricValidation { metric: &'static str, reason: String },

    #[error("Forecast service did not answer within {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("Forecast service is not reachable at {0}")]
    UpstreamConnection(String),

    #[error("Forecast service returned error (status {status}): {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Unreadable forecast service envelope: {0}")]
    UpstreamEnvelope(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Appointment records could not be parsed: {0}")]
    RecordParsing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Coarse grouping of [`ForecastError`] for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Not enough (or badly bounded) history. Fixed by a wider range or more data.
    InputData,
    /// The request itself is wrong and will stay wrong.
    CallerError,
    /// The upstream service answered with unusable content.
    UpstreamQuality,
    /// The upstream service was slow or unreachable.
    Transient,
    /// Local configuration, files or I/O.
    Environment,
}

impl ForecastError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRange { .. } | Self::InsufficientData { .. } => ErrorClass::InputData,
            Self::InvalidHorizon(_) | Self::InvalidEnum { .. } => ErrorClass::CallerError,
            Self::MalformedResponse(_)
            | Self::SchemaValidation { .. }
            | Self::LengthMismatch { .. }
            | Self::DateSequence { .. }
            | Self::BoundsViolation { .. }
            | Self::MetricValidation { .. }
            | Self::UpstreamEnvelope(_) => ErrorClass::UpstreamQuality,
            Self::UpstreamTimeout { .. } | Self::UpstreamConnection(_) => ErrorClass::Transient,
            Self::UpstreamStatus { status, .. } if *status >= 500 || *status == 429 => {
                ErrorClass::Transient
            }
            Self::UpstreamStatus { .. } | Self::HttpClient(_) => ErrorClass::Environment,
            Self::Config(_) | Self::RecordParsing(_) | Self::Io(_) => ErrorClass::Environment,
        }
    }

    /// Whether a caller-side retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// One missing or mistyped field in an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path, e.g. `accuracy.rmse` or `predictions[3].lower_bound`.
    pub path: String,
    pub problem: FieldProblem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    Mistyped { expected: &'static str },
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{} (missing)", self.path),
            FieldProblem::Mistyped { expected } => {
                write!(f, "{} (expected {expected})", self.path)
            }
        }
    }
}

/// One prediction point that broke a per-point invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsIssue {
    pub index: usize,
    pub date: NaiveDate,
    pub reason: String,
}

impl fmt::Display for BoundsIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "predictions[{}] ({}): {}", self.index, self.date, self.reason)
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
