//! Error types for the telemetry hub
//!
//! None of these are fatal at runtime: the ingest path logs and drops a
//! `ParseError`, the enrichment path degrades a `LookupFailure` to "no
//! metadata". `ConfigError` is the only one that stops the process, and only
//! at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Inbound message could not be turned into a reading
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Payload is not valid JSON
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Payload is JSON but not an object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// `username` missing or blank
    #[error("Missing sensor identity")]
    MissingIdentity,

    /// A required metric field is absent
    #[error("Missing metric: {0}")]
    MissingMetric(&'static str),

    /// A metric field is present but not a finite number
    #[error("Metric {0} is not a finite number")]
    NonFiniteMetric(&'static str),
}

impl ParseError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::Malformed(_) => "malformed",
            ParseError::NotAnObject => "not_an_object",
            ParseError::MissingIdentity => "missing_identity",
            ParseError::MissingMetric(_) => "missing_metric",
            ParseError::NonFiniteMetric(_) => "non_finite_metric",
        }
    }
}

/// Why a device directory lookup produced nothing usable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// Request exceeded the configured timeout
    #[error("Lookup timed out")]
    Timeout,

    /// Connection refused, DNS failure, reset...
    #[error("Transport error: {0}")]
    Transport(String),

    /// Directory answered with a non-success, non-404 status
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(u16),

    /// Body was not a device record
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Configuration could not be loaded or is inconsistent
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Threshold row is unusable
    #[error("Invalid threshold for {metric}: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    /// Any other out-of-range value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for config loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
