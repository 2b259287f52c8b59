use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The structured label of a target does not contain the expected delimiter.
    #[error("malformed target {target}: label {label:?} value {value:?} does not contain {delimiter:?}")]
    MalformedTarget {
        target: String,
        label: String,
        value: String,
        delimiter: String,
    },
    #[error("target {target} is missing label {label:?}")]
    MissingLabel { target: String, label: String },
    #[error("error calling relabel_targets: {0}")]
    ScriptExecution(String),
    #[error("relabel_targets did not complete within {0:?}")]
    Timeout(Duration),
    #[error("relabel_targets returned an invalid target list: {0}")]
    InvalidOutput(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0} already registered")]
    AlreadyRegistered(String),
    #[error("metrics: {0}")]
    Metrics(String),
    #[error("invalid label set: {0}")]
    InvalidLabels(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True when the failure came from running the transformation itself,
    /// as opposed to a target it rejected.
    pub fn is_script_execution(&self) -> bool {
        matches!(self, Error::ScriptExecution(_) | Error::Timeout(_) | Error::InvalidOutput(_))
    }

    pub fn is_malformed_target(&self) -> bool {
        matches!(self, Error::MalformedTarget { .. } | Error::MissingLabel { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
