// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Per-row failure. The row is skipped; the batch keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize)]
pub enum ValidationError {
    #[error("row {position} from '{source_tag}' has no identifier")]
    MissingIdentifier { source_tag: String, position: usize },
}

impl ValidationError {
    pub fn source_tag(&self) -> &str {
        match self {
            ValidationError::MissingIdentifier { source_tag, .. } => source_tag,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            ValidationError::MissingIdentifier { position, .. } => *position,
        }
    }

    /// Short machine-friendly reason used in batch summaries.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingIdentifier { .. } => "missing_identifier",
        }
    }
}

/// Whole-source failure raised by a reader. Fatal for the batch that needed it.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{source_tag}' is unavailable: {reason}")]
    Unavailable { source_tag: String, reason: String },

    #[error("source '{source_tag}' is malformed: {details}")]
    Malformed { source_tag: String, details: String },
}

impl SourceError {
    pub fn unavailable(source_tag: &str, reason: impl ToString) -> Self {
        SourceError::Unavailable {
            source_tag: source_tag.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(source_tag: &str, details: impl ToString) -> Self {
        SourceError::Malformed {
            source_tag: source_tag.to_string(),
            details: details.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("converter `{program}` exited with {status}: {stderr}")]
    Converter {
        program: String,
        status: String,
        stderr: String,
    },
}
