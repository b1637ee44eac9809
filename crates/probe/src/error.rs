//! # Probe Errors

use quick_xml::DeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding a simulation file into probe points.
///
/// Any of these aborts the ingestion of the file being decoded.
#[derive(Error, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    #[error("code: invalid_format, description: {0}")]
    InvalidFormat(String),

    #[error("code: missing_field, description: missing {0}")]
    MissingField(String),

    #[error("code: invalid_timestamp, description: {0}")]
    InvalidTimestamp(String),

    #[error("code: server_error, description: {0}")]
    ServerError(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::InvalidFormat(_) => "invalid_format",
            Self::MissingField(_) => "missing_field",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<Self>() {
            Some(Self::InvalidFormat(e)) => Self::InvalidFormat(format!("{err}: {e}")),
            Some(Self::MissingField(e)) => Self::MissingField(format!("{err}: {e}")),
            Some(Self::InvalidTimestamp(e)) => Self::InvalidTimestamp(format!("{err}: {e}")),
            Some(Self::ServerError(e)) => Self::ServerError(format!("{err}: {e}")),
            None => {
                let stack = err.chain().fold(String::new(), |cause, e| format!("{cause} -> {e}"));
                let stack = stack.trim_start_matches(" -> ").to_string();
                Self::ServerError(stack)
            }
        }
    }
}

impl From<DeError> for Error {
    fn from(err: DeError) -> Self {
        Self::InvalidFormat(format!("failed to deserialize fcd export: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(format!("failed to deserialize json simulation: {err}"))
    }
}
