use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dispatch pipeline errors.
///
/// Failed outbound calls are not errors of the pipeline: they are counted
/// and logged by the queue. `InvariantViolation` marks a bookkeeping bug and
/// is only ever logged.
#[derive(Error, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    #[error("code: invalid_config, description: {0}")]
    InvalidConfig(String),

    #[error("code: invariant_violation, description: {0}")]
    InvariantViolation(String),

    #[error("code: server_error, description: {0}")]
    ServerError(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::InvariantViolation(_) => "invariant_violation",
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
            Some(Self::InvalidConfig(e)) => Self::InvalidConfig(format!("{err}: {e}")),
            Some(Self::InvariantViolation(e)) => Self::InvariantViolation(format!("{err}: {e}")),
            Some(Self::ServerError(e)) => Self::ServerError(format!("{err}: {e}")),
            None => {
                let stack = err.chain().fold(String::new(), |cause, e| format!("{cause} -> {e}"));
                let stack = stack.trim_start_matches(" -> ").to_string();
                Self::ServerError(stack)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
