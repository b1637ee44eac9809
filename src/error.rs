use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Import errors.
///
/// Failed map-matching or probe submission calls are not import errors:
/// the dispatch queue counts and logs them.
#[derive(Error, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// The simulation file could not be decoded.
    #[error(transparent)]
    Probe(#[from] probe::Error),

    /// The dispatch pipeline could not be built.
    #[error(transparent)]
    Dispatch(#[from] probe_dispatch::Error),

    #[error("code: read_failed, description: {0}")]
    ReadFailed(String),

    /// The trip store rejected the bulk insert.
    #[error("code: persistence, description: {0}")]
    Persistence(String),

    #[error("code: server_error, description: {0}")]
    ServerError(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::Probe(e) => e.code(),
            Self::Dispatch(e) => e.code(),
            Self::ReadFailed(_) => "read_failed",
            Self::Persistence(_) => "persistence",
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
            Some(Self::ReadFailed(e)) => Self::ReadFailed(format!("{err}: {e}")),
            Some(Self::Persistence(e)) => Self::Persistence(format!("{err}: {e}")),
            Some(e @ (Self::Probe(_) | Self::Dispatch(_) | Self::ServerError(_))) => {
                Self::ServerError(format!("{err}: {e}"))
            }
            None => {
                if let Some(e) = err.downcast_ref::<probe::Error>() {
                    return Self::Probe(e.clone());
                }
                let stack = err.chain().fold(String::new(), |cause, e| format!("{cause} -> {e}"));
                let stack = stack.trim_start_matches(" -> ").to_string();
                Self::ServerError(stack)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use anyhow::{Context, anyhow};

    use super::*;

    #[test]
    fn probe_code_passes_through() {
        let err: Error = probe::Error::MissingField("trip_id of record 4".to_string()).into();
        assert_eq!(err.code(), "missing_field");
        assert_eq!(err.to_string(), "code: missing_field, description: missing trip_id of record 4");
    }

    #[test]
    fn persistence_context() {
        let result = Err::<(), Error>(Error::Persistence("bulk insert rejected".into()))
            .context("storing trips for tokyo");
        let err: Error = result.unwrap_err().into();

        assert_eq!(
            err.to_string(),
            "code: persistence, description: storing trips for tokyo: bulk insert rejected"
        );
    }

    #[test]
    fn anyhow_context() {
        let result = Err::<(), anyhow::Error>(anyhow!("index unavailable")).context("searching");
        let err: Error = result.unwrap_err().into();

        assert_eq!(err.code(), "server_error");
        assert_eq!(err.to_string(), "code: server_error, description: searching -> index unavailable");
    }
}
