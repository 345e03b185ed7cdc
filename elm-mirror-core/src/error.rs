//! Error types for mirror operations
//!
//! Every step of the pipeline either succeeds, is skipped, or fails with an
//! `OperationError`. Whether a failure aborts anything is decided by the call
//! site, not here: see `pipeline` for the continue/abort policy.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single mirror operation
#[derive(Error, Debug)]
pub enum OperationError {
    /// A caller passed arguments the operation cannot work with
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// The HTTP client could not be constructed
    #[error("failed to create HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// The request never produced a response (DNS, TLS, connection reset, timeout)
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Filesystem failure while reading, writing, or deleting
    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fetched document did not have the expected JSON shape
    #[error("failed to parse {what}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// The external program could not be started at all
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program ran and exited unsuccessfully
    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The external program did not finish in time and was killed
    #[error("`{command}` timed out after {seconds}s")]
    CommandTimedOut { command: String, seconds: u64 },

    /// An elm.json template is missing the structure the aggregator needs
    #[error("invalid manifest: {detail}")]
    InvalidManifest { detail: String },
}

impl OperationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OperationError::Io {
            path: path.into(),
            source,
        }
    }

    /// Render the error with its full source chain on one line
    ///
    /// Outcomes carry causes as plain text, so the chain is flattened here
    /// rather than lost behind the top-level message.
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }
}

pub type Result<T, E = OperationError> = std::result::Result<T, E>;
