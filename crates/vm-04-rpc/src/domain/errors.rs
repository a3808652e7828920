//! RPC error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure reported by the remote side of a call.
///
/// Field names follow the FAIL payload on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(rename = "ename")]
    pub kind: String,
    #[serde(rename = "evalue")]
    pub message: String,
    #[serde(rename = "traceback", default)]
    pub trace: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trace.is_empty() {
            write!(f, "{}({})", self.kind, self.message)
        } else {
            f.write_str(&self.trace)
        }
    }
}

impl std::error::Error for RemoteError {}

/// Error returned by a procedure; becomes the FAIL payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureError {
    pub kind: String,
    pub message: String,
    pub trace: String,
}

impl ProcedureError {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: String::new(),
        }
    }

    /// The procedure name is not registered.
    #[must_use]
    pub fn not_implemented(name: &str) -> Self {
        Self::new("NotImplementedError", format!("Unknown procedure {name}"))
    }
}

impl From<anyhow::Error> for ProcedureError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            kind: "Error".to_string(),
            message: format!("{err:#}"),
            trace: format!("{err:?}"),
        }
    }
}

impl From<ProcedureError> for RemoteError {
    fn from(err: ProcedureError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            trace: err.trace,
        }
    }
}

impl fmt::Display for ProcedureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.message)
    }
}

/// Errors of the RPC transport.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Procedure name '{0}' is reserved")]
    ReservedName(String),

    #[error("No RPC connection to peer '{0}'")]
    UnknownPeer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Bad message type: {0}")]
    BadStatus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
