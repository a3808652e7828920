//! # Error Types
//!
//! Errors shared by the crates that encode and decode wire frames.

use thiserror::Error;

/// Errors raised while encoding or decoding a JSON wire frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame could not be serialized.
    #[error("Failed to encode {frame} frame: {source}")]
    Encode {
        frame: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The bytes did not parse into the expected frame.
    #[error("Malformed {frame} frame: {source}")]
    Decode {
        frame: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
