//! # Domain Layer
//!
//! Frames, errors and configuration of the RPC transport.

pub mod config;
pub mod errors;
pub mod frame;

pub use config::RpcConfig;
pub use errors::{ProcedureError, RemoteError, RpcError};
pub use frame::{BadRequest, MalformedReply, ReplyStatus, RpcReply, RpcRequest, BOUNDARY, RESERVED_NAMES};
