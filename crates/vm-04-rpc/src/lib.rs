//! # Point-to-Point RPC
//!
//! **Subsystem ID:** 4
//!
//! Request/reply calls between two nodes over a dedicated TCP connection.
//!
//! ## Wire format
//!
//! Every message is a list of parts carried in one length-delimited frame:
//!
//! ```text
//! request: [route..] "|" req_id procedure args(json array) kwargs(json object)
//! reply:   [route..] "|" req_id "OK"|"FAIL" payload(json)
//! ```
//!
//! The route prefix is an opaque return address. Connections here are
//! point to point, so clients send an empty route and the server echoes
//! whatever it received.
//!
//! A FAIL payload is `{"ename", "evalue", "traceback"}` and surfaces on
//! the calling side as `RpcError::Remote`.
//!
//! ## Components
//!
//! - `RpcServer`: accepts any peer, dispatches to registered procedures
//!   with a bounded number of calls in flight.
//! - `RpcClient`: one connection to one peer; concurrent calls are
//!   multiplexed by request id.
//! - `RpcClientPool`: the per-peer clients of a node, keyed by peer name.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod codec;
pub mod domain;
pub mod procedure;
pub mod server;


pub use client::{RpcClient, RpcClientPool};
pub use codec::{Multipart, MultipartCodec};
pub use domain::{ProcedureError, RemoteError, ReplyStatus, RpcConfig, RpcError, RpcReply, RpcRequest};
pub use procedure::{procedure, Procedure, ProcedureTable};
pub use server::RpcServer;
