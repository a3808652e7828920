//! # Integration Tests
//!
//! Every module spins up real nodes on a `LocalMesh`; RPC and pub/sub go
//! over loopback TCP.

pub mod config;
pub mod lifecycle;
pub mod rpc;
pub mod surveys;
pub mod values;
