//! # Shared Types Crate
//!
//! This crate contains the identities, timestamps and wire frames shared by
//! every subsystem of the node runtime.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every JSON shape exchanged between peers is
//!   defined here, so that survey, event and RPC crates agree on field names.
//! - **Codec-agnostic payloads**: application data travels as
//!   `serde_json::Value` (numbers, strings, booleans, null, lists, maps).
//! - **Microsecond time**: `Timestamp` is truncated to microseconds so the
//!   float-seconds wire form round-trips exactly.

pub mod entities;
pub mod errors;
pub mod ipc;

pub use entities::*;
pub use errors::*;
pub use ipc::*;
