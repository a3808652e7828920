//! # Event Engine
//!
//! **Subsystem ID:** 3
//!
//! One-way broadcast notifications on the `EVENT` group. A node only
//! receives events while it is a member of that group, and it is a member
//! only while something local cares: membership is reference counted by
//! `acquire_group` / `release_group`.
//!
//! Incoming events are routed by `event_name` to a registered
//! `EventHandler`, which typically re-broadcasts to local observers.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod engine;
mod errors;
mod handler;

pub use engine::{EventEngine, EventRegistry};
pub use errors::EventError;
pub use handler::EventHandler;
