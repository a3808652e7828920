//! # Shared Bus - Local Observer Fan-Out
//!
//! The process-wide value-change notification primitive used by shared
//! values and event handlers.
//!
//! ## Dispatch Model
//!
//! ```text
//! ┌──────────────┐   notify(args)   ┌──────────────┐
//! │  Publisher   │ ───────────────→ │  Observable  │
//! └──────────────┘                  └──────┬───────┘
//!                                          │ one task per observer
//!                        ┌─────────────────┼─────────────────┐
//!                        ↓                 ↓                 ↓
//!                   observer A        observer B        observer C
//! ```
//!
//! - Fire-and-forget: `notify` never waits for observers.
//! - A panicking observer only kills its own task.
//! - No ordering guarantee across observers.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod observable;

pub use observable::{Observable, Observer, ObserverId};
