//! # Survey Engine
//!
//! **Subsystem ID:** 2
//!
//! Broadcast a question to the `SURVEY` group and collect the answers of
//! up to `limit_peers` peers, or whatever arrived before the timeout.
//!
//! ## Request lifecycle
//!
//! ```text
//! ask() ──► ISSUED ──reply──► COLLECTING ──limit reached──► SATISFIED ─┐
//!              │                   │                                   ├─► RETIRED
//!              └───────────────────┴──────────timeout──────► TIMED_OUT ┘
//! ```
//!
//! A request id lives in the pending table only between ISSUED and
//! RETIRED. Retirement happens exactly once, when `ask` returns or its
//! future is dropped; late replies are then logged and discarded.
//!
//! ## Handlers
//!
//! Each survey kind is a `SurveyHandler` registered by name. The same
//! handler answers remote requests (`process_request`) and reduces the
//! collected replies of local asks (`process_result`).

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    reducers, PendingGuard, PendingTable, RecordOutcome, Reply, SurveyConfig, SurveyError, SurveyOptions,
};
pub use ports::{SurveyContext, SurveyHandler};
pub use service::{SurveyEngine, SurveyRegistry};
