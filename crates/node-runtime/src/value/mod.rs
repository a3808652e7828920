//! # Shared Values
//!
//! A `SharedValue` is a named, timestamped datum kept in sync across every
//! node that hosts the same URI.
//!
//! - `state`: the synchronized core shared with handlers
//! - `shared`: the user-facing handle and its creation protocol
//! - `history`: the archive port behind `get_history`

pub mod history;
pub mod shared;
pub mod state;

pub use history::{history_procedure, EmptyHistory, HistoryPoint, HistoryProvider};
pub use shared::{SharedValue, SharedValueBuilder};
pub use state::{MetadataChange, UpdateOutcome, ValueChange, ValueCore, ValueSnapshot};
