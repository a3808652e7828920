//! # Domain Layer
//!
//! Request bookkeeping, configuration and the reducers shared by the
//! built-in survey kinds.

pub mod config;
pub mod errors;
pub mod pending;
pub mod reducers;

pub use config::{SurveyConfig, SurveyOptions};
pub use errors::SurveyError;
pub use pending::{PendingGuard, PendingTable, RecordOutcome, Reply};
