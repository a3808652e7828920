//! # History Port
//!
//! Archived values answer `<uri>.get_history_impl` over RPC with a list of
//! `[value, timestamp, tags]` points. What backs the archive is up to the
//! `HistoryProvider` implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use shared_types::{Payload, Tags, Timestamp};
use vm_04_rpc::ProcedureError;

/// Suffix of the per-value history procedure.
pub const HISTORY_PROCEDURE_SUFFIX: &str = ".get_history_impl";

/// Name of the history procedure for `uri`.
#[must_use]
pub fn history_procedure(uri: &str) -> String {
    format!("{uri}{HISTORY_PROCEDURE_SUFFIX}")
}

/// One archived sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub value: Payload,
    pub timestamp: Timestamp,
    pub tags: Tags,
}

impl HistoryPoint {
    #[must_use]
    pub fn new(value: Payload, timestamp: Timestamp, tags: Tags) -> Self {
        Self { value, timestamp, tags }
    }

    /// `[value, ts_float, tags]`
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!([self.value, self.timestamp.as_secs_f64(), self.tags])
    }

    /// Parse `[value, ts_float, tags]`. Tags may be missing or null.
    pub fn from_wire(point: &Value) -> Result<Self, String> {
        let items = point.as_array().ok_or_else(|| format!("expected a list, got {point}"))?;
        let value = items.first().cloned().ok_or("empty history point")?;
        let ts = items
            .get(1)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("missing timestamp in {point}"))?;
        let tags = match items.get(2) {
            None | Some(Value::Null) => Tags::new(),
            Some(Value::Object(tags)) => tags.clone(),
            Some(other) => return Err(format!("tags must be a map, got {other}")),
        };
        Ok(Self::new(value, Timestamp::from_secs_f64(ts), tags))
    }
}

/// Backing store for an archived value.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Samples of `uri` with `start <= timestamp <= end`, oldest first.
    async fn history(
        &self,
        uri: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<HistoryPoint>, ProcedureError>;
}

/// A provider with nothing archived.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHistory;

#[async_trait]
impl HistoryProvider for EmptyHistory {
    async fn history(
        &self,
        _uri: &str,
        _start: Timestamp,
        _end: Timestamp,
    ) -> Result<Vec<HistoryPoint>, ProcedureError> {
        Ok(Vec::new())
    }
}

/// Parse the `[[start, end]]` argument list of a history call.
pub(crate) fn parse_period(args: &[Value]) -> Result<(Timestamp, Timestamp), ProcedureError> {
    let period = args
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| ProcedureError::new("ValueError", "expected [start, end] as first argument"))?;
    match (period.first().and_then(Value::as_f64), period.get(1).and_then(Value::as_f64)) {
        (Some(start), Some(end)) => Ok((Timestamp::from_secs_f64(start), Timestamp::from_secs_f64(end))),
        _ => Err(ProcedureError::new("ValueError", format!("bad time period {}", Value::Array(period.clone())))),
    }
}
