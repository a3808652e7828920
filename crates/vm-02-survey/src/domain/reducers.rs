//! Reducers that fold collected replies into a single survey result.
//!
//! Replies come from untrusted peers. A reply that does not have the
//! expected shape is skipped, never an error.

use super::pending::Reply;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Union of string lists, returned as a sorted JSON array.
#[must_use]
pub fn union_of_sets(replies: Vec<Reply>) -> Value {
    let merged: BTreeSet<String> = replies
        .into_iter()
        .filter_map(|(_, data)| match data {
            Value::Array(items) => Some(items),
            _ => None,
        })
        .flatten()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect();
    json!(merged)
}

/// The `[value, timestamp, tags]` reply with the greatest timestamp.
///
/// Without any well-formed reply the result is `[null, 0, {}]`.
#[must_use]
pub fn max_by_timestamp(replies: Vec<Reply>) -> Value {
    let mut best: Option<(f64, Value)> = None;
    for (_, data) in replies {
        let Some(ts) = data.get(1).and_then(Value::as_f64) else {
            continue;
        };
        if best.as_ref().map_or(true, |(best_ts, _)| ts > *best_ts) {
            best = Some((ts, data));
        }
    }
    best.map_or_else(|| json!([null, 0.0, {}]), |(_, data)| data)
}

/// The first reply's data, or `default`.
#[must_use]
pub fn first_or(replies: Vec<Reply>, default: Value) -> Value {
    replies.into_iter().next().map_or(default, |(_, data)| data)
}

/// All object replies merged key by key; later replies overwrite earlier ones.
#[must_use]
pub fn merge_maps(replies: Vec<Reply>) -> Value {
    let mut merged = Map::new();
    for (_, data) in replies {
        if let Value::Object(map) = data {
            merged.extend(map);
        }
    }
    Value::Object(merged)
}

/// Name of the first peer that answered `true`, or `null`.
#[must_use]
pub fn first_affirmative_peer(replies: Vec<Reply>) -> Value {
    replies
        .into_iter()
        .find(|(_, data)| data.as_bool() == Some(true))
        .map_or(Value::Null, |(peer, _)| Value::String(peer))
}
