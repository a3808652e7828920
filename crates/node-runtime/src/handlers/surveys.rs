//! Survey handlers over the local value registry.
//!
//! Each handler stays silent (`None`) when it has nothing to contribute,
//! so askers only wait for peers that actually know something.

use super::{
    SURVEY_LAST_VALUE, SURVEY_VALUES_METADATA, SURVEY_VALUE_HISTORY, SURVEY_VALUE_METADATA,
    SURVEY_VALUE_STATIC_TAGS, SURVEY_VALUE_URI,
};
use crate::registry::ValueRegistry;
use crate::value::history_procedure;
use regex::Regex;
use serde_json::{json, Map, Value};
use shared_types::{Metadata, NodeIdentity};
use std::sync::Arc;
use tracing::warn;
use vm_02_survey::{reducers, Reply, SurveyContext, SurveyHandler};
use vm_04_rpc::ProcedureTable;

fn uri_arg(args: &[Value]) -> Option<&str> {
    args.first().and_then(Value::as_str)
}

fn compile(pattern: &str, ctx: &SurveyContext) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(peer = %ctx.peer_name, pattern, error = %e, "Invalid URI pattern in survey");
            None
        }
    }
}

// =============================================================================
// URI DISCOVERY
// =============================================================================

/// Which URIs matching a regular expression do peers host?
#[derive(Debug)]
pub struct ValueUriSurvey {
    values: Arc<ValueRegistry>,
}

impl ValueUriSurvey {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>) -> Self {
        Self { values }
    }
}

impl SurveyHandler for ValueUriSurvey {
    fn name(&self) -> &str {
        SURVEY_VALUE_URI
    }

    fn default_limit_peers(&self) -> usize {
        0
    }

    fn process_request(&self, ctx: &SurveyContext, args: &[Value], _kwargs: &Map<String, Value>) -> Option<Value> {
        let pattern = compile(uri_arg(args)?, ctx)?;
        let uris = self.values.matching(&pattern);
        (!uris.is_empty()).then(|| json!(uris))
    }

    fn process_result(&self, replies: Vec<Reply>) -> Value {
        reducers::union_of_sets(replies)
    }
}

// =============================================================================
// LAST VALUE
// =============================================================================

/// What is the freshest `[value, ts, tags]` of a URI?
#[derive(Debug)]
pub struct LastValueSurvey {
    values: Arc<ValueRegistry>,
}

impl LastValueSurvey {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>) -> Self {
        Self { values }
    }
}

impl SurveyHandler for LastValueSurvey {
    fn name(&self) -> &str {
        SURVEY_LAST_VALUE
    }

    fn default_limit_peers(&self) -> usize {
        3
    }

    fn process_request(&self, _ctx: &SurveyContext, args: &[Value], _kwargs: &Map<String, Value>) -> Option<Value> {
        let core = self.values.get(uri_arg(args)?)?;
        Some(core.snapshot().to_wire())
    }

    fn process_result(&self, replies: Vec<Reply>) -> Value {
        reducers::max_by_timestamp(replies)
    }
}

// =============================================================================
// STATIC TAGS
// =============================================================================

#[derive(Debug)]
pub struct StaticTagsSurvey {
    values: Arc<ValueRegistry>,
}

impl StaticTagsSurvey {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>) -> Self {
        Self { values }
    }
}

impl SurveyHandler for StaticTagsSurvey {
    fn name(&self) -> &str {
        SURVEY_VALUE_STATIC_TAGS
    }

    fn process_request(&self, _ctx: &SurveyContext, args: &[Value], _kwargs: &Map<String, Value>) -> Option<Value> {
        let tags = self.values.get(uri_arg(args)?)?.static_tags();
        (!tags.is_empty()).then(|| Value::Object(tags))
    }

    fn process_result(&self, replies: Vec<Reply>) -> Value {
        reducers::first_or(replies, json!({}))
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Metadata of one URI, answered as `[metadata, responder identity]`.
#[derive(Debug)]
pub struct MetadataSurvey {
    values: Arc<ValueRegistry>,
    identity: NodeIdentity,
}

impl MetadataSurvey {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>, identity: NodeIdentity) -> Self {
        Self { values, identity }
    }
}

impl SurveyHandler for MetadataSurvey {
    fn name(&self) -> &str {
        SURVEY_VALUE_METADATA
    }

    fn process_request(&self, _ctx: &SurveyContext, args: &[Value], _kwargs: &Map<String, Value>) -> Option<Value> {
        let metadata = self.values.get(uri_arg(args)?)?.metadata()?;
        if metadata.is_empty() {
            return None;
        }
        Some(json!([metadata, self.identity]))
    }

    fn process_result(&self, replies: Vec<Reply>) -> Value {
        reducers::first_or(replies, json!([null, null]))
    }
}

/// Metadata of many URIs at once, by list or by pattern.
///
/// Arguments: `[uris]` where `uris` is a list of URIs, or a pattern
/// string when the `is_re` keyword is true.
#[derive(Debug)]
pub struct ValuesMetadataSurvey {
    values: Arc<ValueRegistry>,
}

impl ValuesMetadataSurvey {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>) -> Self {
        Self { values }
    }
}

impl SurveyHandler for ValuesMetadataSurvey {
    fn name(&self) -> &str {
        SURVEY_VALUES_METADATA
    }

    fn process_request(&self, ctx: &SurveyContext, args: &[Value], kwargs: &Map<String, Value>) -> Option<Value> {
        let is_re = kwargs.get("is_re").and_then(Value::as_bool).unwrap_or(false);
        let uris: Vec<String> = if is_re {
            let pattern = compile(args.first()?.as_str()?, ctx)?;
            self.values.matching(&pattern)
        } else {
            args.first()?
                .as_array()?
                .iter()
                .filter_map(|uri| uri.as_str().map(str::to_string))
                .collect()
        };

        let found: Map<String, Value> = uris
            .into_iter()
            .filter_map(|uri| {
                let metadata: Metadata = self.values.get(&uri)?.metadata()?;
                (!metadata.is_empty()).then(|| (uri, Value::Object(metadata)))
            })
            .collect();
        (!found.is_empty()).then(|| Value::Object(found))
    }

    fn process_result(&self, replies: Vec<Reply>) -> Value {
        reducers::merge_maps(replies)
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// Who can serve the history of a URI? Answered `true` by archiving hosts.
#[derive(Debug)]
pub struct HistorySurvey {
    values: Arc<ValueRegistry>,
    procedures: ProcedureTable,
}

impl HistorySurvey {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>, procedures: ProcedureTable) -> Self {
        Self { values, procedures }
    }
}

impl SurveyHandler for HistorySurvey {
    fn name(&self) -> &str {
        SURVEY_VALUE_HISTORY
    }

    fn process_request(&self, _ctx: &SurveyContext, args: &[Value], _kwargs: &Map<String, Value>) -> Option<Value> {
        let uri = uri_arg(args)?;
        (self.values.contains(uri) && self.procedures.contains(&history_procedure(uri))).then_some(Value::Bool(true))
    }

    fn process_result(&self, replies: Vec<Reply>) -> Value {
        reducers::first_affirmative_peer(replies)
    }
}
