//! # Inbound Port: Survey Handlers
//!
//! A handler defines one survey kind end to end: how a responder answers
//! it and how an asker folds the answers.

use crate::domain::Reply;
use serde_json::{Map, Value};
use shared_types::{PeerId, RequestId};

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyContext {
    pub peer: PeerId,
    pub peer_name: String,
    pub req_id: RequestId,
}

/// One named survey kind.
pub trait SurveyHandler: Send + Sync {
    /// Registry key, also the `function` field on the wire.
    fn name(&self) -> &str;

    /// How many replies complete an ask when the caller does not say.
    fn default_limit_peers(&self) -> usize {
        1
    }

    /// Answer a remote request. `None` means stay silent.
    fn process_request(&self, ctx: &SurveyContext, args: &[Value], kwargs: &Map<String, Value>)
        -> Option<Value>;

    /// Fold the replies of a local ask.
    fn process_result(&self, replies: Vec<Reply>) -> Value;
}
