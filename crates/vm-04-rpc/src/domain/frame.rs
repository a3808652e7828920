//! # RPC Frames
//!
//! Parsing and rendering of request and reply part lists. The boundary
//! marker separates the route prefix from the payload parts.

use super::errors::RemoteError;
use crate::codec::Multipart;
use bytes::Bytes;
use serde_json::{Map, Value};
use shared_types::RequestId;

/// Separates the route prefix from the rest of the message.
pub const BOUNDARY: &[u8] = b"|";

const STATUS_OK: &[u8] = b"OK";
const STATUS_FAIL: &[u8] = b"FAIL";

/// Names that can never be registered as procedures.
pub const RESERVED_NAMES: &[&str] = &["", "|", "OK", "FAIL"];

/// A call request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub route: Vec<Bytes>,
    pub req_id: RequestId,
    pub procedure: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl RpcRequest {
    pub fn to_parts(&self) -> Result<Multipart, serde_json::Error> {
        let mut parts = self.route.clone();
        parts.push(Bytes::from_static(BOUNDARY));
        parts.push(Bytes::copy_from_slice(self.req_id.as_str().as_bytes()));
        parts.push(Bytes::copy_from_slice(self.procedure.as_bytes()));
        parts.push(Bytes::from(serde_json::to_vec(&self.args)?));
        parts.push(Bytes::from(serde_json::to_vec(&self.kwargs)?));
        Ok(parts)
    }

    /// Parse a request.
    ///
    /// `Err(Some(..))` means the frame is unusable but still carries
    /// enough addressing to be answered with a failure.
    pub fn from_parts(parts: &[Bytes]) -> Result<Self, Option<BadRequest>> {
        let boundary = parts.iter().position(|p| p.as_ref() == BOUNDARY).ok_or(None::<BadRequest>)?;
        let route = parts[..boundary].to_vec();
        let rest = &parts[boundary + 1..];
        let req_id = rest
            .first()
            .map(|id| RequestId::from_wire(String::from_utf8_lossy(id)))
            .ok_or(None::<BadRequest>)?;
        let bad = |reason: String| {
            Some(BadRequest {
                route: route.clone(),
                req_id: req_id.clone(),
                reason,
            })
        };

        // req_id, procedure, args, kwargs
        if rest.len() < 4 {
            return Err(bad(format!("Truncated request with {} parts", parts.len())));
        }
        let procedure = std::str::from_utf8(&rest[1])
            .map_err(|_| bad("Procedure name is not UTF-8".to_string()))?
            .to_string();
        let args: Vec<Value> =
            serde_json::from_slice(&rest[2]).map_err(|e| bad(format!("Bad args: {e}")))?;
        let kwargs: Map<String, Value> =
            serde_json::from_slice(&rest[3]).map_err(|e| bad(format!("Bad kwargs: {e}")))?;

        Ok(Self {
            route,
            req_id,
            procedure,
            args,
            kwargs,
        })
    }
}

/// A request that parsed far enough to be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRequest {
    pub route: Vec<Bytes>,
    pub req_id: RequestId,
    pub reason: String,
}

/// Outcome carried by a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyStatus {
    Ok(Value),
    Fail(RemoteError),
}

/// A call reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    pub route: Vec<Bytes>,
    pub req_id: RequestId,
    pub status: ReplyStatus,
}

/// A reply that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReply {
    /// Present when the frame still identifies the call it answers.
    pub req_id: Option<RequestId>,
    /// Set when the status part is neither OK nor FAIL.
    pub bad_status: Option<String>,
    pub reason: String,
}

impl RpcReply {
    pub fn to_parts(&self) -> Result<Multipart, serde_json::Error> {
        let (status, payload) = match &self.status {
            ReplyStatus::Ok(value) => (STATUS_OK, serde_json::to_vec(value)?),
            ReplyStatus::Fail(err) => (STATUS_FAIL, serde_json::to_vec(err)?),
        };
        let mut parts = self.route.clone();
        parts.push(Bytes::from_static(BOUNDARY));
        parts.push(Bytes::copy_from_slice(self.req_id.as_str().as_bytes()));
        parts.push(Bytes::from_static(status));
        parts.push(Bytes::from(payload));
        Ok(parts)
    }

    /// Parse a reply received by a client. Clients send no route, so the
    /// boundary must come first.
    pub fn from_parts(parts: &[Bytes]) -> Result<Self, MalformedReply> {
        let req_id = match (parts.first(), parts.get(1)) {
            (Some(boundary), Some(id)) if boundary.as_ref() == BOUNDARY => {
                Some(RequestId::from_wire(String::from_utf8_lossy(id)))
            }
            _ => None,
        };
        let malformed = |reason: String| MalformedReply {
            req_id: req_id.clone(),
            bad_status: None,
            reason,
        };

        let Some(id) = req_id.clone().filter(|_| parts.len() >= 4) else {
            return Err(malformed(format!("Bad reply with {} parts", parts.len())));
        };

        let status = match parts[2].as_ref() {
            STATUS_OK => match serde_json::from_slice(&parts[3]) {
                Ok(value) => ReplyStatus::Ok(value),
                Err(e) => return Err(malformed(format!("Bad OK payload: {e}"))),
            },
            STATUS_FAIL => match serde_json::from_slice(&parts[3]) {
                Ok(err) => ReplyStatus::Fail(err),
                Err(e) => return Err(malformed(format!("Bad FAIL payload: {e}"))),
            },
            other => {
                let status = String::from_utf8_lossy(other).into_owned();
                return Err(MalformedReply {
                    req_id: Some(id),
                    bad_status: Some(status.clone()),
                    reason: format!("Bad message type: {status}"),
                });
            }
        };

        Ok(Self {
            route: Vec::new(),
            req_id: id,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_request_layout() {
        let request = RpcRequest {
            route: vec![b("peer-a")],
            req_id: RequestId::from_wire("1f"),
            procedure: "add".into(),
            args: vec![json!(1), json!(2)],
            kwargs: Map::new(),
        };
        let parts = request.to_parts().unwrap();
        assert_eq!(parts, vec![b("peer-a"), b("|"), b("1f"), b("add"), b("[1,2]"), b("{}")]);
        assert_eq!(RpcRequest::from_parts(&parts).unwrap(), request);
    }

    #[test]
    fn test_request_without_route() {
        let parts = vec![b("|"), b("7"), b("ping"), b("[]"), b("{\"x\":1}")];
        let request = RpcRequest::from_parts(&parts).unwrap();
        assert!(request.route.is_empty());
        assert_eq!(request.kwargs["x"], json!(1));
    }

    #[test]
    fn test_request_without_boundary_is_unanswerable() {
        let parts = vec![b("7"), b("ping"), b("[]"), b("{}")];
        assert_eq!(RpcRequest::from_parts(&parts), Err(None));
    }

    #[test]
    fn test_request_with_bad_args_is_answerable() {
        let parts = vec![b("|"), b("7"), b("ping"), b("not json"), b("{}")];
        match RpcRequest::from_parts(&parts) {
            Err(Some(bad)) => {
                assert!(bad.route.is_empty());
                assert_eq!(bad.req_id.as_str(), "7");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fail_reply_parses() {
        let reply = RpcReply {
            route: vec![],
            req_id: RequestId::from_wire("a"),
            status: ReplyStatus::Fail(RemoteError {
                kind: "KeyError".into(),
                message: "x".into(),
                trace: "tb".into(),
            }),
        };
        let parts = reply.to_parts().unwrap();
        assert_eq!(parts[2], b("FAIL"));
        assert_eq!(RpcReply::from_parts(&parts).unwrap(), reply);
    }

    #[test]
    fn test_short_reply_keeps_request_id() {
        let err = RpcReply::from_parts(&[b("|"), b("a"), b("OK")]).unwrap_err();
        assert_eq!(err.req_id, Some(RequestId::from_wire("a")));
        assert_eq!(err.bad_status, None);

        let err = RpcReply::from_parts(&[b("garbage")]).unwrap_err();
        assert_eq!(err.req_id, None);
    }

    #[test]
    fn test_unknown_status() {
        let err = RpcReply::from_parts(&[b("|"), b("a"), b("MAYBE"), b("1")]).unwrap_err();
        assert_eq!(err.bad_status.as_deref(), Some("MAYBE"));
    }
}
