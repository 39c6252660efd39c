//! Transport-level replies
//!
//! Maps batch results and discovery documents onto HTTP-style status codes:
//! `200` with a JSON array of responses, `204` with no body when a batch
//! produced no responses, `400` with a single error response when the
//! envelope is rejected, and `404` when describing an action the caller
//! cannot see.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::cache::CacheabilityMetadata;
use crate::runtime::discovery::DiscoveryDocument;
use crate::runtime::dispatch::BatchResult;
use crate::runtime::error::RequestParseError;
use crate::runtime::object::Response;
use crate::runtime::{Caller, Runtime};

/// Cache context of replies that vary by the submitted query.
pub const QUERY_CONTEXT: &str = "url.query_args:query";

/// Body present.
pub const STATUS_OK: u16 = 200;
/// No response to return.
pub const STATUS_NO_CONTENT: u16 = 204;
/// Envelope rejected before dispatch.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Requested action unknown or not viewable.
pub const STATUS_NOT_FOUND: u16 = 404;

/// Status, optional body and cacheability of one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// HTTP-style status code
    pub status: u16,
    /// JSON body; absent for `204`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Aggregated cacheability
    pub cacheability: CacheabilityMetadata,
}

impl Reply {
    /// Reply for a submitted batch.
    pub fn from_batch(outcome: Result<BatchResult, RequestParseError>) -> Self {
        let query = CacheabilityMetadata::default().with_context(QUERY_CONTEXT);
        match outcome {
            Ok(batch) => {
                let cacheability = batch.cacheability.clone().merged(&query);
                match batch.to_wire() {
                    Some(body) => Reply {
                        status: STATUS_OK,
                        body: Some(body),
                        cacheability,
                    },
                    None => Reply {
                        status: STATUS_NO_CONTENT,
                        body: None,
                        cacheability,
                    },
                }
            }
            Err(err) => Reply {
                status: STATUS_BAD_REQUEST,
                body: Some(Response::error(Value::Null, err.to_rpc()).to_wire()),
                cacheability: query,
            },
        }
    }

    /// Reply for a discovery document.
    pub fn from_discovery(document: DiscoveryDocument) -> Self {
        let status = if document.document.is_some() {
            STATUS_OK
        } else {
            STATUS_NOT_FOUND
        };
        Reply {
            status,
            body: document.document,
            cacheability: document.cacheability,
        }
    }

    /// Whether the reply carries a body.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// Parse and execute `payload`, mapped to a reply.
pub fn submit(runtime: &Runtime, payload: &str, caller: &dyn Caller) -> Reply {
    Reply::from_batch(runtime.submit(payload, caller))
}

/// Execute an already decoded payload, mapped to a reply.
pub fn submit_value(runtime: &Runtime, payload: Value, caller: &dyn Caller) -> Reply {
    Reply::from_batch(runtime.submit_value(payload, caller))
}

/// List viewable actions.
pub fn list(runtime: &Runtime, caller: &dyn Caller) -> Reply {
    Reply::from_discovery(runtime.list_actions(caller))
}

/// Describe one action.
pub fn describe(runtime: &Runtime, id: &str, caller: &dyn Caller) -> Reply {
    Reply::from_discovery(runtime.describe_action(id, caller))
}
