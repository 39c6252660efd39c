//! Request normalizer
//!
//! Turns a raw payload into a list of [`Request`]s. Three shapes are
//! accepted:
//!
//! - a flat object carrying an `action` member
//! - a keyed object `{"<action id>": {...}}` with a single member
//! - an array of either, which marks every request as part of a batch
//!
//! Envelope validation is all-or-nothing: one malformed element rejects the
//! whole payload before any request is dispatched.

use serde_json::{Map, Value};

use super::error::RequestParseError;
use super::object::{Request, RequestId};

/// Envelope members that never name an action in the keyed form.
const RESERVED_MEMBERS: [&str; 3] = ["action", "id", "params"];

/// Parse a textual payload.
pub fn parse(payload: &str) -> Result<Vec<Request>, RequestParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|err| RequestParseError::Syntax(err.to_string()))?;
    parse_value(value)
}

/// Normalize an already decoded payload.
pub fn parse_value(payload: Value) -> Result<Vec<Request>, RequestParseError> {
    match payload {
        Value::Object(envelope) => Ok(vec![parse_envelope(envelope, false)?]),
        Value::Array(elements) => elements
            .into_iter()
            .enumerate()
            .map(|(index, element)| match element {
                Value::Object(envelope) => parse_envelope(envelope, true).map_err(|err| {
                    RequestParseError::Envelope(format!("Batch element {index}: {err}"))
                }),
                _ => Err(RequestParseError::Envelope(format!(
                    "Batch element {index}: A request must be a JSON object."
                ))),
            })
            .collect(),
        _ => Err(RequestParseError::Envelope(
            "The payload must be a request object or an array of request objects.".to_string(),
        )),
    }
}

fn parse_envelope(envelope: Map<String, Value>, in_batch: bool) -> Result<Request, RequestParseError> {
    if envelope.contains_key("action") {
        return parse_flat(envelope, None, in_batch);
    }

    if envelope.len() == 1 {
        if let Some((key, Value::Object(inner))) = envelope.into_iter().next() {
            if !RESERVED_MEMBERS.contains(&key.as_str()) {
                return parse_flat(inner, Some(key), in_batch);
            }
        }
    }

    Err(RequestParseError::Envelope(
        "The request is missing the 'action' member.".to_string(),
    ))
}

fn parse_flat(
    mut envelope: Map<String, Value>,
    key: Option<String>,
    in_batch: bool,
) -> Result<Request, RequestParseError> {
    let action = match (envelope.remove("action"), key) {
        (Some(Value::String(action)), Some(key)) if action != key => {
            return Err(RequestParseError::Envelope(format!(
                "The action '{action}' does not match the envelope key '{key}'."
            )));
        }
        (Some(Value::String(action)), _) => action,
        (Some(_), _) => {
            return Err(RequestParseError::Envelope(
                "The 'action' member must be a string.".to_string(),
            ));
        }
        (None, Some(key)) => key,
        (None, None) => {
            return Err(RequestParseError::Envelope(
                "The request is missing the 'action' member.".to_string(),
            ));
        }
    };
    if action.is_empty() {
        return Err(RequestParseError::Envelope(
            "The 'action' member must not be empty.".to_string(),
        ));
    }

    let id = match envelope.remove("id") {
        None => RequestId::Notification,
        Some(id @ (Value::String(_) | Value::Number(_) | Value::Null)) => RequestId::Id(id),
        Some(_) => {
            return Err(RequestParseError::Envelope(
                "The 'id' member must be a string, a number or null.".to_string(),
            ));
        }
    };

    let params = match envelope.remove("params") {
        None | Some(Value::Null) => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
        Some(_) => {
            return Err(RequestParseError::Envelope(
                "The 'params' member must be an object or an array.".to_string(),
            ));
        }
    };

    Ok(Request::new(action, id, params, in_batch))
}
