//! Request, parameter bag and response objects
//!
//! These are the per-batch values that flow through the dispatcher. They are
//! created for one batch, owned by the executing call stack and never shared.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::cache::CacheabilityMetadata;
use super::error::RpcError;
use super::factory::Pagination;
use super::repository::Entity;

/// Correlation id of a request.
///
/// `Notification` is distinct from `Id(Value::Null)`: a literal `null` id is a
/// legitimate id and still gets a response.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestId {
    /// Caller-supplied id (string, number or null).
    Id(Value),
    /// No `id` member was present; no response is expected.
    Notification,
}

impl RequestId {
    /// Whether this is the notification marker.
    pub fn is_notification(&self) -> bool {
        matches!(self, RequestId::Notification)
    }

    /// The id echoed on responses. Notifications map to `null`.
    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Id(value) => value.clone(),
            RequestId::Notification => Value::Null,
        }
    }
}

impl From<Value> for RequestId {
    fn from(value: Value) -> Self {
        RequestId::Id(value)
    }
}

/// A single action invocation, normalized from the wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    action: String,
    id: RequestId,
    params: Option<Value>,
    in_batch: bool,
}

impl Request {
    /// Construct a request. `params` holds the raw wire value; `None` means
    /// the member was absent (or `null`).
    pub fn new(
        action: impl Into<String>,
        id: RequestId,
        params: Option<Value>,
        in_batch: bool,
    ) -> Self {
        Self {
            action: action.into(),
            id,
            params,
            in_batch,
        }
    }

    /// A standalone request expecting a response.
    pub fn call(action: impl Into<String>, id: impl Into<Value>) -> Self {
        Self::new(action, RequestId::Id(id.into()), None, false)
    }

    /// A standalone notification.
    pub fn notification(action: impl Into<String>) -> Self {
        Self::new(action, RequestId::Notification, None, false)
    }

    /// Attach raw parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Target action id.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Correlation id.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Raw parameters, if supplied.
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// Whether any parameters were supplied.
    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    /// Whether the caller expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_notification()
    }

    /// Whether the request arrived inside a multi-request envelope.
    pub fn in_batch(&self) -> bool {
        self.in_batch
    }
}

/// Parameter key: a name for by-name actions, an offset for positional ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    /// By-name parameter.
    Name(String),
    /// 0-based positional parameter.
    Index(usize),
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamId::Name(name) => f.write_str(name),
            ParamId::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for ParamId {
    fn from(name: &str) -> Self {
        ParamId::Name(name.to_string())
    }
}

impl From<String> for ParamId {
    fn from(name: String) -> Self {
        ParamId::Name(name)
    }
}

impl From<usize> for ParamId {
    fn from(index: usize) -> Self {
        ParamId::Index(index)
    }
}

impl Serialize for ParamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamId::Name(name) => serializer.serialize_str(name),
            ParamId::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

/// A parameter value produced by a parameter factory.
#[derive(Clone)]
pub enum BoundValue {
    /// Validated JSON passed through unchanged.
    Json(Value),
    /// Offset/limit pair.
    Pagination(Pagination),
    /// Entity loaded through the repository.
    Entity(Entity),
    /// Output of a registry-provided factory.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl BoundValue {
    /// JSON view of the value, when one exists.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            BoundValue::Json(value) => Some(value.clone()),
            BoundValue::Pagination(page) => serde_json::to_value(page).ok(),
            BoundValue::Entity(entity) => serde_json::to_value(entity).ok(),
            BoundValue::Custom(_) => None,
        }
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            BoundValue::Pagination(page) => f.debug_tuple("Pagination").field(page).finish(),
            BoundValue::Entity(entity) => f.debug_tuple("Entity").field(entity).finish(),
            BoundValue::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Bound parameters of one request, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParameterBag {
    entries: Vec<(ParamId, BoundValue)>,
    positional: bool,
}

impl ParameterBag {
    /// Empty bag.
    pub fn new(positional: bool) -> Self {
        Self {
            entries: Vec::new(),
            positional,
        }
    }

    /// Append a bound value. Later inserts for the same id replace earlier ones.
    pub fn insert(&mut self, id: ParamId, value: BoundValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == id) {
            slot.1 = value;
        } else {
            self.entries.push((id, value));
        }
    }

    /// Look up a bound value.
    pub fn get(&self, id: impl Into<ParamId>) -> Option<&BoundValue> {
        let id = id.into();
        self.entries
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, value)| value)
    }

    /// Whether a value is bound for `id`.
    pub fn contains(&self, id: impl Into<ParamId>) -> bool {
        self.get(id).is_some()
    }

    /// JSON value bound by the raw factory.
    pub fn json(&self, id: impl Into<ParamId>) -> Option<&Value> {
        match self.get(id)? {
            BoundValue::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Pagination bound by the pagination factory.
    pub fn pagination(&self, id: impl Into<ParamId>) -> Option<&Pagination> {
        match self.get(id)? {
            BoundValue::Pagination(page) => Some(page),
            _ => None,
        }
    }

    /// Entity bound by the entity reference factory.
    pub fn entity(&self, id: impl Into<ParamId>) -> Option<&Entity> {
        match self.get(id)? {
            BoundValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Typed output of a custom factory.
    pub fn custom<T: Any + Send + Sync>(&self, id: impl Into<ParamId>) -> Option<&T> {
        match self.get(id)? {
            BoundValue::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamId, &BoundValue)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the bag was bound positionally.
    pub fn is_positional(&self) -> bool {
        self.positional
    }
}

/// Success or failure payload of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Handler result.
    Result(Value),
    /// Error object.
    Error(RpcError),
}

/// Response to a single non-notification request.
///
/// Exactly one of result/error is present by construction; the wire
/// deserializer rejects payloads that carry both or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    id: Value,
    outcome: Outcome,
    result_schema: Option<Value>,
    cacheability: CacheabilityMetadata,
}

impl Response {
    /// Successful response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
            result_schema: None,
            cacheability: CacheabilityMetadata::default(),
        }
    }

    /// Error response.
    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
            result_schema: None,
            cacheability: CacheabilityMetadata::default(),
        }
    }

    /// Attach the action's declared result schema.
    pub fn with_result_schema(mut self, schema: Option<Value>) -> Self {
        self.result_schema = schema;
        self
    }

    /// Attach cacheability metadata.
    pub fn with_cacheability(mut self, cacheability: CacheabilityMetadata) -> Self {
        self.cacheability = cacheability;
        self
    }

    /// Echoed id (`null` when unknown).
    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Result or error.
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Result value, for successful responses.
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// Error object, for failed responses.
    pub fn error_object(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(error) => Some(error),
        }
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Declared result schema, if any.
    pub fn result_schema(&self) -> Option<&Value> {
        self.result_schema.as_ref()
    }

    /// Cacheability of this response.
    pub fn cacheability(&self) -> &CacheabilityMetadata {
        &self.cacheability
    }

    /// Wire form as a JSON value.
    pub fn to_wire(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert("id".into(), self.id.clone());
        match &self.outcome {
            Outcome::Result(value) => {
                object.insert("result".into(), value.clone());
            }
            Outcome::Error(error) => {
                object.insert(
                    "error".into(),
                    serde_json::to_value(error).unwrap_or(Value::Null),
                );
            }
        }
        Value::Object(object)
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: Value,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

/// Distinguishes `"result": null` from an absent member.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (result, error) = match &self.outcome {
            Outcome::Result(value) => (Some(value.clone()), None),
            Outcome::Error(error) => (None, Some(error.clone())),
        };
        WireResponse {
            id: self.id.clone(),
            result,
            error,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireResponse::deserialize(deserializer)?;
        match (wire.result, wire.error) {
            (Some(result), None) => Ok(Response::success(wire.id, result)),
            (None, Some(error)) => Ok(Response::error(wire.id, error)),
            (Some(_), Some(_)) => Err(serde::de::Error::custom(
                "response carries both a result and an error",
            )),
            (None, None) => Err(serde::de::Error::custom(
                "response carries neither a result nor an error",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_marker_differs_from_null_id() {
        let null_id = Request::call("ping", Value::Null);
        let notification = Request::notification("ping");
        assert!(!null_id.is_notification());
        assert!(notification.is_notification());
        assert_eq!(null_id.id().to_value(), Value::Null);
    }

    #[test]
    fn test_bag_keeps_declaration_order() {
        let mut bag = ParameterBag::new(false);
        bag.insert("b".into(), BoundValue::Json(json!(2)));
        bag.insert("a".into(), BoundValue::Json(json!(1)));
        let ids: Vec<_> = bag.iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(bag.json("a"), Some(&json!(1)));
        assert!(bag.pagination("a").is_none());
        assert_eq!(bag.len(), 2);
        assert!(!ParameterBag::default().contains("a"));
    }

    #[test]
    fn test_custom_values_downcast() {
        let mut bag = ParameterBag::new(true);
        bag.insert(ParamId::Index(0), BoundValue::Custom(Arc::new(42u32)));
        assert_eq!(bag.custom::<u32>(0usize), Some(&42));
        assert_eq!(bag.custom::<String>(0usize), None);
        assert!(bag.is_positional());
    }

    #[test]
    fn test_response_wire_shape() {
        let ok = Response::success(json!(1), json!("pong"));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"id": 1, "result": "pong"}));
        assert_eq!(ok.to_wire(), json!({"id": 1, "result": "pong"}));

        let null_result = Response::success(json!("a"), Value::Null);
        assert_eq!(
            serde_json::to_value(&null_result).unwrap(),
            json!({"id": "a", "result": null})
        );

        let failed = Response::error(Value::Null, RpcError::internal_error("boom"));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"id": null, "error": {"code": -32603, "message": "boom"}})
        );
    }

    #[test]
    fn test_deserializer_enforces_exactly_one_of_result_or_error() {
        let ok: Response = serde_json::from_value(json!({"id": 1, "result": null})).unwrap();
        assert_eq!(ok.result(), Some(&Value::Null));

        let both = serde_json::from_value::<Response>(json!({
            "id": 1, "result": 1, "error": {"code": -32603, "message": "x"}
        }));
        assert!(both.is_err());

        let neither = serde_json::from_value::<Response>(json!({"id": 1}));
        assert!(neither.is_err());
    }
}
