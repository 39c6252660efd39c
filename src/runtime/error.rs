//! Error types for the action runtime
//!
//! Wire-level failures are modelled by [`RpcError`], whose [`ErrorKind`] maps
//! onto the fixed JSON-RPC 2.0 code table. Failures that never reach the wire
//! (registration, configuration, repository lookups) use thiserror enums with
//! conversions at the dispatcher boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy shared by every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Envelope is not valid JSON.
    ParseError,
    /// Well-formed JSON that violates the request or batch contract.
    InvalidRequest,
    /// No registered action matches the requested id.
    MethodNotFound,
    /// A parameter is missing, fails its schema or cannot be converted.
    InvalidParams,
    /// A handler fault or unexpected runtime failure.
    InternalError,
}

impl ErrorKind {
    /// Numeric wire code for this kind.
    pub const fn code(self) -> i64 {
        match self {
            ErrorKind::ParseError => -32700,
            ErrorKind::InvalidRequest => -32600,
            ErrorKind::MethodNotFound => -32601,
            ErrorKind::InvalidParams => -32602,
            ErrorKind::InternalError => -32603,
        }
    }

    /// Reverse lookup used when reading responses back off the wire.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorKind::ParseError),
            -32600 => Some(ErrorKind::InvalidRequest),
            -32601 => Some(ErrorKind::MethodNotFound),
            -32602 => Some(ErrorKind::InvalidParams),
            -32603 => Some(ErrorKind::InternalError),
            _ => None,
        }
    }

    /// Stable snake_case label.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::MethodNotFound => "method_not_found",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = i64::deserialize(deserializer)?;
        ErrorKind::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {code}")))
    }
}

/// Error object carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{} ({}): {}", .kind, .kind.code(), .message)]
pub struct RpcError {
    /// Taxonomy kind, serialized as its numeric code.
    #[serde(rename = "code")]
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `parse_error`
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// `invalid_request`
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// `method_not_found` for the given action id.
    pub fn method_not_found(action: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("The action '{action}' could not be found."),
        )
        .with_data(Value::String(action.to_string()))
    }

    /// `invalid_params`
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// `internal_error`
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Numeric code of this error.
    pub fn code(&self) -> i64 {
        self.kind.code()
    }
}

/// Failure reported by an action handler.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A structured error surfaced to the caller verbatim.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Any other fault; reported as `internal_error`.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ActionError {
    /// Convert into the error placed on the wire.
    pub fn into_rpc(self) -> RpcError {
        match self {
            ActionError::Rpc(error) => error,
            ActionError::Internal(error) => RpcError::internal_error(format!("{error:#}")),
        }
    }
}

/// Convenience result alias for handlers.
pub type ActionResult<T> = std::result::Result<T, ActionError>;

/// Registration-time failures; raised before any request is served.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// An action with the same id is already registered.
    #[error("Action '{0}' is already registered")]
    Duplicate(String),

    /// Action ids must be non-empty.
    #[error("Action ids must not be empty")]
    EmptyId,

    /// The action definition was built without a handler.
    #[error("Action '{0}' has no handler")]
    MissingHandler(String),

    /// A parameter declares neither a schema nor a factory.
    #[error("Parameter '{param}' of action '{action}' must define either a factory or a schema")]
    MissingSchemaOrFactory {
        /// Action identifier
        action: String,
        /// Offending parameter
        param: String,
    },

    /// A parameter names a factory that is not registered.
    #[error("Parameter '{param}' of action '{action}' uses unknown parameter factory '{factory}'")]
    UnknownFactory {
        /// Action identifier
        action: String,
        /// Offending parameter
        param: String,
        /// Requested factory name
        factory: String,
    },

    /// A factory with the same name is already registered.
    #[error("Parameter factory '{0}' is already registered")]
    DuplicateFactory(String),

    /// Parameter ids do not match the positional/by-name mode.
    #[error("Invalid parameter layout for action '{action}': {detail}")]
    ParameterLayout {
        /// Action identifier
        action: String,
        /// Description of the problem
        detail: String,
    },

    /// A declared or factory-provided schema does not compile.
    #[error("Invalid schema for '{target}' of action '{action}': {detail}")]
    InvalidSchema {
        /// Action identifier
        action: String,
        /// Parameter id or `result`
        target: String,
        /// Compiler message
        detail: String,
    },
}

/// Convenience result alias for registration.
pub type RegistrationResult<T> = std::result::Result<T, RegistrationError>;

/// Envelope-level failure raised by the request normalizer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestParseError {
    /// The payload is not JSON at all.
    #[error("Malformed JSON payload: {0}")]
    Syntax(String),

    /// The payload is JSON but not a request or a batch of requests.
    #[error("{0}")]
    Envelope(String),
}

impl RequestParseError {
    /// Error object placed in the single top-level error response.
    pub fn to_rpc(&self) -> RpcError {
        match self {
            RequestParseError::Syntax(_) => RpcError::parse_error(self.to_string()),
            RequestParseError::Envelope(_) => RpcError::invalid_request(self.to_string()),
        }
    }
}

/// Failures of the entity repository collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The repository does not know this entity type.
    #[error("Unsupported entity type '{0}'")]
    UnsupportedType(String),

    /// Storage backend failure.
    #[error("Repository backend failure: {0}")]
    Backend(String),
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Setting that fails validation after loading
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
