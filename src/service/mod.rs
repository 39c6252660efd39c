//! NDJSON service for the action runtime.
//!
//! This module exposes a small command loop that translates newline-delimited
//! JSON commands into calls on the [`Runtime`]. It backs the `actionrpcd`
//! daemon: commands are processed sequentially, one reply line per command,
//! and unsupported operations return structured errors.
//!
//! Commands are objects `{"id": <any>, "op": <name>, "params": {...}}`:
//!
//! - `handshake`: `{client, protocol_version}`
//! - `resolve`: `{payload}`, where `payload` is a request envelope (or its
//!   JSON text); replies with the mapped [`Reply`]
//! - `actions`: lists viewable actions
//! - `action`: `{id}`, describes one action

pub mod reply;

pub use reply::Reply;

use crate::PROTOCOL_VERSION;
use crate::runtime::{Caller, CallerIdentity, Runtime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Service entry point: wraps a [`Runtime`] and the identity its commands run as.
pub struct Service {
    runtime: Runtime,
    caller: CallerIdentity,
}

impl Service {
    /// Create a new service around `runtime`, acting as `caller`.
    pub fn new(runtime: Runtime, caller: CallerIdentity) -> Self {
        Self { runtime, caller }
    }

    /// Service acting as the caller named in the runtime configuration.
    pub fn from_config(runtime: Runtime) -> Self {
        let caller = runtime.config().caller.clone();
        Self::new(runtime, caller)
    }

    /// Runtime served by this service.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Process a single connection by consuming commands from the reader and writing replies.
    pub fn handle<R: BufRead, W: Write>(&self, reader: R, writer: W) -> io::Result<()> {
        let mut session = Session::new(&self.runtime, &self.caller, writer);
        session.run(reader)
    }
}

struct Session<'a, W: Write> {
    runtime: &'a Runtime,
    caller: &'a CallerIdentity,
    writer: W,
    client: Option<String>,
}

impl<'a, W: Write> Session<'a, W> {
    fn new(runtime: &'a Runtime, caller: &'a CallerIdentity, writer: W) -> Self {
        Self {
            runtime,
            caller,
            writer,
            client: None,
        }
    }

    fn run<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let envelope: Result<CommandEnvelope, _> = serde_json::from_str(&line);
            let response = match envelope {
                Ok(command) => self.handle_command(command),
                Err(err) => {
                    ResponseEnvelope::from_error(Value::Null, ServiceError::Parse(err.to_string()))
                }
            };
            self.write_response(response)?;
        }

        Ok(())
    }

    fn write_response(&mut self, envelope: ResponseEnvelope) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, &envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn handle_command(&mut self, command: CommandEnvelope) -> ResponseEnvelope {
        debug!(op = %command.op, client = ?self.client, "service command");
        match self.dispatch(&command.op, &command.params) {
            Ok(value) => ResponseEnvelope::success(command.id, value),
            Err(err) => ResponseEnvelope::from_error(command.id, err),
        }
    }

    fn dispatch(&mut self, op: &str, params: &Value) -> Result<Value, ServiceError> {
        match op {
            "handshake" => self.cmd_handshake(params),
            "resolve" => self.cmd_resolve(params),
            "actions" => self.cmd_actions(),
            "action" => self.cmd_action(params),
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn cmd_handshake(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let client = params
            .get("client")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("client"))?;

        let requested = params
            .get("protocol_version")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("protocol_version"))?;

        if requested != PROTOCOL_VERSION {
            return Err(ServiceError::Protocol(format!(
                "unsupported protocol version: expected {}, got {}",
                PROTOCOL_VERSION, requested
            )));
        }

        self.client = Some(client.to_string());

        Ok(json!({
            "protocol_version": PROTOCOL_VERSION,
            "runtime": {
                "version": crate::VERSION,
                "client": client,
                "caller": self.caller.name(),
                "actions": self.runtime.registry().len(),
                "features": ["resolve", "actions", "action"]
            }
        }))
    }

    fn cmd_resolve(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let payload = params
            .get("payload")
            .ok_or_else(|| ServiceError::invalid_param("payload"))?;

        let reply = match payload {
            Value::String(text) => reply::submit(self.runtime, text, self.caller),
            other => reply::submit_value(self.runtime, other.clone(), self.caller),
        };
        to_value(&reply)
    }

    fn cmd_actions(&mut self) -> Result<Value, ServiceError> {
        to_value(&reply::list(self.runtime, self.caller))
    }

    fn cmd_action(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let id = params
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("id"))?;
        to_value(&reply::describe(self.runtime, id, self.caller))
    }
}

fn to_value(reply: &Reply) -> Result<Value, ServiceError> {
    serde_json::to_value(reply).map_err(|err| ServiceError::Internal(err.to_string()))
}

#[derive(Debug)]
enum ServiceError {
    Parse(String),
    InvalidParams(String),
    Unsupported(String),
    Protocol(String),
    Internal(String),
}

impl ServiceError {
    fn invalid_param(name: &str) -> Self {
        ServiceError::InvalidParams(format!("missing or invalid parameter: {}", name))
    }
}

#[derive(Deserialize)]
struct CommandEnvelope {
    #[serde(default)]
    id: Value,
    op: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn from_error(id: Value, error: ServiceError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorEnvelope::from(error)),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(error: ServiceError) -> Self {
        let (code, message) = match error {
            ServiceError::Parse(message) => ("parse_error", message),
            ServiceError::InvalidParams(message) => ("invalid_params", message),
            ServiceError::Unsupported(op) => {
                ("unsupported_command", format!("Command '{op}' is not supported"))
            }
            ServiceError::Protocol(message) => ("protocol_error", message),
            ServiceError::Internal(message) => ("internal_error", message),
        };
        ErrorEnvelope {
            code: code.into(),
            message,
        }
    }
}
