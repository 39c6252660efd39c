//! Dispatcher and batch executor
//!
//! The dispatcher walks one request through lookup, parameter binding, the
//! access gate and handler execution. Every failure on the way becomes an
//! error response carrying the request id; handler errors and panics are
//! caught and never escape. Notifications run the same pipeline but produce
//! no output, successful or not.
//!
//! The batch executor runs the dispatcher over a batch sequentially, in
//! order, and aggregates cacheability across the surviving responses.

use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::access::{AccessGate, Caller, Operation};
use super::action::{Action, ActionContext};
use super::binder::ParameterBinder;
use super::cache::CacheabilityMetadata;
use super::error::RpcError;
use super::object::{Request, Response};
use super::registry::ActionRegistry;
use super::repository::EntityRepository;

/// Per-request pipeline over an immutable registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ActionRegistry,
    repository: Arc<dyn EntityRepository>,
    validate_results: bool,
}

impl Dispatcher {
    /// Dispatcher over `registry`, resolving entities through `repository`.
    pub fn new(registry: ActionRegistry, repository: Arc<dyn EntityRepository>) -> Self {
        Self {
            registry,
            repository,
            validate_results: false,
        }
    }

    /// Check successful results against the declared result schema and log
    /// mismatches.
    pub fn with_result_validation(mut self, enabled: bool) -> Self {
        self.validate_results = enabled;
        self
    }

    /// Registry this dispatcher reads from.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Entity repository handed to parameter factories.
    pub fn repository(&self) -> &Arc<dyn EntityRepository> {
        &self.repository
    }

    /// Dispatch one request. Returns `None` for notifications.
    pub fn dispatch(&self, request: &Request, caller: &dyn Caller) -> Option<Response> {
        let mut cacheability = CacheabilityMetadata::default();
        // Factories and predicates are extension points too; none may unwind
        // past this request.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(request, caller, &mut cacheability)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(action = %request.action(), panic = %message, "dispatch panicked");
            Err(RpcError::internal_error(format!(
                "The {} action failed: {message}",
                request.action()
            )))
        });

        if request.is_notification() {
            if let Err(error) = &outcome {
                debug!(action = %request.action(), error = %error, "notification failed");
            }
            return None;
        }

        let id = request.id().to_value();
        let response = match outcome {
            Ok((value, action)) => Response::success(id, value)
                .with_result_schema(action.result_schema().cloned()),
            Err(error) => Response::error(id, error),
        };
        Some(response.with_cacheability(cacheability))
    }

    /// Run a batch through this dispatcher.
    pub fn run(&self, requests: &[Request], caller: &dyn Caller) -> BatchResult {
        BatchExecutor::new(self).run(requests, caller)
    }

    fn execute(
        &self,
        request: &Request,
        caller: &dyn Caller,
        cacheability: &mut CacheabilityMetadata,
    ) -> Result<(Value, Arc<Action>), RpcError> {
        let action = self
            .registry
            .get(request.action())
            .cloned()
            .ok_or_else(|| RpcError::method_not_found(request.action()))?;
        cacheability.merge(action.cacheability());

        let params = ParameterBinder::new(self.repository.as_ref(), caller)
            .bind(&action, request.params())?;

        let decision = AccessGate::check(&action, caller, &Operation::Execute);
        cacheability.merge(&decision.cacheability);
        if !decision.is_allowed() {
            debug!(action = %action.id(), caller = %caller.name(), "access denied");
            return Err(decision.denial_error());
        }

        debug!(
            action = %action.id(),
            entry_point = %action.entry_point(),
            params = params.len(),
            "executing action"
        );
        let context = ActionContext::new(&action, caller, request.id(), request.in_batch());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            action.handler().call(action.entry_point(), &params, &context)
        }));
        cacheability.merge(&context.into_cacheability());

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                let error = error.into_rpc();
                warn!(action = %action.id(), error = %error, "action handler failed");
                return Err(error);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(action = %action.id(), panic = %message, "action handler panicked");
                return Err(RpcError::internal_error(format!(
                    "The {} action failed: {message}",
                    action.id()
                )));
            }
        };

        if self.validate_results {
            check_result(&action, &value);
        }
        Ok((value, action))
    }
}

fn check_result(action: &Action, value: &Value) {
    let Some(validator) = &action.result_validator else {
        return;
    };
    if let Err(violations) = validator.validate(value) {
        warn!(
            action = %action.id(),
            violations = ?violations,
            "result does not match the declared result schema"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected fault".to_string()
    }
}

/// Responses of one batch plus their aggregate cacheability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Non-notification responses, in request order
    pub responses: Vec<Response>,
    /// Merge of every response's cacheability
    pub cacheability: CacheabilityMetadata,
}

impl BatchResult {
    /// Whether the caller should receive no body.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Wire body: an array of responses, or `None` for "no body".
    pub fn to_wire(&self) -> Option<Value> {
        if self.responses.is_empty() {
            return None;
        }
        Some(Value::Array(self.responses.iter().map(Response::to_wire).collect()))
    }
}

/// Runs the dispatcher over a batch, strictly sequentially.
pub struct BatchExecutor<'d> {
    dispatcher: &'d Dispatcher,
}

impl<'d> BatchExecutor<'d> {
    /// Executor over `dispatcher`.
    pub fn new(dispatcher: &'d Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Dispatch every request in order; failures stay isolated to their own
    /// response.
    pub fn run(&self, requests: &[Request], caller: &dyn Caller) -> BatchResult {
        let mut result = BatchResult::default();
        for request in requests {
            if let Some(response) = self.dispatcher.dispatch(request, caller) {
                result.cacheability.merge(response.cacheability());
                result.responses.push(response);
            }
        }
        debug!(
            requests = requests.len(),
            responses = result.responses.len(),
            "batch complete"
        );
        result
    }
}
