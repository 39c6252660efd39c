//! Runtime orchestrator and public API
//!
//! This module provides the `Runtime` struct that ties the dispatch pipeline
//! together: request normalization, the batch executor, and the discovery
//! documents built from the same registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

// Submodules
pub mod access;
pub mod action;
pub mod binder;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod object;
pub mod registry;
pub mod repository;
pub mod request;
pub mod schema;

pub use access::{AccessDecision, AccessGate, Caller, CallerIdentity, CapabilityRule, Operation, Verdict};
pub use action::{Action, ActionBuilder, ActionContext, ActionHandler, ParameterDef};
pub use cache::CacheabilityMetadata;
pub use discovery::{Discovery, DiscoveryDocument};
pub use dispatch::{BatchExecutor, BatchResult, Dispatcher};
pub use error::{ActionError, ActionResult, ErrorKind, RegistrationError, RequestParseError, RpcError};
pub use factory::{Pagination, ParameterFactory};
pub use object::{BoundValue, ParamId, ParameterBag, Request, RequestId, Response};
pub use registry::{ActionCatalog, ActionRegistry};
pub use repository::{Entity, EntityRepository, NullRepository};

/// Configuration for the action runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Prefix of the links published in discovery documents
    pub base_url: String,

    /// Check successful results against the declared result schema
    pub validate_results: bool,

    /// Identity used by the bundled binaries
    pub caller: CallerIdentity,

    /// TCP address for the daemon; stdio when unset
    pub listen: Option<String>,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            validate_results: false,
            caller: CallerIdentity::anonymous(),
            listen: None,
            log_filter: "info".to_string(),
        }
    }
}

/// The action runtime
///
/// Owns an immutable registry snapshot and the dispatcher built over it.
/// Every method takes `&self`; one runtime can serve concurrent batches.
#[derive(Clone)]
pub struct Runtime {
    config: RuntimeConfig,
    dispatcher: Dispatcher,
}

impl Runtime {
    /// Create a runtime over `registry`, resolving entity references through
    /// `repository`.
    pub fn new(
        config: RuntimeConfig,
        registry: ActionRegistry,
        repository: Arc<dyn EntityRepository>,
    ) -> Self {
        let dispatcher =
            Dispatcher::new(registry, repository).with_result_validation(config.validate_results);
        Self { config, dispatcher }
    }

    /// Get the current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the action registry
    pub fn registry(&self) -> &ActionRegistry {
        self.dispatcher.registry()
    }

    /// Get the dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Parse and execute a textual payload.
    ///
    /// An envelope the normalizer rejects aborts the whole batch; nothing is
    /// dispatched in that case.
    pub fn submit(&self, payload: &str, caller: &dyn Caller) -> Result<BatchResult, RequestParseError> {
        let requests = request::parse(payload).inspect_err(|err| {
            warn!(error = %err, "rejected request envelope");
        })?;
        Ok(self.dispatcher.run(&requests, caller))
    }

    /// Execute an already decoded payload.
    pub fn submit_value(&self, payload: Value, caller: &dyn Caller) -> Result<BatchResult, RequestParseError> {
        let requests = request::parse_value(payload).inspect_err(|err| {
            warn!(error = %err, "rejected request envelope");
        })?;
        Ok(self.dispatcher.run(&requests, caller))
    }

    /// Discovery listing of the actions `caller` may view.
    pub fn list_actions(&self, caller: &dyn Caller) -> DiscoveryDocument {
        Discovery::new(self.registry(), &self.config.base_url).list(caller)
    }

    /// Discovery description of one action.
    pub fn describe_action(&self, id: &str, caller: &dyn Caller) -> DiscoveryDocument {
        Discovery::new(self.registry(), &self.config.base_url).describe(id, caller)
    }
}
