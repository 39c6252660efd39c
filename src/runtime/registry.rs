//! Action catalog and registry
//!
//! Actions are registered on an [`ActionCatalog`] at startup. Registration
//! validates the parameter layout, resolves every parameter's factory and
//! compiles all schemas, so malformed definitions fail before any request is
//! served. Dispatch reads from an [`ActionRegistry`], an immutable snapshot of
//! the catalog that can be shared across threads without locking.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

use super::access::{AccessGate, Caller, Operation};
use super::action::{Action, FactoryRef};
use super::cache::CacheabilityMetadata;
use super::error::{RegistrationError, RegistrationResult};
use super::factory::{BoundFactory, FactorySet, ParameterFactory, RawParameterFactory};
use super::object::ParamId;
use super::schema::CompiledSchema;

/// Mutable catalog of action definitions and parameter factories.
pub struct ActionCatalog {
    actions: RwLock<Vec<Arc<Action>>>,
    factories: RwLock<FactorySet>,
}

impl ActionCatalog {
    /// Empty catalog with the built-in factories.
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(Vec::new()),
            factories: RwLock::new(FactorySet::with_builtins()),
        }
    }

    /// Register a custom parameter factory under its name.
    pub fn register_factory(&self, factory: Arc<dyn ParameterFactory>) -> RegistrationResult<()> {
        let name = factory.name().to_string();
        self.factories.write().register(factory)?;
        info!(factory = %name, "registered parameter factory");
        Ok(())
    }

    /// Validate and register an action.
    pub fn register(&self, mut action: Action) -> RegistrationResult<()> {
        if action.id().is_empty() {
            return Err(RegistrationError::EmptyId);
        }

        check_layout(&action)?;
        action.factories = self.resolve_factories(&action)?;
        action.result_validator = action
            .result_schema()
            .map(|schema| {
                CompiledSchema::compile(schema).map(Arc::new).map_err(|detail| {
                    RegistrationError::InvalidSchema {
                        action: action.id().to_string(),
                        target: "result".to_string(),
                        detail,
                    }
                })
            })
            .transpose()?;

        let mut actions = self.actions.write();
        if actions.iter().any(|existing| existing.id() == action.id()) {
            return Err(RegistrationError::Duplicate(action.id().to_string()));
        }
        info!(
            action = %action.id(),
            params = action.parameters().map_or(0, <[_]>::len),
            positional = action.is_positional(),
            "registered action"
        );
        actions.push(Arc::new(action));
        Ok(())
    }

    fn resolve_factories(&self, action: &Action) -> RegistrationResult<Vec<BoundFactory>> {
        let factories = self.factories.read();
        let Some(parameters) = action.parameters() else {
            return Ok(Vec::new());
        };

        parameters
            .iter()
            .map(|def| {
                let param = def.id().to_string();
                let factory: Arc<dyn ParameterFactory> = match def.factory() {
                    Some(FactoryRef::Named(name)) => factories.get(name).ok_or_else(|| {
                        RegistrationError::UnknownFactory {
                            action: action.id().to_string(),
                            param: param.clone(),
                            factory: name.clone(),
                        }
                    })?,
                    Some(FactoryRef::Instance(factory)) => factory.clone(),
                    None if def.schema().is_some() => Arc::new(RawParameterFactory),
                    None => {
                        return Err(RegistrationError::MissingSchemaOrFactory {
                            action: action.id().to_string(),
                            param,
                        });
                    }
                };
                BoundFactory::new(factory, def.schema()).map_err(|detail| {
                    RegistrationError::InvalidSchema {
                        action: action.id().to_string(),
                        target: param,
                        detail,
                    }
                })
            })
            .collect()
    }

    /// Produce an immutable registry for dispatch.
    pub fn snapshot(&self) -> ActionRegistry {
        let actions = self.actions.read();
        let index = actions
            .iter()
            .enumerate()
            .map(|(position, action)| (action.id().to_string(), position))
            .collect();
        ActionRegistry {
            actions: Arc::new(actions.clone()),
            index: Arc::new(index),
        }
    }

    /// Names of the registered parameter factories.
    pub fn factory_names(&self) -> Vec<String> {
        self.factories.read().names()
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// By-name actions need unique names; positional actions need offsets
/// `0..n` in declaration order.
fn check_layout(action: &Action) -> RegistrationResult<()> {
    let Some(parameters) = action.parameters() else {
        return Ok(());
    };
    let layout_error = |detail: String| RegistrationError::ParameterLayout {
        action: action.id().to_string(),
        detail,
    };

    if action.is_positional() {
        for (expected, def) in parameters.iter().enumerate() {
            match def.id() {
                ParamId::Index(index) if *index == expected => {}
                ParamId::Index(index) => {
                    return Err(layout_error(format!(
                        "positional parameter {index} declared where {expected} was expected"
                    )));
                }
                ParamId::Name(name) => {
                    return Err(layout_error(format!(
                        "named parameter '{name}' on a positional action"
                    )));
                }
            }
        }
    } else {
        let mut seen = BTreeSet::new();
        for def in parameters {
            match def.id() {
                ParamId::Name(name) if seen.insert(name.as_str()) => {}
                ParamId::Name(name) => {
                    return Err(layout_error(format!("parameter '{name}' declared twice")));
                }
                ParamId::Index(index) => {
                    return Err(layout_error(format!(
                        "positional parameter {index} on a by-name action"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Immutable view of the registered actions.
#[derive(Clone)]
pub struct ActionRegistry {
    actions: Arc<Vec<Arc<Action>>>,
    index: Arc<HashMap<String, usize>>,
}

impl ActionRegistry {
    /// Look up an action by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Action>> {
        self.index.get(id).map(|&position| &self.actions[position])
    }

    /// Actions `caller` may view, in registration order. The cacheability of
    /// every access evaluation is merged into `accumulator`.
    pub fn list(&self, caller: &dyn Caller, accumulator: &mut CacheabilityMetadata) -> Vec<Arc<Action>> {
        self.actions
            .iter()
            .filter(|action| {
                let decision = AccessGate::check(action, caller, &Operation::View);
                accumulator.merge(&decision.cacheability);
                decision.is_allowed()
            })
            .cloned()
            .collect()
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.actions.iter().map(|action| action.id()).collect()
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Stable digest of the registered ids, used as a cache tag for listings.
    pub fn fingerprint(&self) -> String {
        let mut ids = self.ids();
        ids.sort_unstable();
        let mut hasher = blake3::Hasher::new();
        for id in ids {
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        ActionCatalog::new().snapshot()
    }
}
