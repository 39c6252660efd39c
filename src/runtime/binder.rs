//! Parameter binder
//!
//! Binds the raw `params` of one request against an action's declared
//! parameters, in declaration order. The first failing parameter aborts the
//! bind; absent optional parameters are left out of the bag.

use serde_json::Value;

use super::access::Caller;
use super::action::Action;
use super::error::RpcError;
use super::factory::FactoryContext;
use super::object::{ParamId, ParameterBag};
use super::repository::EntityRepository;

/// Binds raw parameters using explicitly supplied collaborators.
pub struct ParameterBinder<'a> {
    repository: &'a dyn EntityRepository,
    caller: &'a dyn Caller,
}

impl<'a> ParameterBinder<'a> {
    /// Binder resolving entities through `repository` on behalf of `caller`.
    pub fn new(repository: &'a dyn EntityRepository, caller: &'a dyn Caller) -> Self {
        Self { repository, caller }
    }

    /// Bind `raw` (the request's `params`, `None` when absent) for `action`.
    pub fn bind(&self, action: &Action, raw: Option<&Value>) -> Result<ParameterBag, RpcError> {
        let Some(parameters) = action.parameters() else {
            return match raw {
                Some(_) => Err(RpcError::invalid_params(format!(
                    "The {} action does not accept parameters.",
                    action.id()
                ))),
                None => Ok(ParameterBag::new(action.is_positional())),
            };
        };

        let factories = action.bound_factories();
        if factories.len() != parameters.len() {
            return Err(RpcError::internal_error(format!(
                "Action '{}' was not registered through a catalog.",
                action.id()
            )));
        }

        match (raw, action.is_positional()) {
            (None | Some(Value::Array(_)), true) | (None | Some(Value::Object(_)), false) => {}
            (Some(_), true) => {
                return Err(RpcError::invalid_params(format!(
                    "The {} action takes positional parameters; params must be an array.",
                    action.id()
                )));
            }
            (Some(_), false) => {
                return Err(RpcError::invalid_params(format!(
                    "The {} action takes named parameters; params must be an object.",
                    action.id()
                )));
            }
        }

        let mut bag = ParameterBag::new(action.is_positional());
        for (def, factory) in parameters.iter().zip(factories) {
            let supplied = raw
                .and_then(|raw| lookup(raw, def.id()))
                .filter(|value| !value.is_null());

            match supplied {
                Some(value) => {
                    let context = FactoryContext {
                        param: def,
                        repository: self.repository,
                        caller: self.caller,
                    };
                    let bound = factory.transform(value, &context)?;
                    bag.insert(def.id().clone(), bound);
                }
                None if def.is_required() => {
                    return Err(RpcError::invalid_params(format!(
                        "Missing required parameter: {}",
                        def.id()
                    ))
                    .with_data(Value::String(def.id().to_string())));
                }
                None => {}
            }
        }
        Ok(bag)
    }
}

fn lookup<'v>(raw: &'v Value, id: &ParamId) -> Option<&'v Value> {
    match (raw, id) {
        (Value::Object(object), ParamId::Name(name)) => object.get(name),
        (Value::Array(items), ParamId::Index(index)) => items.get(*index),
        _ => None,
    }
}
