//! Action definitions
//!
//! An [`Action`] is an immutable registry entry: identifier, capability rule,
//! parameter layout, result schema, descriptive metadata and the handler
//! invoked by the dispatcher. Actions are assembled with [`ActionBuilder`] and
//! become immutable once the catalog accepts them.

use anyhow::anyhow;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::access::{Caller, CapabilityRule};
use super::cache::CacheabilityMetadata;
use super::error::{ActionError, ActionResult, RegistrationError, RegistrationResult};
use super::factory::{BoundFactory, ParameterFactory};
use super::object::{ParamId, ParameterBag, RequestId};
use super::schema::CompiledSchema;

/// Entry point used when an action does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "execute";

/// Reference to the factory a parameter is bound with.
#[derive(Clone)]
pub enum FactoryRef {
    /// Factory registered on the catalog under this name.
    Named(String),
    /// Factory instance owned by the parameter.
    Instance(Arc<dyn ParameterFactory>),
}

impl FactoryRef {
    /// Name of the referenced factory.
    pub fn name(&self) -> &str {
        match self {
            FactoryRef::Named(name) => name,
            FactoryRef::Instance(factory) => factory.name(),
        }
    }
}

impl fmt::Debug for FactoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            FactoryRef::Instance(factory) => f.debug_tuple("Instance").field(&factory.name()).finish(),
        }
    }
}

/// Declaration of one action parameter.
#[derive(Debug, Clone)]
pub struct ParameterDef {
    id: ParamId,
    schema: Option<Value>,
    factory: Option<FactoryRef>,
    required: bool,
    description: Option<String>,
}

impl ParameterDef {
    /// By-name parameter.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_id(ParamId::Name(name.into()))
    }

    /// Positional parameter at 0-based `index`.
    pub fn positional(index: usize) -> Self {
        Self::with_id(ParamId::Index(index))
    }

    fn with_id(id: ParamId) -> Self {
        Self {
            id,
            schema: None,
            factory: None,
            required: false,
            description: None,
        }
    }

    /// Declare the parameter's JSON Schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Bind with the catalog factory registered as `name`.
    pub fn with_factory(mut self, name: impl Into<String>) -> Self {
        self.factory = Some(FactoryRef::Named(name.into()));
        self
    }

    /// Bind with a factory instance.
    pub fn with_factory_instance(mut self, factory: Arc<dyn ParameterFactory>) -> Self {
        self.factory = Some(FactoryRef::Instance(factory));
        self
    }

    /// Mark the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parameter key.
    pub fn id(&self) -> &ParamId {
        &self.id
    }

    /// Declared schema.
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Declared factory.
    pub fn factory(&self) -> Option<&FactoryRef> {
        self.factory.as_ref()
    }

    /// Whether a value must be supplied.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Per-invocation view handed to handlers.
pub struct ActionContext<'a> {
    /// Action being executed
    pub action: &'a Action,
    /// Submitting caller
    pub caller: &'a dyn Caller,
    /// Request correlation id
    pub request_id: &'a RequestId,
    /// Whether the request arrived inside a batch
    pub in_batch: bool,
    cacheability: Mutex<CacheabilityMetadata>,
}

impl<'a> ActionContext<'a> {
    /// Context for one invocation of `action`.
    pub fn new(action: &'a Action, caller: &'a dyn Caller, request_id: &'a RequestId, in_batch: bool) -> Self {
        Self {
            action,
            caller,
            request_id,
            in_batch,
            cacheability: Mutex::new(CacheabilityMetadata::default()),
        }
    }

    /// Record a cache dependency of the result being produced.
    pub fn add_cacheability(&self, cacheability: &CacheabilityMetadata) {
        self.cacheability.lock().merge(cacheability);
    }

    /// Cache dependencies recorded so far.
    pub fn into_cacheability(self) -> CacheabilityMetadata {
        self.cacheability.into_inner()
    }
}

/// Server-side behavior behind an action.
pub trait ActionHandler: Send + Sync {
    /// Default entry point.
    fn execute(&self, params: &ParameterBag, context: &ActionContext<'_>) -> ActionResult<Value>;

    /// Dispatch on the action's entry point. Handlers exposing more than
    /// `execute` override this.
    fn call(
        &self,
        entry_point: &str,
        params: &ParameterBag,
        context: &ActionContext<'_>,
    ) -> ActionResult<Value> {
        match entry_point {
            DEFAULT_ENTRY_POINT => self.execute(params, context),
            other => Err(ActionError::Internal(anyhow!(
                "Action '{}' has no entry point '{other}'",
                context.action.id()
            ))),
        }
    }
}

/// Handler backed by a closure.
pub struct FnHandler<F>(F);

impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&ParameterBag, &ActionContext<'_>) -> ActionResult<Value> + Send + Sync,
{
    fn execute(&self, params: &ParameterBag, context: &ActionContext<'_>) -> ActionResult<Value> {
        (self.0)(params, context)
    }
}

/// A registered, invocable action.
#[derive(Clone)]
pub struct Action {
    id: String,
    capability: CapabilityRule,
    entry_point: String,
    parameters: Option<Vec<ParameterDef>>,
    positional: bool,
    result_schema: Option<Value>,
    title: Option<String>,
    description: Option<String>,
    semantic_type: Option<String>,
    usage: Option<String>,
    cacheability: CacheabilityMetadata,
    handler: Arc<dyn ActionHandler>,
    pub(crate) factories: Vec<BoundFactory>,
    pub(crate) result_validator: Option<Arc<CompiledSchema>>,
}

impl Action {
    /// Start building an action with the given id.
    pub fn builder(id: impl Into<String>) -> ActionBuilder {
        ActionBuilder::new(id)
    }

    /// Unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authorization policy.
    pub fn capability(&self) -> &CapabilityRule {
        &self.capability
    }

    /// Handler entry point.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Declared parameters; `None` means the action accepts none.
    pub fn parameters(&self) -> Option<&[ParameterDef]> {
        self.parameters.as_deref()
    }

    /// Whether parameters bind by position.
    pub fn is_positional(&self) -> bool {
        self.positional
    }

    /// Declared result schema; `None` marks a notification-only action.
    pub fn result_schema(&self) -> Option<&Value> {
        self.result_schema.as_ref()
    }

    /// Short title.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Longer description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Semantic type, published as `@type`.
    pub fn semantic_type(&self) -> Option<&str> {
        self.semantic_type.as_deref()
    }

    /// Usage notes.
    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    /// Cacheability carried by every response of this action.
    pub fn cacheability(&self) -> &CacheabilityMetadata {
        &self.cacheability
    }

    /// Handler reference.
    pub fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }

    /// Resolved factories, one per declared parameter, in declaration order.
    /// Empty until the action is registered.
    pub fn bound_factories(&self) -> &[BoundFactory] {
        &self.factories
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .field("entry_point", &self.entry_point)
            .field("parameters", &self.parameters)
            .field("positional", &self.positional)
            .field("result_schema", &self.result_schema)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Action`].
pub struct ActionBuilder {
    id: String,
    capability: CapabilityRule,
    entry_point: String,
    parameters: Option<Vec<ParameterDef>>,
    positional: bool,
    result_schema: Option<Value>,
    title: Option<String>,
    description: Option<String>,
    semantic_type: Option<String>,
    usage: Option<String>,
    cacheability: CacheabilityMetadata,
    handler: Option<Arc<dyn ActionHandler>>,
}

impl ActionBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability: CapabilityRule::public(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            parameters: None,
            positional: false,
            result_schema: None,
            title: None,
            description: None,
            semantic_type: None,
            usage: None,
            cacheability: CacheabilityMetadata::default(),
            handler: None,
        }
    }

    /// Authorization policy.
    pub fn capability(mut self, capability: CapabilityRule) -> Self {
        self.capability = capability;
        self
    }

    /// Require a permission, on top of any already required.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        match &mut self.capability {
            CapabilityRule::Permissions(set) => {
                set.insert(permission.into());
            }
            CapabilityRule::Predicate(_) => {
                self.capability = CapabilityRule::permissions([permission.into()]);
            }
        }
        self
    }

    /// Handler entry point.
    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Declare a parameter. The first call switches the action from
    /// "no parameters" to a declared list.
    pub fn parameter(mut self, parameter: ParameterDef) -> Self {
        self.parameters.get_or_insert_with(Vec::new).push(parameter);
        self
    }

    /// Declare an empty parameter list: `params` may be given, but binds
    /// nothing.
    pub fn empty_parameters(mut self) -> Self {
        self.parameters.get_or_insert_with(Vec::new);
        self
    }

    /// Bind parameters by position.
    pub fn positional(mut self) -> Self {
        self.positional = true;
        self
    }

    /// Result schema.
    pub fn result_schema(mut self, schema: Value) -> Self {
        self.result_schema = Some(schema);
        self
    }

    /// Short title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Longer description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Semantic type.
    pub fn semantic_type(mut self, semantic_type: impl Into<String>) -> Self {
        self.semantic_type = Some(semantic_type.into());
        self
    }

    /// Usage notes.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Cacheability attached to every response.
    pub fn cacheability(mut self, cacheability: CacheabilityMetadata) -> Self {
        self.cacheability = cacheability;
        self
    }

    /// Handler implementation.
    pub fn handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Handler backed by a closure for the `execute` entry point.
    pub fn handler_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&ParameterBag, &ActionContext<'_>) -> ActionResult<Value> + Send + Sync + 'static,
    {
        self.handler(Arc::new(FnHandler(handler)))
    }

    /// Finish the definition.
    pub fn build(self) -> RegistrationResult<Action> {
        let handler = self
            .handler
            .ok_or_else(|| RegistrationError::MissingHandler(self.id.clone()))?;
        Ok(Action {
            id: self.id,
            capability: self.capability,
            entry_point: self.entry_point,
            parameters: self.parameters,
            positional: self.positional,
            result_schema: self.result_schema,
            title: self.title,
            description: self.description,
            semantic_type: self.semantic_type,
            usage: self.usage,
            cacheability: self.cacheability,
            handler,
            factories: Vec::new(),
            result_validator: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::access::CallerIdentity;
    use crate::runtime::error::{ErrorKind, RpcError};
    use serde_json::json;

    struct Lamp;

    impl ActionHandler for Lamp {
        fn execute(&self, _params: &ParameterBag, _context: &ActionContext<'_>) -> ActionResult<Value> {
            Ok(json!("on"))
        }

        fn call(&self, entry_point: &str, params: &ParameterBag, context: &ActionContext<'_>) -> ActionResult<Value> {
            match entry_point {
                "off" => Ok(json!("off")),
                _ => self.execute(params, context),
            }
        }
    }

    #[test]
    fn test_builder_defaults() {
        let action = Action::builder("ping")
            .handler_fn(|_, _| Ok(json!("pong")))
            .build()
            .unwrap();
        assert_eq!(action.entry_point(), "execute");
        assert!(action.parameters().is_none());
        assert!(!action.is_positional());
        assert!(action.result_schema().is_none());
        assert!(matches!(action.capability(), CapabilityRule::Permissions(set) if set.is_empty()));
    }

    #[test]
    fn test_builder_requires_handler() {
        let err = Action::builder("orphan").build().unwrap_err();
        assert!(matches!(err, RegistrationError::MissingHandler(id) if id == "orphan"));
    }

    #[test]
    fn test_empty_parameter_list_differs_from_none() {
        let action = Action::builder("noop")
            .empty_parameters()
            .handler_fn(|_, _| Ok(Value::Null))
            .build()
            .unwrap();
        assert_eq!(action.parameters().map(<[_]>::len), Some(0));
    }

    #[test]
    fn test_permissions_accumulate() {
        let action = Action::builder("admin")
            .permission("a")
            .permission("b")
            .handler_fn(|_, _| Ok(Value::Null))
            .build()
            .unwrap();
        match action.capability() {
            CapabilityRule::Permissions(set) => assert_eq!(set.len(), 2),
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn test_entry_points_route_through_call() {
        let action = Action::builder("lamp")
            .entry_point("off")
            .handler(Arc::new(Lamp))
            .build()
            .unwrap();
        let caller = CallerIdentity::anonymous();
        let id = RequestId::Id(json!(1));
        let context = ActionContext::new(&action, &caller, &id, false);
        let bag = ParameterBag::default();
        let result = action.handler().call(action.entry_point(), &bag, &context).unwrap();
        assert_eq!(result, json!("off"));
    }

    #[test]
    fn test_unknown_entry_point_is_internal() {
        let action = Action::builder("ping")
            .entry_point("missing")
            .handler_fn(|_, _| Ok(json!("pong")))
            .build()
            .unwrap();
        let caller = CallerIdentity::anonymous();
        let id = RequestId::Notification;
        let context = ActionContext::new(&action, &caller, &id, false);
        let err = action
            .handler()
            .call(action.entry_point(), &ParameterBag::default(), &context)
            .unwrap_err()
            .into_rpc();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }

    #[test]
    fn test_context_collects_cacheability() {
        let action = Action::builder("ping")
            .handler_fn(|_, context| {
                context.add_cacheability(&CacheabilityMetadata::default().with_tag("thing:1"));
                Err(RpcError::invalid_params("late").into())
            })
            .build()
            .unwrap();
        let caller = CallerIdentity::anonymous();
        let id = RequestId::Id(json!(1));
        let context = ActionContext::new(&action, &caller, &id, true);
        assert!(action.handler().execute(&ParameterBag::default(), &context).is_err());
        assert!(context.into_cacheability().tags.contains("thing:1"));
    }
}
