//! Parameter factories
//!
//! A factory turns the raw JSON supplied for one parameter into the value the
//! handler receives. Each factory exposes the schema its input must satisfy,
//! a conversion, and a post-condition on its output. Three factories ship
//! with the runtime:
//!
//! - `raw`: validates against the parameter's own schema and passes through
//! - `pagination`: fixed `{limit, offset}` shape, bound as [`Pagination`]
//! - `entity`: `{type, uuid}` resolved through the [`EntityRepository`]
//!
//! Further factories can be registered by name on the action catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::access::Caller;
use super::action::ParameterDef;
use super::error::{RegistrationError, RepositoryError, RpcError};
use super::object::BoundValue;
use super::repository::EntityRepository;
use super::schema::CompiledSchema;

/// Name of the pass-through factory.
pub const RAW: &str = "raw";
/// Name of the pagination factory.
pub const PAGINATION: &str = "pagination";
/// Name of the entity reference factory.
pub const ENTITY: &str = "entity";

/// Offset/limit pair bound by the pagination factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Number of items to skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl Pagination {
    /// Apply to an iterator, with `default_limit` when no limit was given.
    pub fn apply<I: Iterator>(&self, items: I, default_limit: usize) -> impl Iterator<Item = I::Item> {
        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map_or(default_limit, |limit| limit as usize);
        items.skip(offset).take(limit)
    }
}

/// Collaborators available while converting a parameter.
pub struct FactoryContext<'a> {
    /// Definition of the parameter being bound
    pub param: &'a ParameterDef,
    /// Repository used to resolve entity references
    pub repository: &'a dyn EntityRepository,
    /// Caller submitting the request
    pub caller: &'a dyn Caller,
}

/// Post-condition a factory guarantees about its output.
#[derive(Clone)]
pub enum OutputValidator {
    /// The output is the validated input, unchanged.
    Identity,
    /// The output's JSON form satisfies the input schema.
    InputSchema,
    /// The output is a loaded entity.
    EntityInstance,
    /// Factory-defined check.
    Custom(Arc<dyn Fn(&BoundValue) -> bool + Send + Sync>),
}

impl fmt::Debug for OutputValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValidator::Identity => f.write_str("Identity"),
            OutputValidator::InputSchema => f.write_str("InputSchema"),
            OutputValidator::EntityInstance => f.write_str("EntityInstance"),
            OutputValidator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Converter and validator from a raw wire value to a bound parameter.
pub trait ParameterFactory: Send + Sync {
    /// Name used to reference the factory from parameter definitions.
    fn name(&self) -> &str;

    /// Schema the raw value must satisfy, given the parameter's declared one.
    fn input_schema(&self, declared: Option<&Value>) -> Option<Value>;

    /// Convert an already validated input.
    fn convert(&self, input: Value, context: &FactoryContext<'_>) -> Result<BoundValue, RpcError>;

    /// Post-condition on [`convert`](Self::convert)'s output.
    fn output_validator(&self) -> OutputValidator;
}

/// Pass-through factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawParameterFactory;

impl ParameterFactory for RawParameterFactory {
    fn name(&self) -> &str {
        RAW
    }

    fn input_schema(&self, declared: Option<&Value>) -> Option<Value> {
        declared.cloned()
    }

    fn convert(&self, input: Value, _context: &FactoryContext<'_>) -> Result<BoundValue, RpcError> {
        Ok(BoundValue::Json(input))
    }

    fn output_validator(&self) -> OutputValidator {
        OutputValidator::Identity
    }
}

/// Offset/limit factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginationParameterFactory;

impl ParameterFactory for PaginationParameterFactory {
    fn name(&self) -> &str {
        PAGINATION
    }

    fn input_schema(&self, _declared: Option<&Value>) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 0},
                "offset": {"type": "integer", "minimum": 0}
            }
        }))
    }

    fn convert(&self, input: Value, context: &FactoryContext<'_>) -> Result<BoundValue, RpcError> {
        serde_json::from_value::<Pagination>(input)
            .map(BoundValue::Pagination)
            .map_err(|err| {
                RpcError::invalid_params(format!(
                    "The {} parameter is not a valid pagination object. {err}",
                    context.param.id()
                ))
            })
    }

    fn output_validator(&self) -> OutputValidator {
        OutputValidator::InputSchema
    }
}

/// Factory loading entities from `{type, uuid}` input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityParameterFactory;

impl ParameterFactory for EntityParameterFactory {
    fn name(&self) -> &str {
        ENTITY
    }

    fn input_schema(&self, _declared: Option<&Value>) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "type": {"type": "string"},
                "uuid": {"type": "string"}
            },
            "required": ["type", "uuid"]
        }))
    }

    fn convert(&self, input: Value, context: &FactoryContext<'_>) -> Result<BoundValue, RpcError> {
        let entity_type = input.get("type").and_then(Value::as_str).unwrap_or_default();
        let raw_uuid = input.get("uuid").and_then(Value::as_str).unwrap_or_default();
        let uuid = Uuid::parse_str(raw_uuid).map_err(|_| {
            RpcError::invalid_params(format!("'{raw_uuid}' is not a valid entity identifier."))
        })?;

        match context.repository.load_by_type_and_id(entity_type, &uuid) {
            Ok(Some(entity)) => Ok(BoundValue::Entity(entity)),
            Ok(None) => Err(RpcError::invalid_params(
                "The requested entity could not be found.",
            )),
            Err(err @ RepositoryError::UnsupportedType(_)) => Err(RpcError::invalid_params(
                format!("This entity type is not supported. Error: {err}"),
            )),
            Err(err @ RepositoryError::Backend(_)) => Err(RpcError::internal_error(err.to_string())),
        }
    }

    fn output_validator(&self) -> OutputValidator {
        OutputValidator::EntityInstance
    }
}

/// Named factories available to parameter definitions.
#[derive(Clone)]
pub struct FactorySet {
    factories: HashMap<String, Arc<dyn ParameterFactory>>,
}

impl FactorySet {
    /// Set containing only the built-in factories.
    pub fn with_builtins() -> Self {
        let mut factories: HashMap<String, Arc<dyn ParameterFactory>> = HashMap::new();
        factories.insert(RAW.to_string(), Arc::new(RawParameterFactory));
        factories.insert(PAGINATION.to_string(), Arc::new(PaginationParameterFactory));
        factories.insert(ENTITY.to_string(), Arc::new(EntityParameterFactory));
        Self { factories }
    }

    /// Add a factory under its own name.
    pub fn register(&mut self, factory: Arc<dyn ParameterFactory>) -> Result<(), RegistrationError> {
        let name = factory.name().to_string();
        if self.factories.contains_key(&name) {
            return Err(RegistrationError::DuplicateFactory(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Look up a factory.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ParameterFactory>> {
        self.factories.get(name).cloned()
    }

    /// Registered factory names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FactorySet {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// A factory resolved for one parameter, with its input schema compiled.
#[derive(Clone)]
pub struct BoundFactory {
    factory: Arc<dyn ParameterFactory>,
    input_schema: Option<Arc<CompiledSchema>>,
}

impl BoundFactory {
    /// Resolve the input schema for `declared` and compile it.
    pub fn new(factory: Arc<dyn ParameterFactory>, declared: Option<&Value>) -> Result<Self, String> {
        let input_schema = factory
            .input_schema(declared)
            .map(|schema| CompiledSchema::compile(&schema).map(Arc::new))
            .transpose()?;
        Ok(Self {
            factory,
            input_schema,
        })
    }

    /// Name of the underlying factory.
    pub fn name(&self) -> &str {
        self.factory.name()
    }

    /// Effective input schema.
    pub fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_deref().map(CompiledSchema::source)
    }

    /// Validate `raw` against the input schema (with type coercion), convert
    /// it, and check the factory's output post-condition.
    pub fn transform(&self, raw: &Value, context: &FactoryContext<'_>) -> Result<BoundValue, RpcError> {
        let input = match &self.input_schema {
            Some(schema) => schema.coerce_and_validate(raw.clone()).map_err(|messages| {
                RpcError::invalid_params(format!(
                    "The {} parameter does not conform to the parameter schema. {}",
                    context.param.id(),
                    messages.join("; ")
                ))
                .with_data(json!({ "param": context.param.id().to_string(), "violations": messages }))
            })?,
            None => raw.clone(),
        };

        let output = self.factory.convert(input.clone(), context)?;
        if !self.check_output(&input, &output) {
            return Err(RpcError::internal_error(format!(
                "Parameter factory '{}' produced an invalid value for the {} parameter.",
                self.name(),
                context.param.id()
            )));
        }
        Ok(output)
    }

    /// Evaluate the factory's output validator.
    pub fn check_output(&self, input: &Value, output: &BoundValue) -> bool {
        match self.factory.output_validator() {
            OutputValidator::Identity => output.to_json().as_ref() == Some(input),
            OutputValidator::InputSchema => match (&self.input_schema, output.to_json()) {
                (Some(schema), Some(json)) => schema.validate(&json).is_ok(),
                (None, Some(_)) => true,
                (_, None) => false,
            },
            OutputValidator::EntityInstance => matches!(output, BoundValue::Entity(_)),
            OutputValidator::Custom(check) => check(output),
        }
    }
}

impl fmt::Debug for BoundFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFactory")
            .field("factory", &self.factory.name())
            .field("input_schema", &self.input_schema())
            .finish()
    }
}
