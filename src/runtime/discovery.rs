//! Discovery documents for registered actions
//!
//! Listing and describing are read-only views over the [`ActionRegistry`],
//! both gated by `view` access. Listing omits parameter detail; describing a
//! single action includes each parameter's effective input schema.

use serde_json::{Map, Value, json};

use super::access::{AccessGate, Caller, Operation};
use super::action::Action;
use super::cache::CacheabilityMetadata;
use super::registry::ActionRegistry;

/// Cache context of documents that vary by the requested path.
pub const PATH_CONTEXT: &str = "url.path";

/// Document type of a single action definition.
pub const DEFINITION_TYPE: &str = "ActionDefinition";

/// A discovery document and how it may be cached.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryDocument {
    /// Body; `None` when the requested action is unknown or not viewable
    pub document: Option<Value>,
    /// Aggregated cacheability
    pub cacheability: CacheabilityMetadata,
}

/// Builds discovery documents with links rooted at `base_url`.
pub struct Discovery<'a> {
    registry: &'a ActionRegistry,
    base_url: &'a str,
}

impl<'a> Discovery<'a> {
    /// Discovery over `registry`.
    pub fn new(registry: &'a ActionRegistry, base_url: &'a str) -> Self {
        Self { registry, base_url }
    }

    /// Every action `caller` may view.
    pub fn list(&self, caller: &dyn Caller) -> DiscoveryDocument {
        let mut cacheability = CacheabilityMetadata::default()
            .with_tag(format!("actions:{}", self.registry.fingerprint()));
        let definitions = self
            .registry
            .list(caller, &mut cacheability)
            .iter()
            .map(|action| Value::Object(self.definition(action)))
            .collect();
        DiscoveryDocument {
            document: Some(Value::Array(definitions)),
            cacheability,
        }
    }

    /// One action, with parameter detail.
    pub fn describe(&self, id: &str, caller: &dyn Caller) -> DiscoveryDocument {
        let mut cacheability = CacheabilityMetadata::default().with_context(PATH_CONTEXT);
        let Some(action) = self.registry.get(id) else {
            return DiscoveryDocument {
                document: None,
                cacheability,
            };
        };

        let decision = AccessGate::check(action, caller, &Operation::View);
        cacheability.merge(&decision.cacheability);
        cacheability.merge(action.cacheability());
        if !decision.is_allowed() {
            return DiscoveryDocument {
                document: None,
                cacheability,
            };
        }

        let mut definition = self.definition(action);
        definition.insert("positional".into(), Value::Bool(action.is_positional()));
        definition.insert("params".into(), parameters(action));
        DiscoveryDocument {
            document: Some(Value::Object(definition)),
            cacheability,
        }
    }

    /// Link to an action's description.
    pub fn href(&self, id: &str) -> String {
        format!("{}/actions/{id}", self.base_url.trim_end_matches('/'))
    }

    fn definition(&self, action: &Action) -> Map<String, Value> {
        let mut definition = Map::new();
        definition.insert("type".into(), json!(DEFINITION_TYPE));
        definition.insert("id".into(), json!(action.id()));
        let optional = [
            ("@type", action.semantic_type()),
            ("title", action.title()),
            ("description", action.description()),
            ("usage", action.usage()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                definition.insert(key.into(), json!(value));
            }
        }
        if let Some(schema) = action.result_schema() {
            definition.insert("result_schema".into(), schema.clone());
        }
        definition.insert("links".into(), json!({ "href": self.href(action.id()) }));
        definition
    }
}

fn parameters(action: &Action) -> Value {
    let Some(parameters) = action.parameters() else {
        return Value::Null;
    };
    parameters
        .iter()
        .zip(action.bound_factories())
        .map(|(def, factory)| {
            let mut param = Map::new();
            param.insert("id".into(), json!(def.id()));
            if let Some(description) = def.description() {
                param.insert("description".into(), json!(description));
            }
            param.insert("required".into(), Value::Bool(def.is_required()));
            param.insert("factory".into(), json!(factory.name()));
            param.insert(
                "schema".into(),
                factory.input_schema().cloned().unwrap_or(Value::Null),
            );
            Value::Object(param)
        })
        .collect()
}
