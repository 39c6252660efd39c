use actionrpc::runtime::factory::{FactoryContext, OutputValidator, ParameterFactory};
use actionrpc::runtime::object::BoundValue;
use actionrpc::runtime::{
    Action, ActionCatalog, CallerIdentity, ParameterDef, RegistrationError, Runtime,
    RuntimeConfig, RpcError,
};
use actionrpc::things::{THING_TYPE, ThingStore};
use serde_json::{Value, json};
use std::sync::Arc;

/// Parses "#rrggbb" into an RGB triple.
struct ColorFactory;

#[derive(Debug, PartialEq)]
struct Rgb(u8, u8, u8);

impl ParameterFactory for ColorFactory {
    fn name(&self) -> &str {
        "color"
    }

    fn input_schema(&self, _declared: Option<&Value>) -> Option<Value> {
        Some(json!({"type": "string", "pattern": "^#[0-9a-fA-F]{6}$"}))
    }

    fn convert(&self, input: Value, _context: &FactoryContext<'_>) -> Result<BoundValue, RpcError> {
        let text = input.as_str().unwrap_or_default();
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&text[range], 16)
                .map_err(|err| RpcError::invalid_params(format!("Bad color: {err}")))
        };
        let rgb = Rgb(channel(1..3)?, channel(3..5)?, channel(5..7)?);
        Ok(BoundValue::Custom(Arc::new(rgb)))
    }

    fn output_validator(&self) -> OutputValidator {
        OutputValidator::Custom(Arc::new(|output| match output {
            BoundValue::Custom(value) => value.downcast_ref::<Rgb>().is_some(),
            _ => false,
        }))
    }
}

fn runtime(store: Arc<ThingStore>) -> Runtime {
    let catalog = ActionCatalog::new();
    catalog.register_factory(Arc::new(ColorFactory)).unwrap();
    catalog
        .register(
            Action::builder("thing.describe")
                .parameter(ParameterDef::named("thing").with_factory("entity").required())
                .result_schema(json!({"type": "object"}))
                .handler_fn(|params, _| {
                    let entity = params.entity("thing").unwrap();
                    Ok(json!({"uuid": entity.uuid, "title": entity.attributes["title"]}))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            Action::builder("paint")
                .parameter(ParameterDef::named("color").with_factory("color").required())
                .result_schema(json!({"type": "array"}))
                .handler_fn(|params, _| {
                    let Rgb(r, g, b) = params.custom::<Rgb>("color").unwrap();
                    Ok(json!([r, g, b]))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    Runtime::new(RuntimeConfig::default(), catalog.snapshot(), store)
}

fn call(runtime: &Runtime, action: &str, params: Value) -> Value {
    let batch = runtime
        .submit_value(
            json!({"action": action, "id": 1, "params": params}),
            &CallerIdentity::anonymous(),
        )
        .unwrap();
    batch.responses[0].to_wire()
}

#[test]
fn entity_references_load_through_the_repository() {
    let store = Arc::new(ThingStore::new());
    let uuid = store.insert("Desk lamp");
    let runtime = runtime(store);

    let response = call(
        &runtime,
        "thing.describe",
        json!({"thing": {"type": THING_TYPE, "uuid": uuid.to_string()}}),
    );
    assert_eq!(response["result"]["title"], json!("Desk lamp"));
    assert_eq!(response["result"]["uuid"], json!(uuid.to_string()));
}

#[test]
fn unknown_entities_are_invalid_params() {
    let runtime = runtime(Arc::new(ThingStore::new()));

    let missing = call(
        &runtime,
        "thing.describe",
        json!({"thing": {"type": THING_TYPE, "uuid": uuid::Uuid::new_v4().to_string()}}),
    );
    assert_eq!(missing["error"]["code"], json!(-32602));
    assert_eq!(
        missing["error"]["message"],
        json!("The requested entity could not be found.")
    );

    let unsupported = call(
        &runtime,
        "thing.describe",
        json!({"thing": {"type": "user", "uuid": uuid::Uuid::new_v4().to_string()}}),
    );
    assert_eq!(unsupported["error"]["code"], json!(-32602));

    let malformed = call(
        &runtime,
        "thing.describe",
        json!({"thing": {"type": THING_TYPE, "uuid": "not-a-uuid"}}),
    );
    assert_eq!(malformed["error"]["code"], json!(-32602));

    let shapeless = call(&runtime, "thing.describe", json!({"thing": "lamp"}));
    assert_eq!(shapeless["error"]["code"], json!(-32602));
}

#[test]
fn custom_factories_produce_typed_values() {
    let runtime = runtime(Arc::new(ThingStore::new()));
    let response = call(&runtime, "paint", json!({"color": "#ff8000"}));
    assert_eq!(response["result"], json!([255, 128, 0]));

    let rejected = call(&runtime, "paint", json!({"color": "orange"}));
    assert_eq!(rejected["error"]["code"], json!(-32602));
    assert!(
        rejected["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("The color parameter does not conform to the parameter schema.")
    );
}

#[test]
fn custom_factory_names_must_be_unique() {
    let catalog = ActionCatalog::new();
    catalog.register_factory(Arc::new(ColorFactory)).unwrap();
    assert!(matches!(
        catalog.register_factory(Arc::new(ColorFactory)),
        Err(RegistrationError::DuplicateFactory(name)) if name == "color"
    ));
    assert!(catalog.factory_names().contains(&"color".to_string()));
}

#[test]
fn factory_instances_can_be_attached_directly() {
    let catalog = ActionCatalog::new();
    catalog
        .register(
            Action::builder("paint")
                .parameter(ParameterDef::named("color").with_factory_instance(Arc::new(ColorFactory)))
                .result_schema(json!({"type": "integer"}))
                .handler_fn(|params, _| {
                    Ok(json!(params.custom::<Rgb>("color").map_or(0, |rgb| rgb.0)))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let runtime = Runtime::new(
        RuntimeConfig::default(),
        catalog.snapshot(),
        Arc::new(ThingStore::new()),
    );
    let response = call(&runtime, "paint", json!({"color": "#0a0000"}));
    assert_eq!(response["result"], json!(10));
}
