use actionrpc::runtime::error::ErrorKind;
use actionrpc::runtime::factory::{FactoryContext, OutputValidator, ParameterFactory};
use actionrpc::runtime::{
    Action, ActionCatalog, ActionError, BoundValue, CallerIdentity, CapabilityRule,
    NullRepository, ParameterDef, RpcError, Runtime, RuntimeConfig,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn runtime_with(catalog: &ActionCatalog) -> Runtime {
    Runtime::new(RuntimeConfig::default(), catalog.snapshot(), Arc::new(NullRepository))
}

fn scenario_catalog() -> ActionCatalog {
    let catalog = ActionCatalog::new();
    catalog
        .register(
            Action::builder("ping")
                .result_schema(json!({"type": "string"}))
                .handler_fn(|_, _| Ok(json!("pong")))
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            Action::builder("setBrightness")
                .parameter(
                    ParameterDef::named("level")
                        .with_schema(json!({"type": "integer"}))
                        .required(),
                )
                .result_schema(json!({"type": "integer"}))
                .handler_fn(|params, _| Ok(params.json("level").cloned().unwrap_or_default()))
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            Action::builder("purge")
                .permission("administer things")
                .result_schema(json!({"type": "boolean"}))
                .handler_fn(|_, _| Ok(json!(true)))
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            Action::builder("crash")
                .result_schema(json!({"type": "null"}))
                .handler_fn(|_, _| {
                    let items: Vec<u32> = Vec::new();
                    Ok(json!(items[3]))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
}

fn submit(runtime: &Runtime, payload: Value) -> Vec<Value> {
    runtime
        .submit_value(payload, &CallerIdentity::anonymous())
        .unwrap()
        .to_wire()
        .map(|body| body.as_array().unwrap().clone())
        .unwrap_or_default()
}

#[test]
fn scenario_a_ping_returns_pong() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(&runtime, json!({"action": "ping", "id": 1}));
    assert_eq!(responses, vec![json!({"id": 1, "result": "pong"})]);
}

#[test]
fn scenario_b_unknown_action() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(&runtime, json!({"action": "nonexistent", "id": 2}));
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], json!(2));
    assert_eq!(responses[0]["error"]["code"], json!(-32601));
    assert!(responses[0].get("result").is_none());
}

#[test]
fn scenario_c_missing_required_parameter() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(
        &runtime,
        json!({"action": "setBrightness", "id": 3, "params": {"transition": 2}}),
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32602));
    assert_eq!(
        responses[0]["error"]["message"],
        json!("Missing required parameter: level")
    );
}

#[test]
fn scenario_d_notifications_are_dropped_from_batches() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(
        &runtime,
        json!([{"action": "ping"}, {"action": "ping", "id": 5}]),
    );
    assert_eq!(responses, vec![json!({"id": 5, "result": "pong"})]);
}

#[test]
fn scenario_e_missing_permission_is_denied() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(&runtime, json!({"action": "purge", "id": 6}));
    assert_eq!(responses[0]["error"]["code"], json!(-32600));
    let message = responses[0]["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Access Denied"));
    assert!(message.contains("administer things"));

    let admin = CallerIdentity::new("admin").with_permission("administer things");
    let batch = runtime
        .submit_value(json!({"action": "purge", "id": 7}), &admin)
        .unwrap();
    assert_eq!(batch.responses[0].result(), Some(&json!(true)));
}

#[test]
fn scenario_f_faults_do_not_stop_the_batch() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(
        &runtime,
        json!([
            {"action": "crash", "id": "a"},
            {"action": "ping", "id": "b"}
        ]),
    );
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], json!(-32603));
    assert_eq!(responses[1], json!({"id": "b", "result": "pong"}));
}

#[test]
fn parameterless_action_round_trip() {
    let runtime = runtime_with(&scenario_catalog());
    let accepted = submit(&runtime, json!({"action": "ping", "id": 1}));
    assert_eq!(accepted[0]["result"], json!("pong"));

    let rejected = submit(&runtime, json!({"action": "ping", "id": 1, "params": {"x": 1}}));
    assert_eq!(rejected[0]["error"]["code"], json!(-32602));
}

#[test]
fn null_id_still_gets_a_response() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(&runtime, json!({"action": "ping", "id": null}));
    assert_eq!(responses, vec![json!({"id": null, "result": "pong"})]);
}

#[test]
fn keyed_envelope_dispatches_like_flat_form() {
    let runtime = runtime_with(&scenario_catalog());
    let responses = submit(&runtime, json!({"ping": {"action": "ping", "id": 9}}));
    assert_eq!(responses, vec![json!({"id": 9, "result": "pong"})]);
}

#[test]
fn malformed_envelopes_reject_the_whole_batch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let catalog = scenario_catalog();
    catalog
        .register(
            Action::builder("count")
                .result_schema(json!({"type": "integer"}))
                .handler_fn(move |_, _| Ok(json!(counter.fetch_add(1, Ordering::SeqCst))))
                .build()
                .unwrap(),
        )
        .unwrap();
    let runtime = runtime_with(&catalog);
    let caller = CallerIdentity::anonymous();

    let err = runtime
        .submit_value(json!([{"action": "count", "id": 1}, {"id": 2}]), &caller)
        .unwrap_err();
    assert_eq!(err.to_rpc().kind, ErrorKind::InvalidRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let err = runtime.submit("{not json", &caller).unwrap_err();
    assert_eq!(err.to_rpc().kind, ErrorKind::ParseError);
}

#[test]
fn all_notification_batches_have_no_body() {
    let runtime = runtime_with(&scenario_catalog());
    let batch = runtime
        .submit_value(
            json!([{"action": "ping"}, {"action": "crash"}, {"action": "missing"}]),
            &CallerIdentity::anonymous(),
        )
        .unwrap();
    assert!(batch.is_empty());
    assert!(batch.to_wire().is_none());
}

#[test]
fn handler_raised_errors_pass_through() {
    let catalog = ActionCatalog::new();
    catalog
        .register(
            Action::builder("strict")
                .handler_fn(|_, _| {
                    Err(ActionError::Rpc(
                        RpcError::invalid_params("level is out of range")
                            .with_data(json!({"max": 100})),
                    ))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let runtime = runtime_with(&catalog);
    let responses = submit(&runtime, json!({"action": "strict", "id": 1}));
    assert_eq!(
        responses[0],
        json!({"id": 1, "error": {"code": -32602, "message": "level is out of range", "data": {"max": 100}}})
    );
}

#[test]
fn result_schema_validation_only_logs() {
    let catalog = ActionCatalog::new();
    catalog
        .register(
            Action::builder("liar")
                .result_schema(json!({"type": "string"}))
                .handler_fn(|_, _| Ok(json!(42)))
                .build()
                .unwrap(),
        )
        .unwrap();
    let config = RuntimeConfig {
        validate_results: true,
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::new(config, catalog.snapshot(), Arc::new(NullRepository));
    let batch = runtime
        .submit_value(json!({"action": "liar", "id": 1}), &CallerIdentity::anonymous())
        .unwrap();
    assert_eq!(batch.responses[0].result(), Some(&json!(42)));
    assert_eq!(batch.responses[0].result_schema(), Some(&json!({"type": "string"})));
}

struct Brittle;

impl ParameterFactory for Brittle {
    fn name(&self) -> &str {
        "brittle"
    }

    fn input_schema(&self, _declared: Option<&Value>) -> Option<Value> {
        None
    }

    fn convert(&self, _input: Value, _context: &FactoryContext<'_>) -> Result<BoundValue, RpcError> {
        panic!("brittle factory broke")
    }

    fn output_validator(&self) -> OutputValidator {
        OutputValidator::Identity
    }
}

#[test]
fn factory_panics_stay_inside_their_request() {
    let catalog = scenario_catalog();
    catalog.register_factory(Arc::new(Brittle)).unwrap();
    catalog
        .register(
            Action::builder("fragile")
                .parameter(ParameterDef::named("x").with_factory("brittle"))
                .handler_fn(|_, _| Ok(Value::Null))
                .build()
                .unwrap(),
        )
        .unwrap();
    let runtime = runtime_with(&catalog);

    let responses = submit(
        &runtime,
        json!([
            {"action": "fragile", "id": 1, "params": {"x": 1}},
            {"action": "ping", "id": 2}
        ]),
    );
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], json!(1));
    assert_eq!(responses[0]["error"]["code"], json!(-32603));
    assert!(
        responses[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("brittle factory broke")
    );
    assert_eq!(responses[1], json!({"id": 2, "result": "pong"}));
}

#[test]
fn predicate_panics_stay_inside_their_request() {
    let catalog = scenario_catalog();
    catalog
        .register(
            Action::builder("guarded")
                .capability(CapabilityRule::predicate(|_, _| panic!("predicate broke")))
                .handler_fn(|_, _| Ok(Value::Null))
                .build()
                .unwrap(),
        )
        .unwrap();
    let runtime = runtime_with(&catalog);

    let responses = submit(
        &runtime,
        json!([{"action": "guarded", "id": 1}, {"action": "ping", "id": 2}]),
    );
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], json!(-32603));
    assert_eq!(responses[1], json!({"id": 2, "result": "pong"}));

    let silent = runtime
        .submit_value(json!([{"action": "guarded"}]), &CallerIdentity::anonymous())
        .unwrap();
    assert!(silent.is_empty());
}

#[test]
fn reserved_members_are_not_action_keys() {
    let runtime = runtime_with(&scenario_catalog());
    let err = runtime
        .submit_value(json!({"params": {"level": 5}}), &CallerIdentity::anonymous())
        .unwrap_err();
    assert_eq!(err.to_rpc().kind, ErrorKind::InvalidRequest);
}
