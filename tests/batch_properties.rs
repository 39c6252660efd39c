use actionrpc::runtime::{
    Action, ActionCatalog, CallerIdentity, NullRepository, ParameterDef, Runtime, RuntimeConfig,
};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Call {
    Ping,
    Echo(i64),
    Missing,
    BadParams,
}

fn runtime() -> Runtime {
    let catalog = ActionCatalog::new();
    catalog
        .register(
            Action::builder("ping")
                .handler_fn(|_, _| Ok(json!("pong")))
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .register(
            Action::builder("echo")
                .parameter(
                    ParameterDef::named("value")
                        .with_schema(json!({"type": "integer"}))
                        .required(),
                )
                .handler_fn(|params, _| Ok(params.json("value").cloned().unwrap_or_default()))
                .build()
                .unwrap(),
        )
        .unwrap();
    Runtime::new(RuntimeConfig::default(), catalog.snapshot(), Arc::new(NullRepository))
}

fn call() -> impl Strategy<Value = Call> {
    prop_oneof![
        Just(Call::Ping),
        any::<i64>().prop_map(Call::Echo),
        Just(Call::Missing),
        Just(Call::BadParams),
    ]
}

fn envelope(call: Call, id: Option<usize>) -> Value {
    let mut request = match call {
        Call::Ping => json!({"action": "ping"}),
        Call::Echo(value) => json!({"action": "echo", "params": {"value": value}}),
        Call::Missing => json!({"action": "missing"}),
        Call::BadParams => json!({"action": "echo", "params": {"value": "high"}}),
    };
    if let Some(id) = id {
        request["id"] = json!(id);
    }
    request
}

proptest! {
    #[test]
    fn responses_follow_request_order(calls in prop::collection::vec((call(), any::<bool>()), 1..12)) {
        let runtime = runtime();
        let batch: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(index, (call, notify))| envelope(*call, (!notify).then_some(index)))
            .collect();
        let expected: Vec<(usize, Call)> = calls
            .iter()
            .enumerate()
            .filter(|(_, (_, notify))| !notify)
            .map(|(index, (call, _))| (index, *call))
            .collect();

        let result = runtime
            .submit_value(Value::Array(batch), &CallerIdentity::anonymous())
            .unwrap();
        prop_assert_eq!(result.responses.len(), expected.len());
        prop_assert_eq!(result.to_wire().is_none(), expected.is_empty());

        for (response, (index, call)) in result.responses.iter().zip(expected) {
            prop_assert_eq!(response.id(), &json!(index));
            prop_assert!(response.result().is_some() != response.error_object().is_some());
            match call {
                Call::Ping => prop_assert_eq!(response.result(), Some(&json!("pong"))),
                Call::Echo(value) => prop_assert_eq!(response.result(), Some(&json!(value))),
                Call::Missing => prop_assert_eq!(response.error_object().map(|e| e.code()), Some(-32601)),
                Call::BadParams => prop_assert_eq!(response.error_object().map(|e| e.code()), Some(-32602)),
            }
        }
    }

    #[test]
    fn batch_cacheability_covers_every_response(calls in prop::collection::vec(call(), 1..8)) {
        let runtime = runtime();
        let batch: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| envelope(*call, Some(index)))
            .collect();
        let result = runtime
            .submit_value(Value::Array(batch), &CallerIdentity::anonymous())
            .unwrap();
        for response in &result.responses {
            prop_assert!(response.cacheability().contexts.is_subset(&result.cacheability.contexts));
            prop_assert!(response.cacheability().tags.is_subset(&result.cacheability.tags));
        }
    }
}
