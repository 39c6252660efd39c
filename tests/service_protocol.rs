use actionrpc::runtime::CallerIdentity;
use actionrpc::service::Service;
use actionrpc::things::{self, ADMINISTER, THING_TYPE};
use actionrpc::{PROTOCOL_VERSION, RuntimeConfig};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

fn run_session(service: &Service, requests: Vec<Value>) -> Vec<Value> {
    let input_data = requests
        .into_iter()
        .map(|req| serde_json::to_string(&req).unwrap())
        .collect::<Vec<_>>()
        .join("\n");

    let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
    let writer = SharedWriter(sink.clone());
    let reader = Cursor::new(format!("{}\n", input_data));
    service.handle(reader, writer).unwrap();

    let output = sink.borrow();
    output
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice::<Value>(line).unwrap())
        .collect()
}

#[test]
fn service_handles_basic_commands() {
    let (runtime, _store) = things::sample_runtime(RuntimeConfig::default()).unwrap();
    let service = Service::from_config(runtime);

    let requests = vec![
        json!({"id": 1, "op": "handshake", "params": {"client": "test", "protocol_version": "0.0.1"}}),
        json!({"id": 2, "op": "handshake", "params": {"client": "test", "protocol_version": PROTOCOL_VERSION}}),
        json!({"id": 3, "op": "resolve", "params": {"payload": {"action": "ping", "id": 1}}}),
        json!({"id": 4, "op": "resolve", "params": {"payload": "[{\"action\": \"ping\"}]"}}),
        json!({"id": 5, "op": "resolve", "params": {"payload": "{broken"}}),
        json!({"id": 6, "op": "actions", "params": {}}),
        json!({"id": 7, "op": "action", "params": {"id": "ping"}}),
        json!({"id": 8, "op": "action", "params": {"id": "thing.setBrightness"}}),
        json!({"id": 9, "op": "action", "params": {}}),
        json!({"id": 10, "op": "noop", "params": {}}),
    ];
    let lines = run_session(&service, requests);

    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0]["error"]["code"], "protocol_error");
    assert_eq!(lines[1]["result"]["protocol_version"], json!(PROTOCOL_VERSION));
    assert_eq!(lines[1]["result"]["runtime"]["caller"], json!("anonymous"));

    assert_eq!(lines[2]["id"], json!(3));
    assert_eq!(lines[2]["result"]["status"], json!(200));
    assert_eq!(lines[2]["result"]["body"], json!([{"id": 1, "result": "pong"}]));

    assert_eq!(lines[3]["result"]["status"], json!(204));
    assert!(lines[3]["result"].get("body").is_none());

    assert_eq!(lines[4]["result"]["status"], json!(400));
    assert_eq!(lines[4]["result"]["body"]["id"], Value::Null);
    assert_eq!(lines[4]["result"]["body"]["error"]["code"], json!(-32700));

    let listed: Vec<_> = lines[5]["result"]["body"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|definition| definition["id"].as_str())
        .collect();
    assert!(listed.contains(&"ping"));
    assert!(!listed.contains(&"thing.setBrightness"));

    assert_eq!(lines[6]["result"]["status"], json!(200));
    assert_eq!(lines[6]["result"]["body"]["id"], json!("ping"));
    assert_eq!(lines[7]["result"]["status"], json!(404));
    assert_eq!(lines[8]["error"]["code"], "invalid_params");
    assert_eq!(lines[9]["error"]["code"], "unsupported_command");
}

#[test]
fn malformed_command_lines_are_reported_and_skipped() {
    let (runtime, _store) = things::sample_runtime(RuntimeConfig::default()).unwrap();
    let service = Service::from_config(runtime);

    let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
    let writer = SharedWriter(sink.clone());
    let reader = Cursor::new("not json\n\n{\"id\": 2, \"op\": \"actions\"}\n");
    service.handle(reader, writer).unwrap();

    let output = sink.borrow();
    let lines: Vec<Value> = output
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], Value::Null);
    assert_eq!(lines[0]["error"]["code"], "parse_error");
    assert_eq!(lines[1]["result"]["status"], json!(200));
}

#[test]
fn service_acts_as_its_caller() {
    let (runtime, store) = things::sample_runtime(RuntimeConfig::default()).unwrap();
    let admin = CallerIdentity::new("admin").with_permission(ADMINISTER);
    let service = Service::new(runtime, admin);
    let uuid = store.list()[0].uuid;

    let lines = run_session(
        &service,
        vec![json!({"id": "dim", "op": "resolve", "params": {"payload": {
            "action": "thing.setBrightness",
            "id": 1,
            "params": {"thing": {"type": THING_TYPE, "uuid": uuid.to_string()}, "level": 20}
        }}})],
    );

    assert_eq!(lines[0]["id"], json!("dim"));
    let body = &lines[0]["result"]["body"];
    assert_eq!(body[0]["result"]["brightness"], json!(20));
    let tags = lines[0]["result"]["cacheability"]["tags"].as_array().unwrap();
    assert!(tags.contains(&json!(format!("thing:{uuid}"))));
    assert_eq!(store.get(&uuid).unwrap().brightness, 20);
}

struct SharedWriter(Rc<RefCell<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
