//! End-to-end tests for the capture pipeline: dispatcher, merge, serializer
//! and the collection file on disk.

use postcap::collection::postman;
use postcap::dispatch::DispatchOutcome;
use postcap::persist::StagedWrite;
use postcap::{CaptureStore, DomainFilter, EventDispatcher, Flow, MergeOutcome, Normalizer};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn dispatcher_at(path: &Path, domain: &str, name: &str) -> EventDispatcher {
    EventDispatcher::new(
        DomainFilter::new(domain).unwrap(),
        Normalizer::default(),
        Arc::new(CaptureStore::new(name, path)),
    )
}

fn json_flow(method: &str, url: &str, body: &str) -> Flow {
    Flow::new(method, url).with_response(200, Some("application/json"), body.to_string())
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn test_orders_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Orders.json");
    let d = dispatcher_at(&path, "example.com", "Orders");

    assert_eq!(
        d.on_flow_complete(&json_flow(
            "GET",
            "http://api.example.com/orders?status=open",
            r#"{"id":1}"#
        )),
        DispatchOutcome::Merged(MergeOutcome::Inserted)
    );
    assert_eq!(
        d.on_flow_complete(&json_flow(
            "GET",
            "http://api.example.com/orders/55",
            r#"{"id":55}"#
        )),
        DispatchOutcome::Merged(MergeOutcome::Inserted)
    );

    let doc = read_json(&path);
    assert_eq!(doc["info"]["name"], "Orders");
    let top = doc["item"].as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["name"], "orders");

    let entries = top[0]["item"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "GET /orders?status");
    assert_eq!(entries[0]["response"][0]["body"], r#"{"id":1}"#);
    assert_eq!(entries[1]["name"], "GET /orders/{id}");
    assert_eq!(
        entries[1]["request"]["url"]["raw"],
        "http://api.example.com/orders/55"
    );
    assert_eq!(entries[1]["response"][0]["body"], r#"{"id":55}"#);

    let model = d.store().snapshot();
    let entry = &model.root.child("orders").unwrap().items[1];
    assert_eq!(entry.key.path, "/orders/{id}");
    assert!(entry.key.query_keys.is_empty());
}

#[test]
fn test_users_grouping_keeps_last_example() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Users.json");
    let d = dispatcher_at(&path, "example.com", "Users");

    d.on_flow_complete(&json_flow("GET", "http://example.com/users/42", r#"{"id":42}"#));
    d.on_flow_complete(&json_flow("GET", "http://example.com/users/43", r#"{"id":43}"#));

    let model = d.store().snapshot();
    assert_eq!(model.root.children.len(), 1);
    let users = model.root.child("users").unwrap();
    assert_eq!(users.items.len(), 1);
    assert_eq!(users.items[0].name(), "GET /users/{id}");
    assert_eq!(users.items[0].request.url, "http://example.com/users/43");
}

#[test]
fn test_out_of_scope_traffic_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("C.json");
    let d = dispatcher_at(&path, "example.com", "C");

    d.on_flow_complete(&json_flow("GET", "http://notexample.com/a", "{}"));
    d.on_flow_complete(&json_flow("GET", "http://cdn.other.net/b", "{}"));
    assert!(!path.exists());
}

#[test]
fn test_repeated_flow_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("C.json");
    let d = dispatcher_at(&path, "example.com", "C");
    let heartbeat = json_flow("GET", "http://example.com/heartbeat", r#"{"ok":true}"#);

    d.on_flow_complete(&heartbeat);
    let first = fs::read(&path).unwrap();
    let version = d.store().persisted_version();

    assert_eq!(
        d.on_flow_complete(&heartbeat),
        DispatchOutcome::Merged(MergeOutcome::Unchanged)
    );
    assert_eq!(fs::read(&path).unwrap(), first);
    assert_eq!(d.store().persisted_version(), version);
}

#[test]
fn test_output_is_deterministic_across_sessions() {
    let flows = vec![
        json_flow("GET", "http://api.example.com/orders?status=open", "[]"),
        json_flow("POST", "http://api.example.com/orders", r#"{"id":9}"#),
        json_flow("GET", "http://api.example.com/orders/9/items", "[]"),
        json_flow("GET", "http://api.example.com/", "{}"),
        json_flow("GET", "http://api.example.com/orders/10", r#"{"id":10}"#),
    ];

    let run = || {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Orders.json");
        let d = dispatcher_at(&path, "example.com", "Orders");
        for flow in &flows {
            d.on_flow_complete(flow);
        }
        fs::read(&path).unwrap()
    };

    assert_eq!(run(), run());
}

#[test]
fn test_concurrent_flows_for_one_identity() {
    const N: usize = 32;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("C.json");
    let d = Arc::new(dispatcher_at(&path, "example.com", "C"));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let d = Arc::clone(&d);
            thread::spawn(move || {
                let flow = json_flow(
                    "GET",
                    &format!("http://example.com/users/{i}"),
                    &format!(r#"{{"id":{i}}}"#),
                );
                d.on_flow_complete(&flow)
            })
        })
        .collect();
    for handle in handles {
        assert!(matches!(handle.join().unwrap(), DispatchOutcome::Merged(_)));
    }

    let model = d.store().snapshot();
    assert_eq!(model.request_count(), 1);
    let entry = &model.root.child("users").unwrap().items[0];

    // Request and response come from the same input.
    let id = entry.request.segments[1].clone();
    assert_eq!(
        entry.response.body.as_ref().unwrap().text(),
        format!(r#"{{"id":{id}}}"#)
    );

    // The newest version is what ended up on disk.
    assert_eq!(d.store().persisted_version(), d.store().version());
    assert_eq!(fs::read(&path).unwrap(), postman::serialize(&model).unwrap());
}

#[test]
fn test_concurrent_flows_for_many_identities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("C.json");
    let d = Arc::new(dispatcher_at(&path, "example.com", "C"));

    let handles: Vec<_> = ["users", "orders", "carts", "items"]
        .into_iter()
        .flat_map(|resource| (0..8).map(move |i| (resource, i)))
        .map(|(resource, i)| {
            let d = Arc::clone(&d);
            thread::spawn(move || {
                d.on_flow_complete(&json_flow(
                    "GET",
                    &format!("http://example.com/{resource}/{i}"),
                    "{}",
                ))
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let model = d.store().snapshot();
    assert_eq!(model.root.children.len(), 4);
    assert_eq!(model.request_count(), 4);
    assert_eq!(fs::read(&path).unwrap(), postman::serialize(&model).unwrap());
}

#[test]
fn test_interrupted_write_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("C.json");
    let d = dispatcher_at(&path, "example.com", "C");
    d.on_flow_complete(&json_flow("GET", "http://example.com/a", "{}"));
    let before = fs::read(&path).unwrap();

    // Temp file fully written, process "dies" before the rename.
    let staged = StagedWrite::stage(b"{\"info\": {\"name\": \"tor", &path).unwrap();
    drop(staged);

    assert_eq!(fs::read(&path).unwrap(), before);
    let (name, flows) = postman::read_flows(&before).unwrap();
    assert_eq!(name, "C");
    assert_eq!(flows.len(), 1);
}

#[test]
fn test_resume_continues_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Shop.json");
    {
        let d = dispatcher_at(&path, "example.com", "Shop");
        d.on_flow_complete(&json_flow("GET", "http://example.com/products/1", "{}"));
        d.on_flow_complete(&json_flow("GET", "http://example.com/cart", "[]"));
    }

    let store = CaptureStore::open("Shop", &path, &Normalizer::default()).unwrap();
    let d = EventDispatcher::new(
        DomainFilter::new("example.com").unwrap(),
        Normalizer::default(),
        Arc::new(store),
    );
    assert_eq!(
        d.on_flow_complete(&json_flow("GET", "http://example.com/products/1", "{}")),
        DispatchOutcome::Merged(MergeOutcome::Unchanged)
    );
    assert_eq!(
        d.on_flow_complete(&json_flow("POST", "http://example.com/cart", "{}")),
        DispatchOutcome::Merged(MergeOutcome::Inserted)
    );

    let doc = read_json(&path);
    let names: Vec<&str> = doc["item"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["products", "cart"]);
    assert_eq!(doc["item"][1]["item"].as_array().unwrap().len(), 2);
}

mod properties {
    use super::json_flow;
    use postcap::collection::{merge, postman, CollectionModel};
    use postcap::{Flow, Normalizer};
    use proptest::prelude::*;

    const PATHS: &[&str] = &[
        "/",
        "/orders",
        "/orders/1",
        "/orders/2/items",
        "/orders?status=open",
        "/orders?page=2&status=open",
        "/users/7f3c2a1e-9b4d-4c8e-a1f2-0123456789ab",
        "/users/me",
        "/api/v1/carts/99",
    ];

    fn pool() -> impl Strategy<Value = Flow> {
        (0..PATHS.len(), prop::bool::ANY, 0u8..4).prop_map(|(path, post, n)| {
            let method = if post { "POST" } else { "GET" };
            json_flow(
                method,
                &format!("http://api.example.com{}", PATHS[path]),
                &format!(r#"{{"n":{n}}}"#),
            )
        })
    }

    fn build(flows: &[Flow]) -> Vec<u8> {
        let normalizer = Normalizer::default();
        let mut model = CollectionModel::new("Prop");
        for flow in flows {
            merge(&mut model, normalizer.normalize(flow).unwrap());
        }
        postman::serialize(&model).unwrap()
    }

    proptest! {
        #[test]
        fn test_same_sequence_same_bytes(flows in prop::collection::vec(pool(), 0..24)) {
            prop_assert_eq!(build(&flows), build(&flows));
        }

        #[test]
        fn test_replaying_sequence_changes_nothing(flows in prop::collection::vec(pool(), 0..24)) {
            let mut twice = flows.clone();
            twice.extend(flows.iter().cloned());
            prop_assert_eq!(build(&flows), build(&twice));
        }
    }
}
