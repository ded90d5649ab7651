//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and expected outcomes. Request bodies are compared as parsed JSON so field
//! order does not matter.

use couch_core::{
    Fields, HttpMethod, HttpRequest, HttpResponse, Protocol, StoreError, ViewKey, ViewQuery,
    WriteOutcome,
};
use serde_json::Value;

const BASE_URL: &str = "http://localhost:5984/albums";

fn protocol() -> Protocol {
    Protocol::new(BASE_URL)
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn simulated(case: &Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse::new(
        sim["status"].as_u64().unwrap() as u16,
        sim["body"].as_str().unwrap(),
    )
}

fn check_request(name: &str, req: &HttpRequest, expected: &Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(
        req.path,
        format!("{BASE_URL}{}", expected["path"].as_str().unwrap()),
        "{name}: path"
    );
    let body: Value = req
        .body
        .as_deref()
        .map(|b| serde_json::from_str(b).unwrap())
        .unwrap_or(Value::Null);
    assert_eq!(body, expected["body"], "{name}: body");
    if req.body.is_some() {
        assert_eq!(req.header("content-type"), Some("application/json"), "{name}: content-type");
    }
    assert!(req.header("user-agent").is_some(), "{name}: user-agent");
}

fn check_error(name: &str, err: StoreError, expected: &str) {
    match expected {
        "Conflict" => assert!(matches!(err, StoreError::Conflict { .. }), "{name}: expected Conflict, got {err}"),
        "Response" => assert!(matches!(err, StoreError::Response { .. }), "{name}: expected Response, got {err}"),
        other => panic!("{name}: unknown expected_error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

fn view_query(input: &Value) -> ViewQuery {
    let mut query = if input["all_docs"].as_bool() == Some(true) {
        ViewQuery::all_docs()
    } else {
        ViewQuery::new(
            input["design"].as_str().unwrap(),
            input["view"].as_str().unwrap(),
        )
    };
    if let Some(params) = input["params"].as_array() {
        for pair in params {
            query = query.param(pair[0].as_str().unwrap(), pair[1].clone());
        }
    }
    if let Some(key) = input.get("key") {
        query = query.key(ViewKey::Single(key.clone()));
    }
    if let Some(keys) = input["keys"].as_array() {
        query = query.keys(keys.iter().cloned());
    }
    query
}

#[test]
fn view_test_vectors() {
    let raw = include_str!("../../test-vectors/views.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let p = protocol();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let query = view_query(&case["input"]);

        // Verify build
        let req = p.build_view(&query).unwrap();
        check_request(name, &req, &case["expected_request"]);

        // Verify parse
        let result = p.parse_view(&req, simulated(case));
        match case["expected_outcome"].as_str().unwrap() {
            "rows" => {
                let body = result.unwrap().expect("expected a body");
                assert!(body["rows"].is_array(), "{name}: rows");
            }
            "soft_miss" => assert!(result.unwrap().is_none(), "{name}: expected soft miss"),
            expected => check_error(name, result.unwrap_err(), expected),
        }
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn as_fields(value: &Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn write_test_vectors() {
    let raw = include_str!("../../test-vectors/writes.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let p = protocol();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let doc = as_fields(&case["input"]);

        let result: Result<Value, StoreError> = match case["op"].as_str().unwrap() {
            "put" => {
                let req = p.build_put(case["id"].as_str().unwrap(), &doc).unwrap();
                check_request(name, &req, &case["expected_request"]);
                p.parse_put(&req, simulated(case)).map(outcome_value)
            }
            "post" => {
                let req = p.build_post(&doc).unwrap();
                check_request(name, &req, &case["expected_request"]);
                p.parse_post(&req, simulated(case)).map(outcome_value)
            }
            "delete" => {
                let req = p.build_delete(case["id"].as_str().unwrap(), case["rev"].as_str().unwrap());
                check_request(name, &req, &case["expected_request"]);
                p.parse_delete(&req, simulated(case)).map(|()| Value::Null)
            }
            other => panic!("{name}: unknown op: {other}"),
        };

        if let Some(expected_error) = case.get("expected_error") {
            check_error(name, result.unwrap_err(), expected_error.as_str().unwrap());
        } else {
            assert_eq!(result.unwrap(), case["expected_result"], "{name}: result");
        }
    }
}

fn outcome_value(outcome: WriteOutcome) -> Value {
    match outcome {
        WriteOutcome::Saved(doc_ref) => serde_json::to_value(doc_ref).unwrap(),
        WriteOutcome::Raw(value) => value,
    }
}
