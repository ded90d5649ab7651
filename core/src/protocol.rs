//! Stateless request builder and response interpreter for the document API.
//!
//! # Design
//! `Protocol` holds only the database URL. Each operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method
//! that consumes the matching `HttpResponse`, so the whole wire mapping can
//! be checked without a network. `StoreClient` layers the cache and the
//! transport on top.
//!
//! Status policy differs by operation. Writes have one success code and
//! fail loudly on anything else; reads treat any non-200 as a soft miss.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{DocRef, Fields, WriteOutcome};
use crate::view::ViewQuery;

/// Sent on every request.
pub const USER_AGENT: &str = concat!("couch-core/", env!("CARGO_PKG_VERSION"));

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct Protocol {
    base_url: String,
}

impl Protocol {
    /// `base_url` is the database URL, e.g. `http://localhost:5984/albums/`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Database URL without the trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(id))
    }

    pub fn view_url(&self, query: &ViewQuery) -> String {
        let query_string = query.query_string();
        if query_string.is_empty() {
            format!("{}/{}", self.base_url, query.relative_path())
        } else {
            format!("{}/{}?{query_string}", self.base_url, query.relative_path())
        }
    }

    pub fn build_get(&self, id: &str) -> HttpRequest {
        request(HttpMethod::Get, self.document_url(id), None)
    }

    /// PUT the document under `id`, carrying its `_rev` in the query when set
    /// and non-empty.
    pub fn build_put(&self, id: &str, doc: &Fields) -> Result<HttpRequest> {
        let mut path = self.document_url(id);
        let rev = doc
            .get("_rev")
            .and_then(Value::as_str)
            .filter(|rev| !rev.is_empty());
        if let Some(rev) = rev {
            path.push_str("?rev=");
            path.push_str(&urlencoding::encode(rev));
        }
        Ok(request(HttpMethod::Put, path, Some(encode_body(doc)?)))
    }

    pub fn build_post(&self, doc: &Fields) -> Result<HttpRequest> {
        let path = format!("{}/", self.base_url);
        Ok(request(HttpMethod::Post, path, Some(encode_body(doc)?)))
    }

    pub fn build_delete(&self, id: &str, rev: &str) -> HttpRequest {
        let path = format!("{}?rev={}", self.document_url(id), urlencoding::encode(rev));
        request(HttpMethod::Delete, path, None)
    }

    /// GET for single-key or keyless queries, POST with a `keys` body otherwise.
    pub fn build_view(&self, query: &ViewQuery) -> Result<HttpRequest> {
        let path = self.view_url(query);
        match query.body() {
            Some(body) => Ok(request(HttpMethod::Post, path, Some(encode_body(&body)?))),
            None => Ok(request(HttpMethod::Get, path, None)),
        }
    }

    /// `Some(document)` on 200, `None` on any other status.
    pub fn parse_get(&self, request: &HttpRequest, response: HttpResponse) -> Result<Option<Value>> {
        if response.status != 200 {
            debug!(path = %request.path, status = response.status, "soft miss");
            return Ok(None);
        }
        decode(&response.body).map(Some)
    }

    /// 201 succeeds, 409 is a conflict, anything else is unexpected.
    pub fn parse_put(&self, request: &HttpRequest, response: HttpResponse) -> Result<WriteOutcome> {
        if response.status == 409 {
            warn!(path = %request.path, "revision conflict");
            return Err(StoreError::Conflict {
                method: request.method,
                path: request.path.clone(),
            });
        }
        expect_status(request, &response, 201)?;
        decode(&response.body).map(normalize_write)
    }

    pub fn parse_post(&self, request: &HttpRequest, response: HttpResponse) -> Result<WriteOutcome> {
        expect_status(request, &response, 201)?;
        decode(&response.body).map(normalize_write)
    }

    pub fn parse_delete(&self, request: &HttpRequest, response: HttpResponse) -> Result<()> {
        expect_status(request, &response, 200)
    }

    /// GET views soft-miss like `parse_get`; POSTed key-set views must answer 200.
    pub fn parse_view(&self, request: &HttpRequest, response: HttpResponse) -> Result<Option<Value>> {
        match request.method {
            HttpMethod::Post => {
                expect_status(request, &response, 200)?;
                decode(&response.body).map(Some)
            }
            _ => self.parse_get(request, response),
        }
    }
}

fn request(method: HttpMethod, path: String, body: Option<String>) -> HttpRequest {
    let mut headers = vec![("user-agent".to_string(), USER_AGENT.to_string())];
    if body.is_some() {
        headers.push(("content-type".to_string(), JSON_CONTENT_TYPE.to_string()));
    }
    HttpRequest {
        method,
        path,
        headers,
        body,
    }
}

fn encode_body<S: serde::Serialize>(body: &S) -> Result<String> {
    serde_json::to_string(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| StoreError::Deserialization(e.to_string()))
}

fn expect_status(request: &HttpRequest, response: &HttpResponse, expected: u16) -> Result<()> {
    if response.status == expected {
        return Ok(());
    }
    warn!(
        method = %request.method,
        path = %request.path,
        status = response.status,
        expected,
        "unexpected status"
    );
    Err(StoreError::Response {
        status: response.status,
        method: request.method,
        path: request.path.clone(),
    })
}

/// `{"ok":true,"id":..,"rev":..}` becomes a `DocRef`; other bodies pass through.
fn normalize_write(body: Value) -> WriteOutcome {
    let Some(id) = body.get("id") else {
        return WriteOutcome::Raw(body);
    };
    WriteOutcome::Saved(DocRef {
        id: json_text(id),
        rev: body
            .get("rev")
            .filter(|rev| !rev.is_null())
            .map(json_text)
            .filter(|rev| !rev.is_empty()),
    })
}

/// String values verbatim, anything else as its JSON text.
pub(crate) fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn protocol() -> Protocol {
        Protocol::new("http://localhost:5984/albums/")
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn build_get_encodes_identifier() {
        let req = protocol().build_get("a b/c");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:5984/albums/a%20b%2Fc");
        assert!(req.body.is_none());
        assert_eq!(req.header("user-agent"), Some(USER_AGENT));
        assert_eq!(req.header("content-type"), None);
    }

    #[test]
    fn build_put_carries_revision_in_query() {
        let doc = fields(json!({"_id": "a", "_rev": "1-abc", "title": "Blue"}));
        let req = protocol().build_put("a", &doc).unwrap();
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.path, "http://localhost:5984/albums/a?rev=1-abc");
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Blue");
        assert_eq!(body["_rev"], "1-abc");
    }

    #[test]
    fn build_put_without_revision_has_no_query() {
        let doc = fields(json!({"title": "Blue"}));
        let req = protocol().build_put("a", &doc).unwrap();
        assert_eq!(req.path, "http://localhost:5984/albums/a");
    }

    #[test]
    fn build_post_targets_database_root() {
        let doc = fields(json!({"field": "v"}));
        let req = protocol().build_post(&doc).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:5984/albums/");
    }

    #[test]
    fn build_delete_carries_revision() {
        let req = protocol().build_delete("a", "3-xyz");
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.path, "http://localhost:5984/albums/a?rev=3-xyz");
        assert!(req.body.is_none());
    }

    #[test]
    fn build_view_single_key_is_get() {
        let query = ViewQuery::new("app", "by_title").key("k1");
        let req = protocol().build_view(&query).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.path,
            "http://localhost:5984/albums/_design/app/_view/by_title?&key=%22k1%22"
        );
    }

    #[test]
    fn build_view_key_set_is_post_with_body() {
        let query = ViewQuery::new("app", "by_title")
            .param("limit", 10)
            .key(vec!["k1", "k2"]);
        let req = protocol().build_view(&query).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(
            req.path,
            "http://localhost:5984/albums/_design/app/_view/by_title?limit=10"
        );
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"keys": ["k1", "k2"]}));
    }

    #[test]
    fn build_view_without_key_or_params_has_no_query() {
        let req = protocol().build_view(&ViewQuery::all_docs()).unwrap();
        assert_eq!(req.path, "http://localhost:5984/albums/_all_docs");
    }

    #[test]
    fn parse_get_soft_misses_on_any_non_200() {
        let p = protocol();
        let req = p.build_get("a");
        for status in [404, 500, 503] {
            let result = p.parse_get(&req, HttpResponse::new(status, "")).unwrap();
            assert!(result.is_none(), "status {status}");
        }
    }

    #[test]
    fn parse_get_bad_json_is_an_error() {
        let p = protocol();
        let req = p.build_get("a");
        let err = p.parse_get(&req, HttpResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(err, StoreError::Deserialization(_)));
    }

    #[test]
    fn parse_put_conflict() {
        let p = protocol();
        let doc = fields(json!({"_rev": "1-old"}));
        let req = p.build_put("a", &doc).unwrap();
        let err = p
            .parse_put(&req, HttpResponse::new(409, r#"{"error":"conflict"}"#))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { method: HttpMethod::Put, .. }));
    }

    #[test]
    fn parse_put_unexpected_status() {
        let p = protocol();
        let req = p.build_put("a", &Fields::new()).unwrap();
        let err = p.parse_put(&req, HttpResponse::new(400, "")).unwrap_err();
        match err {
            StoreError::Response { status, method, path } => {
                assert_eq!(status, 400);
                assert_eq!(method, HttpMethod::Put);
                assert_eq!(path, "http://localhost:5984/albums/a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_put_normalizes_id_and_rev() {
        let p = protocol();
        let req = p.build_put("a", &Fields::new()).unwrap();
        let outcome = p
            .parse_put(&req, HttpResponse::new(201, r#"{"ok":true,"id":"a","rev":"1-x"}"#))
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Saved(DocRef {
                id: "a".to_string(),
                rev: Some("1-x".to_string())
            })
        );
    }

    #[test]
    fn parse_write_without_rev_has_no_revision() {
        let p = protocol();
        let req = p.build_post(&Fields::new()).unwrap();
        let outcome = p
            .parse_post(&req, HttpResponse::new(201, r#"{"ok":true,"id":"x"}"#))
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Saved(DocRef {
                id: "x".to_string(),
                rev: None
            })
        );
        assert!(!outcome.fields().contains_key("_rev"));
    }

    #[test]
    fn build_put_skips_empty_revision() {
        let doc = fields(json!({"_id": "x", "_rev": ""}));
        let req = protocol().build_put("x", &doc).unwrap();
        assert_eq!(req.path, "http://localhost:5984/albums/x");
    }

    #[test]
    fn parse_post_without_id_returns_body_verbatim() {
        let p = protocol();
        let req = p.build_post(&Fields::new()).unwrap();
        let outcome = p.parse_post(&req, HttpResponse::new(201, r#"{"ok":true}"#)).unwrap();
        assert_eq!(outcome, WriteOutcome::Raw(json!({"ok": true})));
    }

    #[test]
    fn parse_post_conflict_is_a_response_failure() {
        let p = protocol();
        let req = p.build_post(&Fields::new()).unwrap();
        let err = p.parse_post(&req, HttpResponse::new(409, "")).unwrap_err();
        assert!(matches!(err, StoreError::Response { status: 409, .. }));
    }

    #[test]
    fn parse_delete_requires_200() {
        let p = protocol();
        let req = p.build_delete("a", "1-x");
        assert!(p.parse_delete(&req, HttpResponse::new(200, r#"{"ok":true}"#)).is_ok());
        let err = p.parse_delete(&req, HttpResponse::new(404, "")).unwrap_err();
        assert!(matches!(err, StoreError::Response { status: 404, method: HttpMethod::Delete, .. }));
    }

    #[test]
    fn parse_view_get_soft_misses_but_post_fails() {
        let p = protocol();
        let get = p.build_view(&ViewQuery::new("app", "v").key("k")).unwrap();
        assert!(p.parse_view(&get, HttpResponse::new(500, "")).unwrap().is_none());

        let post = p.build_view(&ViewQuery::new("app", "v").keys(["k"])).unwrap();
        let err = p.parse_view(&post, HttpResponse::new(500, "")).unwrap_err();
        assert!(matches!(err, StoreError::Response { status: 500, method: HttpMethod::Post, .. }));
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let with = Protocol::new("http://localhost:5984/albums/");
        let without = Protocol::new("http://localhost:5984/albums");
        assert_eq!(with.build_get("a").path, without.build_get("a").path);
    }
}
