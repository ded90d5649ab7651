//! Caching client for a single database.
//!
//! # Design
//! `StoreClient` pairs a stateless `Protocol` with a `Transport` and an
//! in-memory cache. Every public operation is at most one round trip.
//!
//! The cache holds the last decoded body per document id and per GET view
//! URL, for the lifetime of the client. There is no expiry: only `delete`
//! evicts the document it touches, and `clear_cache` drops everything. A
//! cached `get` after `put` still returns the pre-update body; pass
//! `use_cache = false` to see the write. The map sits behind a mutex so
//! a client can be shared across threads; calls are still blocking.
//!
//! Reads soft-miss: `get` and GET views return `Ok(None)` for any non-200,
//! so "not found" and "server error" look the same on that path. Writes,
//! deletes and POSTed key-set views return typed errors instead.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::config::ServerConfig;
use crate::document::Document;
use crate::error::Result;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::protocol::Protocol;
use crate::transport::UreqTransport;
use crate::types::{Fetched, Fields, ViewOutput, WriteOutcome};
use crate::view::ViewQuery;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Document(String),
    View(String),
}

pub struct StoreClient<T = UreqTransport> {
    protocol: Protocol,
    transport: T,
    cache: Mutex<HashMap<CacheKey, Value>>,
    as_documents: bool,
}

impl StoreClient<UreqTransport> {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_transport(&config.base_url(), UreqTransport::new())
    }

    /// Client for a database URL such as `http://localhost:5984/albums/`.
    pub fn from_url(base_url: &str) -> Self {
        Self::with_transport(base_url, UreqTransport::new())
    }
}

impl<T> StoreClient<T> {
    pub fn with_transport(base_url: &str, transport: T) -> Self {
        Self {
            protocol: Protocol::new(base_url),
            transport,
            cache: Mutex::new(HashMap::new()),
            as_documents: false,
        }
    }

    /// Return `Document` wrappers instead of raw JSON from reads.
    pub fn as_documents(mut self, flag: bool) -> Self {
        self.as_documents = flag;
        self
    }

    pub fn returns_documents(&self) -> bool {
        self.as_documents
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.cache
            .lock()
            .contains_key(&CacheKey::Document(id.to_string()))
    }

    pub fn invalidate(&self, id: &str) {
        self.cache.lock().remove(&CacheKey::Document(id.to_string()));
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Wrap a field set that has not been stored yet.
    pub fn document(&self, fields: Fields) -> Document<'_, T> {
        Document::new(self, fields)
    }

    pub fn new_document(&self) -> Document<'_, T> {
        self.document(Fields::new())
    }

    fn cached(&self, key: &CacheKey) -> Option<Value> {
        let hit = self.cache.lock().get(key).cloned();
        if hit.is_some() {
            debug!(key = ?key, "cache hit");
        }
        hit
    }

    fn store(&self, key: CacheKey, value: &Value) {
        self.cache.lock().insert(key, value.clone());
    }

    fn fetched(&self, value: Value) -> Fetched<'_, T> {
        if !self.as_documents {
            return Fetched::Raw(value);
        }
        match value {
            Value::Object(fields) => Fetched::Document(Document::new(self, fields)),
            other => Fetched::Raw(other),
        }
    }

    /// Each row's `value` becomes one document; rows without an `_id` are dropped.
    fn view_output(&self, body: Value) -> ViewOutput<'_, T> {
        if !self.as_documents {
            return ViewOutput::Raw(body);
        }
        let rows = match body {
            Value::Object(mut map) => match map.remove("rows") {
                Some(Value::Array(rows)) => rows,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        let docs = rows
            .into_iter()
            .filter_map(|mut row| row.get_mut("value").map(Value::take))
            .filter_map(|value| Document::from_stored(self, value))
            .collect();
        ViewOutput::Documents(docs)
    }
}

impl<T: Transport> StoreClient<T> {
    fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let response = self.transport.execute(request)?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            "round trip"
        );
        Ok(response)
    }

    /// Fetch a document, serving it from the cache when `use_cache` is set.
    ///
    /// Any non-200 answer is `Ok(None)`.
    pub fn get(&self, id: &str, use_cache: bool) -> Result<Option<Fetched<'_, T>>> {
        let key = CacheKey::Document(id.to_string());
        if use_cache {
            if let Some(value) = self.cached(&key) {
                return Ok(Some(self.fetched(value)));
            }
        }
        let request = self.protocol.build_get(id);
        let response = self.round_trip(&request)?;
        let Some(value) = self.protocol.parse_get(&request, response)? else {
            return Ok(None);
        };
        self.store(key, &value);
        Ok(Some(self.fetched(value)))
    }

    /// Store `doc` under `id`. A stale `_rev` yields `StoreError::Conflict`.
    pub fn put(&self, id: &str, doc: &Fields) -> Result<WriteOutcome> {
        let request = self.protocol.build_put(id, doc)?;
        let response = self.round_trip(&request)?;
        self.protocol.parse_put(&request, response)
    }

    /// Store `doc` under a server-assigned identifier.
    pub fn post(&self, doc: &Fields) -> Result<WriteOutcome> {
        let request = self.protocol.build_post(doc)?;
        let response = self.round_trip(&request)?;
        self.protocol.parse_post(&request, response)
    }

    pub fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let request = self.protocol.build_delete(id, rev);
        let response = self.round_trip(&request)?;
        self.protocol.parse_delete(&request, response)?;
        self.invalidate(id);
        Ok(())
    }

    pub fn get_all_documents(&self) -> Result<Option<ViewOutput<'_, T>>> {
        self.get_view(&ViewQuery::all_docs())
    }

    pub fn get_all_documents_with<K, V>(
        &self,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Option<ViewOutput<'_, T>>>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.get_view(&ViewQuery::all_docs().params(params))
    }

    /// Run a view query.
    ///
    /// Single-key and keyless queries are GETs: cached by URL and soft-missed
    /// on non-200. Key-set queries are POSTed, bypass the cache, and fail with
    /// `StoreError::Response` on non-200.
    pub fn get_view(&self, query: &ViewQuery) -> Result<Option<ViewOutput<'_, T>>> {
        let request = self.protocol.build_view(query)?;
        let key = CacheKey::View(request.path.clone());
        let cacheable = request.method == HttpMethod::Get;
        if cacheable {
            if let Some(value) = self.cached(&key) {
                return Ok(Some(self.view_output(value)));
            }
        }
        let response = self.round_trip(&request)?;
        let Some(body) = self.protocol.parse_view(&request, response)? else {
            return Ok(None);
        };
        if cacheable {
            self.store(key, &body);
        }
        Ok(Some(self.view_output(body)))
    }
}

impl<T> fmt::Debug for StoreClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("base_url", &self.protocol.base_url())
            .field("as_documents", &self.as_documents)
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}
