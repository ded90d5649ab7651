//! View queries and their query-string encoding.
//!
//! # Design
//! Every parameter value is JSON-encoded before percent-encoding: strings
//! come out quoted, booleans and numbers bare, arrays and objects as JSON.
//! That is what the server expects for `startkey`, `key` and friends, and it
//! keeps `limit=5` and `descending=true` readable. Parameters keep insertion
//! order so the rendered URL, and therefore the cache key, is deterministic.
//!
//! A key set is never put in the URL. The server caps URL length, so
//! multi-key lookups are POSTed with a `{"keys": [...]}` body instead.

use serde_json::{json, Value};

/// The key selector of a view query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ViewKey {
    #[default]
    None,
    Single(Value),
    Multi(Vec<Value>),
}

impl From<&str> for ViewKey {
    fn from(key: &str) -> Self {
        ViewKey::Single(Value::String(key.to_string()))
    }
}

impl From<String> for ViewKey {
    fn from(key: String) -> Self {
        ViewKey::Single(Value::String(key))
    }
}

impl From<bool> for ViewKey {
    fn from(key: bool) -> Self {
        ViewKey::Single(Value::Bool(key))
    }
}

impl<V: Into<Value>> From<Vec<V>> for ViewKey {
    fn from(keys: Vec<V>) -> Self {
        ViewKey::Multi(keys.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<Option<V>> for ViewKey {
    fn from(key: Option<V>) -> Self {
        key.map_or(ViewKey::None, |k| ViewKey::Single(k.into()))
    }
}

/// A query against a design view or the built-in `_all_docs` index.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery {
    design: Option<String>,
    view: String,
    key: ViewKey,
    params: Vec<(String, Value)>,
}

impl ViewQuery {
    pub fn new(design: impl Into<String>, view: impl Into<String>) -> Self {
        Self {
            design: Some(design.into()),
            view: view.into(),
            key: ViewKey::None,
            params: Vec::new(),
        }
    }

    pub fn all_docs() -> Self {
        Self {
            design: None,
            view: "_all_docs".to_string(),
            key: ViewKey::None,
            params: Vec::new(),
        }
    }

    /// Select rows by key. A `Vec` becomes a multi-key lookup.
    pub fn key(mut self, key: impl Into<ViewKey>) -> Self {
        self.key = key.into();
        self
    }

    pub fn keys<V: Into<Value>>(mut self, keys: impl IntoIterator<Item = V>) -> Self {
        self.key = ViewKey::Multi(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Append an extra query parameter. A repeated name is sent twice.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn key_selector(&self) -> &ViewKey {
        &self.key
    }

    pub fn is_multi_key(&self) -> bool {
        matches!(self.key, ViewKey::Multi(_))
    }

    /// Path relative to the database URL, without the query string.
    pub fn relative_path(&self) -> String {
        match &self.design {
            Some(design) => format!(
                "_design/{}/_view/{}",
                urlencoding::encode(design),
                urlencoding::encode(&self.view)
            ),
            None => self.view.clone(),
        }
    }

    /// Rendered query string, without the leading `?`.
    ///
    /// A single key is appended as `&key=...` after the extra params. Key
    /// sets are left out; see `body`.
    pub fn query_string(&self) -> String {
        let mut query = encode_params(&self.params);
        if let ViewKey::Single(key) = &self.key {
            query.push_str("&key=");
            query.push_str(&encode_value(key));
        }
        query
    }

    /// Request body for multi-key lookups.
    pub fn body(&self) -> Option<Value> {
        match &self.key {
            ViewKey::Multi(keys) => Some(json!({ "keys": keys })),
            _ => None,
        }
    }
}

/// JSON-encode then percent-encode a single parameter value.
pub fn encode_value(value: &Value) -> String {
    urlencoding::encode(&value.to_string()).into_owned()
}

/// Render `name=value` pairs joined with `&`, in the given order.
pub fn encode_params(params: &[(String, Value)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={}", encode_value(value)))
        .collect::<Vec<_>>()
        .join("&")
}
