//! Mutable local view over one document.
//!
//! # Design
//! A `Document` owns a copy of the field set and borrows the `StoreClient`
//! that produced it only to save. Edits stay local until `save`, which
//! picks `put` or `post` depending on whether `_id` is set and merges the
//! server's `_id`/`_rev` back in. `save` reports failure as `false`; use the
//! client directly when the cause matters.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::client::StoreClient;
use crate::http::Transport;
use crate::protocol::json_text;
use crate::types::Fields;

pub struct Document<'c, T> {
    client: &'c StoreClient<T>,
    fields: Fields,
}

impl<'c, T> Document<'c, T> {
    pub(crate) fn new(client: &'c StoreClient<T>, fields: Fields) -> Self {
        Self { client, fields }
    }

    /// Wrap a decoded value if it is an object carrying a string `_id`.
    pub(crate) fn from_stored(client: &'c StoreClient<T>, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) if fields.get("_id").is_some_and(Value::is_string) => {
                Some(Self::new(client, fields))
            }
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("_id")
    }

    pub fn rev(&self) -> Option<&str> {
        self.get_str("_rev")
    }

    /// `None` for fields that are not set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Set a field locally. `_id` and `_rev` are ordinary fields here.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn as_map(&self) -> &Fields {
        &self.fields
    }

    pub fn into_map(self) -> Fields {
        self.fields
    }
}

impl<T: Transport> Document<'_, T> {
    /// Persist the local copy. Returns `false` on any failure.
    ///
    /// Any non-null `_id` counts as set; non-string ids are sent as their
    /// JSON text.
    pub fn save(&mut self) -> bool {
        let id = self
            .fields
            .get("_id")
            .filter(|id| !id.is_null())
            .map(json_text);
        let result = match id {
            Some(id) => self.client.put(&id, &self.fields),
            None => self.client.post(&self.fields),
        };
        match result {
            Ok(outcome) => {
                self.fields.extend(outcome.fields());
                true
            }
            Err(e) => {
                debug!(id = ?self.fields.get("_id"), error = %e, "save failed");
                false
            }
        }
    }
}

impl<T> fmt::Debug for Document<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl<T> Serialize for Document<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
