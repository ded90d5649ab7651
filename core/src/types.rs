//! Result shapes returned by `StoreClient`.
//!
//! # Design
//! The client's output-shape toggle decides between raw decoded JSON and
//! `Document` wrappers, so read results are enums rather than a single type.
//! Write results are normalized to `DocRef` whenever the server reports an
//! `id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::Document;

/// Field set of a stored document.
pub type Fields = Map<String, Value>;

/// Identifier and revision of a stored document.
///
/// `rev` is `None` when the server reported no revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

/// Outcome of a successful `put` or `post`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Saved(DocRef),
    /// The server's answer had no `id`; handed back verbatim.
    Raw(Value),
}

impl WriteOutcome {
    pub fn doc_ref(&self) -> Option<&DocRef> {
        match self {
            WriteOutcome::Saved(doc_ref) => Some(doc_ref),
            WriteOutcome::Raw(_) => None,
        }
    }

    /// Fields to merge into a local copy after a save.
    pub fn fields(&self) -> Fields {
        match self {
            WriteOutcome::Saved(doc_ref) => {
                let mut fields = Fields::new();
                fields.insert("_id".to_string(), Value::String(doc_ref.id.clone()));
                if let Some(rev) = &doc_ref.rev {
                    fields.insert("_rev".to_string(), Value::String(rev.clone()));
                }
                fields
            }
            WriteOutcome::Raw(Value::Object(fields)) => fields.clone(),
            WriteOutcome::Raw(_) => Fields::new(),
        }
    }
}

/// A document read through `StoreClient::get`.
#[derive(Debug)]
pub enum Fetched<'c, T> {
    Raw(Value),
    Document(Document<'c, T>),
}

impl<'c, T> Fetched<'c, T> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Fetched::Raw(value) => Some(value),
            Fetched::Document(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Fetched::Raw(value) => value,
            Fetched::Document(doc) => Value::Object(doc.into_map()),
        }
    }

    pub fn into_document(self) -> Option<Document<'c, T>> {
        match self {
            Fetched::Document(doc) => Some(doc),
            Fetched::Raw(_) => None,
        }
    }
}

/// Result of a view or `_all_docs` query.
#[derive(Debug)]
pub enum ViewOutput<'c, T> {
    /// The decoded response body, `rows` and all.
    Raw(Value),
    /// One wrapper per row whose `value` carries an `_id`.
    Documents(Vec<Document<'c, T>>),
}

impl<'c, T> ViewOutput<'c, T> {
    pub fn into_value(self) -> Value {
        match self {
            ViewOutput::Raw(value) => value,
            ViewOutput::Documents(docs) => Value::Array(
                docs.into_iter()
                    .map(|doc| Value::Object(doc.into_map()))
                    .collect(),
            ),
        }
    }

    /// Wrapped documents; empty in raw mode.
    pub fn into_documents(self) -> Vec<Document<'c, T>> {
        match self {
            ViewOutput::Documents(docs) => docs,
            ViewOutput::Raw(_) => Vec::new(),
        }
    }

    /// Raw `rows` array; empty in document mode.
    pub fn rows(&self) -> &[Value] {
        match self {
            ViewOutput::Raw(value) => value
                .get("rows")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            ViewOutput::Documents(_) => &[],
        }
    }
}
