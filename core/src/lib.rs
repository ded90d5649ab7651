//! Synchronous client for a document-oriented HTTP database.
//!
//! # Overview
//! Maps typed calls (get, put, post, delete, view queries) onto the
//! database's HTTP API and interprets the status codes that come back.
//! `StoreClient` keeps a per-instance cache of documents and GET view
//! results; `Document` offers a mutable local copy that saves itself back
//! through the client.
//!
//! # Design
//! - `Protocol` is pure: `build_*` produces an `HttpRequest`, `parse_*`
//!   consumes an `HttpResponse`. No I/O happens there.
//! - `Transport` is the only I/O seam. `UreqTransport` is the default; tests
//!   substitute their own.
//! - Reads soft-miss (`Ok(None)` on non-200). Writes return `StoreError`.
//!
//! ```no_run
//! use couch_core::{ServerConfig, StoreClient, ViewQuery};
//!
//! let client = StoreClient::new(&ServerConfig::new("albums")).as_documents(true);
//! if let Some(fetched) = client.get("blue", true)? {
//!     if let Some(mut doc) = fetched.into_document() {
//!         doc.set("rating", 5);
//!         doc.save();
//!     }
//! }
//! let _by_artist = client.get_view(&ViewQuery::new("app", "by_artist").key("Joni Mitchell"))?;
//! # Ok::<(), couch_core::StoreError>(())
//! ```

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod http;
pub mod protocol;
pub mod transport;
pub mod types;
pub mod view;

#[cfg(test)]
mod testing;

pub use client::StoreClient;
pub use config::ServerConfig;
pub use document::Document;
pub use error::{Result, StoreError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use protocol::{Protocol, USER_AGENT};
pub use transport::{UreqTransport, REQUEST_TIMEOUT};
pub use types::{DocRef, Fetched, Fields, ViewOutput, WriteOutcome};
pub use view::{ViewKey, ViewQuery};
