//! In-memory stand-in for the document database's HTTP API.
//!
//! Databases are created on first write. Views are field indexes: view
//! `<name>` under any design emits `key = doc[<name>]`, `value = doc` for
//! every document that has that field.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Documents of one database, ordered by id.
pub type Database = BTreeMap<String, Map<String, Value>>;

pub type Db = Arc<RwLock<HashMap<String, Database>>>;

type Reply = (StatusCode, Json<Value>);

#[derive(Deserialize)]
pub struct KeysBody {
    pub keys: Vec<Value>,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/{db}", post(create_doc))
        .route("/{db}/", post(create_doc))
        .route("/{db}/_all_docs", get(all_docs))
        .route(
            "/{db}/_design/{design}/_view/{view}",
            get(view_get).post(view_post),
        )
        .route("/{db}/{id}", get(get_doc).put(put_doc).delete(delete_doc))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn error(status: StatusCode, error: &str, reason: &str) -> Reply {
    (status, Json(json!({ "error": error, "reason": reason })))
}

fn missing_db() -> Reply {
    error(StatusCode::NOT_FOUND, "not_found", "Database does not exist.")
}

fn conflict() -> Reply {
    error(StatusCode::CONFLICT, "conflict", "Document update conflict.")
}

/// `<n>-<32 hex>`, with `n` one past the previous generation.
fn next_rev(previous: Option<&str>) -> String {
    let generation = previous
        .and_then(|rev| rev.split('-').next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

fn current_rev(doc: &Map<String, Value>) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

/// Insert or update `id`, enforcing revision checks. Returns the new revision.
fn write_doc(
    database: &mut Database,
    id: String,
    mut doc: Map<String, Value>,
    rev: Option<String>,
) -> Result<String, Reply> {
    let previous = database.get(&id).and_then(|d| current_rev(d).map(str::to_string));
    if previous != rev {
        return Err(conflict());
    }
    let new_rev = next_rev(previous.as_deref());
    doc.insert("_id".to_string(), Value::String(id.clone()));
    doc.insert("_rev".to_string(), Value::String(new_rev.clone()));
    database.insert(id, doc);
    Ok(new_rev)
}

fn body_object(body: Value) -> Result<Map<String, Value>, Reply> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "Document must be a JSON object",
        )),
    }
}

async fn get_doc(State(db): State<Db>, Path((name, id)): Path<(String, String)>) -> Reply {
    let dbs = db.read().await;
    let Some(database) = dbs.get(&name) else {
        return missing_db();
    };
    match database.get(&id) {
        Some(doc) => (StatusCode::OK, Json(Value::Object(doc.clone()))),
        None => error(StatusCode::NOT_FOUND, "not_found", "missing"),
    }
}

async fn put_doc(
    State(db): State<Db>,
    Path((name, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    let doc = match body_object(body) {
        Ok(doc) => doc,
        Err(reply) => return reply,
    };
    let rev = query
        .get("rev")
        .cloned()
        .or_else(|| current_rev(&doc).map(str::to_string));

    let mut dbs = db.write().await;
    let database = dbs.entry(name).or_default();
    match write_doc(database, id.clone(), doc, rev) {
        Ok(rev) => {
            tracing::debug!(%id, %rev, "stored document");
            (StatusCode::CREATED, Json(json!({ "ok": true, "id": id, "rev": rev })))
        }
        Err(reply) => reply,
    }
}

async fn create_doc(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let doc = match body_object(body) {
        Ok(doc) => doc,
        Err(reply) => return reply,
    };
    let id = doc
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let mut dbs = db.write().await;
    let database = dbs.entry(name).or_default();
    match write_doc(database, id.clone(), doc, None) {
        Ok(rev) => (StatusCode::CREATED, Json(json!({ "ok": true, "id": id, "rev": rev }))),
        Err(reply) => reply,
    }
}

async fn delete_doc(
    State(db): State<Db>,
    Path((name, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let mut dbs = db.write().await;
    let Some(database) = dbs.get_mut(&name) else {
        return missing_db();
    };
    let Some(doc) = database.get(&id) else {
        return error(StatusCode::NOT_FOUND, "not_found", "missing");
    };
    if current_rev(doc) != query.get("rev").map(String::as_str) {
        return conflict();
    }
    let rev = next_rev(current_rev(doc));
    database.remove(&id);
    (StatusCode::OK, Json(json!({ "ok": true, "id": id, "rev": rev })))
}

/// Query parameters decoded as JSON values.
struct ViewParams {
    key: Option<Value>,
    limit: Option<usize>,
    skip: usize,
    descending: bool,
    include_docs: bool,
}

impl ViewParams {
    fn parse(query: &HashMap<String, String>) -> Result<Self, Reply> {
        let decode = |name: &str| -> Result<Option<Value>, Reply> {
            query
                .get(name)
                .map(|raw| {
                    serde_json::from_str(raw).map_err(|_| {
                        error(
                            StatusCode::BAD_REQUEST,
                            "query_parse_error",
                            &format!("Invalid value for {name}"),
                        )
                    })
                })
                .transpose()
        };
        let count = |name: &str| -> Result<Option<usize>, Reply> {
            Ok(decode(name)?
                .and_then(|v| v.as_u64())
                .map(|n| n as usize))
        };
        Ok(Self {
            key: decode("key")?,
            limit: count("limit")?,
            skip: count("skip")?.unwrap_or(0),
            descending: decode("descending")?.and_then(|v| v.as_bool()).unwrap_or(false),
            include_docs: decode("include_docs")?
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        })
    }

    fn apply(&self, mut rows: Vec<Value>) -> Vec<Value> {
        if let Some(key) = &self.key {
            rows.retain(|row| &row["key"] == key);
        }
        if self.descending {
            rows.reverse();
        }
        let rows = rows.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        }
    }
}

fn view_reply(total: usize, skip: usize, rows: Vec<Value>) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "total_rows": total, "offset": skip, "rows": rows })),
    )
}

/// Rows emitted by the field-index view `field`, ordered by key then id.
fn index_rows(database: &Database, field: &str) -> Vec<Value> {
    let mut rows: Vec<(String, Value)> = database
        .iter()
        .filter_map(|(id, doc)| {
            doc.get(field).map(|key| {
                (
                    key.to_string(),
                    json!({ "id": id, "key": key, "value": Value::Object(doc.clone()) }),
                )
            })
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows.into_iter().map(|(_, row)| row).collect()
}

async fn all_docs(
    State(db): State<Db>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let params = match ViewParams::parse(&query) {
        Ok(params) => params,
        Err(reply) => return reply,
    };
    let dbs = db.read().await;
    let Some(database) = dbs.get(&name) else {
        return missing_db();
    };
    let rows = database
        .iter()
        .map(|(id, doc)| {
            let mut row = json!({ "id": id, "key": id, "value": { "rev": current_rev(doc) } });
            if params.include_docs {
                row["doc"] = Value::Object(doc.clone());
            }
            row
        })
        .collect();
    view_reply(database.len(), params.skip, params.apply(rows))
}

async fn view_get(
    State(db): State<Db>,
    Path((name, _design, view)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let params = match ViewParams::parse(&query) {
        Ok(params) => params,
        Err(reply) => return reply,
    };
    let dbs = db.read().await;
    let Some(database) = dbs.get(&name) else {
        return missing_db();
    };
    let rows = index_rows(database, &view);
    let total = rows.len();
    view_reply(total, params.skip, params.apply(rows))
}

async fn view_post(
    State(db): State<Db>,
    Path((name, _design, view)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<KeysBody>,
) -> Reply {
    let params = match ViewParams::parse(&query) {
        Ok(params) => params,
        Err(reply) => return reply,
    };
    let dbs = db.read().await;
    let Some(database) = dbs.get(&name) else {
        return missing_db();
    };
    let indexed = index_rows(database, &view);
    let total = indexed.len();
    // Rows come back grouped in the order the keys were given.
    let rows = body
        .keys
        .iter()
        .flat_map(|key| indexed.iter().filter(move |row| &row["key"] == key).cloned())
        .collect();
    view_reply(total, params.skip, params.apply(rows))
}
