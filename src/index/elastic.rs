//! Elasticsearch 7 backend over the blocking reqwest client.
//!
//! Indices are typeless, so the document kind is stored in a `doc_kind`
//! keyword field. It is added on create, used as a filter on search, and
//! removed from sources before they are handed back.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{PodaciError, Result};
use crate::index::{DocKind, DocumentIndex, Hit, Query, SearchHits, UpdateOutcome};

pub const KIND_FIELD: &str = "doc_kind";

/// Fields compared by exact value; everything else keeps dynamic mapping.
const KEYWORD_FIELDS: &[&str] = &[
    KIND_FIELD,
    "identifier",
    "hash",
    "url",
    "tags",
    "parents",
    "allowed_users",
    "allowed_write_users",
    "mimetype",
    "created_by",
];

#[derive(Debug, Clone)]
pub struct ElasticIndex {
    base: String,
    client: Client,
    refresh_on_write: bool,
}

impl ElasticIndex {
    pub fn new(base_url: &str, timeout_ms: u64, refresh_on_write: bool) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
        Ok(Self { base: base_url.trim_end_matches('/').to_string(), client, refresh_on_write })
    }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base, path.trim_start_matches('/')) }

    fn write_url(&self, path: &str) -> String {
        if self.refresh_on_write { format!("{}?refresh=wait_for", self.url(path)) } else { self.url(path) }
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        Ok(req.send()?)
    }

    /// Parse a success body, or turn an error status into `Backend`.
    fn json_or_error(resp: Response) -> Result<Value> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<Value>()?);
        }
        let message = resp.text().unwrap_or_default();
        Err(PodaciError::Backend { status: status.as_u16(), message: error_reason(&message) })
    }
}

/// Mapping sent when the index is created.
pub fn index_mapping() -> Value {
    let mut props = serde_json::Map::new();
    for f in KEYWORD_FIELDS {
        props.insert((*f).to_string(), json!({ "type": "keyword" }));
    }
    json!({ "mappings": { "properties": props } })
}

/// Restrict `query` to one document kind.
pub fn scoped_query(query: &Query, kind: Option<DocKind>) -> Value {
    match kind {
        None => query.to_es(),
        Some(k) => json!({
            "bool": {
                "must": [ query.to_es() ],
                "filter": [ { "term": { KIND_FIELD: k.as_str() } } ]
            }
        }),
    }
}

/// Body to index: the document plus its kind marker.
pub fn with_kind(body: &Value, kind: DocKind) -> Result<Value> {
    let mut obj = body
        .as_object()
        .cloned()
        .ok_or_else(|| PodaciError::Backend { status: 400, message: "document body must be an object".into() })?;
    obj.insert(KIND_FIELD.to_string(), Value::String(kind.as_str().to_string()));
    Ok(Value::Object(obj))
}

/// Remove the kind marker from a source, returning the kind it named.
pub fn strip_kind(mut source: Value) -> (Option<DocKind>, Value) {
    let kind = source
        .as_object_mut()
        .and_then(|o| o.remove(KIND_FIELD))
        .and_then(|v| v.as_str().and_then(DocKind::parse));
    (kind, source)
}

/// `hits.total` is a number before 7.0 and `{ "value": n }` after.
pub fn parse_total(total: &Value) -> u64 {
    match total {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::Object(o) => o.get("value").and_then(Value::as_u64).unwrap_or(0),
        _ => 0,
    }
}

/// Decode a `_search` response. Hits without a recognizable kind fall back to `default_kind`.
pub fn parse_search(resp: &Value, default_kind: Option<DocKind>) -> SearchHits {
    let hits_obj = &resp["hits"];
    let total = parse_total(&hits_obj["total"]);
    let mut hits = Vec::new();
    if let Some(arr) = hits_obj["hits"].as_array() {
        for h in arr {
            let Some(id) = h["_id"].as_str() else { continue };
            let (kind, source) = strip_kind(h["_source"].clone());
            let Some(kind) = kind.or(default_kind) else {
                warn!(target: "podaci::index", "search hit {} has no {}; skipped", id, KIND_FIELD);
                continue;
            };
            hits.push(Hit { id: id.to_string(), kind, version: h["_version"].as_u64(), source });
        }
    }
    SearchHits { total, hits }
}

/// Pull `error.reason` out of an error body when there is one.
pub fn error_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let e = v.get("error")?;
            e.get("reason").and_then(Value::as_str).map(str::to_string).or_else(|| e.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

impl DocumentIndex for ElasticIndex {
    fn server_version(&self) -> Result<String> {
        let v = Self::json_or_error(self.send(self.client.get(self.url("/")))?)?;
        v["version"]["number"]
            .as_str()
            .map(str::to_string)
            .ok_or(PodaciError::MissingField("version.number"))
    }

    fn index_exists(&self, index: &str) -> Result<bool> {
        let resp = self.send(self.client.head(self.url(index)))?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(PodaciError::Backend { status: s.as_u16(), message: format!("HEAD /{}", index) }),
        }
    }

    fn create_index(&self, index: &str) -> Result<()> {
        let resp = self.send(self.client.put(self.url(index)).json(&index_mapping()))?;
        match Self::json_or_error(resp) {
            Ok(_) => Ok(()),
            // lost a race with another creator
            Err(PodaciError::Backend { status: 400, message }) if message.contains("already exists") => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create(&self, index: &str, kind: DocKind, body: &Value) -> Result<(String, u64)> {
        let body = with_kind(body, kind)?;
        let resp = self.send(self.client.post(self.write_url(&format!("{}/_doc", index))).json(&body))?;
        let v = Self::json_or_error(resp)?;
        let id = v["_id"].as_str().ok_or(PodaciError::MissingField("_id"))?.to_string();
        let version = v["_version"].as_u64().unwrap_or(1);
        Ok((id, version))
    }

    fn get(&self, index: &str, kind: DocKind, id: &str) -> Result<Hit> {
        let resp = self.send(self.client.get(self.url(&format!("{}/_doc/{}", index, id))))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PodaciError::not_found(kind.as_str(), id));
        }
        let v = Self::json_or_error(resp)?;
        if !v["found"].as_bool().unwrap_or(false) {
            return Err(PodaciError::not_found(kind.as_str(), id));
        }
        let (found_kind, source) = strip_kind(v["_source"].clone());
        if found_kind.is_some_and(|k| k != kind) {
            return Err(PodaciError::not_found(kind.as_str(), id));
        }
        Ok(Hit { id: id.to_string(), kind, version: v["_version"].as_u64(), source })
    }

    fn update(&self, index: &str, kind: DocKind, id: &str, doc: &Value, detect_noop: bool) -> Result<UpdateOutcome> {
        let body = json!({ "doc": doc, "detect_noop": detect_noop });
        let resp = self.send(self.client.post(self.write_url(&format!("{}/_update/{}", index, id))).json(&body))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PodaciError::not_found(kind.as_str(), id));
        }
        let v = Self::json_or_error(resp)?;
        let noop = v["result"].as_str() == Some("noop");
        Ok(UpdateOutcome { version: v["_version"].as_u64().unwrap_or(0), noop })
    }

    fn delete(&self, index: &str, kind: DocKind, id: &str) -> Result<()> {
        let resp = self.send(self.client.delete(self.write_url(&format!("{}/_doc/{}", index, id))))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PodaciError::not_found(kind.as_str(), id));
        }
        Self::json_or_error(resp).map(|_| ())
    }

    fn search(&self, index: &str, kind: Option<DocKind>, query: &Query, from: usize, size: usize) -> Result<SearchHits> {
        let body = json!({
            "query": scoped_query(query, kind),
            "from": from,
            "size": size,
            "track_total_hits": true,
        });
        debug!(target: "podaci::index", "search index={} body={}", index, body);
        let resp = self.send(self.client.post(self.url(&format!("{}/_search", index))).json(&body))?;
        // searching an index that does not exist yet finds nothing
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(SearchHits::default());
        }
        let v = Self::json_or_error(resp)?;
        Ok(parse_search(&v, kind))
    }
}
