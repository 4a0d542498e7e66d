//! Backend-neutral query model.
//!
//! A `Query` renders to Elasticsearch DSL for the remote backend and is
//! evaluated directly against JSON documents by the in-memory backend.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    MatchAll,
    /// Exact value match; on array fields any element may match.
    Term { field: String, value: Value },
    Bool { must: Vec<Query>, must_not: Vec<Query> },
    /// Field absent, null or an empty array.
    Missing { field: String },
    /// Tokens of `text` within AUTO edit distance of tokens in any of `fields`.
    Fuzzy { text: String, fields: Vec<String> },
}

impl Query {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Query::Term { field: field.to_string(), value: value.into() }
    }

    pub fn all_of(must: Vec<Query>) -> Self {
        Query::Bool { must, must_not: Vec::new() }
    }

    pub fn missing(field: &str) -> Self {
        Query::Missing { field: field.to_string() }
    }

    pub fn fuzzy(text: &str, fields: &[&str]) -> Self {
        Query::Fuzzy { text: text.to_string(), fields: fields.iter().map(|f| f.to_string()).collect() }
    }

    /// Elasticsearch query DSL.
    pub fn to_es(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Query::Bool { must, must_not } => {
                let mut b = serde_json::Map::new();
                b.insert("must".into(), Value::Array(must.iter().map(Query::to_es).collect()));
                if !must_not.is_empty() {
                    b.insert("must_not".into(), Value::Array(must_not.iter().map(Query::to_es).collect()));
                }
                json!({ "bool": b })
            }
            Query::Missing { field } => json!({ "bool": { "must_not": [ { "exists": { "field": field } } ] } }),
            Query::Fuzzy { text, fields } => json!({
                "multi_match": { "query": text, "fields": fields, "fuzziness": "AUTO" }
            }),
        }
    }

    pub fn matches(&self, doc: &Value) -> bool { self.score(doc).is_some() }

    /// Relevance of `doc`, or None when it does not match.
    pub fn score(&self, doc: &Value) -> Option<f64> {
        match self {
            Query::MatchAll => Some(1.0),
            Query::Term { field, value } => {
                let v = lookup(doc, field)?;
                if any_element(v, |x| term_eq(x, value)) { Some(1.0) } else { None }
            }
            Query::Bool { must, must_not } => {
                let mut total = 0.0;
                for q in must {
                    total += q.score(doc)?;
                }
                if must_not.iter().any(|q| q.matches(doc)) {
                    return None;
                }
                Some(total.max(1.0))
            }
            Query::Missing { field } => match lookup(doc, field) {
                None | Some(Value::Null) => Some(1.0),
                Some(Value::Array(a)) if a.iter().all(Value::is_null) => Some(1.0),
                _ => None,
            },
            Query::Fuzzy { text, fields } => {
                let mut have = Vec::new();
                for f in fields {
                    have.extend(field_tokens(doc, f));
                }
                let mut total = 0.0;
                for q in tokenize(text) {
                    let allowed = auto_fuzziness(q.chars().count());
                    let best = have.iter().map(|t| levenshtein(&q, t)).min();
                    if let Some(d) = best {
                        if d <= allowed {
                            // exact hits outrank near misses
                            total += 1.0 / (1.0 + d as f64);
                        }
                    }
                }
                if total > 0.0 { Some(total) } else { None }
            }
        }
    }
}

/// Edit distance allowed for a term of `len` characters under AUTO fuzziness.
pub fn auto_fuzziness(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Character-level Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() { return b.len(); }
    if b.is_empty() { return a.len(); }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Lowercased alphanumeric runs.
pub fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Resolve a dotted field path ("extra.source") inside a JSON document.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = doc;
    for part in path.split('.') {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

fn any_element(v: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    match v {
        Value::Array(items) => items.iter().any(|x| pred(x)),
        other => pred(other),
    }
}

fn scalar_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Keyword fields compare on their rendered scalar, so "7" and 7 are the same term.
fn term_eq(field: &Value, wanted: &Value) -> bool {
    if field == wanted { return true; }
    match (scalar_str(field), scalar_str(wanted)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn field_tokens(doc: &Value, field: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(v) = lookup(doc, field) {
        match v {
            Value::Array(items) => {
                for i in items {
                    if let Some(s) = scalar_str(i) { out.extend(tokenize(&s)); }
                }
            }
            other => {
                if let Some(s) = scalar_str(other) { out.extend(tokenize(&s)); }
            }
        }
    }
    out
}
