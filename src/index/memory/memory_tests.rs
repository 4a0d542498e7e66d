use super::*;
use serde_json::json;
use tempfile::tempdir;

const IDX: &str = "podaci";

#[test]
fn create_get_delete() {
    let m = MemoryIndex::new();
    let (id, v) = m.create(IDX, DocKind::File, &json!({ "name": "a" })).unwrap();
    assert_eq!(v, 1);
    let hit = m.get(IDX, DocKind::File, &id).unwrap();
    assert_eq!(hit.source["name"], "a");
    assert_eq!(hit.version, Some(1));
    // wrong kind does not leak the document
    assert!(matches!(m.get(IDX, DocKind::Tag, &id), Err(PodaciError::NotFound { .. })));
    m.delete(IDX, DocKind::File, &id).unwrap();
    assert!(matches!(m.get(IDX, DocKind::File, &id), Err(PodaciError::NotFound { .. })));
    assert!(matches!(m.delete(IDX, DocKind::File, &id), Err(PodaciError::NotFound { .. })));
}

#[test]
fn update_merges_and_detects_noop() {
    let m = MemoryIndex::new();
    let (id, _) = m.create(IDX, DocKind::Tag, &json!({ "name": "press", "parents": [] })).unwrap();
    let out = m.update(IDX, DocKind::Tag, &id, &json!({ "parents": ["p1"] }), true).unwrap();
    assert_eq!(out, UpdateOutcome { version: 2, noop: false });
    let again = m.update(IDX, DocKind::Tag, &id, &json!({ "parents": ["p1"] }), true).unwrap();
    assert_eq!(again, UpdateOutcome { version: 2, noop: true });
    // without detection every write bumps the version
    let forced = m.update(IDX, DocKind::Tag, &id, &json!({ "parents": ["p1"] }), false).unwrap();
    assert_eq!(forced.version, 3);
    let hit = m.get(IDX, DocKind::Tag, &id).unwrap();
    assert_eq!(hit.source, json!({ "name": "press", "parents": ["p1"] }));
}

#[test]
fn update_missing_is_not_found() {
    let m = MemoryIndex::new();
    m.create_index(IDX).unwrap();
    let err = m.update(IDX, DocKind::File, "nope", &json!({}), true).unwrap_err();
    assert!(matches!(err, PodaciError::NotFound { .. }));
}

#[test]
fn search_filters_kind_and_pages() {
    let m = MemoryIndex::new();
    for i in 0..5 {
        m.create(IDX, DocKind::File, &json!({ "n": i, "tags": ["t"] })).unwrap();
    }
    m.create(IDX, DocKind::Tag, &json!({ "tags": ["t"] })).unwrap();
    let q = Query::term("tags", "t");
    let all = m.search(IDX, None, &q, 0, 100).unwrap();
    assert_eq!(all.total, 6);
    let page = m.search(IDX, Some(DocKind::File), &q, 1, 2).unwrap();
    assert_eq!(page.total, 5);
    let ns: Vec<_> = page.hits.iter().map(|h| h.source["n"].as_i64().unwrap()).collect();
    // equal scores keep insertion order
    assert_eq!(ns, vec![1, 2]);
    assert_eq!(m.search("other", None, &q, 0, 10).unwrap().total, 0);
}

#[test]
fn snapshot_survives_reopen() {
    let tmp = tempdir().unwrap();
    let id = {
        let m = MemoryIndex::open(tmp.path()).unwrap();
        m.create_index("empty").unwrap();
        let (id, _) = m.create(IDX, DocKind::File, &json!({ "name": "kept", "size": 5 })).unwrap();
        m.update(IDX, DocKind::File, &id, &json!({ "size": 6 }), true).unwrap();
        m.save_snapshot().unwrap();
        id
    };
    let m = MemoryIndex::open(tmp.path()).unwrap();
    let hit = m.get(IDX, DocKind::File, &id).unwrap();
    assert_eq!(hit.version, Some(2));
    assert_eq!(hit.source["size"], 6);
    assert!(m.index_exists("empty").unwrap());
    // ids assigned after reload keep ranking after older documents
    m.create(IDX, DocKind::File, &json!({ "name": "new" })).unwrap();
    let hits = m.search(IDX, Some(DocKind::File), &Query::MatchAll, 0, 10).unwrap();
    assert_eq!(hits.hits[0].id, id);
}
