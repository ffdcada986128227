//! The SQLite processor set must select the same documents as the matcher.

use bson::{Bson, Document};
use docstore::condition::{matcher, sql};
use docstore::error::ConditionError;
use docstore::Condition;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{json, Value};

// ============================================================================
// Test helpers
// ============================================================================

/// Scalar-valued documents only: array lifting is matcher-only behavior.
fn corpus() -> Vec<Value> {
    vec![
        json!({ "id": 1, "v": 10, "name": "web-1", "ok": true, "meta": { "zone": "a" } }),
        json!({ "id": 2, "v": 5, "name": "web-2", "ok": false, "meta": { "zone": "b" } }),
        json!({ "id": 3, "v": 20.5, "name": "db-1", "meta": { "zone": "a" } }),
        json!({ "id": 4, "v": "8", "name": "cache", "ok": null }),
        json!({ "id": 5, "name": "Web-3", "meta": "flat" }),
        json!({ "id": 6, "v": 10.0, "ok": true, "meta": { "zone": null } }),
        json!({ "id": 7, "v": -3, "name": "wébhook", "meta": {} }),
    ]
}

fn open(corpus: &[Value]) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE docs (id INTEGER PRIMARY KEY, data TEXT NOT NULL)")
        .unwrap();
    for doc in corpus {
        conn.execute(
            "INSERT INTO docs (id, data) VALUES (?1, ?2)",
            params![doc["id"].as_i64().unwrap(), doc.to_string()],
        )
        .unwrap();
    }
    conn
}

fn matcher_ids(condition: &Condition, corpus: &[Value]) -> Vec<i64> {
    let predicate = matcher::compile(condition).unwrap();
    corpus
        .iter()
        .filter(|v| {
            let doc: Document = bson::to_document(v).unwrap();
            predicate(&doc)
        })
        .map(|v| v["id"].as_i64().unwrap())
        .collect()
}

fn sql_ids(condition: &Condition, conn: &Connection) -> Vec<i64> {
    let fragment = sql::compile(condition, "data").unwrap();
    let query = format!("SELECT id FROM docs WHERE {} ORDER BY id", fragment.sql);
    let mut stmt = conn.prepare(&query).unwrap();
    let rows = stmt
        .query_map(params_from_iter(fragment.params.iter()), |row| row.get(0))
        .unwrap();
    rows.collect::<Result<Vec<i64>, _>>().unwrap()
}

fn conditions() -> Vec<Condition> {
    vec![
        Condition::eq("v", 10),
        Condition::eq("v", "8"),
        Condition::eq("ok", true),
        Condition::eq("ok", false),
        Condition::eq("ok", Bson::Null),
        Condition::ne("v", 10),
        Condition::ne("ok", Bson::Null),
        Condition::gt("v", 8),
        Condition::gte("v", 10),
        Condition::lt("v", 6),
        Condition::lte("v", -3),
        Condition::gt("name", "db"),
        Condition::lt("ok", true),
        Condition::in_set("v", [Bson::Int32(5), Bson::Double(20.5)]),
        Condition::in_set("name", ["cache", "nope"]),
        Condition::in_set("ok", [Bson::Null]),
        Condition::in_set("v", Vec::<i32>::new()),
        Condition::not_in("v", [10]),
        Condition::not_in("ok", [Bson::Null, true.into()]),
        Condition::prefix("name", "web"),
        Condition::prefix("name", "wé"),
        Condition::prefix("name", "%"),
        Condition::exists("ok", true),
        Condition::exists("ok", false),
        Condition::exists("meta.zone", true),
        Condition::eq("meta.zone", "a"),
        Condition::eq("meta.zone", Bson::Null),
        Condition::and([Condition::gt("v", 0), Condition::prefix("name", "web")]),
        Condition::or([Condition::eq("meta.zone", "b"), Condition::lt("v", 0)]),
        Condition::nor([Condition::exists("v", true), Condition::eq("name", "Web-3")]),
        Condition::nor([Condition::eq("ok", true)]),
        Condition::and([
            Condition::or([Condition::eq("ok", true), Condition::eq("ok", false)]),
            Condition::nor([Condition::gt("v", 9)]),
        ]),
        Condition::and(Vec::new()),
        Condition::or(Vec::new()),
        Condition::nor(Vec::new()),
    ]
}

// ============================================================================
// Parity
// ============================================================================

#[test]
fn sql_and_matcher_select_the_same_documents() {
    let corpus = corpus();
    let conn = open(&corpus);
    for condition in conditions() {
        assert_eq!(
            sql_ids(&condition, &conn),
            matcher_ids(&condition, &corpus),
            "match sets differ for {condition:?}"
        );
    }
}

#[test]
fn scenario_ids_match_in_both_backends() {
    let corpus = vec![
        json!({ "id": 1, "v": 10 }),
        json!({ "id": 2, "v": 5 }),
        json!({ "id": 3, "v": 20 }),
    ];
    let conn = open(&corpus);
    let c = Condition::gt("v", 8);
    assert_eq!(sql_ids(&c, &conn), vec![1, 3]);
    assert_eq!(matcher_ids(&c, &corpus), vec![1, 3]);
}

#[test]
fn regex_is_rejected_before_any_query() {
    let err = sql::compile(&Condition::regex("name", "^web"), "data").unwrap_err();
    assert!(matches!(err, ConditionError::UnsupportedOperator { backend: "sqlite", .. }));
}
