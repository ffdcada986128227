//! Matcher semantics over a small fleet of resource documents.

use bson::{doc, Bson, Document};
use docstore::condition::{matcher, mongo};
use docstore::error::ConditionError;
use docstore::{Condition, Operator};

fn fleet() -> Vec<Document> {
    vec![
        doc! { "_id": 1, "kind": "Deployment", "ns": "default", "replicas": 3, "labels": { "app": "web" } },
        doc! { "_id": 2, "kind": "Deployment", "ns": "kube-system", "replicas": 1, "labels": { "app": "dns" } },
        doc! { "_id": 3, "kind": "Pod", "ns": "default", "labels": { "app": "web", "tier": "front" } },
        doc! { "_id": 4, "kind": "Service", "ns": "default", "ports": [80, 443], "deletedAt": Bson::Null },
        doc! { "_id": 5, "kind": "Pod", "ns": "monitoring", "replicas": "2" },
    ]
}

fn ids(condition: &Condition) -> Vec<i32> {
    let predicate = matcher::compile(condition).unwrap();
    fleet()
        .iter()
        .filter(|d| predicate(*d))
        .map(|d| d.get_i32("_id").unwrap())
        .collect()
}

#[test]
fn equality_on_nested_paths() {
    assert_eq!(ids(&Condition::eq("labels.app", "web")), [1, 3]);
    assert_eq!(ids(&Condition::exists("labels.tier", true)), [3]);
}

#[test]
fn conjunction_and_disjunction() {
    let c = Condition::and([
        Condition::eq("ns", "default"),
        Condition::or([Condition::eq("kind", "Pod"), Condition::gte("replicas", 3)]),
    ]);
    assert_eq!(ids(&c), [1, 3]);
}

#[test]
fn nor_excludes_every_child() {
    let c = Condition::nor([Condition::eq("kind", "Pod"), Condition::eq("ns", "kube-system")]);
    assert_eq!(ids(&c), [1, 4]);
}

#[test]
fn numeric_ordering_skips_strings_and_missing_fields() {
    assert_eq!(ids(&Condition::gt("replicas", 0)), [1, 2]);
    assert_eq!(ids(&Condition::lt("replicas", 100)), [1, 2]);
}

#[test]
fn membership_and_arrays() {
    assert_eq!(ids(&Condition::in_set("ns", ["kube-system", "monitoring"])), [2, 5]);
    assert_eq!(ids(&Condition::not_in("kind", ["Pod", "Deployment"])), [4]);
    assert_eq!(ids(&Condition::eq("ports", 443)), [4]);
}

#[test]
fn null_matches_missing_and_explicit_null() {
    assert_eq!(ids(&Condition::eq("deletedAt", Bson::Null)), [1, 2, 3, 4, 5]);
    assert_eq!(ids(&Condition::exists("deletedAt", true)), [4]);
}

#[test]
fn regex_and_prefix() {
    assert_eq!(ids(&Condition::regex("ns", "^kube-|^mon")), [2, 5]);
    assert_eq!(ids(&Condition::prefix("kind", "Dep")), [1, 2]);
    // prefix is literal, so pattern characters never match as syntax
    assert!(ids(&Condition::prefix("kind", "D.p")).is_empty());
}

#[test]
fn empty_branches_follow_the_constant_table() {
    assert_eq!(ids(&Condition::and(Vec::new())).len(), 5);
    assert!(ids(&Condition::or(Vec::new())).is_empty());
    assert_eq!(ids(&Condition::nor(Vec::new())).len(), 5);
}

#[test]
fn malformed_leaf_fails_for_every_backend() {
    let bad = Condition::and([Condition::leaf("ns", Operator::In, "default")]);
    let expected = ConditionError::UnsupportedValue {
        field: "ns".into(),
        operator: "$in",
        found: "string",
    };
    assert_eq!(matcher::compile(&bad).err(), Some(expected.clone()));
    assert_eq!(mongo::compile(&bad).err(), Some(expected));
}

#[test]
fn conditions_are_reusable_across_compilations() {
    let c = Condition::eq("kind", "Pod");
    let first = ids(&c);
    let filter = mongo::compile(&c).unwrap();
    assert_eq!(filter, doc! { "kind": { "$eq": "Pod" } });
    assert_eq!(ids(&c), first);
}
