//! CRUD and finder behavior of the in-memory backend.

use bson::{doc, Bson, Document};
use docstore::error::ValidationError;
use docstore::memory::{MemoryDb, MemoryTable};
use docstore::types::SortEntry;
use docstore::{Condition, Context, Database, StorageError, Table};
use serde::Deserialize;

// ============================================================================
// Test helpers
// ============================================================================

async fn seeded() -> (MemoryDb, MemoryTable) {
    let db = MemoryDb::default();
    let table = db.table("metrics");
    let n = table
        .insert(
            &Context::background(),
            vec![
                doc! { "id": 1, "v": 10 },
                doc! { "id": 2, "v": 5 },
                doc! { "id": 3, "v": 20 },
            ],
        )
        .await
        .unwrap();
    assert_eq!(n, 3);
    (db, table)
}

fn ids(docs: &[Document]) -> Vec<i32> {
    docs.iter().map(|d| d.get_i32("id").unwrap()).collect()
}

// ============================================================================
// Finder
// ============================================================================

#[tokio::test]
async fn filtered_ascending_find_returns_expected_ids() {
    let (_db, table) = seeded().await;
    let docs = table
        .find(Condition::gt("v", 8))
        .with_sort([SortEntry::asc("v")])
        .all(&Context::background())
        .await
        .unwrap();
    assert_eq!(ids(&docs), [1, 3]);
}

#[tokio::test]
async fn sort_orders_are_monotonic() {
    let (_db, table) = seeded().await;
    let ctx = Context::background();
    let asc = table
        .find(Condition::always())
        .with_sort([SortEntry::asc("v")])
        .all(&ctx)
        .await
        .unwrap();
    let values: Vec<i32> = asc.iter().map(|d| d.get_i32("v").unwrap()).collect();
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");

    let desc = table
        .find(Condition::always())
        .with_sort([SortEntry::desc("v")])
        .all(&ctx)
        .await
        .unwrap();
    assert_eq!(ids(&desc), [3, 1, 2]);
}

#[tokio::test]
async fn sort_with_nan_values_is_monotonic() {
    let db = MemoryDb::default();
    let table = db.table("samples");
    let ctx = Context::background();
    let docs = (0..2000)
        .map(|i| {
            if i % 7 == 0 {
                doc! { "v": f64::NAN }
            } else {
                doc! { "v": f64::from((i * 37) % 101) - 50.0 }
            }
        })
        .collect();
    table.insert(&ctx, docs).await.unwrap();

    let sorted = table
        .find(Condition::always())
        .with_sort([SortEntry::asc("v")])
        .all(&ctx)
        .await
        .unwrap();
    let values: Vec<f64> = sorted.iter().map(|d| d.get_f64("v").unwrap()).collect();
    let nans = values.iter().take_while(|v| v.is_nan()).count();
    assert_eq!(nans, 286);
    assert!(values[nans..].windows(2).all(|w| w[0] <= w[1]));

    let in_range = table
        .find(Condition::and([Condition::gte("v", -100), Condition::lte("v", 100)]))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(in_range, 2000 - 286);
}

#[tokio::test]
async fn pagination_and_projection() {
    let (_db, table) = seeded().await;
    let docs = table
        .find(Condition::always())
        .with_sort([SortEntry::asc("id")])
        .with_start(1)
        .with_limit(1)
        .with_projection([("id", true), ("_id", false)])
        .all(&Context::background())
        .await
        .unwrap();
    assert_eq!(docs, vec![doc! { "id": 2 }]);
}

#[tokio::test]
async fn one_and_all_on_zero_matches() {
    let (_db, table) = seeded().await;
    let ctx = Context::background();
    let err = table
        .find(Condition::gt("v", 100))
        .one(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let docs = table.find(Condition::gt("v", 100)).all(&ctx).await.unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn count_ignores_pagination() {
    let (_db, table) = seeded().await;
    let n = table
        .find(Condition::gte("v", 5))
        .with_limit(1)
        .with_start(2)
        .count(&Context::background())
        .await
        .unwrap();
    assert_eq!(n, 3);
}

#[tokio::test]
async fn typed_results_decode_into_structs() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Metric {
        id: i32,
        v: i32,
    }
    let (_db, table) = seeded().await;
    let metric: Metric = table
        .find(Condition::eq("id", 3))
        .one_as(&Context::background())
        .await
        .unwrap();
    assert_eq!(metric, Metric { id: 3, v: 20 });
}

#[tokio::test]
async fn insert_generates_missing_ids() {
    let db = MemoryDb::default();
    let table = db.table("pods");
    table
        .insert(&Context::background(), vec![doc! { "name": "web" }])
        .await
        .unwrap();
    let doc = table
        .find(Condition::eq("name", "web"))
        .one(&Context::background())
        .await
        .unwrap();
    assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
}

// ============================================================================
// Mutation
// ============================================================================

#[tokio::test]
async fn update_many_returns_pre_mutation_match_count() {
    let (_db, table) = seeded().await;
    let ctx = Context::background();
    let matched = table
        .update_many(&ctx, &Condition::gt("v", 8), doc! { "v": 0 })
        .await
        .unwrap();
    assert_eq!(matched, 2);
    let left = table.find(Condition::gt("v", 8)).count(&ctx).await.unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn update_touches_only_the_first_match() {
    let (db, table) = seeded().await;
    table
        .update(
            &Context::background(),
            &Condition::always(),
            doc! { "$inc": { "v": 1 } },
        )
        .await
        .unwrap();
    let values: Vec<i32> = db
        .snapshot("metrics")
        .iter()
        .map(|d| d.get_i32("v").unwrap())
        .collect();
    assert_eq!(values, [11, 5, 20]);
}

#[tokio::test]
async fn delete_returns_pre_mutation_match_count() {
    let (db, table) = seeded().await;
    let deleted = table
        .delete(&Context::background(), &Condition::lt("v", 15))
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(ids(&db.snapshot("metrics")), [3]);
}

#[tokio::test]
async fn upsert_inserts_equality_fields_merged_with_patch() {
    let db = MemoryDb::default();
    let table = db.table("clusters");
    let ctx = Context::background();
    let cond = Condition::and([
        Condition::eq("clusterId", "BCS-K8S-001"),
        Condition::eq("ns", "default"),
    ]);
    table
        .upsert(&ctx, &cond, doc! { "$set": { "status": "ready" }, "$setOnInsert": { "v": 1 } })
        .await
        .unwrap();
    table
        .upsert(&ctx, &cond, doc! { "status": "degraded" })
        .await
        .unwrap();

    let docs = db.snapshot("clusters");
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc.get_str("clusterId").unwrap(), "BCS-K8S-001");
    assert_eq!(doc.get_str("ns").unwrap(), "default");
    assert_eq!(doc.get_str("status").unwrap(), "degraded");
    assert_eq!(doc.get_i32("v").unwrap(), 1);
}

#[tokio::test]
async fn mixed_patch_is_rejected_without_mutation() {
    let (db, table) = seeded().await;
    let err = table
        .update_many(
            &Context::background(),
            &Condition::always(),
            doc! { "$set": { "v": 1 }, "extra": true },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(ValidationError::InvalidPatch(_))));
    let values: Vec<i32> = db
        .snapshot("metrics")
        .iter()
        .map(|d| d.get_i32("v").unwrap())
        .collect();
    assert_eq!(values, [10, 5, 20]);
}

#[tokio::test]
async fn malformed_condition_fails_before_touching_data() {
    let (db, table) = seeded().await;
    let bad = Condition::leaf("v", docstore::Operator::In, 5);
    let err = table
        .delete(&Context::background(), &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Condition(_)));
    assert_eq!(db.snapshot("metrics").len(), 3);
}

#[tokio::test]
async fn cancelled_context_reports_cancellation() {
    let (_db, table) = seeded().await;
    let ctx = Context::background();
    ctx.cancel();
    let err = table
        .find(Condition::always())
        .all(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Cancelled { operation: "find" }));
}

#[tokio::test]
async fn closed_database_rejects_operations() {
    let (db, table) = seeded().await;
    db.close().await.unwrap();
    let err = table
        .insert(&Context::background(), vec![doc! { "id": 4 }])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Closed));
}

#[tokio::test]
async fn concurrent_readers_share_one_database() {
    let (_db, table) = seeded().await;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let table = table.clone();
        handles.push(tokio::spawn(async move {
            table
                .find(Condition::gt("v", 8))
                .count(&Context::background())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 2);
    }
}
