//! Index management and uniqueness enforcement.

use bson::doc;
use docstore::error::ValidationError;
use docstore::memory::{MemoryDb, ID_INDEX};
use docstore::types::{Index, IndexField};
use docstore::{Condition, Context, Database, StorageError, Table};

fn by_name() -> Index {
    Index::new("by_name", [IndexField::asc("name")])
        .unwrap()
        .unique(true)
}

#[tokio::test]
async fn invalid_index_fails_before_any_io() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    let index = Index {
        name: String::new(),
        keys: vec![IndexField::asc("name")],
        unique: false,
        background: false,
    };
    let err = table.create_index(&ctx, index).await.unwrap_err();
    assert!(matches!(err, StorageError::Validation(ValidationError::EmptyIndexName)));
    assert!(!db.has_table(&ctx, "pods").await.unwrap());
}

#[tokio::test]
async fn new_tables_carry_the_id_index() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    db.create_table(&ctx, "pods").await.unwrap();
    let table = db.table("pods");
    assert!(table.has_index(&ctx, ID_INDEX).await.unwrap());
    assert!(!table.has_index(&ctx, "by_name").await.unwrap());
}

#[tokio::test]
async fn create_list_and_drop_an_index() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    table.create_index(&ctx, by_name()).await.unwrap();
    // same definition again is a no-op
    table.create_index(&ctx, by_name()).await.unwrap();

    let names: Vec<String> = table
        .indexes(&ctx)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, [ID_INDEX, "by_name"]);

    table.drop_index(&ctx, "by_name").await.unwrap();
    assert!(!table.has_index(&ctx, "by_name").await.unwrap());
    assert!(table.drop_index(&ctx, "by_name").await.is_err());
}

#[tokio::test]
async fn conflicting_definition_is_rejected() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    table.create_index(&ctx, by_name()).await.unwrap();
    let other = Index::new("by_name", [IndexField::desc("name")]).unwrap();
    let err = table.create_index(&ctx, other).await.unwrap_err();
    assert!(matches!(err, StorageError::Execution { .. }));
}

#[tokio::test]
async fn the_id_index_cannot_be_dropped() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    db.create_table(&ctx, "pods").await.unwrap();
    let err = db.table("pods").drop_index(&ctx, ID_INDEX).await.unwrap_err();
    assert!(matches!(err, StorageError::Execution { .. }));
}

#[tokio::test]
async fn unique_violation_leaves_the_table_unchanged() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    table.create_index(&ctx, by_name()).await.unwrap();
    table
        .insert(&ctx, vec![doc! { "name": "web" }, doc! { "name": "db" }])
        .await
        .unwrap();

    let err = table
        .insert(&ctx, vec![doc! { "name": "cache" }, doc! { "name": "web" }])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("by_name"), "{err}");
    let n = table.find(Condition::always()).count(&ctx).await.unwrap();
    assert_eq!(n, 2);

    let err = table
        .update(&ctx, &Condition::eq("name", "db"), doc! { "name": "web" })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Execution { .. }));
    assert_eq!(
        table.find(Condition::eq("name", "db")).count(&ctx).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    table.insert(&ctx, vec![doc! { "_id": 1 }]).await.unwrap();
    // numeric widening: 1 and 1.0 are the same key
    let err = table
        .insert(&ctx, vec![doc! { "_id": 1.0 }])
        .await
        .unwrap_err();
    assert!(err.to_string().contains(ID_INDEX), "{err}");
}

#[tokio::test]
async fn unique_index_over_existing_duplicates_fails() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    table
        .insert(&ctx, vec![doc! { "name": "web" }, doc! { "name": "web" }])
        .await
        .unwrap();
    assert!(table.create_index(&ctx, by_name()).await.is_err());
    assert!(!table.has_index(&ctx, "by_name").await.unwrap());
}

#[tokio::test]
async fn distinct_large_integer_ids_are_not_duplicates() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("pods");
    let n = table
        .insert(
            &ctx,
            vec![
                doc! { "_id": 9_007_199_254_740_993_i64 },
                doc! { "_id": 9_007_199_254_740_992_i64 },
            ],
        )
        .await
        .unwrap();
    assert_eq!(n, 2);
    let found = table
        .find(Condition::eq("_id", 9_007_199_254_740_993_i64))
        .all(&ctx)
        .await
        .unwrap();
    assert_eq!(found, vec![doc! { "_id": 9_007_199_254_740_993_i64 }]);
}

#[tokio::test]
async fn unique_index_over_nan_values_stays_consistent() {
    let db = MemoryDb::default();
    let ctx = Context::background();
    let table = db.table("metrics");
    let index = Index::new("by_v", [IndexField::asc("v")])
        .unwrap()
        .unique(true);
    table.create_index(&ctx, index).await.unwrap();

    let mut docs: Vec<_> = (0..60).map(|i| doc! { "v": f64::from(i) * 1.5 }).collect();
    docs.push(doc! { "v": f64::NAN });
    table.insert(&ctx, docs).await.unwrap();

    table.insert(&ctx, vec![doc! { "v": 1000 }]).await.unwrap();
    let err = table
        .insert(&ctx, vec![doc! { "v": f64::NAN }])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("by_v"), "{err}");
    assert_eq!(table.find(Condition::always()).count(&ctx).await.unwrap(), 62);
}
