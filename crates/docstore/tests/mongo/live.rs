//! Tests against a real server. Skipped unless `DOCSTORE_TEST_MONGO_HOSTS`
//! names one or more `host:port` entries.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bson::doc;
use docstore::mongo::{MongoDb, MongoOptions};
use docstore::types::{Index, IndexField, SortEntry};
use docstore::{Condition, Context, Database, EventKind, StorageError, Table};
use tokio::time::timeout;

const HOSTS_VAR: &str = "DOCSTORE_TEST_MONGO_HOSTS";

fn live_options() -> Option<MongoOptions> {
    let hosts = std::env::var(HOSTS_VAR).ok()?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    Some(MongoOptions {
        hosts: hosts.split(',').map(str::to_string).collect(),
        database: format!("docstore_test_{nanos}"),
        connect_timeout_seconds: 5,
        ..Default::default()
    })
}

macro_rules! live_db {
    () => {
        match live_options() {
            Some(options) => MongoDb::connect(&Context::background(), &options)
                .await
                .unwrap(),
            None => {
                eprintln!("{HOSTS_VAR} not set, skipping");
                return;
            }
        }
    };
}

#[tokio::test]
async fn unreachable_host_fails_within_the_context_deadline() {
    let options = MongoOptions {
        hosts: vec!["127.0.0.1:1".into()],
        database: "docstore".into(),
        connect_timeout_seconds: 1,
        ..Default::default()
    };
    let ctx = Context::background().with_timeout(Duration::from_millis(500));
    let started = std::time::Instant::now();
    let err = MongoDb::connect(&ctx, &options).await.unwrap_err();
    assert!(
        err.is_cancelled() || matches!(err, StorageError::Connection { .. }),
        "{err}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn invalid_options_fail_before_connecting() {
    let err = MongoDb::connect(&Context::background(), &MongoOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));
}

#[tokio::test]
async fn crud_round_trip() {
    let db = live_db!();
    let ctx = Context::background();
    let table = db.table("metrics");
    let n = table
        .insert(
            &ctx,
            vec![
                doc! { "id": 1, "v": 10 },
                doc! { "id": 2, "v": 5 },
                doc! { "id": 3, "v": 20 },
            ],
        )
        .await
        .unwrap();
    assert_eq!(n, 3);

    let docs = table
        .find(Condition::gt("v", 8))
        .with_sort([SortEntry::asc("v")])
        .all(&ctx)
        .await
        .unwrap();
    let ids: Vec<i32> = docs.iter().map(|d| d.get_i32("id").unwrap()).collect();
    assert_eq!(ids, [1, 3]);

    let matched = table
        .update_many(&ctx, &Condition::gt("v", 8), doc! { "$inc": { "v": 1 } })
        .await
        .unwrap();
    assert_eq!(matched, 2);

    table
        .upsert(&ctx, &Condition::eq("id", 4), doc! { "v": 0 })
        .await
        .unwrap();
    let created = table.find(Condition::eq("id", 4)).one(&ctx).await.unwrap();
    assert_eq!(created.get_i32("v").unwrap(), 0);

    let err = table.find(Condition::eq("id", 99)).one(&ctx).await.unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(table.delete(&ctx, &Condition::always()).await.unwrap(), 4);
    db.drop_table(&ctx, "metrics").await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn index_lifecycle() {
    let db = live_db!();
    let ctx = Context::background();
    let table = db.table("pods");
    let index = Index::new("by_name", [IndexField::asc("name")])
        .unwrap()
        .unique(true);
    table.create_index(&ctx, index).await.unwrap();
    assert!(table.has_index(&ctx, "by_name").await.unwrap());

    table.insert(&ctx, vec![doc! { "name": "web" }]).await.unwrap();
    let err = table
        .insert(&ctx, vec![doc! { "name": "web" }])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Execution { .. }));

    table.drop_index(&ctx, "by_name").await.unwrap();
    assert!(!table.has_index(&ctx, "by_name").await.unwrap());
    db.drop_table(&ctx, "pods").await.unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn change_stream_delivers_inserts() {
    let db = live_db!();
    let ctx = Context::background();
    db.create_table(&ctx, "events").await.unwrap();
    let table = db.table("events");
    // change streams need a replica set; a standalone server refuses them
    let mut rx = match table.watch(Vec::new()).do_watch(&ctx).await {
        Ok(rx) => rx,
        Err(e) => {
            eprintln!("change streams unavailable: {e}");
            return;
        }
    };
    table.insert(&ctx, vec![doc! { "_id": 1 }]).await.unwrap();
    let event = timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, EventKind::Insert);
    assert_eq!(event.collection_name, "events");

    ctx.cancel();
    db.drop_table(&Context::background(), "events").await.unwrap();
    db.close().await.unwrap();
}
