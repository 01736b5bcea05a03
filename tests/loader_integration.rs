// End-to-end load scenarios against the in-memory store.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mongofixture::api::{
    CancelHandle, Connection, Connector, Dispatcher, Error, ErrorKind, Fixture, LoadContext,
    LoadState, Loader, LoaderConfig, MemoryConnection, MemoryStore,
};

const DB: &str = "test_mongofixture";

fn testdata(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("testdata")
        .join(name)
}

fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create");
    file.write_all(contents.as_bytes()).expect("write");
    path
}

fn sorted_by_i(mut docs: Vec<Document>) -> Vec<Document> {
    docs.sort_by_key(|doc| doc.get_i32("i").unwrap_or(i32::MAX));
    docs
}

#[tokio::test]
async fn loads_dated_fixture_in_order() {
    let store = MemoryStore::new();
    let dispatcher = Dispatcher::new(store.clone(), "memory://");
    let report = dispatcher
        .dispatch(
            &LoadContext::background(),
            &Fixture::new(testdata("data.json"), DB),
        )
        .await
        .expect("load");

    assert_eq!(report.collection, "data");
    assert_eq!(report.outcome.documents, 10);

    let docs = sorted_by_i(store.documents(DB, "data"));
    assert_eq!(docs.len(), 10);
    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(doc.get_i32("i").unwrap(), i as i32);
        let time = doc.get_datetime("time").expect("time");
        assert_ne!(time.timestamp_millis(), 0);
        assert_eq!(time.timestamp_millis(), 1_577_836_800_000);
        assert!(doc.get_object_id("_id").is_ok());
    }
}

#[tokio::test]
async fn plain_values_are_stored_verbatim_in_file_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(
        temp.path(),
        "plain.json",
        "{\"i\":0,\"s\":\"a\",\"f\":1.5,\"b\":true,\"n\":null,\"arr\":[1,\"x\"],\"o\":{\"k\":2}}\n\
         {\"i\":1,\"s\":\"b\",\"big\":5000000000}\n\
         {\"i\":2,\"s\":\"c\"}",
    );
    let store = MemoryStore::new();
    Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect("load");

    let docs = store.documents(DB, "plain");
    let order: Vec<i32> = docs.iter().map(|doc| doc.get_i32("i").unwrap()).collect();
    assert_eq!(order, vec![0, 1, 2]);

    let first = &docs[0];
    assert_eq!(first.get_str("s").unwrap(), "a");
    assert_eq!(first.get_f64("f").unwrap(), 1.5);
    assert!(first.get_bool("b").unwrap());
    assert_eq!(first.get("n"), Some(&Bson::Null));
    assert_eq!(
        first.get_array("arr").unwrap(),
        &vec![Bson::Int32(1), Bson::String("x".to_string())]
    );
    assert_eq!(first.get_document("o").unwrap().get_i32("k").unwrap(), 2);
    let keys: Vec<&str> = first.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "i", "s", "f", "b", "n", "arr", "o"]);
    assert_eq!(docs[1].get_i64("big").unwrap(), 5_000_000_000);
}

#[tokio::test]
async fn loading_twice_duplicates_documents() {
    let store = MemoryStore::new();
    let dispatcher = Dispatcher::new(store.clone(), "memory://");
    let fixture = Fixture::new(testdata("data.json"), DB);
    let ctx = LoadContext::background();

    dispatcher.dispatch(&ctx, &fixture).await.expect("first");
    dispatcher.dispatch(&ctx, &fixture).await.expect("second");

    assert_eq!(store.count(DB, "data"), 20);
    assert_eq!(store.connections(), 2);
}

#[tokio::test]
async fn stops_at_first_invalid_object() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(
        temp.path(),
        "broken.json",
        "{\"i\":0}\n{\"i\":1}\n{\"i\":2}\n{\"i\": oops}\n{\"i\":4}\n",
    );
    let store = MemoryStore::new();
    let err = Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect_err("parse error");

    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.index(), Some(4));
    assert!(err.offset().unwrap() >= 24);
    assert_eq!(store.count(DB, "broken"), 3);
}

#[tokio::test]
async fn truncated_tail_keeps_earlier_documents() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(temp.path(), "cut.json", "{\"i\":0}\n{\"i\":1,\"o\":{\"a\":");
    let store = MemoryStore::new();
    let err = Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect_err("truncated");

    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.index(), Some(2));
    assert_eq!(err.offset(), Some(8));
    assert_eq!(store.count(DB, "cut"), 1);
}

#[tokio::test]
async fn unknown_wrapper_is_nested_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(temp.path(), "weird.json", "{\"w\": {\"$weirdTag\": 5}}");
    let store = MemoryStore::new();
    Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect("load");

    let docs = store.documents(DB, "weird");
    let inner = docs[0].get_document("w").expect("nested");
    assert_eq!(inner.get_i32("$weirdTag").unwrap(), 5);
}

#[tokio::test]
async fn empty_file_is_a_successful_noop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(temp.path(), "empty.json", "");
    let store = MemoryStore::new();
    let mut loader = Loader::new(LoaderConfig {
        endpoint: "memory://".to_string(),
        path,
        database: DB.to_string(),
        collection: "empty".to_string(),
    });
    let outcome = loader
        .load_with(&store, &LoadContext::background())
        .await
        .expect("load");

    assert_eq!(outcome.documents, 0);
    assert_eq!(loader.state(), LoadState::Done);
    assert_eq!(store.count(DB, "empty"), 0);
    assert_eq!(store.connections(), 1);
}

#[tokio::test]
async fn unreachable_store_processes_nothing() {
    let store = MemoryStore::new();
    store.refuse_connections(true);
    let mut loader = Loader::new(LoaderConfig {
        endpoint: "memory://down".to_string(),
        path: testdata("data.json"),
        database: DB.to_string(),
        collection: "data".to_string(),
    });
    let err = loader
        .load_with(&store, &LoadContext::background())
        .await
        .expect_err("refused");

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(loader.state(), LoadState::Failed);
    assert_eq!(store.count(DB, "data"), 0);
}

#[tokio::test]
async fn rejected_insert_surfaces_with_index() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(
        temp.path(),
        "dupes.json",
        "{\"_id\":{\"$oid\":\"5e0a1b2c3d4e5f6a7b8c9d0e\"},\"n\":1}\n\
         {\"_id\":{\"$oid\":\"5e0a1b2c3d4e5f6a7b8c9d0e\"},\"n\":2}\n",
    );
    let store = MemoryStore::new();
    let err = Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect_err("duplicate key");

    assert_eq!(err.kind(), ErrorKind::Insert);
    assert_eq!(err.index(), Some(2));
    assert_eq!(store.count(DB, "dupes"), 1);
}

#[tokio::test]
async fn malformed_wrapper_is_type_resolution_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(
        temp.path(),
        "dates.json",
        "{\"d\":{\"$date\":\"2020-01-01T00:00:00Z\"}}\n\
         {\"d\":{\"$date\":\"2020-01-01T00:00:00Z\"}}\n\
         {\"d\":{\"$date\":\"not-a-date\"}}\n",
    );
    let store = MemoryStore::new();
    let err = Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect_err("bad date");

    assert_eq!(err.kind(), ErrorKind::TypeResolution);
    assert_eq!(err.index(), Some(3));
    assert_eq!(err.field(), Some("d"));
    assert_eq!(store.count(DB, "dates"), 2);
}

#[tokio::test]
async fn top_level_array_is_structural_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(temp.path(), "arr.json", "{\"a\":1}\n[{\"a\":2}]\n{\"a\":3}");
    let store = MemoryStore::new();
    let err = Dispatcher::new(store.clone(), "memory://")
        .dispatch(&LoadContext::background(), &Fixture::new(&path, DB))
        .await
        .expect_err("structural");

    assert_eq!(err.kind(), ErrorKind::Structural);
    assert_eq!(err.index(), Some(2));
    assert_eq!(store.count(DB, "arr"), 1);
}

#[tokio::test]
async fn legacy_ids_become_object_ids() {
    let store = MemoryStore::new();
    Dispatcher::new(store.clone(), "memory://")
        .dispatch(
            &LoadContext::background(),
            &Fixture::new(testdata("mixed.json"), DB),
        )
        .await
        .expect("load");

    let docs = store.documents(DB, "mixed");
    assert_eq!(docs.len(), 2);

    let ada = &docs[0];
    assert_eq!(
        ada.get_object_id("_id").unwrap(),
        ObjectId::parse_str("5e0a1b2c3d4e5f6a7b8c9d0e").unwrap()
    );
    assert_eq!(
        ada.get_object_id("manager").unwrap().to_hex(),
        "5e0a1b2c3d4e5f6a7b8c9d0f"
    );
    assert_eq!(
        ada.get_datetime("joined").unwrap().timestamp_millis(),
        1_577_836_800_000
    );
    assert_eq!(ada.get_binary_generic("avatar").unwrap(), &b"hello".to_vec());
    assert_eq!(ada.get_i64("visits").unwrap(), 9_007_199_254_740_993);
    assert_eq!(
        ada.get_document("extra").unwrap().get_i32("$weirdTag").unwrap(),
        5
    );

    let grace = &docs[1];
    let tags = grace.get_array("tags").unwrap();
    assert_eq!(
        tags[1],
        Bson::ObjectId(ObjectId::parse_str("5e0a1b2c3d4e5f6a7b8c9d11").unwrap())
    );
}

#[tokio::test]
async fn cancelled_context_never_connects() {
    let store = MemoryStore::new();
    let ctx = LoadContext::background();
    ctx.cancel_handle().cancel();
    let err = Dispatcher::new(store.clone(), "memory://")
        .dispatch(&ctx, &Fixture::new(testdata("data.json"), DB))
        .await
        .expect_err("cancelled");

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(store.connections(), 0);
}

/// Cancels its context after the first successful insert.
struct CancelAfterFirst {
    store: MemoryStore,
    cancel: CancelHandle,
}

struct CancelAfterFirstConnection {
    inner: MemoryConnection,
    cancel: CancelHandle,
}

#[async_trait]
impl Connector for CancelAfterFirst {
    type Connection = CancelAfterFirstConnection;

    async fn connect(&self, endpoint: &str) -> Result<Self::Connection, Error> {
        Ok(CancelAfterFirstConnection {
            inner: self.store.connect(endpoint).await?,
            cancel: self.cancel.clone(),
        })
    }
}

#[async_trait]
impl Connection for CancelAfterFirstConnection {
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), Error> {
        self.inner.insert_one(database, collection, document).await?;
        self.cancel.cancel();
        Ok(())
    }
}

#[tokio::test]
async fn cancellation_is_observed_between_documents() {
    let store = MemoryStore::new();
    let ctx = LoadContext::background();
    let connector = CancelAfterFirst {
        store: store.clone(),
        cancel: ctx.cancel_handle(),
    };
    let err = Dispatcher::new(connector, "memory://")
        .dispatch(&ctx, &Fixture::new(testdata("data.json"), DB))
        .await
        .expect_err("cancelled");

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.index(), Some(2));
    assert_eq!(store.count(DB, "data"), 1);
}

/// Connects instantly, then never finishes an insert.
struct StalledStore;

struct StalledConnection;

#[async_trait]
impl Connector for StalledStore {
    type Connection = StalledConnection;

    async fn connect(&self, _endpoint: &str) -> Result<Self::Connection, Error> {
        Ok(StalledConnection)
    }
}

#[async_trait]
impl Connection for StalledConnection {
    async fn insert_one(
        &self,
        _database: &str,
        _collection: &str,
        _document: Document,
    ) -> Result<(), Error> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancel_interrupts_a_stalled_insert() {
    let ctx = LoadContext::background();
    let handle = ctx.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });
    let dispatcher = Dispatcher::new(StalledStore, "memory://");
    let fixture = Fixture::new(testdata("data.json"), DB);
    let err = tokio::time::timeout(Duration::from_secs(5), dispatcher.dispatch(&ctx, &fixture))
        .await
        .expect("dispatch returned after cancel")
        .expect_err("cancelled");

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.index(), Some(1));
}
