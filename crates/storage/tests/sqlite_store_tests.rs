use alcove_core::Tenant;
use alcove_core::entry::Entry;
use alcove_core::filter::{Filter, OrderSpec};
use alcove_core::permission::PermissionSet;
use alcove_storage::{ListEvent, SettingsAccess, SettingsStore, SqliteStore, StoreError};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

async fn open_store() -> (tempfile::TempDir, Arc<SqliteStore>, Tenant) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("settings.db"))
        .await
        .expect("open store");
    let tenant = Tenant::parse("testlib").expect("tenant");
    store.init_tenant(&tenant).await.expect("init tenant");
    (dir, Arc::new(store), tenant)
}

fn entry(scope: &str, key: &str, owner: Option<Uuid>) -> Entry {
    Entry {
        id: Some(Uuid::new_v4()),
        scope: scope.to_string(),
        key: key.to_string(),
        value: json!({"k": key}),
        owner,
    }
}

fn access(
    store: Arc<SqliteStore>,
    tenant: &Tenant,
    caller: Option<Uuid>,
    tokens: &[&str],
) -> SettingsAccess {
    SettingsAccess::new(
        store,
        tenant.clone(),
        caller,
        PermissionSet::from_tokens(tokens.iter().copied()),
    )
}

async fn collect(
    store: &SqliteStore,
    tenant: &Tenant,
    query: alcove_storage::CompiledQuery,
) -> (Vec<Entry>, Option<u64>, Option<String>) {
    let (tx, mut rx) = mpsc::channel(100);
    store.stream_entries(tenant, query, tx).await;
    let mut rows = Vec::new();
    let mut total = None;
    let mut failure = None;
    while let Some(event) = rx.recv().await {
        match event {
            ListEvent::Row(entry) => rows.push(entry),
            ListEvent::End { total_records } => total = Some(total_records),
            ListEvent::Failed { message } => failure = Some(message),
        }
    }
    (rows, total, failure)
}

#[tokio::test]
async fn init_tenant_is_idempotent() {
    let (_dir, store, tenant) = open_store().await;
    store.init_tenant(&tenant).await.expect("second init");
}

#[tokio::test]
async fn insert_and_fetch_round_trip() {
    let (_dir, store, tenant) = open_store().await;
    let owner = Uuid::new_v4();
    let e = entry("ui", "theme", Some(owner));
    store.insert(&tenant, &e).await.expect("insert");

    let fetched = store
        .fetch(&tenant, e.id.unwrap())
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(fetched, e);

    assert!(store.fetch(&tenant, Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_scope_key_conflicts_per_owner() {
    let (_dir, store, tenant) = open_store().await;
    let owner = Uuid::new_v4();

    store
        .insert(&tenant, &entry("ui", "theme", None))
        .await
        .expect("global insert");
    let err = store
        .insert(&tenant, &entry("ui", "theme", None))
        .await
        .expect_err("duplicate global");
    assert!(matches!(err, StoreError::Conflict(_)));

    // Same (scope, key) under a different owner does not collide.
    store
        .insert(&tenant, &entry("ui", "theme", Some(owner)))
        .await
        .expect("owned insert");
    let err = store
        .insert(&tenant, &entry("ui", "theme", Some(owner)))
        .await
        .expect_err("duplicate owned");
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn update_replaces_fields_and_reports_missing() {
    let (_dir, store, tenant) = open_store().await;
    let mut e = entry("ui", "theme", None);
    store.insert(&tenant, &e).await.unwrap();

    e.value = json!({"mode": "dark"});
    e.key = "theme2".to_string();
    store.update(&tenant, &e).await.expect("update");
    let fetched = store.fetch(&tenant, e.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(fetched, e);

    let missing = entry("ui", "other", None);
    let err = store.update(&tenant, &missing).await.expect_err("missing");
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn update_into_taken_slot_conflicts() {
    let (_dir, store, tenant) = open_store().await;
    store.insert(&tenant, &entry("ui", "a", None)).await.unwrap();
    let mut b = entry("ui", "b", None);
    store.insert(&tenant, &b).await.unwrap();

    b.key = "a".to_string();
    let err = store.update(&tenant, &b).await.expect_err("collision");
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn delete_removes_and_reports_missing() {
    let (_dir, store, tenant) = open_store().await;
    let e = entry("ui", "theme", None);
    store.insert(&tenant, &e).await.unwrap();

    store.delete(&tenant, e.id.unwrap()).await.expect("delete");
    assert!(store.fetch(&tenant, e.id.unwrap()).await.unwrap().is_none());
    let err = store
        .delete(&tenant, e.id.unwrap())
        .await
        .expect_err("gone");
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn upsert_inserts_then_updates_in_place() {
    let (_dir, store, tenant) = open_store().await;
    let first = entry("ui", "theme", None);
    let inserted = store.upsert(&tenant, &first).await.expect("first upsert");
    assert!(inserted);

    // Second upsert with a fresh id lands on the existing row and only
    // replaces the value.
    let mut second = entry("ui", "theme", None);
    second.value = json!({"mode": "light"});
    let inserted = store.upsert(&tenant, &second).await.expect("second upsert");
    assert!(!inserted);

    let fetched = store
        .fetch(&tenant, first.id.unwrap())
        .await
        .unwrap()
        .expect("kept original id");
    assert_eq!(fetched.value, json!({"mode": "light"}));
    assert!(store
        .fetch(&tenant, second.id.unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn stream_sends_rows_then_total() {
    let (_dir, store, tenant) = open_store().await;
    let caller = Uuid::new_v4();
    for key in ["a", "b", "c"] {
        store.insert(&tenant, &entry("ui", key, None)).await.unwrap();
    }
    store
        .insert(&tenant, &entry("ui", "mine", Some(caller)))
        .await
        .unwrap();
    store
        .insert(&tenant, &entry("other", "x", None))
        .await
        .unwrap();

    let acc = access(
        store.clone(),
        &tenant,
        Some(caller),
        &["alcove.global.read.ui", "alcove.owner.read.ui"],
    );
    let query = acc
        .list_query(None, Some(OrderSpec::parse("key").unwrap()), 10, 0)
        .expect("compile");
    let (rows, total, failure) = collect(&store, &tenant, query).await;
    assert!(failure.is_none());
    assert_eq!(total, Some(4));
    let keys: Vec<&str> = rows.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["a", "b", "c", "mine"]);
}

#[tokio::test]
async fn stream_pagination_partitions_results() {
    let (_dir, store, tenant) = open_store().await;
    for key in ["a", "b", "c", "d", "e"] {
        store.insert(&tenant, &entry("ui", key, None)).await.unwrap();
    }
    let acc = access(store.clone(), &tenant, None, &["alcove.global.read.ui"]);
    let order = || OrderSpec::parse("key.asc").unwrap();

    let q = acc.list_query(None, Some(order()), 2, 0).unwrap();
    let (page1, total, _) = collect(&store, &tenant, q).await;
    let q = acc.list_query(None, Some(order()), 2, 2).unwrap();
    let (page2, _, _) = collect(&store, &tenant, q).await;
    let q = acc.list_query(None, Some(order()), 2, 4).unwrap();
    let (page3, _, _) = collect(&store, &tenant, q).await;

    // Every page still reports the full matching count.
    assert_eq!(total, Some(5));
    let keys: Vec<String> = page1
        .iter()
        .chain(&page2)
        .chain(&page3)
        .map(|e| e.key.clone())
        .collect();
    assert_eq!(keys, ["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn stream_applies_filter() {
    let (_dir, store, tenant) = open_store().await;
    for key in ["theme", "theme.accent", "lang"] {
        store.insert(&tenant, &entry("ui", key, None)).await.unwrap();
    }
    let acc = access(store.clone(), &tenant, None, &["alcove.global.read.ui"]);
    let filter = Filter::parse("key = theme*").unwrap();
    let q = acc
        .list_query(Some(&filter), Some(OrderSpec::parse("key").unwrap()), 10, 0)
        .unwrap();
    let (rows, total, _) = collect(&store, &tenant, q).await;
    assert_eq!(total, Some(2));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|e| e.key.starts_with("theme")));
}

#[tokio::test]
async fn access_hides_unauthorized_entries() {
    let (_dir, store, tenant) = open_store().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let owned = entry("ui", "theme", Some(owner));
    store.insert(&tenant, &owned).await.unwrap();

    let acc = access(store.clone(), &tenant, Some(owner), &["alcove.owner.read.ui"]);
    assert_eq!(acc.get(owned.id.unwrap()).await.unwrap(), owned);

    // A different caller with the same token must not learn the row exists.
    let acc = access(
        store.clone(),
        &tenant,
        Some(stranger),
        &["alcove.owner.read.ui"],
    );
    let err = acc.get(owned.id.unwrap()).await.expect_err("hidden");
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn access_write_checks_old_and_new_entry() {
    let (_dir, store, tenant) = open_store().await;
    let acc = access(store.clone(), &tenant, None, &["alcove.global.write.ui"]);
    let created = acc.create(entry("ui", "theme", None)).await.expect("create");

    // Moving the entry into an unwritable scope is forbidden.
    let mut moved = created.clone();
    moved.scope = "secret".to_string();
    let err = acc.update(moved).await.expect_err("scope escape");
    assert!(matches!(err, StoreError::Forbidden));

    let err = acc
        .create(entry("secret", "k", None))
        .await
        .expect_err("no grant");
    assert!(matches!(err, StoreError::Forbidden));
}

#[tokio::test]
async fn access_list_without_read_grants_is_forbidden() {
    let (_dir, store, tenant) = open_store().await;
    let acc = access(store.clone(), &tenant, None, &["alcove.global.write.ui"]);
    let err = acc.list_query(None, None, 10, 0).expect_err("no read grants");
    assert!(matches!(err, StoreError::Forbidden));
}

#[tokio::test]
async fn access_upsert_assigns_id_and_rejects_supplied_id() {
    let (_dir, store, tenant) = open_store().await;
    let acc = access(store.clone(), &tenant, None, &["alcove.global.write.ui"]);

    let mut e = entry("ui", "theme", None);
    e.id = None;
    assert!(acc.upsert(e.clone()).await.expect("insert"));
    assert!(!acc.upsert(e.clone()).await.expect("update"));

    let err = acc
        .upsert(entry("ui", "theme", None))
        .await
        .expect_err("id supplied");
    assert!(matches!(err, StoreError::User(_)));
}
