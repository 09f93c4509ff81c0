//! Integration tests for the metasync engine
//!
//! These tests drive the retrieve and deploy pipelines end-to-end against
//! the filesystem-backed sandbox adapter: a `dev` environment is retrieved
//! into portable files, then promoted into a fresh `prod` environment with
//! every cross-type reference re-resolved.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

use metasync::core::{BusinessContext, MetadataItem, Rekey, RunOptions, SyncRun, TypeRegistry};
use metasync::registry;
use metasync::remote::FsAdapter;
use metasync::store::ItemStore;

/// Write one remote document into the sandbox environment
fn seed_remote(root: &Path, context: &str, type_name: &str, id: &str, value: Value) {
    let dir = root.join(context).join(type_name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{id}.json")),
        serde_json::to_string_pretty(&value).unwrap(),
    )
    .unwrap();
}

/// Read all remote documents of one type back out of the sandbox
fn remote_docs(root: &Path, context: &str, type_name: &str) -> Vec<MetadataItem> {
    let dir = root.join(context).join(type_name);
    if !dir.exists() {
        return Vec::new();
    }
    let mut docs: Vec<MetadataItem> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
        .map(|e| serde_json::from_str(&fs::read_to_string(e.path()).unwrap()).unwrap())
        .collect();
    docs.sort_by_key(|d| d.field_str("customerKey").unwrap_or_default().to_string());
    docs
}

fn adapter(registry: &TypeRegistry, type_name: &str, root: &Path) -> FsAdapter {
    FsAdapter::new(registry.get(type_name).unwrap().clone(), root)
}

fn ctx(id: &str) -> BusinessContext {
    BusinessContext::new(id).unwrap()
}

fn seed_dev_environment(root: &Path) {
    seed_remote(
        root,
        "dev",
        "folder",
        "12",
        json!({"customerKey": "f-de", "id": 12, "name": "Data Extensions", "path": "/Data Extensions"}),
    );
    seed_remote(
        root,
        "dev",
        "dataExtension",
        "obj-1",
        json!({
            "customerKey": "DE1",
            "objectId": "obj-1",
            "name": "Orders",
            "categoryId": 12,
            "fields": [{"name": "OrderId", "type": "Text"}]
        }),
    );
    seed_remote(
        root,
        "dev",
        "query",
        "q-1",
        json!({
            "customerKey": "Q1",
            "queryDefinitionId": "q-1",
            "name": "Nightly Orders",
            "queryText": "SELECT OrderId FROM Orders",
            "targetId": "obj-1",
            "categoryId": 12
        }),
    );
}

#[tokio::test]
async fn test_retrieve_produces_portable_files() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    seed_dev_environment(remote.path());

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());
    let mut run = SyncRun::new(&registry, ctx("dev"), RunOptions::default());

    for type_name in ["folder", "dataExtension", "query"] {
        let adapter = adapter(&registry, type_name, remote.path());
        let summary = run.retrieve_type(&adapter, &store).await.unwrap();
        assert_eq!(summary.failed, 0, "{type_name} retrieve failed");
    }

    let queries = store.load_items(&ctx("dev"), "query").unwrap();
    assert_eq!(queries.len(), 1);
    let (key, query) = &queries[0];
    assert_eq!(key, "Q1");
    // Environment-specific pointers are gone, portable ones are in place
    assert_eq!(query.field_str("r__dataExtension_key"), Some("DE1"));
    assert_eq!(query.field_str("r__folder_path"), Some("/Data Extensions"));
    assert!(query.field("targetId").is_none());
    assert!(query.field("categoryId").is_none());

    let des = store.load_items(&ctx("dev"), "dataExtension").unwrap();
    assert_eq!(des[0].1.field_str("r__folder_path"), Some("/Data Extensions"));
}

#[tokio::test]
async fn test_promotion_re_resolves_references_in_target_environment() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    seed_dev_environment(remote.path());

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());

    // Retrieve from dev
    let mut retrieve = SyncRun::new(&registry, ctx("dev"), RunOptions::default());
    for type_name in ["folder", "dataExtension", "query"] {
        let adapter = adapter(&registry, type_name, remote.path());
        retrieve.retrieve_type(&adapter, &store).await.unwrap();
    }

    // Copy the portable files into the prod context of the store
    for type_name in ["folder", "dataExtension", "query"] {
        for (key, item) in store.load_items(&ctx("dev"), type_name).unwrap() {
            store.save_item(&ctx("prod"), type_name, &key, &item).unwrap();
        }
    }

    // Deploy into an empty prod environment, dependency order
    let mut deploy = SyncRun::new(&registry, ctx("prod"), RunOptions::default());
    for type_name in ["folder", "dataExtension", "query"] {
        let adapter = adapter(&registry, type_name, remote.path());
        let summary = deploy.deploy_type(&adapter, &store).await.unwrap();
        assert_eq!(summary.created, 1, "{type_name} should be created in prod");
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);
    }

    // The prod query points at the prod data extension's new id, not dev's
    let prod_des = remote_docs(remote.path(), "prod", "dataExtension");
    let prod_queries = remote_docs(remote.path(), "prod", "query");
    assert_eq!(prod_des.len(), 1);
    assert_eq!(prod_queries.len(), 1);
    let prod_de_id = prod_des[0].field_str("objectId").unwrap();
    assert_ne!(prod_de_id, "obj-1");
    assert_eq!(prod_queries[0].field_str("targetId"), Some(prod_de_id));
    assert!(prod_queries[0].field("r__dataExtension_key").is_none());

    // The prod data extension landed in the re-created prod folder
    let prod_folders = remote_docs(remote.path(), "prod", "folder");
    assert_eq!(prod_folders.len(), 1);
    let prod_folder_id = prod_folders[0].field("id").unwrap();
    assert_eq!(prod_des[0].field("categoryId"), Some(prod_folder_id));
}

#[tokio::test]
async fn test_missing_dependency_skips_item_but_not_siblings() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    seed_remote(
        remote.path(),
        "prod",
        "dataExtension",
        "obj-x",
        json!({"customerKey": "DE2", "objectId": "obj-x", "name": "Customers"}),
    );

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());
    store
        .save_item(
            &ctx("prod"),
            "query",
            "Q_ok",
            &MetadataItem::from_value(json!({
                "customerKey": "Q_ok",
                "name": "Works",
                "queryText": "SELECT 1",
                "r__dataExtension_key": "DE2"
            }))
            .unwrap(),
        )
        .unwrap();
    store
        .save_item(
            &ctx("prod"),
            "query",
            "Q_bad",
            &MetadataItem::from_value(json!({
                "customerKey": "Q_bad",
                "name": "Broken",
                "queryText": "SELECT 2",
                "r__dataExtension_key": "DE9"
            }))
            .unwrap(),
        )
        .unwrap();

    let mut deploy = SyncRun::new(&registry, ctx("prod"), RunOptions::default());
    deploy
        .cache_type(&adapter(&registry, "folder", remote.path()))
        .await
        .unwrap();
    deploy
        .cache_type(&adapter(&registry, "dataExtension", remote.path()))
        .await
        .unwrap();
    let summary = deploy
        .deploy_type(&adapter(&registry, "query", remote.path()), &store)
        .await
        .unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    let diagnostic = &summary.diagnostics[0];
    assert_eq!(diagnostic.key, "Q_bad");
    assert!(
        diagnostic.reason.contains("dataExtension/DE9"),
        "diagnostic should name the dependency: {}",
        diagnostic.reason
    );

    // The sibling really made it to the remote
    let prod_queries = remote_docs(remote.path(), "prod", "query");
    assert_eq!(prod_queries.len(), 1);
    assert_eq!(prod_queries[0].field_str("customerKey"), Some("Q_ok"));
}

#[tokio::test]
async fn test_rekey_deploy_renames_and_cleans_up_local_artifacts() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    seed_remote(
        remote.path(),
        "prod",
        "dataExtension",
        "obj-9",
        json!({"customerKey": "DE1", "objectId": "obj-9", "name": "Orders"}),
    );

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());
    store
        .save_item(
            &ctx("prod"),
            "dataExtension",
            "DE1",
            &MetadataItem::from_value(json!({"customerKey": "DE1", "name": "Orders"})).unwrap(),
        )
        .unwrap();

    let options = RunOptions {
        rekey: Some(Rekey {
            type_name: "dataExtension".to_string(),
            old_key: "DE1".to_string(),
            new_key: "DE1_v2".to_string(),
        }),
        ..Default::default()
    };
    let mut deploy = SyncRun::new(&registry, ctx("prod"), options);
    deploy
        .cache_type(&adapter(&registry, "folder", remote.path()))
        .await
        .unwrap();
    let summary = deploy
        .deploy_type(&adapter(&registry, "dataExtension", remote.path()), &store)
        .await
        .unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.renamed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(deploy.renames().lookup("dataExtension", "DE1"), Some("DE1_v2"));

    // The local tree now holds the item under the new key only
    let keys: Vec<String> = store
        .load_items(&ctx("prod"), "dataExtension")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec!["DE1_v2"]);

    // The remote document carries the new key under the old identifier
    let docs = remote_docs(remote.path(), "prod", "dataExtension");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].field_str("customerKey"), Some("DE1_v2"));
    assert_eq!(docs[0].field_str("objectId"), Some("obj-9"));
}

#[tokio::test]
async fn test_retrieve_only_type_is_skipped_on_deploy() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());
    store
        .save_item(
            &ctx("prod"),
            "email",
            "E1",
            &MetadataItem::from_value(json!({"customerKey": "E1", "name": "Welcome"})).unwrap(),
        )
        .unwrap();

    let mut deploy = SyncRun::new(&registry, ctx("prod"), RunOptions::default());
    deploy
        .cache_type(&adapter(&registry, "folder", remote.path()))
        .await
        .unwrap();
    let summary = deploy
        .deploy_type(&adapter(&registry, "email", remote.path()), &store)
        .await
        .unwrap();

    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.skipped, 1);
    assert!(summary.diagnostics[0].reason.contains("does not support"));
    assert!(remote_docs(remote.path(), "prod", "email").is_empty());
}

#[tokio::test]
async fn test_inherited_items_resolve_after_parent_merge() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    // The shared data extension lives only in the parent context
    seed_remote(
        remote.path(),
        "parent",
        "dataExtension",
        "obj-shared",
        json!({"customerKey": "DE_shared", "objectId": "obj-shared", "name": "Shared Audience"}),
    );

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());
    store
        .save_item(
            &ctx("child"),
            "query",
            "Q1",
            &MetadataItem::from_value(json!({
                "customerKey": "Q1",
                "name": "Uses shared",
                "queryText": "SELECT 1",
                "r__dataExtension_key": "DE_shared"
            }))
            .unwrap(),
        )
        .unwrap();

    let mut deploy = SyncRun::new(&registry, ctx("child"), RunOptions::default());
    deploy
        .cache_type(&adapter(&registry, "folder", remote.path()))
        .await
        .unwrap();
    deploy
        .cache_type(&adapter(&registry, "dataExtension", remote.path()))
        .await
        .unwrap();
    let stats = deploy
        .merge_from_context(&adapter(&registry, "dataExtension", remote.path()), ctx("parent"))
        .await
        .unwrap();
    assert_eq!(stats.added, 1);
    assert_eq!(stats.collisions, 0);

    let summary = deploy
        .deploy_type(&adapter(&registry, "query", remote.path()), &store)
        .await
        .unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.skipped, 0);

    let prod_queries = remote_docs(remote.path(), "child", "query");
    assert_eq!(prod_queries[0].field_str("targetId"), Some("obj-shared"));
}

#[tokio::test]
async fn test_out_of_order_caching_is_run_fatal() {
    let remote = TempDir::new().unwrap();
    let registry = registry::builtin().unwrap();

    let mut run = SyncRun::new(&registry, ctx("prod"), RunOptions::default());
    // query depends on dataExtension, which has not been cached yet
    let err = run
        .cache_type(&adapter(&registry, "query", remote.path()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dependency"));
}

#[tokio::test]
async fn test_deploy_is_idempotent() {
    let remote = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    seed_dev_environment(remote.path());

    let registry = registry::builtin().unwrap();
    let store = ItemStore::new(local.path());

    let mut retrieve = SyncRun::new(&registry, ctx("dev"), RunOptions::default());
    for type_name in ["folder", "dataExtension", "query"] {
        let adapter = adapter(&registry, type_name, remote.path());
        retrieve.retrieve_type(&adapter, &store).await.unwrap();
    }

    // First deploy back into dev updates everything in place
    let mut first = SyncRun::new(&registry, ctx("dev"), RunOptions::default());
    for type_name in ["folder", "dataExtension", "query"] {
        let adapter = adapter(&registry, type_name, remote.path());
        let summary = first.deploy_type(&adapter, &store).await.unwrap();
        assert_eq!(summary.updated, 1, "{type_name} should match by key");
        assert_eq!(summary.created, 0);
        assert_eq!(summary.failed, 0);
    }

    // A second run makes the same decisions against the same state
    let mut second = SyncRun::new(&registry, ctx("dev"), RunOptions::default());
    for type_name in ["folder", "dataExtension", "query"] {
        let adapter = adapter(&registry, type_name, remote.path());
        let summary = second.deploy_type(&adapter, &store).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(summary.failed, 0);
    }
}
