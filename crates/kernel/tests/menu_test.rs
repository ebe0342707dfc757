#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Menu tree, authorization filter and per-user cache tests.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use custode_kernel::catalog::{CatalogError, MenuRecord, MetadataCatalog};
use custode_kernel::menu::{MenuNode, MenuService, VisibilityPolicy};
use custode_kernel::permissions::{
    MemoryRolePermissionStore, PermissionLookup, RolePermissionStore,
};

use common::{SwappableSource, TestKernel, sample_records};

fn ids(tree: &[MenuNode]) -> Vec<&str> {
    let mut out = Vec::new();
    for node in tree {
        out.push(node.id.as_str());
        out.extend(ids(&node.children));
    }
    out
}

#[tokio::test]
async fn test_visibility_follows_role_permissions() {
    let kernel = TestKernel::new().await;
    let (admin, _) = kernel.login("admin");
    let (editor, _) = kernel.login("editor");
    let (viewer, _) = kernel.login("viewer");

    let tree = kernel.menus.get_user_menu_tree(admin, true).await.unwrap();
    assert_eq!(ids(&tree), vec!["admin", "users", "settings", "audit", "reports"]);

    // user.edit is missing (AND fails); settings.view suffices (OR).
    let tree = kernel.menus.get_user_menu_tree(editor, true).await.unwrap();
    assert_eq!(ids(&tree), vec!["admin", "settings", "reports"]);

    let tree = kernel.menus.get_user_menu_tree(viewer, true).await.unwrap();
    assert_eq!(ids(&tree), vec!["reports"]);
}

#[tokio::test]
async fn test_rejected_parent_prunes_permitted_child() {
    let kernel = TestKernel::new().await;
    let (user, _) = kernel.login("auditor");
    kernel
        .store
        .grant_permission_to_role("auditor", "audit.view")
        .await
        .unwrap();

    // audit.view alone admits "audit", but its ancestors reject.
    let tree = kernel.menus.get_user_menu_tree(user, true).await.unwrap();
    assert_eq!(ids(&tree), vec!["reports"]);
}

#[tokio::test]
async fn test_per_node_policy_promotes_permitted_descendants() {
    let kernel = TestKernel::new().await;
    let (user, _) = kernel.login("auditor");
    kernel
        .store
        .grant_permission_to_role("auditor", "audit.view")
        .await
        .unwrap();

    let per_node = MenuService::new(
        load_sample_catalog().await,
        kernel.store.clone(),
        VisibilityPolicy::PerNode,
    );
    let tree = per_node.get_user_menu_tree(user, true).await.unwrap();
    assert_eq!(ids(&tree), vec!["audit", "reports"]);
}

async fn load_sample_catalog() -> Arc<MetadataCatalog> {
    let (menus, permissions) = sample_records();
    Arc::new(
        MetadataCatalog::load(Arc::new(SwappableSource::new(menus, permissions)))
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_cached_view_until_user_invalidated() {
    let kernel = TestKernel::new().await;
    let (editor, _) = kernel.login("editor");

    let before = kernel.menus.get_user_menu_tree(editor, true).await.unwrap();
    assert_eq!(kernel.menus.cache_size(), 1);

    kernel
        .store
        .grant_permission_to_role("editor", "user.edit")
        .await
        .unwrap();

    // Still served from cache.
    let cached = kernel.menus.get_user_menu_tree(editor, true).await.unwrap();
    assert!(Arc::ptr_eq(&before, &cached));

    // Bypassing the cache sees the grant.
    let fresh = kernel.menus.get_user_menu_tree(editor, false).await.unwrap();
    assert!(ids(&fresh).contains(&"users"));

    kernel.menus.clear_user_menu_cache(editor);
    let after = kernel.menus.get_user_menu_tree(editor, true).await.unwrap();
    assert_eq!(ids(&after), vec!["admin", "users", "settings", "reports"]);
}

/// Reads permissions, then parks until released, so a caller can change
/// grants and clear caches while a lookup is in flight.
struct ParkedLookup {
    store: Arc<MemoryRolePermissionStore>,
    park: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

#[async_trait]
impl PermissionLookup for ParkedLookup {
    async fn permissions_for(&self, user_id: Uuid) -> anyhow::Result<HashSet<String>> {
        let permissions = self.store.permissions_for(user_id).await?;
        let park = self.park.lock().take();
        if let Some((parked, resume)) = park {
            let _ = parked.send(());
            let _ = resume.await;
        }
        Ok(permissions)
    }
}

#[tokio::test]
async fn test_clear_during_lookup_does_not_cache_stale_view() {
    let kernel = TestKernel::new().await;
    let (editor, _) = kernel.login("editor");

    let (parked_tx, parked_rx) = oneshot::channel();
    let (resume_tx, resume_rx) = oneshot::channel();
    let menus = MenuService::new(
        load_sample_catalog().await,
        Arc::new(ParkedLookup {
            store: kernel.store.clone(),
            park: Mutex::new(Some((parked_tx, resume_rx))),
        }),
        VisibilityPolicy::PruneSubtree,
    );

    let in_flight = {
        let menus = menus.clone();
        tokio::spawn(async move { menus.get_user_menu_tree(editor, true).await.unwrap() })
    };
    parked_rx.await.unwrap();

    kernel
        .store
        .grant_permission_to_role("editor", "user.edit")
        .await
        .unwrap();
    menus.clear_user_menu_cache(editor);
    resume_tx.send(()).unwrap();

    // The overlapping call may answer with the old view, once.
    let stale = in_flight.await.unwrap();
    assert!(!ids(&stale).contains(&"users"));
    assert_eq!(menus.cache_size(), 0);

    let first = menus.get_user_menu_tree(editor, true).await.unwrap();
    assert!(ids(&first).contains(&"users"));
    let second = menus.get_user_menu_tree(editor, true).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_clear_all_drops_every_view() {
    let kernel = TestKernel::new().await;
    for role in ["admin", "editor", "viewer"] {
        let (user, _) = kernel.login(role);
        kernel.menus.get_user_menu_tree(user, true).await.unwrap();
    }
    assert_eq!(kernel.menus.cache_size(), 3);

    kernel.menus.clear_all_menu_cache();
    assert_eq!(kernel.menus.cache_size(), 0);
}

#[tokio::test]
async fn test_refresh_picks_up_new_metadata() {
    let (menus, permissions) = sample_records();
    let source = Arc::new(SwappableSource::new(menus.clone(), permissions));
    let kernel = TestKernel::with_source(source.clone()).await;
    let (viewer, _) = kernel.login("viewer");

    assert_eq!(
        ids(&kernel.menus.get_user_menu_tree(viewer, true).await.unwrap()),
        vec!["reports"]
    );

    let mut updated = menus;
    updated.push(MenuRecord::new("help", "Help", "/help").with_order(0));
    source.set_menus(updated);

    // Not visible until the catalog is rescanned.
    assert!(kernel.menus.find("help").is_none());

    let nodes = kernel.menus.refresh_menu_metadata().await.unwrap();
    assert_eq!(nodes, 6);
    assert_eq!(kernel.menus.cache_size(), 0);
    assert_eq!(
        ids(&kernel.menus.get_user_menu_tree(viewer, true).await.unwrap()),
        vec!["help", "reports"]
    );
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_tree() {
    let (menus, permissions) = sample_records();
    let source = Arc::new(SwappableSource::new(menus, permissions));
    let kernel = TestKernel::with_source(source.clone()).await;
    let (admin, _) = kernel.login("admin");

    let before = kernel.menus.get_user_menu_tree(admin, true).await.unwrap();
    let generation = kernel.state.catalog().snapshot().generation();

    source.set_menus(vec![
        MenuRecord::new("a", "A", "/a").with_parent("b"),
        MenuRecord::new("b", "B", "/b").with_parent("a"),
    ]);

    let err = kernel.menus.refresh_menu_metadata().await.unwrap_err();
    assert!(matches!(err, CatalogError::Cycle(_)));
    assert_eq!(kernel.state.catalog().snapshot().generation(), generation);

    let after = kernel.menus.get_user_menu_tree(admin, false).await.unwrap();
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn test_cyclic_metadata_fails_catalog_load() {
    let source = SwappableSource::new(
        vec![
            MenuRecord::new("root", "Root", "/"),
            MenuRecord::new("x", "X", "/x").with_parent("z"),
            MenuRecord::new("y", "Y", "/y").with_parent("x"),
            MenuRecord::new("z", "Z", "/z").with_parent("y"),
        ],
        Vec::new(),
    );

    let err = MetadataCatalog::load(Arc::new(source)).await.unwrap_err();
    assert!(matches!(err, CatalogError::Cycle(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_trees_during_refresh() {
    let (menus, permissions) = sample_records();
    let source = Arc::new(SwappableSource::new(menus.clone(), permissions));
    let kernel = TestKernel::with_source(source.clone()).await;
    let (admin, _) = kernel.login("admin");

    let old_ids: Vec<String> = ids(&kernel.menus.get_user_menu_tree(admin, false).await.unwrap())
        .into_iter()
        .map(String::from)
        .collect();

    let mut updated = menus;
    updated.push(MenuRecord::new("extra", "Extra", "/extra").with_order(9));
    source.set_menus(updated);

    let mut readers = Vec::new();
    for _ in 0..8 {
        let menus = kernel.menus.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..50 {
                let tree = menus.get_user_menu_tree(admin, true).await.unwrap();
                seen.push(ids(&tree).into_iter().map(String::from).collect::<Vec<_>>());
            }
            seen
        }));
    }

    kernel.menus.refresh_menu_metadata().await.unwrap();

    let mut new_ids = old_ids.clone();
    new_ids.push("extra".to_string());
    for reader in readers {
        for seen in reader.await.unwrap() {
            assert!(seen == old_ids || seen == new_ids, "partial tree: {seen:?}");
        }
    }
}
