#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common fixtures for integration tests.
//!
//! Everything here is built from the real kernel services over in-memory
//! stores and a manual clock, so tests exercise actual behavior without
//! PostgreSQL or Redis.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use custode_kernel::cache::MemoryCache;
use custode_kernel::capability::{
    CapabilityHandler, CapabilityRegistry, CapabilityResolver, Flow, InvocationContext,
    declare_admin_operations, register_builtin,
};
use custode_kernel::catalog::{
    MenuRecord, MetadataCatalog, MetadataSource, PermissionRecord, StaticSource,
};
use custode_kernel::menu::{MenuService, VisibilityPolicy};
use custode_kernel::permissions::{MemoryRolePermissionStore, PermissionReconciler};
use custode_kernel::token::{
    ManualClock, MemoryUserDirectory, RevocationList, TokenService, TokenType, UserRecord,
};
use custode_kernel::{AppState, StateParts, routes};

pub const SECRET: &[u8] = b"integration-test-secret-at-least-32-bytes";
pub const ISSUER: &str = "custode-test";
pub const EPOCH: i64 = 1_750_000_000;

/// A handler that only records that it ran.
#[derive(Debug)]
pub struct Recorder {
    pub name: &'static str,
    pub priority: i32,
}

impl Recorder {
    pub fn arc(name: &'static str, priority: i32) -> Arc<dyn CapabilityHandler> {
        Arc::new(Self { name, priority })
    }
}

impl CapabilityHandler for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn apply(&self, _ctx: &mut InvocationContext) -> Flow {
        Flow::Continue
    }
}

/// Menu and permission metadata shared by the menu, reconcile and API tests.
///
/// ```text
/// admin          any[admin.menu]
///   users        all[user.view, user.edit]
///   settings     any[settings.view, settings.edit]
///     audit      all[audit.view]
/// reports        (no requirements)
/// ```
pub fn sample_records() -> (Vec<MenuRecord>, Vec<PermissionRecord>) {
    let menus = vec![
        MenuRecord::new("reports", "Reports", "/reports").with_order(5),
        MenuRecord::new("admin", "Admin", "/admin")
            .with_order(1)
            .requiring_any(["admin.menu"]),
        MenuRecord::new("users", "Users", "/admin/users")
            .with_parent("admin")
            .requiring_all(["user.view", "user.edit"]),
        MenuRecord::new("settings", "Settings", "/admin/settings")
            .with_parent("admin")
            .with_order(2)
            .requiring_any(["settings.view", "settings.edit"]),
        MenuRecord::new("audit", "Audit", "/admin/settings/audit")
            .with_parent("settings")
            .requiring_all(["audit.view"]),
    ];

    let permissions = vec![
        PermissionRecord::new("admin.menu", "See the admin menu")
            .with_default_roles(["admin", "editor"]),
        PermissionRecord::new("user.view", "View users").with_default_roles(["admin", "editor"]),
        PermissionRecord::new("user.edit", "Edit users").with_default_roles(["admin"]),
        PermissionRecord::new("settings.view", "View settings")
            .with_default_roles(["admin", "editor"]),
        PermissionRecord::new("settings.edit", "Edit settings").with_default_roles(["admin"]),
        PermissionRecord::new("audit.view", "View audit log").with_default_roles(["admin"]),
    ];

    (menus, permissions)
}

/// A metadata source whose records can be replaced between scans.
#[derive(Debug, Default)]
pub struct SwappableSource {
    menus: parking_lot::Mutex<Vec<MenuRecord>>,
    permissions: parking_lot::Mutex<Vec<PermissionRecord>>,
}

impl SwappableSource {
    pub fn new(menus: Vec<MenuRecord>, permissions: Vec<PermissionRecord>) -> Self {
        Self {
            menus: parking_lot::Mutex::new(menus),
            permissions: parking_lot::Mutex::new(permissions),
        }
    }

    pub fn set_menus(&self, menus: Vec<MenuRecord>) {
        *self.menus.lock() = menus;
    }
}

#[async_trait::async_trait]
impl MetadataSource for SwappableSource {
    async fn menu_items(&self) -> anyhow::Result<Vec<MenuRecord>> {
        Ok(self.menus.lock().clone())
    }

    async fn permissions(&self) -> anyhow::Result<Vec<PermissionRecord>> {
        Ok(self.permissions.lock().clone())
    }
}

/// A fully wired kernel over in-memory stores.
pub struct TestKernel {
    pub state: AppState,
    pub router: Router,
    pub store: Arc<MemoryRolePermissionStore>,
    pub users: Arc<MemoryUserDirectory>,
    pub clock: Arc<ManualClock>,
    pub tokens: Arc<TokenService>,
    pub menus: MenuService,
}

impl TestKernel {
    /// Build a kernel over [`sample_records`], reconciled once.
    pub async fn new() -> Self {
        let (menus, permissions) = sample_records();
        Self::with_source(Arc::new(StaticSource::new(menus, permissions))).await
    }

    pub async fn with_source(source: Arc<dyn MetadataSource>) -> Self {
        let store = Arc::new(MemoryRolePermissionStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let clock = Arc::new(ManualClock::at(EPOCH));

        let resolver = Arc::new(CapabilityResolver::new(Arc::new(CapabilityRegistry::new())));
        register_builtin(&resolver).unwrap();
        declare_admin_operations(&resolver);

        let catalog = Arc::new(MetadataCatalog::load(source).await.unwrap());
        let menus = MenuService::new(
            Arc::clone(&catalog),
            store.clone(),
            VisibilityPolicy::PruneSubtree,
        );
        let reconciler = PermissionReconciler::new(store.clone());
        reconciler.sync_from_catalog(&catalog).await;

        let tokens = Arc::new(
            TokenService::new(
                SECRET,
                ISSUER,
                RevocationList::new(Arc::new(MemoryCache::new())),
            )
            .with_clock(clock.clone())
            .with_user_directory(users.clone()),
        );

        let state = AppState::from_parts(StateParts {
            resolver,
            catalog,
            menus: menus.clone(),
            reconciler,
            tokens: Arc::clone(&tokens),
        });
        let router = routes::app(state.clone());

        Self {
            state,
            router,
            store,
            users,
            clock,
            tokens,
            menus,
        }
    }

    /// Create an active user holding `role` and return an access token.
    pub fn login(&self, role: &str) -> (Uuid, String) {
        let id = Uuid::now_v7();
        self.users.insert(UserRecord {
            id,
            email: format!("{id}@example.com"),
            active: true,
        });
        self.store.assign_role(id, role);

        let token = self
            .tokens
            .issue(id, &format!("{id}@example.com"), role, TokenType::Access, 3600)
            .unwrap();
        (id, token)
    }

    /// Send a request through the full router.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// Send `method path` with an optional bearer token.
    pub async fn call(&self, method: &str, path: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Ids of a JSON menu tree, depth-first.
pub fn json_ids(tree: &serde_json::Value) -> Vec<String> {
    let mut ids = Vec::new();
    for node in tree.as_array().unwrap() {
        ids.push(node["id"].as_str().unwrap().to_string());
        ids.extend(json_ids(&node["children"]));
    }
    ids
}
