//! axum-backed application host and a recording database host.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use axum::http::HeaderName;
use axum::routing::MethodRouter;
use axum::{Json, Router};
use impkit::{AppHost, OrmHost, UnitMount};
use impkit_bootstrap::redact_uri;
use serde_json::json;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const STATUS_PATH: &str = "/_imp/status";
pub const APP_STATIC_PATH: &str = "/static";

#[derive(Debug, Clone)]
pub struct MountInfo {
    pub name: String,
    pub mount_path: String,
    pub parent: Option<String>,
    pub template_folder: Option<PathBuf>,
}

/// Routes a unit resource attaches to its mount. Paths are relative to the mount path.
#[derive(Default)]
pub struct UnitRoutes {
    router: Router,
    paths: Vec<String>,
}

impl UnitRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.router = self.router.route(path, method_router);
        self.paths.push(path.to_string());
        self
    }
}

/// Collects routers from app resources and activated units.
pub struct AxumHost {
    router: Router,
    /// Full request paths already routed, app level and unit level.
    routed: BTreeSet<String>,
    /// Non-root mount paths already nested.
    claimed_mounts: BTreeMap<String, String>,
    extensions: BTreeSet<String>,
    static_folder: Option<PathBuf>,
    template_folder: Option<PathBuf>,
    mounts: Vec<MountInfo>,
}

impl Default for AxumHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AxumHost {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            routed: BTreeSet::from([STATUS_PATH.to_string()]),
            claimed_mounts: BTreeMap::new(),
            extensions: BTreeSet::new(),
            static_folder: None,
            template_folder: None,
            mounts: Vec::new(),
        }
    }

    /// Add an app-level route. Used by app resource factories.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> anyhow::Result<()> {
        if !self.routed.insert(path.to_string()) {
            anyhow::bail!("route {path} is already registered");
        }
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        Ok(())
    }

    pub fn mounts(&self) -> &[MountInfo] {
        &self.mounts
    }

    pub fn template_folder(&self) -> Option<&Path> {
        self.template_folder.as_deref()
    }

    /// Final router: app routes, unit routes, app static files, status and middleware.
    pub fn into_router(self, databases: &RecordedDatabases) -> Router {
        let mounts: Vec<_> = self
            .mounts
            .iter()
            .map(|m| json!({ "name": m.name, "mount_path": m.mount_path, "parent": m.parent }))
            .collect();
        let status = json!({
            "units": mounts,
            "databases": databases.redacted(),
        });

        let mut router = self
            .router
            .route(STATUS_PATH, axum::routing::get(move || async move { Json(status) }));
        if let Some(folder) = self.static_folder {
            router = router.nest_service(APP_STATIC_PATH, ServeDir::new(folder));
        }

        let x_request_id = HeaderName::from_static("x-request-id");
        router
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }
}

/// Join a mount path and a route path into the request path axum will match.
fn full_path(mount_path: &str, path: &str) -> String {
    let mount = mount_path.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (mount.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => mount.to_string(),
        (false, false) => format!("{mount}/{path}"),
    }
}

impl AppHost for AxumHost {
    fn register_unit(&mut self, mut unit: UnitMount, parent: Option<&UnitMount>) -> anyhow::Result<()> {
        let mut unit_router = Router::new();
        let mut paths = Vec::new();
        for routes in unit.take_attachments::<UnitRoutes>() {
            unit_router = unit_router.merge(routes.router);
            paths.extend(routes.paths);
        }
        if let Some(folder) = unit.static_folder.as_ref().filter(|f| f.is_dir()) {
            let url = unit
                .static_url_path
                .as_deref()
                .map(|u| u.trim_matches('/'))
                .filter(|u| !u.is_empty())
                .unwrap_or("static");
            let url = format!("/{url}");
            unit_router = unit_router.nest_service(&url, ServeDir::new(folder));
            paths.push(url);
        }
        let has_routes = !paths.is_empty();

        if has_routes && unit.mount_path != "/" {
            if let Some(owner) = self.claimed_mounts.get(&unit.mount_path) {
                anyhow::bail!(
                    "unit {} cannot mount at {}: already used by unit {owner}",
                    unit.name,
                    unit.mount_path
                );
            }
        }
        let mut full: BTreeSet<String> = BTreeSet::new();
        for path in &paths {
            let joined = full_path(&unit.mount_path, path);
            if self.routed.contains(&joined) || !full.insert(joined.clone()) {
                anyhow::bail!("unit {} routes {joined}, which is already registered", unit.name);
            }
        }

        if has_routes {
            let router = std::mem::take(&mut self.router);
            self.router = if unit.mount_path == "/" {
                router.merge(unit_router)
            } else {
                self.claimed_mounts
                    .insert(unit.mount_path.clone(), unit.name.clone());
                router.nest(&unit.mount_path, unit_router)
            };
            self.routed.extend(full);
        }

        tracing::debug!(
            unit = %unit.name,
            mount_path = %unit.mount_path,
            parent = parent.map(|p| p.name.as_str()),
            has_routes,
            "Unit mounted"
        );
        self.mounts.push(MountInfo {
            name: unit.name,
            mount_path: unit.mount_path,
            parent: parent.map(|p| p.name.clone()),
            template_folder: unit.template_folder,
        });
        Ok(())
    }

    fn claim_extension(&mut self, name: &str) -> bool {
        self.extensions.insert(name.to_string())
    }

    fn set_app_folders(&mut self, static_folder: Option<&Path>, template_folder: Option<&Path>) {
        if static_folder.is_some() {
            self.claimed_mounts
                .insert(APP_STATIC_PATH.to_string(), "<app>".to_string());
            self.routed.insert(APP_STATIC_PATH.to_string());
        }
        self.static_folder = static_folder.map(Path::to_path_buf);
        self.template_folder = template_folder.map(Path::to_path_buf);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Database host that records the bind table it receives.
///
/// Connections are opened lazily by whatever store the units bring; the server only
/// reports the table.
#[derive(Debug, Default, Clone)]
pub struct RecordedDatabases {
    pub main_uri: Option<String>,
    pub binds: BTreeMap<String, String>,
}

impl RecordedDatabases {
    pub fn redacted(&self) -> serde_json::Value {
        let binds: serde_json::Map<_, _> = self
            .binds
            .iter()
            .map(|(k, v)| (k.clone(), json!(redact_uri(v))))
            .collect();
        json!({
            "main": self.main_uri.as_deref().map(redact_uri),
            "binds": binds,
        })
    }
}

impl OrmHost for RecordedDatabases {
    fn init_database(
        &mut self,
        main_uri: Option<&str>,
        binds: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        if main_uri.is_none() && binds.is_empty() {
            tracing::warn!("No database configured; running without databases");
        }
        self.main_uri = main_uri.map(str::to_string);
        self.binds = binds.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn status_of(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn unit_routers_are_nested_at_mount_path() {
        let mut host = AxumHost::new();
        let mut parent = UnitMount::new("www", "/app/www", "/www");
        let mut child = UnitMount::new("account", "/app/www/account", "/me").under(&parent);
        child.attach(UnitRoutes::new().route("/profile", get(|| async { "profile" })));
        parent.attach(UnitRoutes::new().route("/hello", get(|| async { "hello" })));

        host.register_unit(child, Some(&parent)).unwrap();
        host.register_unit(parent, None).unwrap();

        assert_eq!(host.mounts()[0].mount_path, "/www/me");
        assert_eq!(host.mounts()[0].parent.as_deref(), Some("www"));

        let router = host.into_router(&RecordedDatabases::default());
        assert_eq!(status_of(router.clone(), "/www/hello").await, StatusCode::OK);
        assert_eq!(status_of(router.clone(), "/www/me/profile").await, StatusCode::OK);
        assert_eq!(status_of(router.clone(), STATUS_PATH).await, StatusCode::OK);
        assert_eq!(status_of(router, "/hello").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_mount_merges_routes() {
        let mut host = AxumHost::new();
        let mut unit = UnitMount::new("home", "/app/home", "/");
        unit.attach(UnitRoutes::new().route("/about", get(|| async { "about" })));
        host.register_unit(unit, None).unwrap();

        let router = host.into_router(&RecordedDatabases::default());
        assert_eq!(status_of(router, "/about").await, StatusCode::OK);
    }

    #[test]
    fn second_unit_on_a_used_mount_path_is_rejected() {
        let mut host = AxumHost::new();
        let mut first = UnitMount::new("a", "/app/a", "/shared");
        first.attach(UnitRoutes::new().route("/", get(|| async { "a" })));
        let mut second = UnitMount::new("b", "/app/b", "/shared");
        second.attach(UnitRoutes::new().route("/other", get(|| async { "b" })));

        host.register_unit(first, None).unwrap();
        let err = host.register_unit(second, None).unwrap_err();

        assert!(err.to_string().contains("already used by unit a"), "{err}");
        assert_eq!(host.mounts().len(), 1);
    }

    #[tokio::test]
    async fn root_unit_colliding_with_app_route_is_rejected() {
        let mut host = AxumHost::new();
        host.route("/", get(|| async { "app" })).unwrap();
        let mut unit = UnitMount::new("c", "/app/c", "/");
        unit.attach(UnitRoutes::new().route("/", get(|| async { "unit" })));

        let err = host.register_unit(unit, None).unwrap_err();
        assert!(err.to_string().contains("routes /"), "{err}");

        let router = host.into_router(&RecordedDatabases::default());
        assert_eq!(status_of(router, "/").await, StatusCode::OK);
    }

    #[test]
    fn app_routes_cannot_shadow_each_other() {
        let mut host = AxumHost::new();
        host.route("/", get(|| async { "app" })).unwrap();
        assert!(host.route("/", get(|| async { "again" })).is_err());
        assert!(host.route(STATUS_PATH, get(|| async { "status" })).is_err());
    }

    #[test]
    fn full_paths_join_mount_and_route() {
        assert_eq!(full_path("/", "/"), "/");
        assert_eq!(full_path("/", "/about"), "/about");
        assert_eq!(full_path("/www", "/"), "/www");
        assert_eq!(full_path("/www/", "/hello"), "/www/hello");
    }

    #[test]
    fn extension_is_claimed_once() {
        let mut host = AxumHost::new();
        assert!(host.claim_extension("imp"));
        assert!(!host.claim_extension("imp"));
    }

    #[test]
    fn recorded_databases_redact_passwords() {
        let mut dbs = RecordedDatabases::default();
        let binds = BTreeMap::from([(
            "shop".to_string(),
            "postgresql://app:secret@db:5432/shop".to_string(),
        )]);
        dbs.init_database(None, &binds).unwrap();

        let shown = dbs.redacted();
        assert_eq!(shown["binds"]["shop"], "postgresql://app:***@db:5432/shop");
        assert!(shown["main"].is_null());
    }
}
