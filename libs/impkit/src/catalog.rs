//! Source catalog: what each discoverable file or folder links to.
//!
//! Keys are paths relative to the application root with `/` separators, e.g.
//! `resources/routes/index.rs`, `blueprints/www` or `models/user.rs`. Entries are
//! registered explicitly or collected at link time through [`Registrator`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::host::{AppHost, UnitMount};
use crate::model::ModelClass;
use crate::unit::{Unit, UnitSite};

/// Factory invoked with the application host.
pub type AppFactory = fn(&mut dyn AppHost) -> anyhow::Result<()>;
/// Factory invoked with the mount of the unit that imported the resource.
pub type UnitFactory = fn(&mut UnitMount) -> anyhow::Result<()>;
/// Runs once when the file is first loaded.
pub type LoadHook = fn() -> anyhow::Result<()>;
/// Declares the unit living in a folder.
pub type UnitEntry = fn(UnitSite) -> anyhow::Result<Unit>;
/// Lists the model classes declared in a file.
pub type ModelSource = fn() -> Vec<ModelClass>;

/// A resource file: an optional load hook plus named factories.
#[derive(Default, Clone)]
pub struct ResourceModule {
    on_load: Option<LoadHook>,
    app_factories: BTreeMap<&'static str, AppFactory>,
    unit_factories: BTreeMap<&'static str, UnitFactory>,
}

impl ResourceModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_load(mut self, hook: LoadHook) -> Self {
        self.on_load = Some(hook);
        self
    }

    pub fn app_factory(mut self, name: &'static str, factory: AppFactory) -> Self {
        self.app_factories.insert(name, factory);
        self
    }

    pub fn unit_factory(mut self, name: &'static str, factory: UnitFactory) -> Self {
        self.unit_factories.insert(name, factory);
        self
    }

    pub fn load_hook(&self) -> Option<LoadHook> {
        self.on_load
    }

    pub fn get_app_factory(&self, name: &str) -> Option<AppFactory> {
        self.app_factories.get(name).copied()
    }

    pub fn get_unit_factory(&self, name: &str) -> Option<UnitFactory> {
        self.unit_factories.get(name).copied()
    }
}

impl fmt::Debug for ResourceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceModule")
            .field("has_on_load", &self.on_load.is_some())
            .field("app_factories", &self.app_factories.keys().collect::<Vec<_>>())
            .field("unit_factories", &self.unit_factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Submitted via `inventory::submit!` to add entries at link time.
pub struct Registrator(pub fn(&mut SourceCatalog));

inventory::collect!(Registrator);

#[derive(Default, Clone)]
pub struct SourceCatalog {
    resources: BTreeMap<String, Arc<ResourceModule>>,
    units: BTreeMap<String, UnitEntry>,
    models: BTreeMap<String, ModelSource>,
}

impl fmt::Debug for SourceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCatalog")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog filled by every linked [`Registrator`].
    pub fn discover() -> Self {
        let mut catalog = Self::new();
        for r in ::inventory::iter::<Registrator> {
            r.0(&mut catalog);
        }
        tracing::debug!(
            resources = catalog.resources.len(),
            units = catalog.units.len(),
            models = catalog.models.len(),
            "Source catalog discovered"
        );
        catalog
    }

    pub fn resource(&mut self, key: &str, module: ResourceModule) -> &mut Self {
        self.resources.insert(normalize_key(key), Arc::new(module));
        self
    }

    pub fn unit(&mut self, folder: &str, entry: UnitEntry) -> &mut Self {
        self.units.insert(normalize_key(folder), entry);
        self
    }

    pub fn models(&mut self, key: &str, source: ModelSource) -> &mut Self {
        self.models.insert(normalize_key(key), source);
        self
    }

    pub fn get_resource(&self, key: &str) -> Option<Arc<ResourceModule>> {
        self.resources.get(key).cloned()
    }

    pub fn get_unit(&self, key: &str) -> Option<UnitEntry> {
        self.units.get(key).copied()
    }

    pub fn get_models(&self, key: &str) -> Option<ModelSource> {
        self.models.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.units.is_empty() && self.models.is_empty()
    }
}

/// `./a\\b/` → `a/b`.
pub fn normalize_key(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Resolve `.` and `..` components lexically, without touching the filesystem.
/// `..` never climbs above a root.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Catalog key of `path` relative to `root`; `None` when `path` is outside it.
pub fn key_for(root: &Path, path: &Path) -> Option<String> {
    let path = clean_path(path);
    let rel = path.strip_prefix(clean_path(root)).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}
