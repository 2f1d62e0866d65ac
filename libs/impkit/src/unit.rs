//! Composition units (blueprints) and their deferred work.
//!
//! A [`Unit`] only records what should happen: models to import, bindings to build,
//! resources to load and children to visit. The engine executes that work when, and
//! only when, the unit is enabled.

use std::path::{Path, PathBuf};

use impkit_bootstrap::{DatabaseBinding, LoadOptions, UnitConfig};

use crate::naming::slug;
use crate::scope::ResourceScope;

/// Name of the config file expected in every unit folder.
pub const UNIT_CONFIG_FILE: &str = "config.toml";

/// Where a unit entry is being called for.
#[derive(Debug, Clone)]
pub struct UnitSite {
    pub name: String,
    pub location: PathBuf,
    pub load_options: LoadOptions,
}

impl UnitSite {
    pub fn new(location: impl Into<PathBuf>, load_options: LoadOptions) -> Self {
        let location = location.into();
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            location,
            load_options,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.location.join(UNIT_CONFIG_FILE)
    }

    /// Read `config.toml` from the unit folder.
    pub fn load_config(&self) -> Result<UnitConfig, impkit_bootstrap::ConfigError> {
        UnitConfig::load(&self.name, self.config_path(), self.load_options)
    }

    /// A unit configured from its folder's `config.toml`.
    pub fn unit_from_config(self) -> Result<Unit, impkit_bootstrap::ConfigError> {
        let config = self.load_config()?;
        Ok(Unit::new(self, config))
    }
}

#[derive(Debug, Clone)]
pub struct PendingResources {
    pub folder: PathBuf,
    pub factories: Vec<String>,
    pub scope: ResourceScope,
}

/// A child unit, resolved only when its parent activates.
#[derive(Debug)]
pub enum NestedRef {
    /// One unit folder.
    Folder(PathBuf),
    /// Every unit folder directly inside this folder.
    FolderScan(PathBuf),
    /// A unit built in code.
    Unit(Box<Unit>),
}

#[derive(Debug)]
pub struct Unit {
    name: String,
    location: PathBuf,
    config: UnitConfig,
    pending_models: Vec<PathBuf>,
    pending_binds: Vec<DatabaseBinding>,
    pending_resources: Vec<PendingResources>,
    children: Vec<NestedRef>,
}

impl Unit {
    pub fn new(site: UnitSite, config: UnitConfig) -> Self {
        let pending_binds = config.database_bindings.clone();
        Self {
            name: site.name,
            location: site.location,
            config,
            pending_models: Vec::new(),
            pending_binds,
            pending_resources: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Configured prefix, or `/` + slug of the folder name.
    pub fn url_prefix(&self) -> String {
        match &self.config.url_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("/{}", slug(&self.name)),
        }
    }

    /// `<unit>/<template>`, the path templates of this unit are addressed by.
    pub fn tmpl(&self, template: &str) -> String {
        format!("{}/{}", self.name, template)
    }

    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.location.join(path)
        }
    }

    /// Queue a model file or folder, relative to the unit folder.
    pub fn import_models(&mut self, file_or_folder: impl AsRef<Path>) -> &mut Self {
        let path = self.resolve(file_or_folder);
        self.add_model_import(path)
    }

    pub fn add_model_import(&mut self, path: PathBuf) -> &mut Self {
        self.pending_models.push(path);
        self
    }

    pub fn add_database_binding(&mut self, binding: DatabaseBinding) -> &mut Self {
        self.pending_binds.push(binding);
        self
    }

    /// Queue resources from `folder` (relative to the unit). `factories` defaults to
    /// `["include"]`, `scope` to `{"*": ["*"]}`.
    pub fn import_resources(
        &mut self,
        folder: impl AsRef<Path>,
        factories: &[&str],
        scope: Option<ResourceScope>,
    ) -> &mut Self {
        let factories = if factories.is_empty() {
            vec![crate::DEFAULT_FACTORY.to_string()]
        } else {
            factories.iter().map(|f| f.to_string()).collect()
        };
        self.pending_resources.push(PendingResources {
            folder: self.resolve(folder),
            factories,
            scope: scope.unwrap_or_default(),
        });
        self
    }

    /// Queue one nested unit folder.
    pub fn import_nested_unit(&mut self, folder: impl AsRef<Path>) -> &mut Self {
        let path = self.resolve(folder);
        self.children.push(NestedRef::Folder(path));
        self
    }

    /// Queue every unit folder directly inside `folder`.
    pub fn import_nested_units(&mut self, folder: impl AsRef<Path>) -> &mut Self {
        let path = self.resolve(folder);
        self.children.push(NestedRef::FolderScan(path));
        self
    }

    pub fn add_nested_child(&mut self, child: Unit) -> &mut Self {
        self.children.push(NestedRef::Unit(Box::new(child)));
        self
    }

    pub fn pending_models(&self) -> &[PathBuf] {
        &self.pending_models
    }

    pub fn pending_binds(&self) -> &[DatabaseBinding] {
        &self.pending_binds
    }

    pub fn pending_resources(&self) -> &[PendingResources] {
        &self.pending_resources
    }

    pub fn children(&self) -> &[NestedRef] {
        &self.children
    }

    pub(crate) fn into_parts(self) -> UnitParts {
        UnitParts {
            name: self.name,
            location: self.location,
            config: self.config,
            pending_models: self.pending_models,
            pending_binds: self.pending_binds,
            pending_resources: self.pending_resources,
            children: self.children,
        }
    }
}

/// Owned pieces of a unit, consumed by the engine during activation.
pub(crate) struct UnitParts {
    pub name: String,
    pub location: PathBuf,
    pub config: UnitConfig,
    pub pending_models: Vec<PathBuf>,
    pub pending_binds: Vec<DatabaseBinding>,
    pub pending_resources: Vec<PendingResources>,
    pub children: Vec<NestedRef>,
}
