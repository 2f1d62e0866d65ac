//! The composition engine.
//!
//! Composition is one synchronous pass at startup:
//! 1. [`Imp::init`] loads the app config, resolves the instance folder and seeds the
//!    assembly (settings, session defaults, main URI, app-level binds).
//! 2. [`Imp::import_app_resources`], [`Imp::import_blueprints`] and friends discover
//!    units and activate them. A disabled unit stops there: its pending work and its
//!    children are never touched.
//! 3. [`Imp::init_database`] hands the merged bind table to the ORM.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use impkit_bootstrap::paths::resolve_instance_dir;
use impkit_bootstrap::{
    build_binds_table, build_uri, redact_uri, DatabaseBinding, ImpConfig, LoadOptions,
};
use serde_json::Value;

use crate::assembly::{AppAssembly, MountedUnit};
use crate::catalog::{clean_path, key_for, SourceCatalog};
use crate::error::{ImpError, RegistryError};
use crate::host::{AppHost, OrmHost, UnitMount};
use crate::importer::{Activation, AppTarget, FactoryTarget, Importer};
use crate::model::{meta_of, ModelClass, ModelMeta, ModelRegistry};
use crate::scope::{select_files, source_files, subfolders, ResourceScope};
use crate::unit::{NestedRef, Unit, UnitSite};

/// Extension slot the engine claims on the application host.
pub const EXTENSION_NAME: &str = "imp";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_RESOURCES_FOLDER: &str = "resources";
/// Fallback bind key for app-level bindings; each one normally carries its own.
const APP_BIND_KEY: &str = "database";

#[derive(Debug, Clone, Default)]
pub struct ImpOptions {
    /// App config file; relative paths resolve against the app root.
    /// Defaults to `<root>/config.toml`.
    pub config_file: Option<PathBuf>,
    pub load: LoadOptions,
    /// Overrides `SETTINGS.INSTANCE_PATH`.
    pub instance_path: Option<String>,
}

pub struct Imp {
    root: PathBuf,
    catalog: SourceCatalog,
    importer: Importer,
    assembly: AppAssembly,
    config: Option<ImpConfig>,
    load: LoadOptions,
    instance_path: PathBuf,
    registered: BTreeSet<PathBuf>,
    resources_imported: bool,
    orm_initialized: bool,
}

impl std::fmt::Debug for Imp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Imp")
            .field("root", &self.root)
            .field("initialized", &self.config.is_some())
            .field("instance_path", &self.instance_path)
            .field("registered", &self.registered.len())
            .finish()
    }
}

impl Imp {
    pub fn new(root: impl Into<PathBuf>, catalog: SourceCatalog) -> Self {
        let root = root.into();
        let instance_path = root.join(impkit_bootstrap::paths::DEFAULT_INSTANCE_SUBDIR);
        Self {
            root,
            catalog,
            importer: Importer::new(),
            assembly: AppAssembly::new(),
            config: None,
            load: LoadOptions::default(),
            instance_path,
            registered: BTreeSet::new(),
            resources_imported: false,
            orm_initialized: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance_path(&self) -> &Path {
        &self.instance_path
    }

    pub fn config(&self) -> Option<&ImpConfig> {
        self.config.as_ref()
    }

    pub fn assembly(&self) -> &AppAssembly {
        &self.assembly
    }

    pub fn into_assembly(self) -> AppAssembly {
        self.assembly
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.assembly.models
    }

    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            clean_path(path)
        } else {
            clean_path(&self.root.join(path))
        }
    }

    fn load_options(&self) -> Result<LoadOptions, ImpError> {
        match self.config {
            Some(_) => Ok(self.load),
            None => Err(ImpError::NotInitialized),
        }
    }

    fn require_folder(path: &Path) -> Result<(), ImpError> {
        if !path.exists() {
            return Err(ImpError::MissingFolder {
                path: path.to_path_buf(),
            });
        }
        if !path.is_dir() {
            return Err(ImpError::NotAFolder {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Attach the engine to `host` and load the app config.
    pub fn init(&mut self, host: &mut dyn AppHost, opts: ImpOptions) -> Result<(), ImpError> {
        if self.config.is_some() || !host.claim_extension(EXTENSION_NAME) {
            return Err(ImpError::AlreadyInitialized);
        }

        let config_path = self.resolve(
            opts.config_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        );
        let config = ImpConfig::load(&config_path, opts.load)?;

        let configured_instance = opts
            .instance_path
            .or_else(|| config.setting_str("INSTANCE_PATH").map(str::to_string));
        self.instance_path = resolve_instance_dir(configured_instance, &self.root, true)?;

        self.assembly.settings = config.settings.clone();
        self.assembly.merge_session(&config.session);

        if let Some(uri) = config.setting_str("DATABASE_URI") {
            self.assembly.set_main_uri(uri.to_string());
        }
        if let Some(Value::Object(preset)) = config.setting("DATABASE_BINDS") {
            let preset: BTreeMap<String, String> = preset
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|uri| (k.to_lowercase(), uri.to_string())))
                .collect();
            self.assembly.preset_binds(preset);
        }

        let main = config
            .database_main
            .clone()
            .filter(DatabaseBinding::is_enabled);
        let app_binds: Vec<DatabaseBinding> = config
            .database_binds
            .iter()
            .filter(|b| b.is_enabled())
            .cloned()
            .collect();
        self.config = Some(config);
        self.load = opts.load;

        if let Some(main) = main {
            let uri = self.build_binding_uri(&main)?;
            if self.assembly.set_main_uri(uri.clone()) {
                tracing::info!(uri = %redact_uri(&uri), "Main database configured");
            } else {
                tracing::debug!("Main database URI preset by settings, keeping it");
            }
        }
        self.store_binds(&app_binds, APP_BIND_KEY)?;

        tracing::info!(
            root = %self.root.display(),
            config = %config_path.display(),
            instance = %self.instance_path.display(),
            "Imp initialized"
        );
        Ok(())
    }

    fn with_sqlite_extension(&self, binding: &DatabaseBinding) -> DatabaseBinding {
        match self
            .config
            .as_ref()
            .and_then(|c| c.setting_str("SQLITE_DB_EXTENSION"))
        {
            Some(ext) => binding.clone().default_extension(ext),
            None => binding.clone(),
        }
    }

    fn build_binding_uri(&self, binding: &DatabaseBinding) -> Result<String, ImpError> {
        let binding = self.with_sqlite_extension(binding);
        build_uri(&binding, &self.instance_path).map_err(|source| ImpError::Uri {
            binding: binding.label().to_string(),
            source,
        })
    }

    /// Add the enabled `bindings` to the bind table. Bindings without a key use
    /// `default_key`; keys preset by settings are kept.
    fn store_binds(&mut self, bindings: &[DatabaseBinding], default_key: &str) -> Result<(), ImpError> {
        let bindings: Vec<DatabaseBinding> = bindings
            .iter()
            .map(|b| self.with_sqlite_extension(b))
            .collect();
        let table = build_binds_table(&bindings, &self.instance_path, default_key).map_err(
            |source| ImpError::Uri {
                binding: default_key.to_string(),
                source,
            },
        )?;
        for (key, uri) in table {
            let redacted = redact_uri(&uri);
            if self.assembly.insert_bind(key.clone(), uri) {
                tracing::info!(bind_key = %key, uri = %redacted, "Database bind added");
            } else {
                tracing::debug!(bind_key = %key, "Bind preset by settings, keeping it");
            }
        }
        Ok(())
    }

    /// Import app-level resources once. `folder` defaults to `resources`, `factories`
    /// to `["include"]`, `scope` to `{"*": ["*"]}`. `static` and `templates` folders
    /// inside it become the app's static and template folders.
    pub fn import_app_resources(
        &mut self,
        host: &mut dyn AppHost,
        folder: Option<&Path>,
        factories: &[&str],
        scope: Option<ResourceScope>,
    ) -> Result<(), ImpError> {
        self.load_options()?;
        if self.resources_imported {
            return Err(ImpError::ResourcesAlreadyImported);
        }
        let folder = self.resolve(folder.unwrap_or(Path::new(DEFAULT_RESOURCES_FOLDER)));
        Self::require_folder(&folder)?;
        self.resources_imported = true;

        let static_folder = Some(folder.join("static")).filter(|p| p.is_dir());
        let template_folder = Some(folder.join("templates")).filter(|p| p.is_dir());
        host.set_app_folders(static_folder.as_deref(), template_folder.as_deref());
        self.assembly.static_folder = static_folder;
        self.assembly.template_folder = template_folder;

        let factories = factory_list(factories);
        let scope = scope.unwrap_or_default();
        let files = select_files(&folder, &scope).map_err(|source| ImpError::Io {
            path: folder.clone(),
            source,
        })?;

        let mut target = AppTarget(host);
        for file in files {
            self.import_resource_file(&file, &factories, &mut target)?;
        }
        Ok(())
    }

    fn import_resource_file(
        &mut self,
        path: &Path,
        factories: &[String],
        target: &mut dyn FactoryTarget,
    ) -> Result<(), ImpError> {
        let Some(key) = key_for(&self.root, path) else {
            tracing::warn!(path = %path.display(), "Resource outside the app root, skipping");
            return Ok(());
        };
        match self
            .importer
            .import_and_activate(&self.catalog, &key, factories, target)
        {
            Ok(Activation::Activated(ran)) => {
                tracing::debug!(key = %key, factories = ?ran, "Resource imported");
                Ok(())
            }
            Ok(Activation::Evicted) => Ok(()),
            Err(ImpError::Import(e)) => {
                tracing::warn!(key = %key, error = ?anyhow::Error::from(e), "Skipping resource file");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Import and register the unit in `folder`.
    pub fn import_blueprint(
        &mut self,
        host: &mut dyn AppHost,
        folder: impl AsRef<Path>,
    ) -> Result<(), ImpError> {
        let location = self.resolve(folder);
        Self::require_folder(&location)?;
        let unit = self
            .build_unit(&location)?
            .ok_or(ImpError::NotAUnit { path: location })?;
        self.activate(host, unit, None)
    }

    /// Import and register every unit folder directly inside `folder`, in name order.
    /// Folders without a linked unit entry are skipped.
    pub fn import_blueprints(
        &mut self,
        host: &mut dyn AppHost,
        folder: impl AsRef<Path>,
    ) -> Result<(), ImpError> {
        let folder = self.resolve(folder);
        Self::require_folder(&folder)?;
        for dir in subfolders(&folder).map_err(|source| ImpError::Io {
            path: folder.clone(),
            source,
        })? {
            match self.build_unit(&dir)? {
                Some(unit) => self.activate(host, unit, None)?,
                None => {
                    tracing::debug!(folder = %dir.display(), "No unit entry linked, skipping")
                }
            }
        }
        Ok(())
    }

    /// Register a unit built in code.
    pub fn register_unit(&mut self, host: &mut dyn AppHost, unit: Unit) -> Result<(), ImpError> {
        self.load_options()?;
        self.activate(host, unit, None)
    }

    /// Call the unit entry linked to `location`, if any.
    fn build_unit(&self, location: &Path) -> Result<Option<Unit>, ImpError> {
        let opts = self.load_options()?;
        let Some(entry) = key_for(&self.root, location).and_then(|k| self.catalog.get_unit(&k))
        else {
            return Ok(None);
        };
        let site = UnitSite::new(location, opts);
        entry(site)
            .map(Some)
            .map_err(|source| ImpError::UnitEntry {
                path: location.to_path_buf(),
                source,
            })
    }

    fn activate(
        &mut self,
        host: &mut dyn AppHost,
        unit: Unit,
        parent: Option<&UnitMount>,
    ) -> Result<(), ImpError> {
        let url_prefix = unit.url_prefix();
        let parts = unit.into_parts();

        if !self.registered.insert(parts.location.clone()) {
            return Err(ImpError::AlreadyRegistered {
                name: parts.name,
                path: parts.location,
            });
        }
        if !parts.config.enabled {
            tracing::debug!(unit = %parts.name, "Unit disabled, skipping");
            return Ok(());
        }

        self.store_binds(&parts.pending_binds, &parts.name)?;

        for path in &parts.pending_models {
            if !path.exists() {
                tracing::debug!(unit = %parts.name, path = %path.display(), "Model path missing, skipping");
                continue;
            }
            self.load_models(path)?;
        }

        let mut mount = UnitMount::new(parts.name.clone(), parts.location.clone(), &url_prefix);
        if let Some(parent) = parent {
            mount = mount.under(parent);
        }
        mount.subdomain = parts.config.subdomain.clone();
        mount.static_url_path = parts.config.static_url_path.clone();
        mount.cli_group = parts.config.cli_group.clone();
        mount.static_folder =
            unit_folder(&parts.location, parts.config.static_folder.as_deref(), "static");
        mount.template_folder = unit_folder(
            &parts.location,
            parts.config.template_folder.as_deref(),
            "templates",
        );

        for res in &parts.pending_resources {
            if !res.folder.is_dir() {
                tracing::warn!(unit = %parts.name, folder = %res.folder.display(), "Resource folder missing, skipping");
                continue;
            }
            let files = select_files(&res.folder, &res.scope).map_err(|source| ImpError::Io {
                path: res.folder.clone(),
                source,
            })?;
            for file in files {
                self.import_resource_file(&file, &res.factories, &mut mount)?;
            }
        }

        let mut children = Vec::new();
        for child in parts.children {
            match child {
                NestedRef::Folder(path) => {
                    Self::require_folder(&path)?;
                    let unit = self
                        .build_unit(&path)?
                        .ok_or(ImpError::NotAUnit { path })?;
                    children.push(unit);
                }
                NestedRef::FolderScan(dir) => {
                    if !dir.is_dir() {
                        tracing::debug!(unit = %parts.name, folder = %dir.display(), "Nested unit folder missing");
                        continue;
                    }
                    let found = subfolders(&dir).map_err(|source| ImpError::Io {
                        path: dir.clone(),
                        source,
                    })?;
                    for sub in found {
                        if let Some(unit) = self.build_unit(&sub)? {
                            children.push(unit);
                        }
                    }
                }
                NestedRef::Unit(unit) => children.push(*unit),
            }
        }
        children.sort_by(|a, b| a.name().cmp(b.name()));
        for child in children {
            self.activate(host, child, Some(&mount))?;
        }

        self.assembly.merge_session(&parts.config.init_session);

        self.assembly.mounted.push(MountedUnit {
            name: mount.name.clone(),
            mount_path: mount.mount_path.clone(),
            parent: parent.map(|p| p.name.clone()),
        });
        tracing::info!(unit = %mount.name, mount_path = %mount.mount_path, "Unit activated");
        host.register_unit(mount, parent)
            .map_err(|source| ImpError::Host { source })
    }

    /// Import model classes from a file or from every source file in a folder.
    pub fn import_models(&mut self, file_or_folder: impl AsRef<Path>) -> Result<usize, ImpError> {
        let path = self.resolve(file_or_folder);
        if !path.exists() {
            return Err(ImpError::MissingFolder { path });
        }
        self.load_models(&path)
    }

    fn load_models(&mut self, path: &Path) -> Result<usize, ImpError> {
        let files = if path.is_dir() {
            source_files(path).map_err(|source| ImpError::Io {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            vec![path.to_path_buf()]
        };

        let mut added = 0;
        for file in files {
            let key = key_for(&self.root, &file).ok_or_else(|| ImpError::ModelImport {
                path: file.clone(),
                reason: "outside the app root".to_string(),
            })?;
            let source = self
                .catalog
                .get_models(&key)
                .ok_or_else(|| ImpError::ModelImport {
                    path: file.clone(),
                    reason: format!("no model source linked for '{key}'"),
                })?;
            for class in source().into_iter().filter(ModelClass::has_table) {
                tracing::debug!(model = class.name(), key = %key, "Model registered");
                self.assembly.models.add(class.located_at(&file));
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn model(&self, name: &str) -> Result<&ModelClass, RegistryError> {
        self.assembly.models.get(name)
    }

    pub fn model_meta(&self, name: &str) -> Result<ModelMeta, RegistryError> {
        meta_of(self.model(name)?)
    }

    /// Hand the main URI and merged binds to the ORM. Allowed once.
    pub fn init_database(&mut self, orm: &mut dyn OrmHost) -> Result<(), ImpError> {
        self.load_options()?;
        if self.orm_initialized {
            return Err(ImpError::OrmAlreadyInitialized);
        }
        orm.init_database(self.assembly.main_uri(), self.assembly.binds())
            .map_err(|source| ImpError::Host { source })?;
        self.orm_initialized = true;
        tracing::info!(
            main = ?self.assembly.main_uri().map(redact_uri),
            binds = ?self.assembly.binds().keys().collect::<Vec<_>>(),
            "Database initialized"
        );
        Ok(())
    }
}

fn factory_list(factories: &[&str]) -> Vec<String> {
    if factories.is_empty() {
        vec![crate::DEFAULT_FACTORY.to_string()]
    } else {
        factories.iter().map(|f| f.to_string()).collect()
    }
}

/// Configured folder relative to the unit, or `default` when it exists.
fn unit_folder(location: &Path, configured: Option<&str>, default: &str) -> Option<PathBuf> {
    match configured {
        Some(folder) => Some(location.join(folder)),
        None => Some(location.join(default)).filter(|p| p.is_dir()),
    }
}
