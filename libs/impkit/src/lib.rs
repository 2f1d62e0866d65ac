//! # impkit - filesystem-driven composition engine
//!
//! Assembles a modular web application at startup from a directory tree: units
//! (blueprints) living in their own folders, each with a `config.toml`, optional
//! resources, models, database bindings and nested units.
//!
//! Source files cannot be loaded at runtime, so every discoverable file or folder is
//! linked to code through a [`SourceCatalog`], either explicitly or through
//! `inventory::submit!` of a [`Registrator`].
//!
//! ```rust,ignore
//! use impkit::{inventory, Registrator, ResourceModule, SourceCatalog, UnitSite, Unit};
//!
//! fn www(site: UnitSite) -> anyhow::Result<Unit> {
//!     let mut unit = site.unit_from_config()?;
//!     unit.import_resources("routes", &[], None)
//!         .import_nested_units("children");
//!     Ok(unit)
//! }
//!
//! fn register(catalog: &mut SourceCatalog) {
//!     catalog.unit("blueprints/www", www);
//! }
//!
//! inventory::submit! { Registrator(register) }
//! ```
//!
//! Then, with some [`AppHost`]:
//!
//! ```rust,ignore
//! let mut imp = Imp::new(app_root, SourceCatalog::discover());
//! imp.init(&mut host, ImpOptions::default())?;
//! imp.import_app_resources(&mut host, None, &[], None)?;
//! imp.import_blueprints(&mut host, "blueprints")?;
//! imp.import_models("models")?;
//! imp.init_database(&mut orm)?;
//! ```

pub use anyhow::Result;

// Re-export inventory for unit crates
pub use inventory;

pub mod assembly;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod host;
pub mod importer;
pub mod model;
pub mod naming;
pub mod scope;
pub mod unit;

/// Factory name used when a caller passes none.
pub const DEFAULT_FACTORY: &str = "include";

pub use assembly::{AppAssembly, MountedUnit};
pub use catalog::{
    AppFactory, LoadHook, ModelSource, Registrator, ResourceModule, SourceCatalog, UnitEntry,
    UnitFactory,
};
pub use engine::{Imp, ImpOptions};
pub use error::{ImpError, ImportError, RegistryError};
pub use host::{AppHost, OrmHost, UnitMount};
pub use model::{Model, ModelClass, ModelMeta, ModelRegistry};
pub use naming::{class_field, slug, snake};
pub use scope::{select_files, ResourceScope, ScopeRule};
pub use unit::{Unit, UnitSite};

pub use impkit_bootstrap::{DatabaseBinding, Dialect, LoadOptions, UnitConfig};
