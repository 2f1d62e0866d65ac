//! Model classes and the name → class registry filled while units activate.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::RegistryError;

/// Implemented by types the persistence layer maps to tables.
///
/// Types without a table (mixins, abstract bases) keep the default `TABLE_NAME` of
/// `None`; the registry ignores them.
pub trait Model: 'static {
    const NAME: &'static str;
    const TABLE_NAME: Option<&'static str> = None;
}

/// Type-erased handle to a model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelClass {
    name: &'static str,
    table_name: Option<&'static str>,
    type_id: TypeId,
    location: Option<PathBuf>,
}

impl ModelClass {
    pub fn of<T: Model>() -> Self {
        Self {
            name: T::NAME,
            table_name: T::TABLE_NAME,
            type_id: TypeId::of::<T>(),
            location: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table_name(&self) -> Option<&'static str> {
        self.table_name
    }

    pub fn has_table(&self) -> bool {
        self.table_name.is_some()
    }

    pub fn is<T: Model>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Source file the class was imported from.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub(crate) fn located_at(mut self, path: &Path) -> Self {
        self.location = Some(path.to_path_buf());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub location: Option<PathBuf>,
    pub table_name: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, ModelClass>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `class` under its name. A later class with the same name replaces the
    /// earlier one.
    pub fn add(&mut self, class: ModelClass) {
        if let Some(previous) = self.entries.get(class.name) {
            tracing::debug!(
                model = class.name,
                previous = ?previous.location(),
                replacement = ?class.location(),
                "Model name registered again, replacing"
            );
        }
        self.entries.insert(class.name.to_string(), class);
    }

    pub fn get(&self, name: &str) -> Result<&ModelClass, RegistryError> {
        self.entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModel {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn assert_exists(&self, name: &str) -> Result<(), RegistryError> {
        self.get(name).map(|_| ())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Sorted names of every registered class.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelClass> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn meta(&self, name: &str) -> Result<ModelMeta, RegistryError> {
        meta_of(self.get(name)?)
    }
}

/// Location and table of a class; fails for classes without a table.
pub fn meta_of(class: &ModelClass) -> Result<ModelMeta, RegistryError> {
    let table_name = class.table_name.ok_or_else(|| RegistryError::NotAModel {
        name: class.name.to_string(),
    })?;
    Ok(ModelMeta {
        location: class.location.clone(),
        table_name,
    })
}

static GLOBAL: OnceLock<ModelRegistry> = OnceLock::new();

/// Publish the registry process-wide once composition is done. Reserved for the
/// outermost entry point; a second call fails.
pub fn install_global(registry: ModelRegistry) -> Result<&'static ModelRegistry, RegistryError> {
    GLOBAL
        .set(registry)
        .map_err(|_| RegistryError::GlobalAlreadyInstalled)?;
    GLOBAL.get().ok_or(RegistryError::GlobalAlreadyInstalled)
}

/// The registry published by [`install_global`], for code that runs after composition.
pub fn global() -> Option<&'static ModelRegistry> {
    GLOBAL.get()
}
