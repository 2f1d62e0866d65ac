//! Loads resource files from the catalog and runs their factories.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::catalog::{ResourceModule, SourceCatalog};
use crate::error::{ImpError, ImportError};
use crate::host::{AppHost, UnitMount};

/// Something a resource factory can be called with.
pub trait FactoryTarget {
    /// Run the factory called `name`, if `module` has one for this target.
    fn invoke(&mut self, module: &ResourceModule, name: &str) -> Option<anyhow::Result<()>>;
}

/// App-level resources: factories receive the application host.
pub struct AppTarget<'a>(pub &'a mut dyn AppHost);

impl FactoryTarget for AppTarget<'_> {
    fn invoke(&mut self, module: &ResourceModule, name: &str) -> Option<anyhow::Result<()>> {
        module.get_app_factory(name).map(|f| f(&mut *self.0))
    }
}

impl FactoryTarget for UnitMount {
    fn invoke(&mut self, module: &ResourceModule, name: &str) -> Option<anyhow::Result<()>> {
        module.get_unit_factory(name).map(|f| f(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Names of the factories that ran.
    Activated(Vec<String>),
    /// Nothing matched; the file was dropped from the loaded set.
    Evicted,
}

/// Tracks which catalog entries have been loaded.
#[derive(Debug, Default)]
pub struct Importer {
    loaded: BTreeSet<String>,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded.contains(key)
    }

    /// Resolve `key` and run its load hook the first time it is seen.
    pub fn load(
        &mut self,
        catalog: &SourceCatalog,
        key: &str,
    ) -> Result<Arc<ResourceModule>, ImportError> {
        let module = catalog
            .get_resource(key)
            .ok_or_else(|| ImportError::NotLinked {
                key: key.to_string(),
            })?;

        if self.loaded.insert(key.to_string()) {
            if let Some(hook) = module.load_hook() {
                if let Err(source) = hook() {
                    self.loaded.remove(key);
                    return Err(ImportError::LoadFailed {
                        key: key.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(module)
    }

    /// Load `key`, then call each factory in `factory_names` that the file exposes for
    /// `target`. Load problems surface as [`ImpError::Import`]; a failing factory is
    /// [`ImpError::Factory`].
    pub fn import_and_activate(
        &mut self,
        catalog: &SourceCatalog,
        key: &str,
        factory_names: &[String],
        target: &mut dyn FactoryTarget,
    ) -> Result<Activation, ImpError> {
        let module = self.load(catalog, key)?;

        let mut ran = Vec::new();
        for name in factory_names {
            if let Some(result) = target.invoke(&module, name) {
                result.map_err(|source| ImpError::Factory {
                    factory: name.clone(),
                    key: key.to_string(),
                    source,
                })?;
                ran.push(name.clone());
            }
        }

        if ran.is_empty() {
            self.loaded.remove(key);
            tracing::debug!(key, "No factory matched, evicted from loaded set");
            return Ok(Activation::Evicted);
        }
        Ok(Activation::Activated(ran))
    }
}
