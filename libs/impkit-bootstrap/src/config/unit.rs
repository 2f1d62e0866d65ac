use serde_json::{Map, Value};
use std::path::Path;

use super::{
    ensure_toml_suffix, extract_tree, opt_string, parse_binding, require_bool, take_table,
    ConfigError, LoadOptions,
};
use crate::database::DatabaseBinding;

/// Activation settings of one unit, read from the unit's own config file or
/// built in code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitConfig {
    pub enabled: bool,
    /// Derived from the unit folder when absent.
    pub url_prefix: Option<String>,
    pub subdomain: Option<String>,
    pub static_folder: Option<String>,
    pub template_folder: Option<String>,
    pub static_url_path: Option<String>,
    pub cli_group: Option<String>,
    pub init_session: Map<String, Value>,
    pub database_bindings: Vec<DatabaseBinding>,
}

impl UnitConfig {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = Some(prefix.into());
        self
    }

    pub fn static_folder(mut self, folder: impl Into<String>) -> Self {
        self.static_folder = Some(folder.into());
        self
    }

    pub fn template_folder(mut self, folder: impl Into<String>) -> Self {
        self.template_folder = Some(folder.into());
        self
    }

    pub fn session_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.init_session.insert(key.into(), value.into());
        self
    }

    pub fn database_binding(mut self, binding: DatabaseBinding) -> Self {
        self.database_bindings.push(binding);
        self
    }

    /// Load `path` for the unit named `unit_name`.
    ///
    /// The file must exist. A missing top-level `ENABLED` leaves the unit disabled. Single `DATABASE_BIND`
    /// tables default their bind key to the unit name, `DATABASE_BINDS.<KEY>` tables
    /// to the lower-cased key.
    pub fn load(
        unit_name: &str,
        path: impl AsRef<Path>,
        opts: LoadOptions,
    ) -> Result<Self, ConfigError> {
        use figment::providers::{Format, Toml};
        use figment::Figment;

        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                what: format!("unit '{unit_name}'"),
                path: path.to_path_buf(),
            });
        }
        ensure_toml_suffix(path)?;

        let figment = Figment::new().merge(Toml::file(path));
        let mut tree = extract_tree(&figment, path, opts)?;

        let enabled = match tree.get("ENABLED") {
            Some(_) => require_bool(&tree, "ENABLED", "<root>", path)?,
            None => false,
        };
        let settings = take_table(&mut tree, "SETTINGS", path)?.unwrap_or_default();
        let setting = |key: &str| opt_string(&settings, key, "SETTINGS", path);

        let init_session = match take_table(&mut tree, "SESSION", path)? {
            Some(session) => session,
            None => take_table(&mut tree, "INIT_SESSION", path)?.unwrap_or_default(),
        };

        let mut database_bindings = Vec::new();
        if let Some(single) = take_table(&mut tree, "DATABASE_BIND", path)? {
            database_bindings.push(parse_binding(&single, "DATABASE_BIND", unit_name, path)?);
        }
        if let Some(binds) = take_table(&mut tree, "DATABASE_BINDS", path)? {
            for (key, value) in binds {
                let section = format!("DATABASE_BINDS.{key}");
                let Value::Object(table) = value else {
                    return Err(ConfigError::InvalidValue {
                        path: path.to_path_buf(),
                        field: section,
                        reason: "expected a table".to_string(),
                    });
                };
                database_bindings.push(parse_binding(
                    &table,
                    &section,
                    &key.to_lowercase(),
                    path,
                )?);
            }
        }

        Ok(Self {
            enabled,
            url_prefix: setting("URL_PREFIX")?.filter(|p| !p.is_empty()),
            subdomain: setting("SUBDOMAIN")?.filter(|s| !s.is_empty()),
            static_folder: setting("STATIC_FOLDER")?.filter(|s| !s.is_empty()),
            template_folder: setting("TEMPLATE_FOLDER")?.filter(|s| !s.is_empty()),
            static_url_path: setting("STATIC_URL_PATH")?.filter(|s| !s.is_empty()),
            cli_group: setting("CLI_GROUP")?.filter(|s| !s.is_empty()),
            init_session,
            database_bindings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Dialect;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_settings_session_and_single_bind() {
        let tmp = tempdir().unwrap();
        let path = write(
            tmp.path(),
            r#"
ENABLED = "yes"

[SETTINGS]
URL_PREFIX = "/shop"
STATIC_FOLDER = "static"
TEMPLATE_FOLDER = ""

[SESSION]
cartItems = 0

[DATABASE_BIND]
ENABLED = true
DIALECT = "sqlite"
DATABASE_NAME = "shop"
"#,
        );

        let cfg = UnitConfig::load("shop", &path, LoadOptions::default()).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.url_prefix.as_deref(), Some("/shop"));
        assert_eq!(cfg.static_folder.as_deref(), Some("static"));
        assert_eq!(cfg.template_folder, None);
        assert_eq!(cfg.init_session["cartItems"], 0);
        assert_eq!(cfg.database_bindings.len(), 1);
        let bind = &cfg.database_bindings[0];
        assert_eq!(bind.key(), Some("shop"));
        assert_eq!(bind.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn multiple_binds_use_lowercased_keys() {
        let tmp = tempdir().unwrap();
        let path = write(
            tmp.path(),
            r#"
ENABLED = 1

[DATABASE_BINDS.REPORTS]
ENABLED = "no"
DIALECT = "postgresql"
DATABASE_NAME = "reports"

[DATABASE_BINDS.CACHE]
ENABLED = "y"
DIALECT = "sqlite"
BIND_KEY = "hot_cache"
"#,
        );
        let cfg = UnitConfig::load("x", &path, LoadOptions::default()).unwrap();
        let keys: Vec<_> = cfg.database_bindings.iter().map(|b| b.key()).collect();
        assert_eq!(keys, vec![Some("hot_cache"), Some("reports")]);
        assert!(!cfg.database_bindings[1].is_enabled());
    }

    #[test]
    fn missing_file_names_the_unit() {
        let tmp = tempdir().unwrap();
        match UnitConfig::load("ghost", tmp.path().join("config.toml"), LoadOptions::default()) {
            Err(ConfigError::NotFound { what, .. }) => assert!(what.contains("ghost")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_enabled_means_disabled() {
        let tmp = tempdir().unwrap();
        let path = write(tmp.path(), "[SETTINGS]\nURL_PREFIX = \"/x\"\n");
        let cfg = UnitConfig::load("x", &path, LoadOptions::default()).unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.url_prefix.as_deref(), Some("/x"));
    }

    #[test]
    fn unreadable_enabled_is_fatal() {
        let tmp = tempdir().unwrap();
        let path = write(tmp.path(), "ENABLED = \"maybe\"\n");
        assert!(matches!(
            UnitConfig::load("x", &path, LoadOptions::default()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn unknown_dialect_is_fatal() {
        let tmp = tempdir().unwrap();
        let path = write(
            tmp.path(),
            "ENABLED = true\n[DATABASE_BIND]\nENABLED = true\nDIALECT = \"mongodb\"\n",
        );
        match UnitConfig::load("x", &path, LoadOptions::default()) {
            Err(ConfigError::InvalidValue { reason, .. }) => {
                assert!(reason.contains("mongodb"));
                assert!(reason.contains("postgresql"));
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn bind_without_dialect_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = write(tmp.path(), "ENABLED = true\n[DATABASE_BIND]\nENABLED = true\n");
        assert!(matches!(
            UnitConfig::load("x", &path, LoadOptions::default()),
            Err(ConfigError::MissingField { field: "DIALECT", .. })
        ));
    }

    #[test]
    fn yaml_suffix_is_unsupported() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "ENABLED: true").unwrap();
        assert!(matches!(
            UnitConfig::load("x", &path, LoadOptions::default()),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }
}
