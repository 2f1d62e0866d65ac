use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::database::{DatabaseBinding, Dialect, DEFAULT_DATABASE_NAME};
use crate::env::{expand_in_value, EnvMode};
use crate::logging::{LogSection, LoggingConfig, DEFAULT_SECTION};

mod unit;
pub use unit::UnitConfig;

/// Environment prefix for overriding app config values, e.g. `IMP__FLASK__DEBUG=true`.
pub const ENV_PREFIX: &str = "IMP__";

/// Default bind address when the settings do not carry `HOST` / `PORT`.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8087;

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Generated on first run. Values may reference environment variables as <NAME>.

[FLASK]
SECRET_KEY = "{secret_key}"
DEBUG = false

[SESSION]

[DATABASE.MAIN]
ENABLED = false
DIALECT = "sqlite"
DATABASE_NAME = "database"
LOCATION = ""
PORT = ""
USERNAME = ""
PASSWORD = ""
"#;

/// Configuration errors. All of them abort composition.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{what} config file not found: {path:?}")]
    NotFound { what: String, path: PathBuf },
    #[error("config file {path:?} must have a .toml or .tml extension")]
    UnsupportedFormat { path: PathBuf },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<figment::Error>,
    },
    #[error("config file {path:?} is missing section {section}")]
    MissingSection { path: PathBuf, section: String },
    #[error("config file {path:?}: {section} is missing required field {field}")]
    MissingField {
        path: PathBuf,
        section: String,
        field: &'static str,
    },
    #[error("config file {path:?}: invalid value for {field}: {reason}")]
    InvalidValue {
        path: PathBuf,
        field: String,
        reason: String,
    },
    #[error("environment variable '{name}' referenced in config is not set")]
    MissingEnv { name: String },
    #[error("I/O error for {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Options shared by app and unit config loading.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Replace unknown `<NAME>` placeholders with `NAME_NOT_FOUND` instead of failing.
    pub ignore_missing_env_variables: bool,
}

impl LoadOptions {
    pub fn lenient() -> Self {
        Self {
            ignore_missing_env_variables: true,
        }
    }

    fn env_mode(&self) -> EnvMode {
        EnvMode::from_ignore_missing(self.ignore_missing_env_variables)
    }
}

/// Root application configuration.
#[derive(Debug, Clone)]
pub struct ImpConfig {
    /// File this config was loaded from.
    pub path: PathBuf,
    /// `FLASK` and `SETTINGS` merged; keys upper-cased.
    pub settings: Map<String, Value>,
    /// `SESSION` seeds, keys as written.
    pub session: Map<String, Value>,
    pub database_main: Option<DatabaseBinding>,
    pub database_binds: Vec<DatabaseBinding>,
    pub logging: LoggingConfig,
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub port: Option<u16>,
    pub verbose: u8,
}

impl ImpConfig {
    /// Load the app config: TOML file, then `IMP__*` environment variables.
    /// A missing file is replaced by a generated default config first.
    pub fn load(path: impl AsRef<Path>, opts: LoadOptions) -> Result<Self, ConfigError> {
        use figment::providers::{Env, Format, Toml};
        use figment::Figment;

        let path = path.as_ref();
        ensure_toml_suffix(path)?;
        if !path.exists() {
            write_default_config(path)?;
        }

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let tree = extract_tree(&figment, path, opts)?;

        Self::from_tree(path, tree)
    }

    /// Parse an already loaded (normalized, placeholder-expanded) config tree.
    fn from_tree(path: &Path, mut tree: Map<String, Value>) -> Result<Self, ConfigError> {
        let flask = take_table(&mut tree, "FLASK", path)?;
        let settings_section = take_table(&mut tree, "SETTINGS", path)?;
        if flask.is_none() && settings_section.is_none() {
            return Err(ConfigError::MissingSection {
                path: path.to_path_buf(),
                section: "FLASK or SETTINGS".to_string(),
            });
        }
        let mut settings = flask.unwrap_or_default();
        settings.extend(settings_section.unwrap_or_default());

        let session = take_table(&mut tree, "SESSION", path)?.unwrap_or_default();

        let extension = settings
            .get("SQLITE_DB_EXTENSION")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut database_main = None;
        let mut database_binds = Vec::new();
        if let Some(database) = take_table(&mut tree, "DATABASE", path)? {
            for (key, value) in database {
                let section = format!("DATABASE.{key}");
                let table = value.as_object().ok_or_else(|| ConfigError::InvalidValue {
                    path: path.to_path_buf(),
                    field: section.clone(),
                    reason: "expected a table".to_string(),
                })?;
                let mut binding = parse_binding(table, &section, &key.to_lowercase(), path)?;
                if let Some(ext) = &extension {
                    binding = binding.default_extension(ext);
                }
                if key == "MAIN" {
                    database_main = Some(binding);
                } else {
                    database_binds.push(binding);
                }
            }
        }

        let logging = match take_table(&mut tree, "LOGGING", path)? {
            Some(table) => parse_logging(table, path)?,
            None => default_logging_config(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            settings,
            session,
            database_main,
            database_binds,
            logging,
        })
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    /// `HOST:PORT` for the server, from settings with defaults.
    pub fn bind_addr(&self) -> String {
        let host = self.setting_str("HOST").unwrap_or(DEFAULT_HOST);
        let port = self
            .setting("PORT")
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(DEFAULT_PORT);
        format!("{host}:{port}")
    }

    /// Render the effective configuration as TOML; passwords are masked.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        let mut root = Map::new();
        root.insert("SETTINGS".into(), Value::Object(strip_nulls(&self.settings)));
        root.insert("SESSION".into(), Value::Object(strip_nulls(&self.session)));

        let mut database = Map::new();
        if let Some(main) = &self.database_main {
            database.insert("MAIN".into(), binding_to_value(main));
        }
        for bind in &self.database_binds {
            let key = bind.key().unwrap_or(bind.name()).to_uppercase();
            database.insert(key, binding_to_value(bind));
        }
        if !database.is_empty() {
            root.insert("DATABASE".into(), Value::Object(database));
        }

        let mut logging = Map::new();
        for (target, section) in &self.logging {
            if let Ok(Value::Object(map)) = serde_json::to_value(section) {
                logging.insert(target.clone(), Value::Object(strip_nulls(&map)));
            }
        }
        root.insert("LOGGING".into(), Value::Object(logging));

        toml::to_string(&Value::Object(root))
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.settings.insert("PORT".into(), Value::from(port));
        }

        let section = self
            .logging
            .entry(DEFAULT_SECTION.to_string())
            .or_default();
        match args.verbose {
            0 => {}
            1 => section.console_level = "debug".to_string(),
            _ => section.console_level = "trace".to_string(),
        }
    }
}

/// Console INFO for everything when the config has no `LOGGING` section.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = LoggingConfig::new();
    logging.insert(DEFAULT_SECTION.to_string(), LogSection::default());
    logging
}

fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    use rand::RngCore;

    let mut secret = [0u8; 24];
    rand::rng().fill_bytes(&mut secret);
    let body = DEFAULT_CONFIG_TEMPLATE.replace("{secret_key}", &hex::encode(secret));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, body).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::warn!(path = %path.display(), "Config file not found, generated a default one");
    Ok(())
}

pub(crate) fn ensure_toml_suffix(path: &Path) -> Result<(), ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") | Some("tml") => Ok(()),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Extract the merged figment as JSON, normalize section keys and expand `<VAR>`s.
pub(crate) fn extract_tree(
    figment: &figment::Figment,
    path: &Path,
    opts: LoadOptions,
) -> Result<Map<String, Value>, ConfigError> {
    let raw: Value = figment.extract().map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    let Value::Object(raw) = raw else {
        return Err(ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: "<root>".to_string(),
            reason: "expected a table".to_string(),
        });
    };

    let mut tree = Value::Object(normalize_root(raw));
    expand_in_value(&mut tree, opts.env_mode())?;
    match tree {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Upper-case section keys. `SESSION` keys keep their case; `LOGGING` target names keep
/// their case while the fields inside them are lower-cased. Tables whose keys collide
/// after normalization are deep-merged, later keys in iteration order winning.
fn normalize_root(raw: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in raw {
        let upper = key.to_uppercase();
        let value = match upper.as_str() {
            "SESSION" | "INIT_SESSION" => value,
            "LOGGING" => normalize_logging(value),
            _ => upper_keys(value),
        };
        merge_into(&mut out, upper, value);
    }
    out
}

fn upper_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                merge_into(&mut out, k.to_uppercase(), upper_keys(v));
            }
            Value::Object(out)
        }
        other => other,
    }
}

fn normalize_logging(value: Value) -> Value {
    let Value::Object(targets) = value else {
        return value;
    };
    let mut out = Map::new();
    for (target, section) in targets {
        let section = match section {
            Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.to_lowercase(), v))
                    .collect(),
            ),
            other => other,
        };
        merge_into(&mut out, target, section);
    }
    Value::Object(out)
}

fn merge_into(map: &mut Map<String, Value>, key: String, value: Value) {
    match (map.get_mut(&key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge_into(existing, k, v);
            }
        }
        (_, value) => {
            map.insert(key, value);
        }
    }
}

pub(crate) fn take_table(
    tree: &mut Map<String, Value>,
    key: &str,
    path: &Path,
) -> Result<Option<Map<String, Value>>, ConfigError> {
    match tree.remove(key) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: key.to_string(),
            reason: format!("expected a table, found {}", type_name(&other)),
        }),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}

/// Lenient boolean: `true/yes/y/1` and `false/no/n/0` (any case), or a real bool.
pub fn cast_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Lenient port: an integer or a numeric string; empty string means 0.
pub fn cast_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) if s.trim().is_empty() => Some(0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn require_bool(
    table: &Map<String, Value>,
    field: &'static str,
    section: &str,
    path: &Path,
) -> Result<bool, ConfigError> {
    let value = table.get(field).ok_or_else(|| ConfigError::MissingField {
        path: path.to_path_buf(),
        section: section.to_string(),
        field,
    })?;
    cast_bool(value).ok_or_else(|| ConfigError::InvalidValue {
        path: path.to_path_buf(),
        field: format!("{section}.{field}"),
        reason: format!("cannot interpret {value} as a boolean"),
    })
}

pub(crate) fn opt_string(
    table: &Map<String, Value>,
    field: &str,
    section: &str,
    path: &Path,
) -> Result<Option<String>, ConfigError> {
    match table.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: format!("{section}.{field}"),
            reason: format!("expected a string, found {}", type_name(other)),
        }),
    }
}

/// Parse one binding table. `ENABLED` and `DIALECT` are required.
pub(crate) fn parse_binding(
    table: &Map<String, Value>,
    section: &str,
    default_key: &str,
    path: &Path,
) -> Result<DatabaseBinding, ConfigError> {
    let enabled = require_bool(table, "ENABLED", section, path)?;
    let dialect_raw =
        opt_string(table, "DIALECT", section, path)?.ok_or_else(|| ConfigError::MissingField {
            path: path.to_path_buf(),
            section: section.to_string(),
            field: "DIALECT",
        })?;
    let dialect: Dialect = dialect_raw.parse().map_err(|e: crate::database::DialectError| {
        ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: format!("{section}.DIALECT"),
            reason: e.to_string(),
        }
    })?;

    let name = opt_string(table, "DATABASE_NAME", section, path)?
        .or(opt_string(table, "NAME", section, path)?)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string());
    let host = opt_string(table, "LOCATION", section, path)?
        .or(opt_string(table, "HOST", section, path)?)
        .unwrap_or_default();
    let port = match table.get("PORT") {
        None | Some(Value::Null) => 0,
        Some(v) => cast_port(v).ok_or_else(|| ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: format!("{section}.PORT"),
            reason: format!("cannot interpret {v} as a port"),
        })?,
    };
    let username = opt_string(table, "USERNAME", section, path)?.unwrap_or_default();
    let password = opt_string(table, "PASSWORD", section, path)?.unwrap_or_default();
    let bind_key = opt_string(table, "BIND_KEY", section, path)?
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| default_key.to_string());

    let mut binding = DatabaseBinding::with_dialect(dialect, name)
        .enabled(enabled)
        .host(host)
        .port(port)
        .credentials(username, password);
    if !bind_key.is_empty() {
        binding = binding.bind_key(bind_key);
    }
    if let Some(ext) = opt_string(table, "SQLITE_DB_EXTENSION", section, path)? {
        binding = binding.sqlite_extension(ext);
    }
    Ok(binding)
}

fn parse_logging(table: Map<String, Value>, path: &Path) -> Result<LoggingConfig, ConfigError> {
    let mut logging = LoggingConfig::new();
    for (target, section) in table {
        let parsed: LogSection =
            serde_json::from_value(section).map_err(|e| ConfigError::InvalidValue {
                path: path.to_path_buf(),
                field: format!("LOGGING.{target}"),
                reason: e.to_string(),
            })?;
        logging.insert(target, parsed);
    }
    Ok(logging)
}

fn binding_to_value(binding: &DatabaseBinding) -> Value {
    let mut map = Map::new();
    map.insert("ENABLED".into(), Value::from(binding.is_enabled()));
    map.insert("DIALECT".into(), Value::from(binding.dialect().as_str()));
    map.insert("DATABASE_NAME".into(), Value::from(binding.name()));
    if let Some(key) = binding.key() {
        map.insert("BIND_KEY".into(), Value::from(key));
    }
    if !binding.dialect().is_file_based() {
        map.insert("LOCATION".into(), Value::from(binding.host_name()));
        map.insert("PORT".into(), Value::from(binding.port_number()));
        map.insert("USERNAME".into(), Value::from(binding.username()));
        let masked = if binding.password().is_empty() { "" } else { "***" };
        map.insert("PASSWORD".into(), Value::from(masked));
    } else {
        map.insert("SQLITE_DB_EXTENSION".into(), Value::from(binding.extension()));
    }
    Value::Object(map)
}

fn strip_nulls(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::Object(inner) => (k.clone(), Value::Object(strip_nulls(inner))),
            other => (k.clone(), other.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests;
