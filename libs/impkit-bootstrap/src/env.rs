//! `<NAME>` placeholder substitution for configuration values.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::config::ConfigError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>").unwrap()
});

/// Suffix appended to the variable name when a lenient lookup misses.
pub const NOT_FOUND_SUFFIX: &str = "_NOT_FOUND";

/// How missing variables are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvMode {
    /// A missing variable is a configuration error.
    #[default]
    Strict,
    /// A missing variable becomes `<NAME>_NOT_FOUND`.
    Lenient,
}

impl EnvMode {
    pub fn from_ignore_missing(ignore_missing_env_variables: bool) -> Self {
        if ignore_missing_env_variables {
            EnvMode::Lenient
        } else {
            EnvMode::Strict
        }
    }
}

fn lookup_process_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .or_else(|| std::env::var(name.to_uppercase()).ok())
}

/// Replace every `<NAME>` in `input` with the value of the environment variable.
pub fn expand_placeholders(input: &str, mode: EnvMode) -> Result<String, ConfigError> {
    expand_with(input, mode, lookup_process_env)
}

/// Same as [`expand_placeholders`] with an explicit lookup function.
pub fn expand_with<F>(input: &str, mode: EnvMode, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains('<') {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        out.push_str(&input[last..whole.start()]);
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => match mode {
                EnvMode::Strict => {
                    return Err(ConfigError::MissingEnv {
                        name: name.to_string(),
                    })
                }
                EnvMode::Lenient => {
                    tracing::warn!(variable = %name, "Environment variable not found");
                    out.push_str(name);
                    out.push_str(NOT_FOUND_SUFFIX);
                }
            },
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Walk a JSON tree and expand placeholders in every string leaf.
pub fn expand_in_value(value: &mut Value, mode: EnvMode) -> Result<(), ConfigError> {
    expand_in_value_with(value, mode, &lookup_process_env)
}

pub fn expand_in_value_with<F>(value: &mut Value, mode: EnvMode, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            *s = expand_with(s, mode, lookup)?;
        }
        Value::Array(items) => {
            for item in items {
                expand_in_value_with(item, mode, lookup)?;
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                expand_in_value_with(v, mode, lookup)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    fn fake(name: &str) -> Option<String> {
        match name {
            "DB_PASS" => Some("hunter2".into()),
            "HOST" => Some("db.local".into()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_whole_and_embedded() {
        assert_eq!(
            expand_with("<DB_PASS>", EnvMode::Strict, fake).unwrap(),
            "hunter2"
        );
        assert_eq!(
            expand_with("tcp://<HOST>:5432", EnvMode::Strict, fake).unwrap(),
            "tcp://db.local:5432"
        );
        assert_eq!(
            expand_with("no placeholders", EnvMode::Strict, fake).unwrap(),
            "no placeholders"
        );
    }

    #[test]
    fn strict_mode_fails_on_missing() {
        match expand_with("<NOPE>", EnvMode::Strict, fake) {
            Err(ConfigError::MissingEnv { name }) => assert_eq!(name, "NOPE"),
            other => panic!("expected MissingEnv, got {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_inserts_marker() {
        assert_eq!(
            expand_with("x-<NOPE>-y", EnvMode::Lenient, fake).unwrap(),
            "x-NOPE_NOT_FOUND-y"
        );
    }

    #[test]
    fn non_identifier_brackets_are_untouched() {
        assert_eq!(
            expand_with("<1abc> <a b>", EnvMode::Strict, fake).unwrap(),
            "<1abc> <a b>"
        );
    }

    #[test]
    #[serial]
    fn falls_back_to_uppercase_name() {
        std::env::set_var("IMPKIT_ENV_TEST_UPPER", "found");
        let out = expand_placeholders("<impkit_env_test_upper>", EnvMode::Strict).unwrap();
        std::env::remove_var("IMPKIT_ENV_TEST_UPPER");
        assert_eq!(out, "found");
    }

    #[test]
    fn expands_nested_values() {
        let mut v = json!({
            "DATABASE": { "MAIN": { "PASSWORD": "<DB_PASS>", "PORT": 5432 } },
            "LIST": ["<HOST>", true]
        });
        expand_in_value_with(&mut v, EnvMode::Strict, &fake).unwrap();
        let expanded = v;
        assert_eq!(expanded["DATABASE"]["MAIN"]["PASSWORD"], "hunter2");
        assert_eq!(expanded["DATABASE"]["MAIN"]["PORT"], 5432);
        assert_eq!(expanded["LIST"][0], "db.local");
    }
}
