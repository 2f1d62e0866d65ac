use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::model::ModelRegistry;

/// A unit that made it into the application, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedUnit {
    pub name: String,
    pub mount_path: String,
    pub parent: Option<String>,
}

/// Everything composition produced for one application.
#[derive(Debug, Default)]
pub struct AppAssembly {
    pub settings: Map<String, Value>,
    session_defaults: Map<String, Value>,
    main_uri: Option<String>,
    binds: BTreeMap<String, String>,
    locked_binds: Vec<String>,
    pub models: ModelRegistry,
    pub static_folder: Option<PathBuf>,
    pub template_folder: Option<PathBuf>,
    pub mounted: Vec<MountedUnit>,
}

impl AppAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the main URI unless something set it before. Returns whether it was stored.
    pub fn set_main_uri(&mut self, uri: String) -> bool {
        if self.main_uri.is_some() {
            return false;
        }
        self.main_uri = Some(uri);
        true
    }

    pub fn main_uri(&self) -> Option<&str> {
        self.main_uri.as_deref()
    }

    /// Seed binds that came from outside (app settings). They are never overwritten.
    pub fn preset_binds(&mut self, binds: BTreeMap<String, String>) {
        for (key, uri) in binds {
            self.locked_binds.push(key.clone());
            self.binds.insert(key, uri);
        }
    }

    /// Last write wins, except for preset keys. Returns whether it was stored.
    pub fn insert_bind(&mut self, key: String, uri: String) -> bool {
        if self.locked_binds.contains(&key) {
            return false;
        }
        self.binds.insert(key, uri);
        true
    }

    pub fn binds(&self) -> &BTreeMap<String, String> {
        &self.binds
    }

    /// First write wins: keys already present keep their value.
    pub fn merge_session(&mut self, seeds: &Map<String, Value>) {
        for (key, value) in seeds {
            if !self.session_defaults.contains_key(key) {
                self.session_defaults.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn session_defaults(&self) -> &Map<String, Value> {
        &self.session_defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_merge_keeps_first_value() {
        let mut assembly = AppAssembly::new();
        let first = json!({ "theme": "dark", "lang": "en" });
        let second = json!({ "theme": "light", "cart": 0 });

        assembly.merge_session(first.as_object().unwrap());
        assembly.merge_session(second.as_object().unwrap());

        let session = assembly.session_defaults();
        assert_eq!(session["theme"], "dark");
        assert_eq!(session["lang"], "en");
        assert_eq!(session["cart"], 0);
    }

    #[test]
    fn main_uri_is_set_once() {
        let mut assembly = AppAssembly::new();
        assert!(assembly.set_main_uri("sqlite:///a".into()));
        assert!(!assembly.set_main_uri("sqlite:///b".into()));
        assert_eq!(assembly.main_uri(), Some("sqlite:///a"));
    }

    #[test]
    fn binds_are_last_write_wins_except_presets() {
        let mut assembly = AppAssembly::new();
        assembly.preset_binds(BTreeMap::from([("ext".to_string(), "pg://x".to_string())]));

        assert!(assembly.insert_bind("shop".into(), "one".into()));
        assert!(assembly.insert_bind("shop".into(), "two".into()));
        assert!(!assembly.insert_bind("ext".into(), "three".into()));

        assert_eq!(assembly.binds()["shop"], "two");
        assert_eq!(assembly.binds()["ext"], "pg://x");
    }
}
