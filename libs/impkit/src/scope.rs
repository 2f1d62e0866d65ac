//! Which source files under a resources folder get imported.
//!
//! A scope maps folder keys to rules:
//! - `"."`: files directly inside the resources folder;
//! - `"*"`: every immediate subfolder (one level, no recursion) without a rule of its own;
//! - any other key: that specific subfolder.
//!
//! A rule is either every source file in the folder or an explicit list of file names.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of source files picked up by the matcher.
pub const SOURCE_EXTENSION: &str = "rs";

pub const ROOT_KEY: &str = ".";
pub const WILDCARD: &str = "*";

/// Files that only glue a folder together and never count as resources.
const PACKAGE_FILES: &[&str] = &["mod.rs", "lib.rs", "main.rs"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRule {
    All,
    Files(BTreeSet<String>),
}

impl ScopeRule {
    fn selects(&self, file_name: &str) -> bool {
        match self {
            ScopeRule::All => true,
            ScopeRule::Files(names) => names.contains(file_name),
        }
    }

    /// A list containing `"*"` means every file.
    pub fn files<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.contains(WILDCARD) {
            ScopeRule::All
        } else {
            ScopeRule::Files(names)
        }
    }
}

impl From<Vec<&str>> for ScopeRule {
    fn from(names: Vec<&str>) -> Self {
        ScopeRule::files(names)
    }
}

impl From<Vec<String>> for ScopeRule {
    fn from(names: Vec<String>) -> Self {
        ScopeRule::files(names)
    }
}

impl<const N: usize> From<[&str; N]> for ScopeRule {
    fn from(names: [&str; N]) -> Self {
        ScopeRule::files(names)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    rules: BTreeMap<String, ScopeRule>,
}

impl Default for ResourceScope {
    /// `{"*": ["*"]}`: everything one level below the resources folder.
    fn default() -> Self {
        Self::empty().with(WILDCARD, ScopeRule::All)
    }
}

impl ResourceScope {
    /// A scope that selects nothing until rules are added.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, rule: impl Into<ScopeRule>) -> Self {
        self.rules.insert(key.into(), rule.into());
        self
    }

    pub fn rules(&self) -> &BTreeMap<String, ScopeRule> {
        &self.rules
    }
}

impl<K, R> FromIterator<(K, R)> for ResourceScope
where
    K: Into<String>,
    R: Into<ScopeRule>,
{
    fn from_iter<T: IntoIterator<Item = (K, R)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |scope, (k, r)| scope.with(k, r))
    }
}

/// Hidden (`.x`) and dunder (`__x`) entries never take part in discovery.
pub fn is_excluded_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("__")
}

fn is_source_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !is_excluded_name(name)
        && !PACKAGE_FILES.contains(&name)
        && path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
        && path.is_file()
}

/// Source files directly inside `dir`, sorted.
pub fn source_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_source_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Visible immediate subfolders of `dir`, sorted.
pub fn subfolders(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let visible = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !is_excluded_name(n));
        if visible && path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn collect(dir: &Path, rule: &ScopeRule, out: &mut BTreeSet<PathBuf>) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for file in source_files(dir)? {
        let selected = file
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| rule.selects(n));
        if selected {
            out.insert(file);
        }
    }
    Ok(())
}

/// Files under `root` selected by `scope`.
///
/// A folder named explicitly in the scope follows its own rule; `"*"` covers the
/// remaining immediate subfolders. The result may be empty.
pub fn select_files(root: &Path, scope: &ResourceScope) -> io::Result<BTreeSet<PathBuf>> {
    let mut selected = BTreeSet::new();

    for (key, rule) in &scope.rules {
        match key.as_str() {
            ROOT_KEY => collect(root, rule, &mut selected)?,
            WILDCARD => {}
            named => {
                let excluded = Path::new(named)
                    .components()
                    .any(|c| c.as_os_str().to_str().is_some_and(is_excluded_name));
                if !excluded {
                    collect(&root.join(named), rule, &mut selected)?;
                }
            }
        }
    }

    if let Some(rule) = scope.rules.get(WILDCARD) {
        for dir in subfolders(root)? {
            let named = dir
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| scope.rules.contains_key(n));
            if !named {
                collect(&dir, rule, &mut selected)?;
            }
        }
    }

    Ok(selected)
}
