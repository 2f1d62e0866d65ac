//! Boundary to the web application and the persistence layer.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The live application the engine registers units into.
pub trait AppHost {
    /// Mount `unit`, nested under `parent` when it is a child unit.
    ///
    /// Children are handed over before their parent; `mount_path` on each mount is
    /// already the full path.
    fn register_unit(&mut self, unit: UnitMount, parent: Option<&UnitMount>)
        -> anyhow::Result<()>;

    /// Claim an extension slot by name. Returns `false` if it was already taken.
    fn claim_extension(&mut self, name: &str) -> bool;

    /// Static and template folders found next to the app resources.
    fn set_app_folders(&mut self, _static_folder: Option<&Path>, _template_folder: Option<&Path>) {}

    /// Downcast hook for factories that need the concrete host.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn AppHost + '_ {
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// The persistence layer. Called once with the merged binding table.
pub trait OrmHost {
    fn init_database(
        &mut self,
        main_uri: Option<&str>,
        binds: &BTreeMap<String, String>,
    ) -> anyhow::Result<()>;
}

/// An activated unit as the application sees it.
#[derive(Debug)]
pub struct UnitMount {
    pub name: String,
    pub location: PathBuf,
    pub url_prefix: String,
    /// Parent mount path joined with `url_prefix`.
    pub mount_path: String,
    pub subdomain: Option<String>,
    pub static_folder: Option<PathBuf>,
    pub template_folder: Option<PathBuf>,
    pub static_url_path: Option<String>,
    pub cli_group: Option<String>,
    attachments: Vec<Box<dyn Any + Send>>,
}

impl UnitMount {
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>, url_prefix: &str) -> Self {
        let url_prefix = normalize_prefix(url_prefix);
        Self {
            name: name.into(),
            location: location.into(),
            mount_path: url_prefix.clone(),
            url_prefix,
            subdomain: None,
            static_folder: None,
            template_folder: None,
            static_url_path: None,
            cli_group: None,
            attachments: Vec::new(),
        }
    }

    /// Place this mount below `parent`.
    pub fn under(mut self, parent: &UnitMount) -> Self {
        self.mount_path = join_paths(&parent.mount_path, &self.url_prefix);
        self
    }

    /// Attach a value for the host to pick up, e.g. a router built by a factory.
    pub fn attach<T: Any + Send>(&mut self, value: T) {
        self.attachments.push(Box::new(value));
    }

    pub fn attachments_of<T: Any>(&self) -> impl Iterator<Item = &T> {
        self.attachments.iter().filter_map(|a| a.downcast_ref::<T>())
    }

    /// Remove and return every attachment of type `T`.
    pub fn take_attachments<T: Any>(&mut self) -> Vec<T> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.attachments)
            .into_iter()
            .partition(|a| a.is::<T>());
        self.attachments = kept;
        taken
            .into_iter()
            .filter_map(|a| a.downcast::<T>().ok())
            .map(|b| *b)
            .collect()
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// `<unit name>/<template>`.
    pub fn tmpl(&self, template: &str) -> String {
        format!("{}/{}", self.name, template)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn join_paths(parent: &str, child: &str) -> String {
    match (parent, child) {
        ("/", c) => c.to_string(),
        (p, "/") => p.to_string(),
        (p, c) => format!("{p}{c}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_normalized() {
        assert_eq!(UnitMount::new("a", "/x", "shop").url_prefix, "/shop");
        assert_eq!(UnitMount::new("a", "/x", "/shop/").url_prefix, "/shop");
        assert_eq!(UnitMount::new("a", "/x", "").url_prefix, "/");
    }

    #[test]
    fn nested_mount_paths_concatenate() {
        let www = UnitMount::new("www", "/x/www", "/www");
        let account = UnitMount::new("account", "/x/www/account", "/account").under(&www);
        assert_eq!(account.mount_path, "/www/account");

        let root = UnitMount::new("root", "/x", "/");
        let child = UnitMount::new("c", "/x/c", "/c").under(&root);
        assert_eq!(child.mount_path, "/c");
        let same = UnitMount::new("s", "/x/s", "/").under(&www);
        assert_eq!(same.mount_path, "/www");
    }

    #[test]
    fn attachments_are_typed() {
        let mut mount = UnitMount::new("a", "/x", "/a");
        mount.attach(1_u32);
        mount.attach("route".to_string());
        mount.attach(2_u32);

        assert_eq!(mount.attachments_of::<u32>().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(mount.take_attachments::<String>(), vec!["route".to_string()]);
        assert_eq!(mount.attachment_count(), 2);
        assert_eq!(mount.tmpl("index.html"), "a/index.html");
    }
}
