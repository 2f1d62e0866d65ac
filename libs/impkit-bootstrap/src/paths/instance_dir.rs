use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Default instance directory name, relative to the application root.
pub const DEFAULT_INSTANCE_SUBDIR: &str = "instance";

/// Errors for resolving the instance directory
#[derive(Debug, thiserror::Error)]
pub enum InstanceDirError {
    #[error("HOME environment variable is not set (needed to expand '{0}')")]
    HomeMissing(String),
    #[error("IO error for instance directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(target_os = "windows")]
fn user_home() -> Option<String> {
    env::var("USERPROFILE").or_else(|_| env::var("HOME")).ok()
}

#[cfg(not(target_os = "windows"))]
fn user_home() -> Option<String> {
    env::var("HOME").ok()
}

fn expand_tilde(raw: &str) -> Result<PathBuf, InstanceDirError> {
    if raw == "~" {
        let home = user_home().ok_or_else(|| InstanceDirError::HomeMissing(raw.to_string()))?;
        return Ok(PathBuf::from(home));
    }
    let rest = raw.strip_prefix("~/");
    #[cfg(target_os = "windows")]
    let rest = rest.or_else(|| raw.strip_prefix("~\\"));
    match rest {
        Some(rest) => {
            let home =
                user_home().ok_or_else(|| InstanceDirError::HomeMissing(raw.to_string()))?;
            Ok(Path::new(&home).join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Resolve where instance data (sqlite files, logs) lives.
///
/// - `configured` set: `~` is expanded against the user's home; a relative result is
///   joined to `app_root`.
/// - `configured` unset: `<app_root>/instance`.
///
/// If `create` is true, the directory is created if missing.
pub fn resolve_instance_dir(
    configured: Option<String>,
    app_root: &Path,
    create: bool,
) -> Result<PathBuf, InstanceDirError> {
    let path = match configured.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            let expanded = expand_tilde(raw)?;
            if expanded.is_absolute() {
                expanded
            } else {
                app_root.join(expanded)
            }
        }
        _ => app_root.join(DEFAULT_INSTANCE_SUBDIR),
    };

    if create {
        fs::create_dir_all(&path).map_err(|source| InstanceDirError::Io {
            path: path.clone(),
            source,
        })?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn defaults_to_instance_under_root() {
        let tmp = tempdir().unwrap();
        let result = resolve_instance_dir(None, tmp.path(), false).unwrap();
        assert_eq!(result, tmp.path().join("instance"));
        assert!(!result.exists());
    }

    #[test]
    fn blank_value_uses_default() {
        let tmp = tempdir().unwrap();
        let result = resolve_instance_dir(Some("  ".into()), tmp.path(), false).unwrap();
        assert_eq!(result, tmp.path().join("instance"));
    }

    #[test]
    fn relative_path_joins_root() {
        let tmp = tempdir().unwrap();
        let result = resolve_instance_dir(Some("data/inst".into()), tmp.path(), true).unwrap();
        assert_eq!(result, tmp.path().join("data/inst"));
        assert!(result.is_dir());
    }

    #[test]
    fn absolute_path_is_kept() {
        let root = tempdir().unwrap();
        let other = tempdir().unwrap();
        let target = other.path().join("inst");
        let result = resolve_instance_dir(
            Some(target.to_string_lossy().into_owned()),
            root.path(),
            true,
        )
        .unwrap();
        assert_eq!(result, target);
        assert!(target.is_dir());
    }

    #[test]
    #[serial]
    #[cfg(not(target_os = "windows"))]
    fn tilde_expands_against_home() {
        let tmp = tempdir().unwrap();
        let original = env::var("HOME").ok();
        env::set_var("HOME", tmp.path());

        let result = resolve_instance_dir(Some("~/imp".into()), Path::new("/unused"), false);
        let only = resolve_instance_dir(Some("~".into()), Path::new("/unused"), false);

        match original {
            Some(h) => env::set_var("HOME", h),
            None => env::remove_var("HOME"),
        }

        assert_eq!(result.unwrap(), tmp.path().join("imp"));
        assert_eq!(only.unwrap(), tmp.path());
    }
}
