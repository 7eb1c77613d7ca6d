//! Component B — deriving the effective cache root from a [`CacheDescriptor`]
//! without ever touching the filesystem. Directory creation is the fetch
//! state machine's job (§4.7 step 1), not this resolver's — constructing or
//! resolving a descriptor must stay a pure, side-effect-free computation so
//! callers can build one at program startup.

use std::path::PathBuf;

use crate::prelude::*;

/// Configuration for where fetched files live and how remote URLs are
/// composed. Cheap to construct and clone; resolving it to a path (via
/// [`CacheDescriptor::resolve`]) is pure.
#[derive(Debug, Clone)]
pub struct CacheDescriptor {
    pub cache_root: PathBuf,
    pub base_url: Option<String>,
    pub version: Option<String>,
    pub version_dev_label: Option<String>,
    pub env_override: Option<String>,
    pub retry_count: u32,
    pub allow_updates: bool,
}

impl Default for CacheDescriptor {
    fn default() -> Self {
        CacheDescriptor {
            cache_root: default_cache_root(),
            base_url: None,
            version: None,
            version_dev_label: None,
            env_override: None,
            retry_count: 1,
            allow_updates: true,
        }
    }
}

fn default_cache_root() -> PathBuf {
    DEFAULT_PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cache"))
}

/// A version string is a "development version" iff it contains a `+`.
pub fn is_dev_version(version: &str) -> bool {
    version.contains('+')
}

/// The path/URL version segment to substitute for `version`, applying the
/// dev-label rule (§3).
pub fn version_segment<'a>(
    version: Option<&'a str>,
    dev_label: Option<&'a str>,
) -> Option<&'a str> {
    let version = version?;
    if is_dev_version(version) {
        dev_label.or(Some(version))
    } else {
        Some(version)
    }
}

impl CacheDescriptor {
    /// Expands `~`, applies the environment-variable override, and appends
    /// the version segment (if any). Never creates directories.
    pub fn resolve(&self) -> Result<PathBuf> {
        let base = match self.env_override.as_deref() {
            Some(var_name) if !var_name.is_empty() => match std::env::var(var_name) {
                Ok(value) if !value.is_empty() => PathBuf::from(value),
                _ => self.cache_root.clone(),
            },
            _ => self.cache_root.clone(),
        };
        let base = expand_tilde(&base)?;
        let segment = version_segment(self.version.as_deref(), self.version_dev_label.as_deref());
        Ok(match segment {
            Some(segment) => base.join(segment),
            None => base,
        })
    }
}

fn expand_tilde(path: &std::path::Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(std::path::Component::Normal(first)) if first == "~" => {
            let home = directories::UserDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_else(|| FetchError::path_error(path, "could not determine home directory"))?;
            Ok(home.join(components.as_path()))
        }
        _ => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dev_version_detection() {
        assert!(is_dev_version("1.2.3+abcdef"));
        assert!(!is_dev_version("1.2.3"));
    }

    #[test]
    fn version_segment_uses_dev_label_only_for_dev_versions() {
        assert_eq!(version_segment(Some("1.2.3"), Some("main")), Some("1.2.3"));
        assert_eq!(
            version_segment(Some("1.2.3+local"), Some("main")),
            Some("main")
        );
        assert_eq!(version_segment(None, Some("main")), None);
    }

    #[test]
    fn env_override_wins_when_set() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("LARDER_TEST_CACHE_OVERRIDE_1", dir.path());
        let descriptor = CacheDescriptor {
            cache_root: PathBuf::from("/should/not/be/used"),
            env_override: Some("LARDER_TEST_CACHE_OVERRIDE_1".into()),
            ..CacheDescriptor::default()
        };
        assert_eq!(descriptor.resolve().unwrap(), dir.path());
        std::env::remove_var("LARDER_TEST_CACHE_OVERRIDE_1");
    }

    #[test]
    fn resolve_never_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nonexistent = dir.path().join("not-created-yet");
        let descriptor = CacheDescriptor {
            cache_root: nonexistent.clone(),
            ..CacheDescriptor::default()
        };
        let resolved = descriptor.resolve().unwrap();
        assert_eq!(resolved, nonexistent);
        assert!(!nonexistent.exists());
    }
}
