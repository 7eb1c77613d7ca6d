//! Component C — composing the effective remote URL for a registry entry.

use crate::cache_path::version_segment;
use crate::prelude::*;
use crate::registry::{Registry, RegistryEntry};

/// Computes the effective URL for `name`, per §4.3's resolution order: a
/// per-file URL override wins outright (no version substitution, no name
/// appended); otherwise `base_url` has `{version}` substituted, gets a
/// trailing slash, and `name` is appended.
pub fn full_url(
    registry: &Registry,
    name: &str,
    version: Option<&str>,
    version_dev_label: Option<&str>,
    base_url: Option<&str>,
) -> Result<String> {
    let entry: &RegistryEntry = registry
        .get(name)
        .ok_or_else(|| FetchError::UnknownFile { name: name.to_string() })?;

    if let Some(url) = &entry.url {
        return Ok(url.clone());
    }

    let base_url = base_url.ok_or_else(|| FetchError::PathError {
        path: Default::default(),
        message: format!("no url override for {name:?} and no base_url configured"),
    })?;

    let substituted = match version_segment(version, version_dev_label) {
        Some(segment) => base_url.replace("{version}", segment),
        None => base_url.to_string(),
    };
    let with_slash = if substituted.ends_with('/') {
        substituted
    } else {
        format!("{substituted}/")
    };
    Ok(format!("{with_slash}{name}"))
}

/// Whether a URL uses the `doi:<DOI>/<filename>` pseudo-scheme (§4.3).
pub fn is_doi_url(url: &str) -> bool {
    url.starts_with("doi:")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hash::HashSpec;

    fn registry_with(name: &str, url: Option<&str>) -> Registry {
        let mut registry = Registry::new();
        registry.insert(
            name.to_string(),
            RegistryEntry {
                hash: HashSpec::parse("unknown").unwrap(),
                url: url.map(str::to_string),
            },
        );
        registry
    }

    #[test]
    fn per_file_url_overrides_base_and_version() {
        let registry = registry_with("x.bin", Some("ftp://mirror.example.org/x.bin"));
        let url = full_url(
            &registry,
            "x.bin",
            Some("1.0+dev"),
            Some("main"),
            Some("https://primary.example.org/{version}/"),
        )
        .unwrap();
        assert_eq!(url, "ftp://mirror.example.org/x.bin");
    }

    #[test]
    fn base_url_gets_version_and_name_appended() {
        let registry = registry_with("tiny-data.txt", None);
        let url = full_url(
            &registry,
            "tiny-data.txt",
            None,
            None,
            Some("https://example.org/v1"),
        )
        .unwrap();
        assert_eq!(url, "https://example.org/v1/tiny-data.txt");
    }

    #[test]
    fn version_placeholder_substituted() {
        let registry = registry_with("tiny-data.txt", None);
        let url = full_url(
            &registry,
            "tiny-data.txt",
            Some("2.0+abcd"),
            Some("main"),
            Some("https://example.org/{version}/"),
        )
        .unwrap();
        assert_eq!(url, "https://example.org/main/tiny-data.txt");
    }

    #[test]
    fn recognizes_doi_scheme() {
        assert!(is_doi_url("doi:10.6084/m9.figshare.14763051.v1/tiny-data.txt"));
        assert!(!is_doi_url("https://example.org/x"));
    }
}
