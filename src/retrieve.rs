//! Component H — the retrieve façade: a thin one-shot entry point for a
//! single `(url, known_hash)` pair that doesn't warrant building a full
//! [`Registry`]. Synthesizes a one-entry registry and delegates to
//! [`Fetcher`], exactly as spec.md §4.8 describes.

use std::path::PathBuf;

use data_encoding::HEXLOWER;
use directories::ProjectDirs;

use crate::cache_path::CacheDescriptor;
use crate::fetch::Fetcher;
use crate::hash::HashSpec;
use crate::prelude::*;
use crate::process::{Action, ProcessedPath, Processor};
use crate::registry::{Registry, RegistryEntry};
use crate::transport::{FetchContext, Transport};

/// Parameters for a one-shot [`retrieve`] call. Built with defaults via
/// [`RetrieveRequest::new`] and overridden with the `with_*` builder
/// methods, mirroring the other descriptor types in this crate.
pub struct RetrieveRequest<'a> {
    pub url: String,
    pub known_hash: String,
    pub filename: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub app_name: &'a str,
    pub transport: Option<&'a dyn Transport>,
    pub processor: Option<&'a dyn Processor>,
}

impl<'a> RetrieveRequest<'a> {
    pub fn new(url: impl Into<String>, known_hash: impl Into<String>) -> RetrieveRequest<'a> {
        RetrieveRequest {
            url: url.into(),
            known_hash: known_hash.into(),
            filename: None,
            cache_path: None,
            app_name: env!("CARGO_PKG_NAME"),
            transport: None,
            processor: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_cache_path(mut self, cache_path: PathBuf) -> Self {
        self.cache_path = Some(cache_path);
        self
    }

    pub fn with_app_name(mut self, app_name: &'a str) -> Self {
        self.app_name = app_name;
        self
    }

    pub fn with_transport(mut self, transport: &'a dyn Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_processor(mut self, processor: &'a dyn Processor) -> Self {
        self.processor = Some(processor);
        self
    }
}

/// Derives a collision-resistant synthetic registry name for a URL that has
/// no explicit `filename`: the URL's basename, prefixed with a short hex
/// digest of the full URL, so two different URLs that happen to share a
/// basename land in distinct cache entries (spec.md §4.8).
fn synthetic_name(url: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, url.as_bytes());
    let short = HEXLOWER.encode(&digest.as_ref()[..8]);
    let basename = url
        .rsplit('/')
        .next()
        .filter(|piece| !piece.is_empty())
        .unwrap_or("download");
    format!("{short}-{basename}")
}

fn default_cache_path(app_name: &str) -> PathBuf {
    ProjectDirs::from("", "", app_name)
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cache").join(app_name))
}

/// Fetches a single file given its URL and expected hash, without the
/// caller needing to build a [`Registry`]. See spec.md §4.8.
pub fn retrieve(request: RetrieveRequest) -> Result<ProcessedPath> {
    let name = request
        .filename
        .clone()
        .unwrap_or_else(|| synthetic_name(&request.url));

    let mut registry = Registry::new();
    registry.insert(
        name.clone(),
        RegistryEntry {
            hash: HashSpec::parse(&request.known_hash)?,
            url: Some(request.url.clone()),
        },
    );

    let cache_root = request
        .cache_path
        .clone()
        .unwrap_or_else(|| default_cache_path(request.app_name));

    let descriptor = CacheDescriptor {
        cache_root,
        base_url: Some(String::new()),
        version: None,
        version_dev_label: None,
        env_override: None,
        retry_count: 1,
        allow_updates: true,
    };

    let fetcher = Fetcher::new(registry, descriptor);
    let ctx = FetchContext::default();
    fetcher.fetch(&name, request.transport, request.processor, &ctx)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn synthetic_name_is_stable_and_prefixed() {
        let a = synthetic_name("https://example.org/a/tiny-data.txt");
        let b = synthetic_name("https://example.org/b/tiny-data.txt");
        assert!(a.ends_with("-tiny-data.txt"));
        assert_ne!(a, b, "different URLs with the same basename must not collide");
        assert_eq!(a, synthetic_name("https://example.org/a/tiny-data.txt"));
    }

    #[test]
    fn retrieve_rejects_bad_hash_spec_before_touching_network() {
        let request = RetrieveRequest::new("https://example.org/x.bin", "not-a-hash-spec")
            .with_cache_path(std::env::temp_dir());
        assert!(retrieve(request).is_err());
    }
}
