//! End-to-end fetch scenarios against a real HTTP server (`warp`, driven by
//! a `tokio` runtime) bound to an ephemeral local port. Covers the scenarios
//! from spec.md §8 that need an actual network round-trip; DOI/FTP/SFTP
//! scenarios are covered by the fake-transport unit tests beside their
//! modules instead.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use larder::{CacheDescriptor, FetchContext, Fetcher, Registry};
use warp::Filter;

const TINY_DATA: &[u8] = b"hello, larder\n";

fn registry_text() -> String {
    format!("tiny-data.txt sha256:{}\n", real_digest())
}

fn real_digest() -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, TINY_DATA);
    data_encoding::HEXLOWER.encode(digest.as_ref())
}

/// Serves `tiny-data.txt` over plain HTTP on an ephemeral port, counting GET
/// requests so tests can assert on how many network round-trips happened.
struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
    runtime: tokio::runtime::Runtime,
}

fn start_server() -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_filter = hits.clone();
    let route = warp::path("tiny-data.txt").map(move || {
        hits_filter.fetch_add(1, Ordering::SeqCst);
        warp::http::Response::builder()
            .status(200)
            .body(TINY_DATA.to_vec())
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, server) = runtime.block_on(async {
        warp::serve(route).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
            rx.await.ok();
        })
    });
    runtime.spawn(server);

    TestServer {
        base_url: format!("http://{addr}/"),
        hits,
        _shutdown: tx,
        runtime,
    }
}

impl TestServer {
    fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn descriptor(cache_root: std::path::PathBuf, base_url: String) -> CacheDescriptor {
    CacheDescriptor {
        cache_root,
        base_url: Some(base_url),
        version: None,
        version_dev_label: None,
        env_override: None,
        retry_count: 1,
        allow_updates: true,
    }
}

#[test]
fn fresh_fetch_then_cached_refetch_makes_no_second_request() {
    let server = start_server();
    let cache_dir = tempfile::tempdir().unwrap();
    let registry = Registry::load("registry.txt", registry_text().as_bytes()).unwrap();
    let fetcher = Fetcher::new(registry, descriptor(cache_dir.path().to_path_buf(), server.base_url.clone()));
    let ctx = FetchContext::default();

    let first = fetcher.fetch("tiny-data.txt", None, None, &ctx).unwrap();
    let path = first.into_paths().into_iter().next().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), TINY_DATA);
    assert_eq!(server.hit_count(), 1);

    let second = fetcher.fetch("tiny-data.txt", None, None, &ctx).unwrap();
    let path2 = second.into_paths().into_iter().next().unwrap();
    assert_eq!(path, path2);
    assert_eq!(server.hit_count(), 1, "a verifying cached file must not re-download");

    drop(server.runtime);
}

#[test]
fn update_on_hash_change_with_allow_updates() {
    let server = start_server();
    let cache_dir = tempfile::tempdir().unwrap();
    let local_path = cache_dir.path().join("tiny-data.txt");
    std::fs::write(&local_path, b"stale contents").unwrap();

    let registry = Registry::load("registry.txt", registry_text().as_bytes()).unwrap();
    let fetcher = Fetcher::new(registry, descriptor(cache_dir.path().to_path_buf(), server.base_url.clone()));
    let ctx = FetchContext::default();

    let result = fetcher.fetch("tiny-data.txt", None, None, &ctx).unwrap();
    let path = result.into_paths().into_iter().next().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), TINY_DATA);
    assert_eq!(server.hit_count(), 1);

    drop(server.runtime);
}

#[test]
fn update_rejected_when_allow_updates_false_leaves_file_untouched() {
    let server = start_server();
    let cache_dir = tempfile::tempdir().unwrap();
    let local_path = cache_dir.path().join("tiny-data.txt");
    std::fs::write(&local_path, b"stale contents").unwrap();

    let registry = Registry::load("registry.txt", registry_text().as_bytes()).unwrap();
    let mut desc = descriptor(cache_dir.path().to_path_buf(), server.base_url.clone());
    desc.allow_updates = false;
    let fetcher = Fetcher::new(registry, desc);
    let ctx = FetchContext::default();

    let err = fetcher.fetch("tiny-data.txt", None, None, &ctx).unwrap_err();
    assert!(matches!(err, larder::FetchError::HashMismatchLocal { .. }));
    assert_eq!(std::fs::read(&local_path).unwrap(), b"stale contents");
    assert_eq!(server.hit_count(), 0, "a rejected update must not touch the network");

    drop(server.runtime);
}

#[test]
fn zero_retries_surfaces_download_failure_for_missing_route() {
    let server = start_server();
    let cache_dir = tempfile::tempdir().unwrap();

    let mut registry = Registry::new();
    registry.insert(
        "does-not-exist.txt".to_string(),
        larder::RegistryEntry {
            hash: larder::HashSpec::parse("unknown").unwrap(),
            url: None,
        },
    );
    let mut desc = descriptor(cache_dir.path().to_path_buf(), server.base_url.clone());
    desc.retry_count = 0;
    let fetcher = Fetcher::new(registry, desc);
    let ctx = FetchContext::default();

    let err = fetcher.fetch("does-not-exist.txt", None, None, &ctx).unwrap_err();
    assert!(matches!(err, larder::FetchError::DownloadFailure { .. }));

    drop(server.runtime);
}

#[test]
fn no_leftover_temp_files_after_successful_fetch() {
    let server = start_server();
    let cache_dir = tempfile::tempdir().unwrap();
    let registry = Registry::load("registry.txt", registry_text().as_bytes()).unwrap();
    let fetcher = Fetcher::new(registry, descriptor(cache_dir.path().to_path_buf(), server.base_url.clone()));
    let ctx = FetchContext::default();

    fetcher.fetch("tiny-data.txt", None, None, &ctx).unwrap();

    let entries: Vec<_> = std::fs::read_dir(cache_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("tiny-data.txt")]);

    drop(server.runtime);
}

