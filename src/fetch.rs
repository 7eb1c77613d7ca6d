//! Component G — the fetch state machine: resolve -> classify -> download
//! (with retry) -> verify -> publish -> post-process (§4.7).

use std::path::PathBuf;

use crate::cache_path::CacheDescriptor;
use crate::hash::{verify, HashSpec};
use crate::lock::lock_for;
use crate::prelude::*;
use crate::process::{Action, ProcessedPath, Processor};
use crate::registry::Registry;
use crate::transport::{select_for_scheme, FetchContext, Transport};
use crate::url_compose::full_url;

/// Binds a registry and a cache descriptor, and performs fetches against
/// them. A plain value type — no process-global state (§9).
pub struct Fetcher {
    pub registry: Registry,
    pub descriptor: CacheDescriptor,
}

impl Fetcher {
    pub fn new(registry: Registry, descriptor: CacheDescriptor) -> Fetcher {
        Fetcher { registry, descriptor }
    }

    /// Resolves `name`'s effective download URL without fetching anything.
    pub fn get_url(&self, name: &str) -> Result<String> {
        full_url(
            &self.registry,
            name,
            self.descriptor.version.as_deref(),
            self.descriptor.version_dev_label.as_deref(),
            self.descriptor.base_url.as_deref(),
        )
    }

    /// Delegates to the selected (or caller-supplied) transport's
    /// availability probe.
    pub fn is_available(
        &self,
        name: &str,
        transport: Option<&dyn Transport>,
        ctx: &FetchContext,
    ) -> Result<bool> {
        let url = self.get_url(name)?;
        match transport {
            Some(transport) => transport.is_available(&url, ctx),
            None => select_for_scheme(&url, self.descriptor.retry_count)?.is_available(&url, ctx),
        }
    }

    /// Runs the full six-step state machine for `name` and returns the
    /// path(s) the caller should use.
    pub fn fetch(
        &self,
        name: &str,
        transport: Option<&dyn Transport>,
        processor: Option<&dyn Processor>,
        ctx: &FetchContext,
    ) -> Result<ProcessedPath> {
        // --- 1. Resolve ---
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| FetchError::UnknownFile { name: name.to_string() })?;
        let url = self.get_url(name)?;
        let cache_root = self.descriptor.resolve()?;
        let local_path = cache_root.join(native_relative_path(name));
        let local_dir = local_path.parent().ok_or_else(|| {
            FetchError::path_error(&local_path, "local path has no parent directory")
        })?;
        std::fs::create_dir_all(local_dir)
            .map_err(|e| FetchError::path_error(local_dir, e.to_string()))?;

        let _guard = lock_for(&local_path)?;

        // --- 2. Classify ---
        let action = if !local_path.exists() {
            Action::Downloaded
        } else if hashes_match_entry(&entry.hash, &local_path)? {
            Action::Fetched
        } else if !self.descriptor.allow_updates {
            return Err(FetchError::HashMismatchLocal {
                expected: entry.hash.to_string(),
                path: local_path,
            });
        } else {
            Action::Updated
        };

        if action != Action::Fetched {
            self.download_and_verify(&url, &local_path, &entry.hash, transport, ctx)?;
            info!(%name, %url, "published");
        }

        // --- 6. Post-process ---
        match processor {
            Some(processor) => processor.process(&local_path, action),
            None => Ok(ProcessedPath::One(local_path)),
        }
    }

    /// Steps 3-5: select a transport, retry on transport or hash-verification
    /// failure, and atomically publish on success.
    fn download_and_verify(
        &self,
        url: &str,
        local_path: &std::path::Path,
        expected: &HashSpec,
        transport: Option<&dyn Transport>,
        ctx: &FetchContext,
    ) -> Result<()> {
        let owned_transport;
        let transport: &dyn Transport = match transport {
            Some(t) => t,
            None => {
                owned_transport = select_for_scheme(url, self.descriptor.retry_count)?;
                owned_transport.as_ref()
            }
        };

        let dir = local_path.parent().expect("checked above");
        let mut attempts_left = self.descriptor.retry_count;
        let mut delay_secs = 1u64;
        loop {
            debug!(%url, "download started");
            let tmp = tempfile::NamedTempFile::new_in(dir)
                .map_err(|e| FetchError::path_error(dir, e.to_string()))?;
            let tmp_path = tmp.path().to_path_buf();
            drop(tmp);

            let download_result = transport.download(url, &tmp_path, ctx);
            let outcome = download_result.and_then(|()| {
                let (matches, actual) = verify(expected, &tmp_path)?;
                if matches {
                    Ok(())
                } else {
                    Err(FetchError::HashMismatch {
                        expected: expected.to_string(),
                        actual: actual.unwrap_or_default(),
                        path: tmp_path.clone(),
                    })
                }
            });

            match outcome {
                Ok(()) => {
                    std::fs::rename(&tmp_path, local_path)
                        .or_else(|_| {
                            std::fs::copy(&tmp_path, local_path).map(|_| ())
                                .and_then(|()| std::fs::remove_file(&tmp_path))
                        })
                        .map_err(|e| FetchError::path_error(local_path, e.to_string()))?;
                    return Ok(());
                }
                Err(err) if is_retryable(&err) && attempts_left > 0 => {
                    let _ = std::fs::remove_file(&tmp_path);
                    warn!(%url, error = %err, delay_secs, "retrying after transient failure");
                    std::thread::sleep(std::time::Duration::from_secs(delay_secs));
                    delay_secs = (delay_secs * 2).min(10);
                    attempts_left -= 1;
                }
                Err(err) => {
                    let _ = std::fs::remove_file(&tmp_path);
                    return Err(err);
                }
            }
        }
    }
}

fn is_retryable(error: &FetchError) -> bool {
    matches!(error, FetchError::DownloadFailure { .. } | FetchError::HashMismatch { .. })
}

fn hashes_match_entry(expected: &HashSpec, path: &std::path::Path) -> Result<bool> {
    crate::hash::hashes_match(expected, path)
}

/// Converts a registry name's forward-slash-separated path into one using
/// the host's native separators (§3).
fn native_relative_path(name: &str) -> PathBuf {
    name.split('/').collect()
}
