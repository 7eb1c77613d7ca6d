//! A sibling-file advisory lock, used to serialize concurrent fetches of the
//! same cache entry *within one process*. Grounded on the teacher's
//! `lock()` helper (used by both `KVFileStore`/`KVDirStore` and
//! `ImmutableFileCache`): a `.lock` file next to the target path, held open
//! and exclusively locked for the duration of the critical section.
//!
//! This does not replace the cross-process idempotence guarantee the state
//! machine relies on (two processes may still race to write the same path;
//! the hash invariant makes that safe) — it only avoids redundant work
//! inside a single process.

use std::fs::{self, File};
use std::path::Path;

use fs2::FileExt;

use crate::error::FetchError;

pub(crate) struct FileLock {
    _file: File,
    path: std::path::PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub(crate) fn lock_for(path: &Path) -> crate::error::Result<FileLock> {
    let parent = path
        .parent()
        .ok_or_else(|| FetchError::path_error(path, "path has no parent directory"))?;
    fs::create_dir_all(parent)
        .map_err(|e| FetchError::path_error(parent, format!("creating cache directory: {e}")))?;
    let mut lock_name = path
        .file_name()
        .ok_or_else(|| FetchError::path_error(path, "path has no file name"))?
        .to_os_string();
    lock_name.push(".lock");
    let lock_path = parent.join(lock_name);
    let file = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&lock_path)
        .map_err(|e| FetchError::path_error(&lock_path, e.to_string()))?;
    file.lock_exclusive()
        .map_err(|e| FetchError::path_error(&lock_path, e.to_string()))?;
    Ok(FileLock {
        _file: file,
        path: lock_path,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_creates_parent_and_sibling_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("entry.dat");
        let _lock = lock_for(&target).unwrap();
        assert!(target.parent().unwrap().join("entry.dat.lock").exists());
    }
}
