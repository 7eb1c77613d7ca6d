//! Unzip / Untar processors (§4.6.b). Generalizes the teacher's
//! `unpack_zip_carefully`/`unpack_tar_gz_carefully` (`tree.rs`): archive
//! member paths are validated through [`SafeMemberPath`] before anything is
//! written, so a `..`-or-absolute member path is rejected rather than ever
//! reaching `extract_dir`.

use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use typed_path::unix::UnixComponent;
use typed_path::UnixPath;

use crate::prelude::*;
use crate::process::{Action, ProcessedPath, Processor};

/// A relative, `..`-free, non-absolute archive member path, safe to join
/// onto an `extract_dir` without escaping it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SafeMemberPath {
    pieces: Vec<String>,
}

impl SafeMemberPath {
    fn parse(name: &str) -> Result<SafeMemberPath> {
        let mut pieces = Vec::new();
        for component in UnixPath::new(name.as_bytes()).components() {
            match component {
                UnixComponent::RootDir => {
                    return Err(archive_path_error(name, "absolute paths are not allowed"))
                }
                UnixComponent::CurDir => (),
                UnixComponent::ParentDir => {
                    return Err(archive_path_error(name, "'..' is not allowed in archive members"))
                }
                UnixComponent::Normal(piece) => {
                    let piece = std::str::from_utf8(piece)
                        .map_err(|_| archive_path_error(name, "non-utf8 path component"))?;
                    pieces.push(piece.to_string());
                }
            }
        }
        Ok(SafeMemberPath { pieces })
    }

    fn to_native(&self) -> PathBuf {
        self.pieces.iter().collect()
    }

    fn to_slash_string(&self) -> String {
        self.pieces.join("/")
    }
}

fn archive_path_error(name: &str, message: &str) -> FetchError {
    FetchError::ProcessorFailure {
        path: PathBuf::from(name),
        message: message.to_string(),
    }
}

fn default_extract_dir(archive_path: &Path, suffix: &str) -> PathBuf {
    let mut out = archive_path.as_os_str().to_owned();
    out.push(suffix);
    PathBuf::from(out)
}

/// Recursively collects every file under `dir`, returning absolute paths,
/// used to expand a directory member into its full contents for the
/// returned path list (§4.6.b).
fn list_recursive(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).map_err(|e| FetchError::ProcessorFailure {
            path: current.clone(),
            message: e.to_string(),
        })? {
            let entry = entry.map_err(|e| FetchError::ProcessorFailure {
                path: current.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Whether member `requested` (directory or file, requested as a
/// slash-joined name) is already present under `extract_dir`.
fn member_present(extract_dir: &Path, requested: &SafeMemberPath) -> bool {
    extract_dir.join(requested.to_native()).exists()
}

pub struct UnzipProcessor {
    extract_dir: Option<PathBuf>,
    members: Option<Vec<String>>,
}

impl UnzipProcessor {
    pub fn new() -> UnzipProcessor {
        UnzipProcessor {
            extract_dir: None,
            members: None,
        }
    }

    pub fn with_extract_dir(mut self, dir: PathBuf) -> Self {
        self.extract_dir = Some(dir);
        self
    }

    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = Some(members);
        self
    }
}

impl Default for UnzipProcessor {
    fn default() -> Self {
        UnzipProcessor::new()
    }
}

impl Processor for UnzipProcessor {
    fn process(&self, path: &Path, action: Action) -> Result<ProcessedPath> {
        let extract_dir = self
            .extract_dir
            .clone()
            .unwrap_or_else(|| default_extract_dir(path, ".unzip"));

        let requested: Vec<SafeMemberPath> = match &self.members {
            Some(members) => members
                .iter()
                .map(|m| SafeMemberPath::parse(m))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };

        let needs_extraction = action != Action::Fetched
            || !extract_dir.exists()
            || requested.iter().any(|m| !member_present(&extract_dir, m));

        if needs_extraction {
            fs::create_dir_all(&extract_dir).map_err(|e| FetchError::ProcessorFailure {
                path: extract_dir.clone(),
                message: e.to_string(),
            })?;
            let file = std::fs::File::open(path).map_err(|e| FetchError::ProcessorFailure {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| FetchError::ProcessorFailure {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            extract_zip_members(&mut zip, &extract_dir, &self.members)?;
        }

        collect_result_paths(&extract_dir, &requested)
    }
}

fn extract_zip_members<R: Read + Seek>(
    zip: &mut zip::ZipArchive<R>,
    extract_dir: &Path,
    members_filter: &Option<Vec<String>>,
) -> Result<()> {
    let mut symlinks = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| FetchError::ProcessorFailure {
            path: extract_dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(filter) = members_filter {
            if !filter
                .iter()
                .any(|m| entry.name() == m || entry.name().starts_with(&format!("{m}/")))
            {
                continue;
            }
        }
        let safe = SafeMemberPath::parse(entry.name())?;
        let dest = extract_dir.join(safe.to_native());

        if let Some(mode) = entry.unix_mode() {
            if mode & 0xf000 == 0xa000 {
                let mut target = Vec::new();
                entry.read_to_end(&mut target).map_err(|e| FetchError::ProcessorFailure {
                    path: dest.clone(),
                    message: e.to_string(),
                })?;
                symlinks.push((dest, target));
                continue;
            }
        }

        if entry.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| FetchError::ProcessorFailure {
                path: dest.clone(),
                message: e.to_string(),
            })?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| FetchError::ProcessorFailure {
                    path: parent.to_path_buf(),
                    message: e.to_string(),
                })?;
            }
            let mut out = fs::File::create(&dest).map_err(|e| FetchError::ProcessorFailure {
                path: dest.clone(),
                message: e.to_string(),
            })?;
            std::io::copy(&mut entry, &mut out).map_err(|e| FetchError::ProcessorFailure {
                path: dest.clone(),
                message: e.to_string(),
            })?;
        }
    }
    for (dest, target) in symlinks {
        #[cfg(unix)]
        {
            let target = String::from_utf8_lossy(&target).into_owned();
            std::os::unix::fs::symlink(target, &dest).map_err(|e| FetchError::ProcessorFailure {
                path: dest.clone(),
                message: e.to_string(),
            })?;
        }
        #[cfg(not(unix))]
        {
            return Err(FetchError::ProcessorFailure {
                path: dest,
                message: "symlinked archive members are not supported on this platform".to_string(),
            });
        }
    }
    Ok(())
}

pub struct UntarProcessor {
    extract_dir: Option<PathBuf>,
    members: Option<Vec<String>>,
}

impl UntarProcessor {
    pub fn new() -> UntarProcessor {
        UntarProcessor {
            extract_dir: None,
            members: None,
        }
    }

    pub fn with_extract_dir(mut self, dir: PathBuf) -> Self {
        self.extract_dir = Some(dir);
        self
    }

    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = Some(members);
        self
    }
}

impl Default for UntarProcessor {
    fn default() -> Self {
        UntarProcessor::new()
    }
}

impl Processor for UntarProcessor {
    fn process(&self, path: &Path, action: Action) -> Result<ProcessedPath> {
        let extract_dir = self
            .extract_dir
            .clone()
            .unwrap_or_else(|| default_extract_dir(path, ".untar"));

        let requested: Vec<SafeMemberPath> = match &self.members {
            Some(members) => members
                .iter()
                .map(|m| SafeMemberPath::parse(m))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };

        let needs_extraction = action != Action::Fetched
            || !extract_dir.exists()
            || requested.iter().any(|m| !member_present(&extract_dir, m));

        if needs_extraction {
            fs::create_dir_all(&extract_dir).map_err(|e| FetchError::ProcessorFailure {
                path: extract_dir.clone(),
                message: e.to_string(),
            })?;
            let file = std::fs::File::open(path).map_err(|e| FetchError::ProcessorFailure {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let decoder = flate2::read::MultiGzDecoder::new(file);
            let mut archive = tar::Archive::new(decoder);
            extract_tar_members(&mut archive, &extract_dir, &self.members)?;
        }

        collect_result_paths(&extract_dir, &requested)
    }
}

fn extract_tar_members<R: Read>(
    archive: &mut tar::Archive<R>,
    extract_dir: &Path,
    members_filter: &Option<Vec<String>>,
) -> Result<()> {
    use std::ops::Deref;
    use tar::EntryType::*;

    let entries = archive.entries().map_err(|e| FetchError::ProcessorFailure {
        path: extract_dir.to_path_buf(),
        message: e.to_string(),
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| FetchError::ProcessorFailure {
            path: extract_dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let name = String::from_utf8_lossy(
            entry
                .path_bytes()
                .deref(),
        )
        .into_owned();
        if let Some(filter) = members_filter {
            if !filter
                .iter()
                .any(|m| name == *m || name.starts_with(&format!("{m}/")))
            {
                continue;
            }
        }
        let safe = SafeMemberPath::parse(&name)?;
        let dest = extract_dir.join(safe.to_native());
        let kind = entry.header().entry_type();
        match kind {
            Symlink | Link | Char | Block | Fifo => {
                return Err(FetchError::ProcessorFailure {
                    path: dest,
                    message: format!("archive entry {name} has unsupported type {kind:?}"),
                })
            }
            Directory => {
                fs::create_dir_all(&dest).map_err(|e| FetchError::ProcessorFailure {
                    path: dest.clone(),
                    message: e.to_string(),
                })?;
            }
            GNULongName | GNULongLink | GNUSparse | XGlobalHeader | XHeader => (),
            Regular | Continuous | _ => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| FetchError::ProcessorFailure {
                        path: parent.to_path_buf(),
                        message: e.to_string(),
                    })?;
                }
                entry.unpack(&dest).map_err(|e| FetchError::ProcessorFailure {
                    path: dest.clone(),
                    message: e.to_string(),
                })?;
            }
        }
    }
    Ok(())
}

fn collect_result_paths(extract_dir: &Path, requested: &[SafeMemberPath]) -> Result<ProcessedPath> {
    if requested.is_empty() {
        return Ok(ProcessedPath::Many(list_recursive(extract_dir)?));
    }
    let mut out = Vec::new();
    for member in requested {
        let full = extract_dir.join(member.to_native());
        if full.is_dir() {
            out.extend(list_recursive(&full)?);
        } else if full.exists() {
            out.push(full);
        } else {
            return Err(FetchError::ProcessorFailure {
                path: full,
                message: format!("member {:?} was not found after extraction", member.to_slash_string()),
            });
        }
    }
    Ok(ProcessedPath::Many(out))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    fn make_zip(dir: &Path) -> PathBuf {
        let path = dir.join("archive.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, contents) in [("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")] {
            writer.start_file(name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn rejects_path_traversal_members() {
        assert!(SafeMemberPath::parse("../../etc/passwd").is_err());
        assert!(SafeMemberPath::parse("/etc/passwd").is_err());
        assert!(SafeMemberPath::parse("a/b/../../../c").is_err());
    }

    #[test]
    fn unzip_member_subset_then_superset_extends_without_redownload() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_zip(dir.path());

        let first = UnzipProcessor::new()
            .with_members(vec!["a.txt".to_string()])
            .process(&archive, Action::Downloaded)
            .unwrap();
        assert_eq!(first.into_paths().len(), 1);

        let extract_dir = default_extract_dir(&archive, ".unzip");
        assert!(extract_dir.join("a.txt").exists());
        assert!(!extract_dir.join("b.txt").exists());

        let second = UnzipProcessor::new()
            .with_members(vec!["a.txt".to_string(), "b.txt".to_string()])
            .process(&archive, Action::Fetched)
            .unwrap();
        assert_eq!(second.into_paths().len(), 2);
        assert!(extract_dir.join("b.txt").exists());
    }

    #[test]
    fn unzip_all_members_when_none_requested() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_zip(dir.path());
        let result = UnzipProcessor::new()
            .process(&archive, Action::Downloaded)
            .unwrap();
        assert_eq!(result.into_paths().len(), 3);
    }
}
