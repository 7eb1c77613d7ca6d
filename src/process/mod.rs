//! Component F — post-processors that turn a freshly-fetched file into a
//! derived artifact (decompressed file, extracted archive members).

mod archive;
mod decompress;

pub use archive::{UnzipProcessor, UntarProcessor};
pub use decompress::{CompressionMethod, DecompressProcessor};

use std::path::PathBuf;

use auto_impl::auto_impl;

use crate::prelude::*;

/// What happened to the local file before a processor runs (§4.6). Closed
/// set, encoded as a sum type rather than as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Downloaded,
    Updated,
    Fetched,
}

/// What a processor hands back to the caller in place of the plain fetched
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedPath {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl ProcessedPath {
    pub fn into_paths(self) -> Vec<PathBuf> {
        match self {
            ProcessedPath::One(path) => vec![path],
            ProcessedPath::Many(paths) => paths,
        }
    }
}

/// A strategy for deriving artifacts from a fetched file (§4.6). Idempotence
/// invariant: when `action == Fetched` and the derived artifacts already
/// exist, a processor recomputes only the return value, doing no work.
#[auto_impl(&, Box, Rc, Arc)]
pub trait Processor {
    fn process(&self, path: &std::path::Path, action: Action) -> Result<ProcessedPath>;
}
