use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

/// The closed set of ways a fetch, registry parse, or post-process step can
/// fail. Every fallible operation in this crate returns `Result<T, FetchError>`
/// — foreign error types (`ureq::Error`, `std::io::Error`, `zip::result::ZipError`,
/// ...) are wrapped into one of these variants at the module boundary.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unknown file {name:?}: not present in registry")]
    UnknownFile { name: String },

    #[error("malformed registry {source}:{line}: {message}")]
    MalformedRegistry {
        source: String,
        line: usize,
        message: String,
    },

    #[error("unsupported URL scheme {scheme:?} in {url}")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("download of {url} failed: {message}")]
    DownloadFailure { url: String, message: String },

    #[error("hash mismatch for {path:?}: expected {expected}, got {actual}")]
    HashMismatch {
        expected: String,
        actual: String,
        path: PathBuf,
    },

    #[error("local file {path:?} does not match expected hash {expected} and allow_updates is false")]
    HashMismatchLocal { expected: String, path: PathBuf },

    #[error("post-processing {path:?} failed: {message}")]
    ProcessorFailure { path: PathBuf, message: String },

    #[error("path error at {path:?}: {message}")]
    PathError { path: PathBuf, message: String },

    #[error("DOI {doi} is not supported: {message}")]
    DOIUnsupported { doi: String, message: String },
}

impl FetchError {
    pub(crate) fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FetchError::PathError {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::PathError {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}
