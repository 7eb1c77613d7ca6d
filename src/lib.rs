#![forbid(unsafe_code)]
//! `larder` — a client-side data-file cache and fetcher: given a declarative
//! registry of remote files (logical name, content hash, optional per-file
//! URL), guarantees callers get back the absolute local path of a verified,
//! up-to-date copy, downloading only when necessary.
//!
//! The crate is a library; it has no CLI, logging subscriber, or
//! progress-bar renderer of its own — see [`ProgressSink`] and the
//! `tracing` events emitted throughout for the hooks a consumer wires up.
//! Start at [`Fetcher`] for a multi-file registry, or [`retrieve`] for a
//! one-off single-file fetch.

mod cache_path;
mod error;
mod fetch;
mod hash;
mod lock;
mod prelude;
mod process;
mod registry;
mod retrieve;
mod transport;
mod url_compose;

pub use cache_path::{is_dev_version, CacheDescriptor};
pub use error::{FetchError, Result};
pub use fetch::Fetcher;
pub use hash::{hash_file, hashes_match, HashAlgorithm, HashSpec};
pub use process::{
    Action, CompressionMethod, DecompressProcessor, ProcessedPath, Processor, UntarProcessor,
    UnzipProcessor,
};
pub use registry::{Registry, RegistryEntry};
pub use retrieve::{retrieve, RetrieveRequest};
pub use transport::{
    CredentialProvider, DoiTransport, FetchContext, FtpTransport, HttpTransport, ProgressSink,
    SftpTransport, Transport,
};
pub use url_compose::full_url;
