//! Component E — the transport abstraction and its concrete implementations.
//!
//! `Transport` is a small capability (`download` + `is_available`), not a
//! class hierarchy: concrete transports are independent strategies selected
//! by URL scheme (§4.5.e), and a caller-supplied transport always overrides
//! that selection.

mod doi;
mod ftp;
mod http;
mod sftp;

pub use doi::DoiTransport;
pub use ftp::FtpTransport;
pub use http::HttpTransport;
pub use sftp::SftpTransport;

use std::path::Path;

use auto_impl::auto_impl;

use crate::prelude::*;

/// Progress reporting sink, injected into transports (§6). Optional:
/// transports must function with no sink attached.
pub trait ProgressSink {
    fn set_total(&self, bytes: u64);
    fn update(&self, bytes_done: u64);
    fn reset(&self);
    fn close(&self);
}

/// Supplies `(username, password)` for a URL/host, for auth-capable
/// transports (§6). Optional.
pub trait CredentialProvider {
    fn credentials(&self, url: &Url) -> Option<(String, String)>;
}

/// Collaborators injected for the duration of one `fetch` call. Never a
/// process-global — built fresh (or borrowed) per call.
#[derive(Default)]
pub struct FetchContext<'a> {
    pub progress: Option<&'a dyn ProgressSink>,
    pub credentials: Option<&'a dyn CredentialProvider>,
}

/// Common transport contract (§4.5). `download` must stream to a temporary
/// path in the destination's directory and either complete fully or leave
/// no partial file at `destination` — the state machine, not the
/// transport, performs the final rename.
#[auto_impl(&, Box, Rc, Arc)]
pub trait Transport {
    fn download(&self, url: &str, destination: &Path, ctx: &FetchContext) -> Result<()>;
    fn is_available(&self, url: &str, ctx: &FetchContext) -> Result<bool>;
}

/// Picks a transport by URL scheme (§4.5.e). Returns `UnsupportedScheme`
/// for anything else.
pub fn select_for_scheme(url: &str, retry_count: u32) -> Result<Box<dyn Transport>> {
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .unwrap_or(url);
    match scheme {
        "http" | "https" => Ok(Box::new(HttpTransport::new(retry_count))),
        "ftp" => Ok(Box::new(FtpTransport::new())),
        "sftp" => Ok(Box::new(SftpTransport::new())),
        "doi" => Ok(Box::new(DoiTransport::new(retry_count))),
        other => Err(FetchError::UnsupportedScheme {
            scheme: other.to_string(),
            url: url.to_string(),
        }),
    }
}
