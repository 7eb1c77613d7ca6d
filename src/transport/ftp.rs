//! FTP transport (§4.5.b). Parses host/port/path/credentials out of the URL
//! and drives a passive-mode data connection via `suppaftp` (no FTP crate
//! appears anywhere among this repo's grounding material; this is the
//! standard real-world crate for the protocol, picked in its place).

use std::io::Write;
use std::path::Path;

use suppaftp::FtpStream;

use crate::prelude::*;
use crate::transport::{FetchContext, Transport};

pub struct FtpTransport;

impl FtpTransport {
    pub fn new() -> FtpTransport {
        FtpTransport
    }

    fn connect(url: &Url) -> Result<FtpStream> {
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::DownloadFailure {
                url: url.to_string(),
                message: "ftp url has no host".to_string(),
            })?;
        let port = url.port().unwrap_or(21);
        let mut stream =
            FtpStream::connect((host, port)).map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let username = if url.username().is_empty() {
            "anonymous"
        } else {
            url.username()
        };
        let password = url.password().unwrap_or("anonymous@");
        stream
            .login(username, password)
            .map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        stream
            .set_mode(suppaftp::types::Mode::Passive);
        Ok(stream)
    }
}

impl Default for FtpTransport {
    fn default() -> Self {
        FtpTransport::new()
    }
}

impl Transport for FtpTransport {
    fn download(&self, url: &str, destination: &Path, _ctx: &FetchContext) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let dir = destination.parent().ok_or_else(|| {
            FetchError::path_error(destination, "destination has no parent directory")
        })?;
        let mut stream = Self::connect(&parsed)?;
        let mut reader = stream
            .retr_as_stream(parsed.path())
            .map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| FetchError::path_error(dir, e.to_string()))?;
        std::io::copy(&mut reader, &mut tmp).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        tmp.flush().ok();
        stream
            .finalize_retr_stream(Box::new(reader))
            .map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        tmp.persist(destination)
            .map_err(|e| FetchError::path_error(destination, e.to_string()))?;
        Ok(())
    }

    fn is_available(&self, url: &str, _ctx: &FetchContext) -> Result<bool> {
        let parsed = Url::parse(url).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let path = std::path::Path::new(parsed.path());
        let parent = path.parent().unwrap_or_else(|| std::path::Path::new("/"));
        let basename = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Ok(false),
        };
        let mut stream = Self::connect(&parsed)?;
        let listing = stream
            .list(Some(&parent.to_string_lossy()))
            .map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(listing.iter().any(|entry| entry.contains(&basename)))
    }
}
