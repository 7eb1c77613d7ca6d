//! SFTP transport (§4.5.c). Grounded on `ssh2`, the SSH/SFTP crate used by
//! the smartcopy remote-transfer example in this repo's reference material.

use std::io::Write;
use std::net::TcpStream;
use std::path::Path;

use ssh2::Session;

use crate::prelude::*;
use crate::transport::{FetchContext, Transport};

pub struct SftpTransport;

impl SftpTransport {
    pub fn new() -> SftpTransport {
        SftpTransport
    }

    fn session(url: &Url, ctx: &FetchContext) -> Result<Session> {
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::DownloadFailure {
                url: url.to_string(),
                message: "sftp url has no host".to_string(),
            })?;
        let port = url.port().unwrap_or(22);
        let tcp = TcpStream::connect((host, port)).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let mut session = Session::new().map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let (username, password) = if !url.username().is_empty() {
            (url.username().to_string(), url.password().map(str::to_string))
        } else if let Some((user, pass)) = ctx.credentials.and_then(|provider| provider.credentials(url)) {
            (user, Some(pass))
        } else {
            return Err(FetchError::DownloadFailure {
                url: url.to_string(),
                message: "no credentials supplied for sftp transport".to_string(),
            });
        };
        match password {
            Some(password) => session.userauth_password(&username, &password),
            None => session.userauth_agent(&username),
        }
        .map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(session)
    }
}

impl Default for SftpTransport {
    fn default() -> Self {
        SftpTransport::new()
    }
}

impl Transport for SftpTransport {
    fn download(&self, url: &str, destination: &Path, ctx: &FetchContext) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let dir = destination.parent().ok_or_else(|| {
            FetchError::path_error(destination, "destination has no parent directory")
        })?;
        let session = Self::session(&parsed, ctx)?;
        let sftp = session.sftp().map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let mut remote = sftp
            .open(Path::new(parsed.path()))
            .map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| FetchError::path_error(dir, e.to_string()))?;
        std::io::copy(&mut remote, &mut tmp).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        tmp.flush().ok();
        tmp.persist(destination)
            .map_err(|e| FetchError::path_error(destination, e.to_string()))?;
        Ok(())
    }

    fn is_available(&self, url: &str, ctx: &FetchContext) -> Result<bool> {
        let parsed = Url::parse(url).map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let session = Self::session(&parsed, ctx)?;
        let sftp = session.sftp().map_err(|e| FetchError::DownloadFailure {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(sftp.stat(Path::new(parsed.path())).is_ok())
    }
}
