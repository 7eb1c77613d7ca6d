//! HTTP(S) transport (§4.5.a). Grounded on the retry-with-backoff and
//! agent-construction patterns used throughout the package-index clients
//! (`net.rs`, `net/net.rs`, `pypi.rs`): a `ureq::Agent` with bounded
//! timeouts, retrying a fixed set of transient statuses/error kinds with a
//! capped exponential backoff.

use std::io;
use std::path::Path;
use std::time::Duration;

use ureq::{Agent, AgentBuilder};

use crate::prelude::*;
use crate::transport::{FetchContext, Transport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_STATUS: &[u16] = &[500, 503, 520, 527];
const RETRY_ERRORKIND: &[ureq::ErrorKind] = &[
    ureq::ErrorKind::Dns,
    ureq::ErrorKind::ConnectionFailed,
    ureq::ErrorKind::TooManyRedirects,
    ureq::ErrorKind::Io,
    ureq::ErrorKind::ProxyConnect,
];

fn backoff_schedule(retry_count: u32) -> Vec<Duration> {
    let mut delay_secs = 1u64;
    (0..retry_count)
        .map(|_| {
            let delay = Duration::from_secs(delay_secs);
            delay_secs = (delay_secs * 2).min(10);
            delay
        })
        .collect()
}

pub struct HttpTransport {
    agent: Agent,
    retry_count: u32,
}

impl HttpTransport {
    pub fn new(retry_count: u32) -> HttpTransport {
        HttpTransport {
            agent: AgentBuilder::new()
                .user_agent(&user_agent())
                .timeout_connect(CONNECT_TIMEOUT)
                .build(),
            retry_count,
        }
    }

    /// Builds a transport against an already-configured agent, used by the
    /// DOI transport to reuse one client for both metadata and artifact
    /// requests.
    pub(crate) fn with_agent(agent: Agent, retry_count: u32) -> HttpTransport {
        HttpTransport { agent, retry_count }
    }

    fn basic_auth_header(url: &str, ctx: &FetchContext) -> Option<String> {
        let provider = ctx.credentials?;
        let parsed = Url::parse(url).ok()?;
        let (user, pass) = provider.credentials(&parsed)?;
        let token = data_encoding::BASE64.encode(format!("{user}:{pass}").as_bytes());
        Some(format!("Basic {token}"))
    }

    fn request(&self, url: &str, ctx: &FetchContext) -> ureq::Request {
        let req = self.agent.get(url);
        match Self::basic_auth_header(url, ctx) {
            Some(header) => req.set("Authorization", &header),
            None => req,
        }
    }

    fn call_with_retry(
        &self,
        make_request: impl Fn() -> ureq::Request,
    ) -> std::result::Result<ureq::Response, ureq::Error> {
        let schedule = backoff_schedule(self.retry_count);
        let mut attempts = schedule.into_iter();
        loop {
            let result = make_request().call();
            let retryable = match &result {
                Ok(_) => return result,
                Err(ureq::Error::Status(status, _)) => RETRY_STATUS.contains(status),
                Err(err @ ureq::Error::Transport(_)) => RETRY_ERRORKIND.contains(&err.kind()),
            };
            if !retryable {
                return result;
            }
            match attempts.next() {
                Some(delay) => std::thread::sleep(delay),
                None => return result,
            }
        }
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, destination: &Path, ctx: &FetchContext) -> Result<()> {
        let dir = destination.parent().ok_or_else(|| {
            FetchError::path_error(destination, "destination has no parent directory")
        })?;
        let response = self
            .call_with_retry(|| self.request(url, ctx))
            .map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let total = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());
        if let (Some(total), Some(progress)) = (total, ctx.progress) {
            progress.set_total(total);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| FetchError::path_error(dir, e.to_string()))?;
        let mut body = response.into_reader();
        let mut buf = [0u8; 65_536];
        let mut done = 0u64;
        loop {
            let n = io::Read::read(&mut body, &mut buf).map_err(|e| FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            io::Write::write_all(&mut tmp, &buf[..n])
                .map_err(|e| FetchError::path_error(dir, e.to_string()))?;
            done += n as u64;
            if let Some(progress) = ctx.progress {
                progress.update(done);
            }
        }
        if let Some(progress) = ctx.progress {
            progress.close();
        }
        tmp.persist(destination)
            .map_err(|e| FetchError::path_error(destination, e.to_string()))?;
        Ok(())
    }

    fn is_available(&self, url: &str, ctx: &FetchContext) -> Result<bool> {
        let req = self.agent.head(url);
        let req = match Self::basic_auth_header(url, ctx) {
            Some(header) => req.set("Authorization", &header),
            None => req,
        };
        match req.call() {
            Ok(response) => Ok((200..300).contains(&response.status())),
            Err(ureq::Error::Status(_, _)) => Ok(false),
            Err(e) => Err(FetchError::DownloadFailure {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

fn user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_schedule_is_capped_at_ten_seconds() {
        let schedule = backoff_schedule(6);
        let secs: Vec<u64> = schedule.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn zero_retries_yields_empty_schedule() {
        assert!(backoff_schedule(0).is_empty());
    }
}
