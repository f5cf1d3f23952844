//! Downloads a task's source document into its working directory.

use std::error::Error as _;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::task::ErrorCode;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Source responded with HTTP {0}")]
    Status(u16),

    #[error("Source host could not be resolved: {0}")]
    Dns(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FetchError::Status(status) => ErrorCode::from_http_status(*status),
            FetchError::Dns(_) => ErrorCode::DnsNxdomain,
            FetchError::Transport(_) => ErrorCode::HttpOthersCases,
            FetchError::Io { .. } => ErrorCode::SysInternalError,
        }
    }
}

pub trait SourceFetcher: Send + Sync {
    /// Writes the document at `url` to `dest`, replacing any existing file.
    /// Returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pdfmill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

/// True when a connect error bottoms out in a failed name lookup.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}

fn classify(err: reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        return FetchError::Status(status.as_u16());
    }
    if is_dns_failure(&err) {
        return FetchError::Dns(err.to_string());
    }
    FetchError::Transport(err.to_string())
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self.client.get(url).send().map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = File::create(dest).map_err(|e| FetchError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        response.copy_to(&mut file).map_err(classify)
    }
}
