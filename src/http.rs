//! Release page and package downloads over HTTP
//!
//! Only idempotent GETs are retried: a bounded number of attempts with
//! exponential backoff, on transport errors and on a fixed set of server
//! error statuses. Everything else is reported on the first failure.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use crate::catalog::ReleaseVersion;
use crate::error::{InstallerError, Result};

/// Statuses worth retrying (521 is Cloudflare's "origin down")
pub const RETRY_STATUSES: &[u16] = &[500, 502, 503, 504, 521];

/// Where releases come from.
///
/// The orchestrator only talks to this trait, so tests can serve pages and
/// packages from memory.
pub trait ReleaseSource {
    /// Fetch the raw release listing page
    fn fetch_index(&self) -> Result<String>;

    /// Download `filename` of release `version` to `dest`.
    ///
    /// On success `dest` holds the complete file.
    fn fetch_asset(&self, version: &ReleaseVersion, filename: &str, dest: &Path) -> Result<()>;
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each further one
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub fn is_retryable(status: StatusCode) -> bool {
        RETRY_STATUSES.contains(&status.as_u16())
    }
}

/// GitHub releases page of the kernel project
pub struct GithubReleases {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl GithubReleases {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            // Packages are large; no overall deadline, only per-connection ones
            .timeout(None)
            .build()
            .map_err(|e| InstallerError::Http {
                url: base_url.to_string(),
                source: e,
            })?;
        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `<base>/download/<version>/<filename>`
    pub fn asset_url(&self, version: &ReleaseVersion, filename: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                InstallerError::config(format!("release URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(["download", version.as_str(), filename]);
        Ok(url)
    }

    /// GET `url`, retrying per policy, and require a success status.
    fn get(&self, url: &Url) -> Result<Response> {
        let mut attempt = 1;
        loop {
            debug!(%url, attempt, "GET");
            match self.client.get(url.clone()).send() {
                Ok(response)
                    if RetryPolicy::is_retryable(response.status())
                        && attempt < self.retry.attempts =>
                {
                    warn!(%url, status = %response.status(), attempt, "Server error, retrying");
                }
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().unwrap_or_default();
                    return Err(InstallerError::Request {
                        url: url.to_string(),
                        status,
                        body,
                    });
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retry.attempts => {
                    warn!(%url, error = %e, attempt, "Request failed, retrying");
                }
                Err(e) => {
                    return Err(InstallerError::Http {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
            thread::sleep(self.retry.delay(attempt));
            attempt += 1;
        }
    }
}

impl ReleaseSource for GithubReleases {
    fn fetch_index(&self) -> Result<String> {
        let response = self.get(&self.base_url)?;
        response.text().map_err(|e| InstallerError::Http {
            url: self.base_url.to_string(),
            source: e,
        })
    }

    fn fetch_asset(&self, version: &ReleaseVersion, filename: &str, dest: &Path) -> Result<()> {
        let url = self.asset_url(version, filename)?;
        let mut response = self.get(&url)?;

        // Stream into a side file so an interrupted download never sits at `dest`
        let partial = partial_path(dest);
        let written = stream_to_file(&mut response, &url, &partial)
            .and_then(|written| {
                fs::rename(&partial, dest)?;
                Ok(written)
            })
            .inspect_err(|_| {
                let _ = fs::remove_file(&partial);
            })?;

        info!(%url, bytes = written, "Downloaded {}", filename);
        Ok(())
    }
}

fn stream_to_file(response: &mut Response, url: &Url, path: &Path) -> Result<u64> {
    let mut file = fs::File::create(path)?;
    let written = response.copy_to(&mut file).map_err(|e| InstallerError::Http {
        url: url.to_string(),
        source: e,
    })?;
    file.sync_all()?;
    Ok(written)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    PathBuf::from(partial)
}
