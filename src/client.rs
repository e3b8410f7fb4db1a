use anyhow::Context;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::load_config;
use crate::error::{Result, format_api_error};
use crate::poll::PollOptions;
use crate::request::TaskDescriptor;
use crate::session::{Credentials, Session};
use crate::util::urljoin;
use crate::{Outcome, orchestrator};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, typically `https://appeears.earthdatacloud.nasa.gov/api`.
    pub url: String,
    /// Base URL for bundle file downloads. Usually the same as `url`.
    pub bundle_url: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

/// Blocking AppEEARS API client.
///
/// Holds the base URLs and HTTP connections; sessions and task handles are
/// passed explicitly to every call.
#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    bundle_url: String,

    pub(crate) timeout: Duration,
    pub(crate) progress: bool,

    // API calls must see the 303 the status endpoint uses to signal completion,
    // so this client never follows redirects.
    pub(crate) http: HttpClient,
    // Bundle files may be served through a redirect to object storage.
    pub(crate) downloads: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.appeearsrc`.
    ///
    /// This is equivalent to `Client::new(None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url` argument
    /// - environment variables `APPEEARS_URL` / `APPEEARS_BUNDLE_URL`
    /// - config file from `APPEEARS_RC` or `.appeearsrc`
    /// - the public AppEEARS endpoint
    pub fn new(url: Option<String>, verify: Option<bool>) -> Result<Self> {
        let cfg = load_config(url, verify)?;
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("appeears-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("appeears-rs")),
        );

        let mut api = HttpClient::builder()
            .default_headers(default_headers.clone())
            .redirect(Policy::none());
        let mut downloads = HttpClient::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .redirect(Policy::limited(10));

        if !cfg.verify {
            api = api.danger_accept_invalid_certs(true);
            downloads = downloads.danger_accept_invalid_certs(true);
        }

        let http = api.build().context("failed to build HTTP client")?;
        let downloads = downloads
            .build()
            .context("failed to build download HTTP client")?;

        Ok(Self {
            url: cfg.url,
            bundle_url: cfg.bundle_url,
            timeout: Duration::from_secs(60),
            progress: true,
            http,
            downloads,
        })
    }

    /// Per-request timeout for API calls. Downloads are not limited.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_bundle_url(mut self, bundle_url: impl Into<String>) -> Self {
        self.bundle_url = bundle_url.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bundle_url(&self) -> &str {
        &self.bundle_url
    }

    /// Runs the whole login → submit → wait → bundle → download sequence.
    ///
    /// See [`get_data`](crate::get_data).
    pub fn get_data(
        &self,
        credentials: &Credentials,
        descriptor: &TaskDescriptor,
        destination: &Path,
        poll: &PollOptions,
    ) -> Outcome {
        orchestrator::get_data(self, credentials, descriptor, destination, poll)
    }

    /// Like [`Client::get_data`], but returns the structured error.
    pub fn try_get_data(
        &self,
        credentials: &Credentials,
        descriptor: &TaskDescriptor,
        destination: &Path,
        poll: &PollOptions,
    ) -> std::result::Result<Vec<PathBuf>, orchestrator::StageError> {
        orchestrator::try_get_data(self, credentials, descriptor, destination, poll)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        urljoin(&self.url, path)
    }

    pub(crate) fn bundle_endpoint(&self, path: &str) -> String {
        urljoin(&self.bundle_url, path)
    }

    pub(crate) fn authorized_get(&self, session: &Session, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .timeout(self.timeout)
            .bearer_auth(session.token())
    }

    /// GET `url` with the session token and decode a JSON reply.
    pub(crate) fn api_json<T: DeserializeOwned>(&self, session: &Session, url: &str) -> Result<T> {
        let resp = self.authorized_get(session, url).send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(format_api_error(status, url, &text));
        }

        let text = resp.text()?;

        Ok(serde_json::from_str::<T>(&text)?)
    }
}
