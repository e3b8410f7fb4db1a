use reqwest::StatusCode;
use std::fmt;
use tracing::{debug, info};

use crate::client::Client;
use crate::config::load_credentials;
use crate::error::{Error, Result, format_api_error};

/// NASA Earthdata login used to open an AppEEARS session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `APPEEARS_USERNAME` / `APPEEARS_PASSWORD`, falling back to `.appeearsrc`.
    pub fn from_env() -> Result<Self> {
        Ok(load_credentials(None, None)?)
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token returned by `POST /login`.
///
/// Expiry is recorded when the server reports it but never checked locally.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    expiration: Option<String>,
}

impl Session {
    /// Wraps a token obtained elsewhere.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expiration: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expiration(&self) -> Option<&str> {
        self.expiration.as_deref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct LoginReply {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration: Option<String>,
}

impl Client {
    /// Exchanges credentials for a bearer token.
    ///
    /// A refused login or a reply without a `token` field is [`Error::InvalidCredentials`].
    pub fn start_session(&self, credentials: &Credentials) -> Result<Session> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(Error::InvalidCredentials);
        }

        let url = self.endpoint("login");
        debug!(%url, username = %credentials.username, "Logging in");

        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .form(&[("grant_type", "client_credentials")])
            .send()?;

        let status = resp.status();
        if status.is_server_error() {
            let text = resp.text().unwrap_or_default();
            return Err(format_api_error(status, &url, &text));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::InvalidCredentials);
        }

        let text = resp.text()?;

        let reply = serde_json::from_str::<LoginReply>(&text).unwrap_or_default();
        match reply.token {
            Some(token) if status.is_success() && !token.is_empty() => {
                info!(username = %credentials.username, "Session started");
                Ok(Session {
                    token,
                    expiration: reply.expiration,
                })
            }
            _ => Err(Error::InvalidCredentials),
        }
    }

    /// Invalidates the token on the server (`POST /logout`).
    pub fn end_session(&self, session: &Session) -> Result<()> {
        let url = self.endpoint("logout");
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(session.token())
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(format_api_error(status, &url, &text));
        }
        debug!("Session ended");
        Ok(())
    }
}
