use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for AppEEARS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the individual client operations.
///
/// The orchestrated [`get_data`](crate::get_data) flow never returns these directly;
/// it wraps them into an [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
pub enum Error {
    /// Login was refused or the server reply carried no token.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The task description could not be turned into a valid request payload.
    #[error("invalid task request: {0}")]
    InvalidRequest(String),

    /// The server did not hand back a task id.
    #[error("task was not accepted{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    InvalidTask { message: Option<String> },

    /// The bundle reply had no files.
    #[error("bundle for task {task_id} lists no files")]
    InvalidBundle { task_id: String },

    /// Fetching or writing one of the bundle files failed.
    #[error("failed to download {file_name} for task {task_id}: {source}")]
    DownloadFailure {
        task_id: String,
        file_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The status endpoint reported the task as errored.
    #[error("task {task_id} failed{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    TaskFailed {
        task_id: String,
        message: Option<String>,
    },

    /// The wait loop ran out of time or attempts before the task completed.
    #[error("timed out waiting for task {task_id} after {attempts} status check(s)")]
    TimedOut { task_id: String, attempts: u32 },

    #[error("cancelled while waiting for task {task_id}")]
    Cancelled { task_id: String },

    /// Non-success HTTP reply from the API.
    #[error("{message}")]
    Api {
        status: u16,
        url: String,
        message: String,
        server_message: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse API JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl Error {
    /// Message supplied by the server, if the error came from an API reply that had one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Error::InvalidTask { message } | Error::TaskFailed { message, .. } => message.as_deref(),
            Error::Api { server_message, .. } => server_message.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn download(
        task_id: &str,
        file_name: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::DownloadFailure {
            task_id: task_id.to_string(),
            file_name: file_name.to_string(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) message: Option<String>,
    // Some gateways answer with {"error": ...} or {"detail": ...}
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
}

impl ApiErrorResponse {
    pub(crate) fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .or(self.detail.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}

pub(crate) fn format_api_error(status: StatusCode, url: &str, body: &str) -> Error {
    let parsed = serde_json::from_str::<ApiErrorResponse>(body).unwrap_or_default();
    let server_message = parsed.text().map(str::to_string);
    let shown = server_message.as_deref().unwrap_or(body.trim());

    let message = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        format!(
            "AppEEARS authentication/authorization failed (HTTP {}).\n- Check your NASA Earthdata username and password\n- Bearer tokens expire; start a new session and retry\n\nServer message: {}\nrequest: {}",
            status.as_u16(),
            shown,
            url
        )
    } else if status == StatusCode::NOT_FOUND {
        format!(
            "AppEEARS API endpoint or task not found (HTTP 404).\n- The task id may be wrong, or your configured base URL is incorrect\n- Recommended url: {}\n\nServer message: {}\nrequest: {}",
            crate::config::DEFAULT_URL,
            shown,
            url
        )
    } else {
        format!(
            "API request failed: HTTP {} for url ({})\n{}",
            status.as_u16(),
            url,
            shown
        )
    };

    Error::Api {
        status: status.as_u16(),
        url: url.to_string(),
        message,
        server_message,
    }
}
