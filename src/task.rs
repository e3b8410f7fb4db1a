use reqwest::StatusCode;
use std::fmt;
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{Error, Result, format_api_error};
use crate::request::TaskDescriptor;
use crate::session::Session;

/// Server-assigned id of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: String,
}

impl TaskHandle {
    /// Refers to a task submitted earlier, e.g. in another process.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct TaskReply {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Progress block of a status reply.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct TaskProgress {
    /// Overall completion percentage.
    #[serde(default)]
    pub summary: Option<f64>,
}

/// Parsed body of `GET /status/{task_id}`.
///
/// Informational only: completion is signalled by the HTTP 303, see [`TaskStatus::done`].
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub task_id: Option<String>,
    /// Server state, e.g. `queued`, `pending`, `processing`, `error`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<TaskProgress>,
    #[serde(default)]
    pub message: Option<String>,
    /// Set from the HTTP status, never from the body.
    #[serde(skip)]
    pub done: bool,
}

impl TaskStatus {
    pub fn percent(&self) -> Option<f64> {
        self.progress.as_ref().and_then(|p| p.summary)
    }

    /// The server reported the task as errored.
    pub fn is_failed(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

impl Client {
    /// Submits `descriptor` as a new task.
    ///
    /// A reply without `task_id` is [`Error::InvalidTask`], carrying the server's
    /// `message` when it sent one.
    pub fn start_task(&self, session: &Session, descriptor: &TaskDescriptor) -> Result<TaskHandle> {
        let request = descriptor.to_request()?;
        let url = self.endpoint("task");
        debug!(%url, task_name = request.task_name(), task_type = request.task_type().as_str(), "Submitting task");

        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(session.token())
            .json(&request)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;

        if status.is_server_error()
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            return Err(format_api_error(status, &url, &text));
        }

        let reply = serde_json::from_str::<TaskReply>(&text).unwrap_or_default();
        match reply.task_id {
            Some(id) if status.is_success() && !id.is_empty() => {
                info!(task_id = %id, task_name = request.task_name(), "Task submitted");
                Ok(TaskHandle { id })
            }
            _ => Err(Error::InvalidTask {
                message: reply.message,
            }),
        }
    }

    /// Current status body of a task.
    pub fn task_status(&self, session: &Session, task: &TaskHandle) -> Result<TaskStatus> {
        self.check_status(session, task)
    }

    /// `true` iff the status endpoint answers with HTTP 303.
    ///
    /// The progress percentage in the body is ignored.
    pub fn is_task_done(&self, session: &Session, task: &TaskHandle) -> Result<bool> {
        Ok(self.check_status(session, task)?.done)
    }

    fn check_status(&self, session: &Session, task: &TaskHandle) -> Result<TaskStatus> {
        let url = self.endpoint(&format!("status/{}", task.id()));
        let resp = self.authorized_get(session, &url).send()?;

        let code = resp.status();
        if code != StatusCode::SEE_OTHER && !code.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(format_api_error(code, &url, &text));
        }

        // Completion is the status code alone; the body is informational.
        let text = resp.text()?;
        let mut status = match serde_json::from_str::<TaskStatus>(&text) {
            Ok(status) => status,
            Err(e) => {
                debug!(task_id = task.id(), error = %e, "Unreadable status body");
                TaskStatus::default()
            }
        };
        status.done = code == StatusCode::SEE_OTHER;

        debug!(
            task_id = task.id(),
            done = status.done,
            state = status.status.as_deref().unwrap_or("unknown"),
            percent = status.percent(),
            "Task status"
        );
        Ok(status)
    }
}
