//! The composed login → submit → wait → bundle → download flow.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::bundle::Bundle;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::poll::{PollOptions, wait_for_task};
use crate::request::TaskDescriptor;
use crate::session::{Credentials, Session};
use crate::task::{TaskHandle, TaskStatus};

/// The individual API operations the orchestrated flow is built from.
///
/// [`Client`] is the real implementation.
pub trait AppeearsApi {
    fn start_session(&self, credentials: &Credentials) -> Result<Session>;
    fn start_task(&self, session: &Session, descriptor: &TaskDescriptor) -> Result<TaskHandle>;
    fn task_status(&self, session: &Session, task: &TaskHandle) -> Result<TaskStatus>;
    fn is_task_done(&self, session: &Session, task: &TaskHandle) -> Result<bool>;
    fn fetch_bundle(&self, session: &Session, task: &TaskHandle) -> Result<Bundle>;
    fn download_bundle_files(
        &self,
        session: Option<&Session>,
        task: &TaskHandle,
        bundle: &Bundle,
        destination: &Path,
    ) -> Result<Vec<PathBuf>>;
}

impl AppeearsApi for Client {
    fn start_session(&self, credentials: &Credentials) -> Result<Session> {
        Client::start_session(self, credentials)
    }

    fn start_task(&self, session: &Session, descriptor: &TaskDescriptor) -> Result<TaskHandle> {
        Client::start_task(self, session, descriptor)
    }

    fn task_status(&self, session: &Session, task: &TaskHandle) -> Result<TaskStatus> {
        Client::task_status(self, session, task)
    }

    fn is_task_done(&self, session: &Session, task: &TaskHandle) -> Result<bool> {
        Client::is_task_done(self, session, task)
    }

    fn fetch_bundle(&self, session: &Session, task: &TaskHandle) -> Result<Bundle> {
        Client::fetch_bundle(self, session, task)
    }

    fn download_bundle_files(
        &self,
        session: Option<&Session>,
        task: &TaskHandle,
        bundle: &Bundle,
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        Client::download_bundle_files(self, session, task, bundle, destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    Submit,
    Wait,
    FetchBundle,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Authenticate => "authenticate",
            Stage::Submit => "submit",
            Stage::Wait => "wait",
            Stage::FetchBundle => "fetch bundle",
            Stage::Download => "download",
        })
    }
}

/// Failure of one stage of [`try_get_data`].
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    /// Set once submission succeeded.
    pub task_id: Option<String>,
    #[source]
    pub source: Error,
}

impl StageError {
    /// Short, user-facing message for this failure.
    pub fn message(&self) -> String {
        let task_id = self.task_id.as_deref().unwrap_or("?");
        match (self.stage, &self.source) {
            (Stage::Authenticate, _) => "Credentials invalid".to_string(),
            (Stage::Submit, e) => e
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| "Task submission failed".to_string()),
            (Stage::Wait, Error::TimedOut { .. }) => format!("Timed out waiting for task {}", task_id),
            (Stage::Wait, Error::Cancelled { .. }) => {
                format!("Cancelled while waiting for task {}", task_id)
            }
            (Stage::Wait, Error::TaskFailed { .. }) => format!("Task {} failed", task_id),
            (Stage::Wait, _) => format!("Error checking status of task {}", task_id),
            (Stage::FetchBundle, _) => "Invalid bundle".to_string(),
            (Stage::Download, _) => format!("Error downloading/writing files for task {}", task_id),
        }
    }
}

/// Result of [`get_data`]: a success flag and message, plus the details behind them.
#[derive(Debug)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    pub task_id: Option<String>,
    /// Local paths written, in bundle order. Empty on failure.
    pub files: Vec<PathBuf>,
    pub error: Option<StageError>,
}

impl Outcome {
    /// The `(success, message)` pair.
    pub fn as_pair(&self) -> (bool, &str) {
        (self.success, &self.message)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        self.error.as_ref().map(|e| e.stage)
    }
}

impl From<std::result::Result<(String, Vec<PathBuf>), StageError>> for Outcome {
    fn from(result: std::result::Result<(String, Vec<PathBuf>), StageError>) -> Self {
        match result {
            Ok((task_id, files)) => Outcome {
                success: true,
                message: "Successfully downloaded files".to_string(),
                task_id: Some(task_id),
                files,
                error: None,
            },
            Err(e) => Outcome {
                success: false,
                message: e.message(),
                task_id: e.task_id.clone(),
                files: Vec::new(),
                error: Some(e),
            },
        }
    }
}

/// Runs the full retrieval and reports the result as an [`Outcome`].
///
/// Never panics or returns an error; each stage's failure stops the run and
/// becomes the outcome message.
pub fn get_data<A: AppeearsApi + ?Sized>(
    api: &A,
    credentials: &Credentials,
    descriptor: &TaskDescriptor,
    destination: &Path,
    poll: &PollOptions,
) -> Outcome {
    let outcome = Outcome::from(run(api, credentials, descriptor, destination, poll));
    if outcome.success {
        info!(task_id = outcome.task_id.as_deref(), files = outcome.files.len(), "{}", outcome.message);
    } else {
        warn!(
            stage = ?outcome.failed_stage(),
            task_id = outcome.task_id.as_deref(),
            "{}",
            outcome.message
        );
    }
    outcome
}

/// Runs the full retrieval, returning the downloaded paths.
pub fn try_get_data<A: AppeearsApi + ?Sized>(
    api: &A,
    credentials: &Credentials,
    descriptor: &TaskDescriptor,
    destination: &Path,
    poll: &PollOptions,
) -> std::result::Result<Vec<PathBuf>, StageError> {
    run(api, credentials, descriptor, destination, poll).map(|(_, files)| files)
}

fn run<A: AppeearsApi + ?Sized>(
    api: &A,
    credentials: &Credentials,
    descriptor: &TaskDescriptor,
    destination: &Path,
    poll: &PollOptions,
) -> std::result::Result<(String, Vec<PathBuf>), StageError> {
    let session = api
        .start_session(credentials)
        .map_err(fail(Stage::Authenticate, None))?;

    let task = api
        .start_task(&session, descriptor)
        .map_err(fail(Stage::Submit, None))?;

    wait_for_task(api, &session, &task, poll).map_err(fail(Stage::Wait, Some(&task)))?;

    let bundle = api
        .fetch_bundle(&session, &task)
        .map_err(fail(Stage::FetchBundle, Some(&task)))?;

    let files = api
        .download_bundle_files(Some(&session), &task, &bundle, destination)
        .map_err(fail(Stage::Download, Some(&task)))?;

    Ok((task.id().to_string(), files))
}

fn fail(stage: Stage, task: Option<&TaskHandle>) -> impl FnOnce(Error) -> StageError {
    let task_id = task.map(|t| t.id().to_string());
    move |source| StageError {
        stage,
        task_id,
        source,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bundle::BundleFile;
    use crate::request::{Geometry, Point};
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Default)]
    pub(crate) struct Calls {
        pub(crate) login: Cell<u32>,
        pub(crate) submit: Cell<u32>,
        pub(crate) status: Cell<u32>,
        pub(crate) bundle: Cell<u32>,
        pub(crate) download: Cell<u32>,
    }

    /// Scripted [`AppeearsApi`] that counts calls per operation.
    #[derive(Debug)]
    pub(crate) struct StubApi {
        pub(crate) calls: Calls,
        pub(crate) login_ok: bool,
        /// `Ok(task_id)` or `Err(server message)`.
        pub(crate) submit_reply: std::result::Result<String, Option<String>>,
        /// Status check number on which the task reports done.
        pub(crate) done_on: u32,
        pub(crate) status_state: Option<String>,
        /// Every status check fails with a 500.
        pub(crate) status_error: bool,
        pub(crate) bundle_files: Vec<BundleFile>,
        pub(crate) download_ok: bool,
        pub(crate) download_session: RefCell<Option<String>>,
    }

    impl StubApi {
        pub(crate) fn done_after(checks: u32) -> Self {
            Self {
                calls: Calls::default(),
                login_ok: true,
                submit_reply: Ok("task-1".into()),
                done_on: checks,
                status_state: Some("processing".into()),
                status_error: false,
                bundle_files: vec![BundleFile {
                    file_id: "f1".into(),
                    file_name: "a/b.tif".into(),
                    file_size: None,
                    file_type: None,
                    sha256: None,
                }],
                download_ok: true,
                download_session: RefCell::new(None),
            }
        }

        fn bump(cell: &Cell<u32>) -> u32 {
            cell.set(cell.get() + 1);
            cell.get()
        }
    }

    impl AppeearsApi for StubApi {
        fn start_session(&self, _credentials: &Credentials) -> Result<Session> {
            Self::bump(&self.calls.login);
            if self.login_ok {
                Ok(Session::from_token("abc"))
            } else {
                Err(Error::InvalidCredentials)
            }
        }

        fn start_task(&self, _session: &Session, descriptor: &TaskDescriptor) -> Result<TaskHandle> {
            Self::bump(&self.calls.submit);
            descriptor.to_request()?;
            match &self.submit_reply {
                Ok(id) => Ok(TaskHandle::from_id(id.clone())),
                Err(message) => Err(Error::InvalidTask {
                    message: message.clone(),
                }),
            }
        }

        fn task_status(&self, _session: &Session, task: &TaskHandle) -> Result<TaskStatus> {
            let n = Self::bump(&self.calls.status);
            if self.status_error {
                return Err(Error::Api {
                    status: 500,
                    url: format!("stub://status/{}", task.id()),
                    message: "boom".into(),
                    server_message: None,
                });
            }
            Ok(TaskStatus {
                status: self.status_state.clone(),
                done: n >= self.done_on,
                ..TaskStatus::default()
            })
        }

        fn is_task_done(&self, session: &Session, task: &TaskHandle) -> Result<bool> {
            Ok(self.task_status(session, task)?.done)
        }

        fn fetch_bundle(&self, _session: &Session, task: &TaskHandle) -> Result<Bundle> {
            Self::bump(&self.calls.bundle);
            if self.bundle_files.is_empty() {
                return Err(Error::InvalidBundle {
                    task_id: task.id().to_string(),
                });
            }
            Ok(Bundle {
                task_id: Some(task.id().to_string()),
                files: self.bundle_files.clone(),
            })
        }

        fn download_bundle_files(
            &self,
            session: Option<&Session>,
            task: &TaskHandle,
            bundle: &Bundle,
            destination: &Path,
        ) -> Result<Vec<PathBuf>> {
            Self::bump(&self.calls.download);
            *self.download_session.borrow_mut() = session.map(|s| s.token().to_string());
            if !self.download_ok {
                return Err(Error::download(
                    task.id(),
                    &bundle.files[0].file_name,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            Ok(bundle
                .files
                .iter()
                .map(|f| destination.join(f.local_name()))
                .collect())
        }
    }

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor::new(
            "stub",
            "MOD11A1.061",
            ["LST_Day_1km"],
            "01-01-2020",
            "01-31-2020",
            Geometry::Points(vec![Point::new(45.0, -93.2, "P1", "Urban")]),
        )
    }

    fn run_stub(api: &StubApi) -> Outcome {
        get_data(
            api,
            &Credentials::new("u", "p"),
            &descriptor(),
            Path::new("/tmp/out"),
            &PollOptions::default(),
        )
    }

    #[test]
    fn happy_path() {
        let api = StubApi::done_after(1);
        let outcome = run_stub(&api);

        assert_eq!(outcome.as_pair(), (true, "Successfully downloaded files"));
        assert_eq!(outcome.task_id.as_deref(), Some("task-1"));
        assert_eq!(outcome.files, vec![PathBuf::from("/tmp/out/a-b.tif")]);
        assert_eq!(api.download_session.borrow().as_deref(), Some("abc"));
        for count in [&api.calls.login, &api.calls.submit, &api.calls.status, &api.calls.bundle, &api.calls.download] {
            assert_eq!(count.get(), 1);
        }
    }

    #[test]
    fn failed_login_short_circuits() {
        let mut api = StubApi::done_after(1);
        api.login_ok = false;
        let outcome = run_stub(&api);

        assert_eq!(outcome.as_pair(), (false, "Credentials invalid"));
        assert_eq!(outcome.failed_stage(), Some(Stage::Authenticate));
        assert_eq!(api.calls.login.get(), 1);
        assert_eq!(api.calls.submit.get(), 0);
        assert_eq!(api.calls.status.get(), 0);
        assert_eq!(api.calls.bundle.get(), 0);
        assert_eq!(api.calls.download.get(), 0);
    }

    #[test]
    fn rejected_task_reports_server_message() {
        let mut api = StubApi::done_after(1);
        api.submit_reply = Err(Some("Invalid layer".into()));
        let outcome = run_stub(&api);

        assert_eq!(outcome.as_pair(), (false, "Invalid layer"));
        assert_eq!(outcome.task_id, None);
        assert_eq!(api.calls.status.get(), 0);
        assert_eq!(api.calls.bundle.get(), 0);
    }

    #[test]
    fn rejected_task_without_message_is_generic() {
        let mut api = StubApi::done_after(1);
        api.submit_reply = Err(None);
        assert_eq!(run_stub(&api).message, "Task submission failed");
    }

    #[test]
    fn empty_bundle_stops_before_download() {
        let mut api = StubApi::done_after(1);
        api.bundle_files.clear();
        let outcome = run_stub(&api);

        assert_eq!(outcome.as_pair(), (false, "Invalid bundle"));
        assert_eq!(outcome.failed_stage(), Some(Stage::FetchBundle));
        assert_eq!(api.calls.download.get(), 0);
    }

    #[test]
    fn download_failure_names_the_task() {
        let mut api = StubApi::done_after(1);
        api.download_ok = false;
        let outcome = run_stub(&api);

        assert_eq!(
            outcome.as_pair(),
            (false, "Error downloading/writing files for task task-1")
        );
        assert!(matches!(
            outcome.error.as_ref().map(|e| &e.source),
            Some(Error::DownloadFailure { .. })
        ));
    }

    #[test]
    fn wait_timeout_is_reported() {
        let api = StubApi::done_after(u32::MAX);
        let outcome = get_data(
            &api,
            &Credentials::new("u", "p"),
            &descriptor(),
            Path::new("/tmp/out"),
            &PollOptions::default().with_max_attempts(1),
        );

        assert_eq!(outcome.as_pair(), (false, "Timed out waiting for task task-1"));
        assert_eq!(api.calls.bundle.get(), 0);
    }

    #[test]
    fn status_check_error_is_reported() {
        let mut api = StubApi::done_after(1);
        api.status_error = true;
        let outcome = get_data(
            &api,
            &Credentials::new("u", "p"),
            &descriptor(),
            Path::new("/tmp/out"),
            &PollOptions::default(),
        );

        assert_eq!(outcome.as_pair(), (false, "Error checking status of task task-1"));
        assert_eq!(outcome.failed_stage(), Some(Stage::Wait));
        assert_eq!(api.calls.status.get(), 1);
        assert_eq!(api.calls.bundle.get(), 0);
        assert_eq!(api.calls.download.get(), 0);
    }

    #[test]
    fn try_get_data_exposes_structured_error() {
        let mut api = StubApi::done_after(1);
        api.login_ok = false;
        let err = try_get_data(
            &api,
            &Credentials::new("u", "p"),
            &descriptor(),
            Path::new("/tmp/out"),
            &PollOptions::default(),
        )
        .unwrap_err();

        assert_eq!(err.stage, Stage::Authenticate);
        assert!(matches!(err.source, Error::InvalidCredentials));
        assert_eq!(err.to_string(), "authenticate stage failed: invalid credentials");
    }
}
