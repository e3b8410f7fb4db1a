//! A small blocking Rust client for the NASA AppEEARS API.
//!
//! This crate implements the usual AppEEARS retrieval flow:
//! log in, submit an area or point extraction task, wait for it to finish,
//! then download every file of the resulting bundle.
//!
//! ## Quick start
//! - Configure credentials via environment variables (`APPEEARS_USERNAME`,
//!   `APPEEARS_PASSWORD`) or a `.appeearsrc` file (current or home directory).
//! - Describe the task with [`TaskDescriptor`] and call [`Client::get_data`].
//!
//! ```no_run
//! use appeears::{Client, Credentials, Geometry, Point, PollOptions, TaskDescriptor};
//! use std::path::Path;
//!
//! fn main() -> appeears::Result<()> {
//!     let client = Client::from_env()?;
//!     let credentials = Credentials::from_env()?;
//!     let task = TaskDescriptor::new(
//!         "twin-cities-lst",
//!         "MOD11A1.061",
//!         ["LST_Day_1km"],
//!         "01-01-2020",
//!         "01-31-2020",
//!         Geometry::Points(vec![Point::new(45.0, -93.2, "P1", "Urban")]),
//!     );
//!
//!     let outcome = client.get_data(&credentials, &task, Path::new("."), &PollOptions::every(60));
//!     println!("{}", outcome.message);
//!     Ok(())
//! }
//! ```
//!
//! Each step is also available on its own: [`Client::start_session`],
//! [`Client::start_task`], [`Client::task_status`], [`Client::is_task_done`],
//! [`Client::fetch_bundle`] and [`Client::download_bundle_files`].

#![forbid(unsafe_code)]

mod bundle;
mod client;
mod config;
mod error;
mod orchestrator;
mod poll;
mod request;
mod session;
mod task;
mod util;

pub use bundle::{Bundle, BundleFile};
pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use orchestrator::{AppeearsApi, Outcome, Stage, StageError, get_data, try_get_data};
pub use poll::{CancelToken, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, PollOptions, wait_for_task};
pub use request::{
    AreaOutput, Coordinate, Geometry, Point, TaskDescriptor, TaskRequest, TaskType,
    build_task_request,
};
pub use session::{Credentials, Session};
pub use task::{TaskHandle, TaskProgress, TaskStatus};
pub use util::sanitize_file_name;
