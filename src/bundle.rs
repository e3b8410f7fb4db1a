use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{Error, Result, format_api_error};
use crate::session::Session;
use crate::task::TaskHandle;
use crate::util::sanitize_file_name;

/// One output file of a completed task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct BundleFile {
    pub file_id: String,
    /// Server-side name; may contain `/`.
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl BundleFile {
    /// Name used for the local copy: a single path component.
    pub fn local_name(&self) -> String {
        sanitize_file_name(&self.file_name, &self.file_id)
    }
}

/// Manifest of a completed task's output files.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub files: Vec<BundleFile>,
}

impl Client {
    /// Lists the output files of a completed task.
    ///
    /// A reply with no files is [`Error::InvalidBundle`].
    pub fn fetch_bundle(&self, session: &Session, task: &TaskHandle) -> Result<Bundle> {
        let url = self.endpoint(&format!("bundle/{}", task.id()));
        let bundle: Bundle = self.api_json(session, &url)?;

        if bundle.files.is_empty() {
            return Err(Error::InvalidBundle {
                task_id: task.id().to_string(),
            });
        }

        debug!(task_id = task.id(), files = bundle.files.len(), "Bundle fetched");
        Ok(bundle)
    }

    /// Downloads every bundle file into `destination`, in manifest order.
    ///
    /// `destination` must already exist. The first failure stops the loop;
    /// files written before it are left in place.
    pub fn download_bundle_files(
        &self,
        session: Option<&Session>,
        task: &TaskHandle,
        bundle: &Bundle,
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(bundle.files.len());
        for file in &bundle.files {
            let path = self
                .download_file(session, task, file, destination)
                .map_err(|e| Error::download(task.id(), &file.file_name, e))?;
            written.push(path);
        }
        info!(task_id = task.id(), files = written.len(), destination = %destination.display(), "Bundle downloaded");
        Ok(written)
    }

    fn download_file(
        &self,
        session: Option<&Session>,
        task: &TaskHandle,
        file: &BundleFile,
        destination: &Path,
    ) -> Result<PathBuf> {
        let url = self.bundle_endpoint(&format!("bundle/{}/{}", task.id(), file.file_id));
        let target = destination.join(file.local_name());
        debug!(%url, target = %target.display(), "Downloading bundle file");

        let mut req = self.downloads.get(&url);
        if let Some(session) = session {
            req = req.bearer_auth(session.token());
        }
        let mut resp = req.send()?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(format_api_error(status, &url, &text));
        }

        let expected = file.file_size.or(resp.content_length());
        let pb = if self.progress {
            let pb = ProgressBar::new(expected.unwrap_or(0));
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb.set_message(file.local_name());
            Some(pb)
        } else {
            None
        };

        let mut out = BufWriter::new(File::create(&target)?);
        let mut downloaded: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = resp.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            downloaded += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }
        out.flush()?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        if let Some(size) = file.file_size {
            if downloaded != size {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("wrote {} byte(s), bundle lists {}", downloaded, size),
                )));
            }
        }

        Ok(target)
    }
}
