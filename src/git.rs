//! Git-backed [`ChangeLister`]: which publishable inputs changed since a revision.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::{ChangeLister, InputKind};
use crate::error::ExternalError;

pub struct GitChangeLister {
    repo_dir: PathBuf,
}

impl GitChangeLister {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }
}

fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!(
            "git exited with code {}",
            output.status.code().unwrap_or(-1)
        )
    } else {
        stderr
    }
}

/// Keep the paths of `git diff -z --name-only` output that are publishable inputs.
///
/// Paths are NUL-separated and never quoted, so non-ASCII names come back as-is.
pub fn filter_publishable(diff_output: &str) -> Vec<String> {
    diff_output
        .split('\0')
        .map(|path| path.trim_end_matches('\n'))
        .filter(|path| !path.is_empty())
        .filter(|path| InputKind::from_path(path).is_some())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ChangeLister for GitChangeLister {
    async fn get_changed_inputs(&self, since_revision: &str) -> Result<Vec<String>, ExternalError> {
        info!(
            repo = %self.repo_dir.display(),
            since = since_revision,
            "Listing changed inputs from git"
        );
        if since_revision.starts_with('-') {
            error!(since = since_revision, "Refusing revision that looks like an option");
            return Err(format!("invalid git revision '{since_revision}'").into());
        }
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(["diff", "-z", "--name-only", since_revision, "HEAD"])
            .output()
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to launch git diff");
                e
            })?;

        if !output.status.success() {
            let msg = format_git_error(&output);
            error!(since = since_revision, error = %msg, "git diff failed");
            return Err(format!("git diff against {since_revision} failed: {msg}").into());
        }

        let changed = filter_publishable(&String::from_utf8_lossy(&output.stdout));
        debug!(?changed, "Changed publishable inputs");
        Ok(changed)
    }
}
