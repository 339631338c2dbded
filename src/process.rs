use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DubError, Result};

/// External program invocation with an explicit timeout
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    pub cwd: Option<PathBuf>,
    pub envs: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl ExternalCommand {
    /// Create a new command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            cwd: None,
            envs: BTreeMap::new(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a path argument
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run to completion and return the raw output, whatever the exit status.
    ///
    /// A timeout is reported as [`DubError::Transport`] so it counts against
    /// the caller's retry budget. The child is killed when the timeout or the
    /// cancellation token fires.
    pub async fn output(&self, cancel: &CancellationToken) -> Result<Output> {
        debug!("Executing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| {
            DubError::Transport(format!("Failed to start {} ({}): {}", self.description, self.binary_path, e))
        })?;

        tokio::select! {
            _ = cancel.cancelled() => {
                Err(DubError::Cancelled(format!("{} cancelled", self.description)))
            }
            waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                Ok(output) => Ok(output?),
                Err(_) => Err(DubError::Transport(format!(
                    "{} timed out after {}s",
                    self.description,
                    self.timeout.as_secs()
                ))),
            },
        }
    }

    /// Run and map a non-zero exit status through `on_failure`
    pub async fn execute_with<F>(&self, cancel: &CancellationToken, on_failure: F) -> Result<Output>
    where
        F: FnOnce(String) -> DubError,
    {
        let output = self.output(cancel).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = tail_lines(&stderr, 12);
            return Err(on_failure(format!("{} failed ({}): {}", self.description, output.status, tail)));
        }
        Ok(output)
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
