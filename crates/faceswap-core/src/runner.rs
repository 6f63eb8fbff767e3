//! External processing command.
//!
//! The face swap itself happens in a separate program. This module builds
//! its argument vector and waits for it to exit. Arguments are passed as an
//! argv array; no shell ever sees them.

use crate::types::SwapParams;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("processing command exited with {status}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("processing command timed out after {0:?}")]
    TimedOut(Duration),
}

/// One invocation's inputs.
#[derive(Debug, Clone)]
pub struct SwapJob {
    pub source: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
    pub params: SwapParams,
}

/// Captured streams of a successful run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct SwapCommand {
    /// Executable to launch, e.g. `python3`.
    pub program: String,
    /// Leading arguments before the job flags, e.g. `["face_swap.py"]`.
    pub base_args: Vec<String>,
    /// Kill the command after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl SwapCommand {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument vector for `job`, excluding the program itself.
    pub fn args(&self, job: &SwapJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();
        args.push("--source".into());
        args.push(job.source.clone().into_os_string());
        args.push("--target".into());
        args.push(job.target.clone().into_os_string());
        args.push("--output".into());
        args.push(job.output.clone().into_os_string());
        args.push("--blend".into());
        args.push(job.params.blend_strength.to_string().into());
        args.push("--alignment".into());
        args.push(job.params.face_alignment.to_string().into());
        args
    }

    /// Launch the command once and wait for it to exit.
    pub async fn run(&self, job: &SwapJob) -> Result<CommandOutput, RunnerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            program = %self.program,
            source = %job.source.display(),
            target = %job.target.display(),
            output = %job.output.display(),
            blend = job.params.blend_strength,
            alignment = job.params.face_alignment,
            "launching processing command"
        );

        let child = cmd.spawn().map_err(|source| RunnerError::Launch {
            program: self.program.clone(),
            source,
        })?;

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::error!(timeout = ?limit, "processing command timed out; killed");
                    return Err(RunnerError::TimedOut(limit));
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| RunnerError::Launch {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::error!(status = %output.status, stderr = %stderr, "processing command failed");
            return Err(RunnerError::Failed {
                status: output.status,
                stderr,
            });
        }

        tracing::debug!(stdout = %stdout, "processing command finished");
        Ok(CommandOutput { stdout, stderr })
    }
}
