//! Job execution collaborators
//!
//! The dispatcher talks to one `JobRunner`: local execution runs the command
//! synchronously and reports whether it exited cleanly; cluster submission
//! hands the command to the batch queue under a derived job name and returns as
//! soon as the scheduler has accepted it. Exit status is best-effort either
//! way; the runner never decides whether the pipeline continues.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::command::CommandLine;

/// Resources requested for one queued job
#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    /// Processors per node
    pub ppn: u32,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self { ppn: 1 }
    }
}

/// Executes commands locally or submits them to a batch queue
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the command to completion; `Ok(true)` means a clean exit
    async fn run_local(&self, command: &CommandLine) -> Result<bool>;

    /// Submit the command to the queue under `job_name`
    async fn submit(
        &self,
        command: &CommandLine,
        job_name: &str,
        resources: &ResourceSpec,
    ) -> Result<()>;
}

/// Production runner: local processes, plus qsub-style queue submission
///
/// Submission writes a small shell script under the logs directory and hands it
/// to the configured submit executable, directing the job's stdout/stderr back
/// into the logs directory as well.
pub struct ProcessJobRunner {
    submit_bin: String,
    logs_dir: PathBuf,
}

impl ProcessJobRunner {
    pub fn new(submit_bin: impl Into<String>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            submit_bin: submit_bin.into(),
            logs_dir: logs_dir.into(),
        }
    }

    async fn write_job_script(&self, command: &CommandLine, job_name: &str) -> Result<PathBuf> {
        let scripts_dir = self.logs_dir.join("scripts");
        tokio::fs::create_dir_all(&scripts_dir)
            .await
            .with_context(|| format!("Failed to create {}", scripts_dir.display()))?;

        let script_path = scripts_dir.join(format!("{}.sh", job_name));
        let mut file = tokio::fs::File::create(&script_path)
            .await
            .with_context(|| format!("Failed to create {}", script_path.display()))?;
        file.write_all(format!("#!/bin/sh\n{}\n", command.display()).as_bytes())
            .await?;
        file.flush().await?;
        Ok(script_path)
    }
}

#[async_trait]
impl JobRunner for ProcessJobRunner {
    async fn run_local(&self, command: &CommandLine) -> Result<bool> {
        let status = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .status()
            .await
            .with_context(|| format!("Failed to launch {}", command.program.display()))?;
        Ok(status.success())
    }

    async fn submit(
        &self,
        command: &CommandLine,
        job_name: &str,
        resources: &ResourceSpec,
    ) -> Result<()> {
        let script_path = self.write_job_script(command, job_name).await?;

        let status = tokio::process::Command::new(&self.submit_bin)
            .arg("-N")
            .arg(job_name)
            .arg("-l")
            .arg(format!("nodes=1:ppn={}", resources.ppn))
            .arg("-o")
            .arg(&self.logs_dir)
            .arg("-e")
            .arg(&self.logs_dir)
            .arg(&script_path)
            .status()
            .await
            .with_context(|| format!("Failed to launch {}", self.submit_bin))?;

        if !status.success() {
            return Err(anyhow!(
                "{} rejected job '{}' (exit status {:?})",
                self.submit_bin,
                job_name,
                status.code()
            ));
        }
        Ok(())
    }
}
