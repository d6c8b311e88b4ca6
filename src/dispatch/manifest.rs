//! Dispatch manifest
//!
//! Every dispatch writes a JSON record of the jobs it planned into the logs
//! directory: which operation ran, in what mode, and the exact command per job.
//! On a dry run this file is the primary artifact; on a live run it is the
//! paper trail for re-running individual jobs by hand.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::dispatcher::{DispatchReport, JobHandle};

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchManifest {
    pub run_id: String,
    pub created_at: String,
    /// Operation that produced this dispatch (run, summarize, ...)
    pub operation: String,
    pub dry_run: bool,
    pub jobs: Vec<PlannedJob>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlannedJob {
    pub job_name: String,
    pub program: String,
    pub args: Vec<String>,
    /// What happened to the job: queued, executed, planned, failed, skipped
    pub disposition: String,
}

fn disposition(handle: &JobHandle) -> &'static str {
    match handle {
        JobHandle::Queued { .. } => "queued",
        JobHandle::Executed { exit_ok: true } => "executed",
        JobHandle::Executed { exit_ok: false } => "failed",
        JobHandle::Planned { .. } => "planned",
        JobHandle::SubmitFailed => "submit-failed",
        JobHandle::Skipped => "skipped",
    }
}

impl DispatchManifest {
    pub fn from_report(operation: &str, dry_run: bool, report: &DispatchReport) -> Self {
        let jobs = report
            .records
            .iter()
            .map(|record| PlannedJob {
                job_name: record.item.job_name(),
                program: record
                    .command
                    .as_ref()
                    .map(|c| c.program.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                args: record
                    .command
                    .as_ref()
                    .map(|c| c.args.clone())
                    .unwrap_or_default(),
                disposition: disposition(&record.handle).to_string(),
            })
            .collect();

        Self {
            run_id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339(),
            operation: operation.to_string(),
            dry_run,
            jobs,
        }
    }

    /// Write the manifest as `<logs_dir>/<operation>_manifest.json`
    pub async fn write(&self, logs_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(logs_dir)
            .await
            .with_context(|| format!("Failed to create {}", logs_dir.display()))?;
        let path = logs_dir.join(format!("{}_manifest.json", self.operation));
        let body = serde_json::to_vec_pretty(self).context("Failed to serialize manifest")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        info!("Dispatch manifest written to {}", path.display());
        Ok(path)
    }
}
