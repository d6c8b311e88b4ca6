//! Work items and the typed command builder
//!
//! A `WorkItem` names one unit of dispatchable work; the command builder turns
//! it into a structured argument list for the external toolchain. Arguments are
//! built as a list from the start, never by splitting a joined string, so
//! command construction is testable field by field.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::compare::SamplePair;
use crate::layout::{self, InsertLenParams};
use crate::settings::Settings;

/// What kind of external job a work item stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Run,
    Summarize,
    Compare,
    InsertLen,
}

impl JobKind {
    /// Toolchain executable that serves this kind of job
    pub fn program(&self) -> &'static str {
        match self {
            JobKind::Run => "run_analysis",
            JobKind::Summarize => "summarize_analysis",
            JobKind::Compare => "compare_analysis",
            JobKind::InsertLen => "pe_insert_len",
        }
    }
}

/// The sample identity a work item operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkTarget {
    Sample(String),
    Pair(SamplePair),
}

/// One unit of dispatchable work
///
/// Created by the pipeline driver, consumed exactly once by the dispatcher,
/// never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub target: WorkTarget,
    /// Absent only for insert-length jobs, which span all event types
    pub event_type: Option<String>,
    pub kind: JobKind,
}

impl WorkItem {
    pub fn run(sample: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            target: WorkTarget::Sample(sample.into()),
            event_type: Some(event_type.into()),
            kind: JobKind::Run,
        }
    }

    pub fn summarize(sample: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            target: WorkTarget::Sample(sample.into()),
            event_type: Some(event_type.into()),
            kind: JobKind::Summarize,
        }
    }

    pub fn compare(pair: SamplePair, event_type: impl Into<String>) -> Self {
        Self {
            target: WorkTarget::Pair(pair),
            event_type: Some(event_type.into()),
            kind: JobKind::Compare,
        }
    }

    pub fn insert_len(sample: impl Into<String>) -> Self {
        Self {
            target: WorkTarget::Sample(sample.into()),
            event_type: None,
            kind: JobKind::InsertLen,
        }
    }

    /// Job name, unique per (sample identity, event type, kind) by construction
    pub fn job_name(&self) -> String {
        let event = self.event_type.as_deref().unwrap_or_default();
        match (&self.target, self.kind) {
            (WorkTarget::Sample(label), JobKind::Run) => format!("{}_{}", label, event),
            (WorkTarget::Sample(label), JobKind::Summarize) => {
                format!("summarize_{}_{}", label, event)
            }
            (WorkTarget::Sample(label), JobKind::InsertLen) => format!("{}_insert_len", label),
            (WorkTarget::Pair(pair), _) => {
                format!("compare_{}_{}_{}", pair.first, pair.second, event)
            }
            (WorkTarget::Sample(label), JobKind::Compare) => {
                // A compare item always carries a pair; keep the name lawful anyway
                format!("compare_{}_{}", label, event)
            }
        }
    }

    /// Human-readable context for per-item log lines
    pub fn describe(&self) -> String {
        let target = match &self.target {
            WorkTarget::Sample(label) => label.clone(),
            WorkTarget::Pair(pair) => pair.label(),
        };
        match &self.event_type {
            Some(event) => format!("{:?} {} [{}]", self.kind, target, event),
            None => format!("{:?} {}", self.kind, target),
        }
    }
}

/// A structured external command: a program and its argument list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Shell-style rendering, for logs only
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Builds the external command for a work item
pub trait CommandBuilder: Send + Sync {
    fn build(&self, item: &WorkItem) -> Result<CommandLine>;
}

/// Command builder for the external toolchain
///
/// Holds the settings snapshot plus the per-sample parameters the driver
/// resolved up front (read lengths, and insert-length stats in paired-end
/// mode), so building a command is pure lookup with no I/O.
pub struct ToolCommandBuilder {
    settings: Settings,
    use_cluster: bool,
    read_lens: HashMap<String, u32>,
    insert_params: HashMap<String, InsertLenParams>,
}

impl ToolCommandBuilder {
    pub fn new(
        settings: Settings,
        use_cluster: bool,
        read_lens: HashMap<String, u32>,
        insert_params: HashMap<String, InsertLenParams>,
    ) -> Self {
        Self {
            settings,
            use_cluster,
            read_lens,
            insert_params,
        }
    }

    fn tool_path(&self, kind: JobKind) -> PathBuf {
        self.settings.tool.bin_dir.join(kind.program())
    }

    fn sample_path(&self, label: &str) -> Result<PathBuf> {
        self.settings
            .sample(label)
            .map(|s| s.path.clone())
            .ok_or_else(|| anyhow!("unknown sample label '{}'", label))
    }

    fn build_run(&self, label: &str, event_type: &str) -> Result<CommandLine> {
        let settings = &self.settings;
        let bam = self.sample_path(label)?;
        let event_dir = settings.tool.events_dir.join(event_type);
        let output_dir =
            layout::sample_event_dir(&settings.output.analysis_dir, label, event_type);
        let read_len = self
            .read_lens
            .get(label)
            .copied()
            .ok_or_else(|| anyhow!("read length for '{}' was not resolved", label))?;

        let mut command = CommandLine::new(self.tool_path(JobKind::Run))
            .arg("--run")
            .arg_path(&event_dir)
            .arg_path(&bam);
        if let Some(params) = self.insert_params.get(label) {
            command = command
                .arg("--paired-end")
                .arg(format!("{:.2}", params.mean))
                .arg(format!("{:.2}", params.sdev));
        }
        command = command
            .arg("--read-len")
            .arg(read_len.to_string())
            .arg("--overhang-len")
            .arg(settings.data.overhang_len.to_string());
        if settings.tool.prefilter {
            command = command.arg("--prefilter");
        }
        command = command.arg("--output-dir").arg_path(&output_dir);
        if self.use_cluster {
            command = command
                .arg("--use-cluster")
                .arg("--chunk-jobs")
                .arg(settings.tool.chunk_jobs.to_string());
        }
        Ok(command
            .arg("--settings")
            .arg_path(&settings.tool.settings))
    }

    fn build_summarize(&self, label: &str, event_type: &str) -> Result<CommandLine> {
        let dir = layout::sample_event_dir(&self.settings.output.analysis_dir, label, event_type);
        Ok(CommandLine::new(self.tool_path(JobKind::Summarize))
            .arg("--summarize-samples")
            .arg_path(&dir)
            .arg_path(&dir)
            .arg("--summary-label")
            .arg(label))
    }

    fn build_compare(&self, pair: &SamplePair, event_type: &str) -> Result<CommandLine> {
        let settings = &self.settings;
        let first_dir =
            layout::sample_event_dir(&settings.output.analysis_dir, &pair.first, event_type);
        let second_dir =
            layout::sample_event_dir(&settings.output.analysis_dir, &pair.second, event_type);
        let event_comparisons_dir = settings.output.comparisons_dir.join(event_type);

        Ok(CommandLine::new(self.tool_path(JobKind::Compare))
            .arg("--compare-samples")
            .arg_path(&first_dir)
            .arg_path(&second_dir)
            .arg_path(&event_comparisons_dir)
            .arg("--comparison-labels")
            .arg(&pair.first)
            .arg(&pair.second))
    }

    fn build_insert_len(&self, label: &str) -> Result<CommandLine> {
        let settings = &self.settings;
        let bam = self.sample_path(label)?;
        let const_exons = settings
            .data
            .const_exons
            .as_ref()
            .ok_or_else(|| anyhow!("const_exons is not configured"))?;
        let output_dir = settings
            .data
            .insert_lens_dir
            .as_ref()
            .ok_or_else(|| anyhow!("insert_lens_dir is not configured"))?;

        Ok(CommandLine::new(self.tool_path(JobKind::InsertLen))
            .arg("--compute-insert-len")
            .arg_path(&bam)
            .arg_path(const_exons)
            .arg("--output-dir")
            .arg_path(output_dir))
    }
}

impl CommandBuilder for ToolCommandBuilder {
    fn build(&self, item: &WorkItem) -> Result<CommandLine> {
        let event = item.event_type.as_deref();
        match (&item.target, item.kind) {
            (WorkTarget::Sample(label), JobKind::Run) => {
                self.build_run(label, event.ok_or_else(|| anyhow!("run item without event type"))?)
            }
            (WorkTarget::Sample(label), JobKind::Summarize) => self.build_summarize(
                label,
                event.ok_or_else(|| anyhow!("summarize item without event type"))?,
            ),
            (WorkTarget::Pair(pair), JobKind::Compare) => self.build_compare(
                pair,
                event.ok_or_else(|| anyhow!("compare item without event type"))?,
            ),
            (WorkTarget::Sample(label), JobKind::InsertLen) => self.build_insert_len(label),
            (target, kind) => Err(anyhow!(
                "work item shape not supported: {:?} with {:?}",
                kind,
                target
            )),
        }
    }
}
