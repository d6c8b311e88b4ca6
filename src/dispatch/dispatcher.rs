//! The throttled submit loop
//!
//! Items are consumed one at a time, in input order; each yields exactly one
//! handle. Cluster submissions are rate-limited: a base pause after every
//! submission, and a longer batch pause each time `batch_size` submissions have
//! gone out since the last batch pause. Local execution is synchronous and
//! unthrottled. A failing job never stops the loop; a cancellation token is
//! honoured between items only.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::command::{CommandBuilder, CommandLine, WorkItem};
use super::executor::{JobRunner, ResourceSpec};
use crate::config::{DEFAULT_BASE_DELAY, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};
use crate::telemetry::{DispatchEvent, DispatchStats};

/// Where work items are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Execute each command synchronously on this machine
    Local,
    /// Submit each command to the batch queue
    Cluster,
}

/// Rate-limiting policy for cluster submission
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Pause after every submission
    pub base_delay: Duration,
    /// Extra pause after every `batch_size` submissions; zero batch size
    /// disables batch pauses
    pub batch_delay: Duration,
    pub batch_size: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            batch_delay: DEFAULT_BATCH_DELAY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ThrottleConfig {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
            batch_size: 0,
        }
    }

    pub fn base_only(base_delay: Duration) -> Self {
        Self {
            base_delay,
            batch_delay: Duration::ZERO,
            batch_size: 0,
        }
    }
}

/// Configuration for one dispatch
#[derive(Debug, Clone, Builder)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    #[builder(default)]
    pub throttle: ThrottleConfig,
    #[builder(default = "false")]
    pub dry_run: bool,
    /// Whether planned submissions advance the batch counter on a dry run, so
    /// planned pause points match what a live dispatch would do
    #[builder(default = "true")]
    pub dry_run_counts_toward_batch: bool,
    #[builder(default = "true")]
    pub quiet: bool,
}

/// Outcome of one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobHandle {
    /// Queued on the cluster under this job name
    Queued { job_name: String },
    /// Executed locally; `exit_ok` is best-effort status
    Executed { exit_ok: bool },
    /// Dry run: recorded, not executed or submitted
    Planned { job_name: String },
    /// Cluster submission did not go through
    SubmitFailed,
    /// Not dispatched (cancellation)
    Skipped,
}

/// One processed item: what it was, what would run, what happened
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub item: WorkItem,
    /// Absent only for items skipped before command construction
    pub command: Option<CommandLine>,
    pub handle: JobHandle,
}

/// Everything a dispatch produced, in input order
#[derive(Debug)]
pub struct DispatchReport {
    pub records: Vec<DispatchRecord>,
    pub stats: DispatchStats,
}

impl DispatchReport {
    /// Commands that were (or on a dry run, would be) handed to the executor
    pub fn planned_commands(&self) -> Vec<&CommandLine> {
        self.records
            .iter()
            .filter(|r| r.handle != JobHandle::Skipped)
            .filter_map(|r| r.command.as_ref())
            .collect()
    }
}

/// Converts work items into external job invocations
pub struct JobDispatcher {
    runner: Arc<dyn JobRunner>,
    config: DispatchConfig,
    resources: ResourceSpec,
    cancel: CancellationToken,
}

impl JobDispatcher {
    pub fn new(
        runner: Arc<dyn JobRunner>,
        config: DispatchConfig,
        resources: ResourceSpec,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner,
            config,
            resources,
            cancel,
        }
    }

    /// Process every item, in order; one record per item
    ///
    /// Command construction failures abort the dispatch (they are configuration
    /// problems); execution and submission failures are logged with the exact
    /// command and recorded, and the loop continues.
    pub async fn dispatch(
        &self,
        items: impl IntoIterator<Item = WorkItem>,
        builder: &dyn CommandBuilder,
    ) -> Result<DispatchReport> {
        let items = items.into_iter();
        let bar = self.progress_bar(&items);

        let mut records = Vec::new();
        let mut stats = DispatchStats::new();
        // Submissions since the last batch pause
        let mut batch_count = 0usize;

        for item in items {
            if self.cancel.is_cancelled() {
                stats.update(&DispatchEvent::Skipped);
                records.push(DispatchRecord {
                    item,
                    command: None,
                    handle: JobHandle::Skipped,
                });
                continue;
            }

            let command = builder.build(&item)?;
            if let Some(bar) = &bar {
                bar.set_message(item.job_name());
            }
            info!("{}: {}", item.describe(), command.display());

            let handle = if self.config.dry_run {
                self.plan(&item, &mut batch_count, &mut stats)
            } else {
                match self.config.mode {
                    DispatchMode::Cluster => {
                        self.submit(&item, &command, &mut batch_count, &mut stats)
                            .await
                    }
                    DispatchMode::Local => self.execute(&item, &command, &mut stats).await,
                }
            };

            records.push(DispatchRecord {
                item,
                command: Some(command),
                handle,
            });
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        info!(
            "Dispatch complete ({} items): {}",
            stats.total_items(),
            stats.summary()
        );
        Ok(DispatchReport { records, stats })
    }

    fn plan(
        &self,
        item: &WorkItem,
        batch_count: &mut usize,
        stats: &mut DispatchStats,
    ) -> JobHandle {
        stats.update(&DispatchEvent::Planned);
        if self.config.mode == DispatchMode::Cluster && self.config.dry_run_counts_toward_batch {
            // Advance the counter without sleeping, so the planned pause
            // points line up with a live dispatch over the same items.
            *batch_count += 1;
            if self.batch_boundary(*batch_count) {
                stats.update(&DispatchEvent::BatchPause);
                *batch_count = 0;
            }
        }
        JobHandle::Planned {
            job_name: item.job_name(),
        }
    }

    async fn submit(
        &self,
        item: &WorkItem,
        command: &CommandLine,
        batch_count: &mut usize,
        stats: &mut DispatchStats,
    ) -> JobHandle {
        let job_name = item.job_name();
        let handle = match self
            .runner
            .submit(command, &job_name, &self.resources)
            .await
        {
            Ok(()) => {
                stats.update(&DispatchEvent::Queued);
                JobHandle::Queued { job_name }
            }
            Err(e) => {
                warn!(
                    "Submission failed for {} ({}): {:#}",
                    item.describe(),
                    command.display(),
                    e
                );
                stats.update(&DispatchEvent::SubmitFailed);
                JobHandle::SubmitFailed
            }
        };

        // Failed submissions still hit the scheduler, so they count too
        *batch_count += 1;
        if self.batch_boundary(*batch_count) {
            info!(
                "Submitted {} jobs, pausing {:.2} mins",
                batch_count,
                self.config.throttle.batch_delay.as_secs_f64() / 60.0
            );
            stats.update(&DispatchEvent::BatchPause);
            self.sleep(self.config.throttle.batch_delay).await;
            *batch_count = 0;
        }
        self.sleep(self.config.throttle.base_delay).await;

        handle
    }

    async fn execute(
        &self,
        item: &WorkItem,
        command: &CommandLine,
        stats: &mut DispatchStats,
    ) -> JobHandle {
        match self.runner.run_local(command).await {
            Ok(exit_ok) => {
                if !exit_ok {
                    warn!(
                        "Job exited with failure for {} ({})",
                        item.describe(),
                        command.display()
                    );
                }
                stats.update(&DispatchEvent::Executed { exit_ok });
                JobHandle::Executed { exit_ok }
            }
            Err(e) => {
                warn!(
                    "Failed to launch {} ({}): {:#}",
                    item.describe(),
                    command.display(),
                    e
                );
                stats.update(&DispatchEvent::Executed { exit_ok: false });
                JobHandle::Executed { exit_ok: false }
            }
        }
    }

    fn batch_boundary(&self, batch_count: usize) -> bool {
        let size = self.config.throttle.batch_size;
        size != 0 && batch_count == size
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    fn progress_bar(&self, items: &impl Iterator) -> Option<ProgressBar> {
        if self.config.quiet {
            return None;
        }
        let (lower, upper) = items.size_hint();
        let bar = match upper {
            Some(upper) if upper == lower => ProgressBar::new(upper as u64),
            _ => ProgressBar::new_spinner(),
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Jobs: [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        Some(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::command::JobKind;
    use std::sync::Mutex;

    /// Records every executor call instead of touching the outside world
    #[derive(Default)]
    struct RecordingRunner {
        pub local: Mutex<Vec<CommandLine>>,
        pub submitted: Mutex<Vec<(String, CommandLine)>>,
        pub fail_all: bool,
    }

    #[async_trait::async_trait]
    impl JobRunner for RecordingRunner {
        async fn run_local(&self, command: &CommandLine) -> Result<bool> {
            self.local.lock().unwrap().push(command.clone());
            Ok(!self.fail_all)
        }

        async fn submit(
            &self,
            command: &CommandLine,
            job_name: &str,
            _resources: &ResourceSpec,
        ) -> Result<()> {
            if self.fail_all {
                return Err(anyhow::anyhow!("queue unavailable"));
            }
            self.submitted
                .lock()
                .unwrap()
                .push((job_name.to_string(), command.clone()));
            Ok(())
        }
    }

    /// Builds one echo-style command per item, no settings needed
    struct StubBuilder;

    impl CommandBuilder for StubBuilder {
        fn build(&self, item: &WorkItem) -> Result<CommandLine> {
            Ok(CommandLine::new("/bin/tool").arg(item.job_name()))
        }
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n).map(|i| WorkItem::run(format!("s{}", i), "SE")).collect()
    }

    fn dispatcher(runner: Arc<RecordingRunner>, config: DispatchConfig) -> JobDispatcher {
        JobDispatcher::new(
            runner,
            config,
            ResourceSpec::default(),
            CancellationToken::new(),
        )
    }

    fn cluster_config(batch_size: usize) -> DispatchConfig {
        DispatchConfigBuilder::default()
            .mode(DispatchMode::Cluster)
            .throttle(ThrottleConfig {
                base_delay: Duration::ZERO,
                batch_delay: Duration::ZERO,
                batch_size,
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_31_submissions_at_batch_30_pause_exactly_once() {
        let runner = Arc::new(RecordingRunner::default());
        let report = dispatcher(runner.clone(), cluster_config(30))
            .dispatch(items(31), &StubBuilder)
            .await
            .unwrap();

        assert_eq!(runner.submitted.lock().unwrap().len(), 31);
        // One pause after the 30th submission; the 31st does not add another
        assert_eq!(report.stats.batch_pauses, 1);
    }

    #[tokio::test]
    async fn test_30_submissions_at_batch_30_also_pause_once() {
        let runner = Arc::new(RecordingRunner::default());
        let report = dispatcher(runner.clone(), cluster_config(30))
            .dispatch(items(30), &StubBuilder)
            .await
            .unwrap();
        assert_eq!(report.stats.batch_pauses, 1);
    }

    #[tokio::test]
    async fn test_29_submissions_at_batch_30_never_pause() {
        let runner = Arc::new(RecordingRunner::default());
        let report = dispatcher(runner.clone(), cluster_config(30))
            .dispatch(items(29), &StubBuilder)
            .await
            .unwrap();
        assert_eq!(report.stats.batch_pauses, 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_disables_batch_pauses() {
        let runner = Arc::new(RecordingRunner::default());
        let report = dispatcher(runner.clone(), cluster_config(0))
            .dispatch(items(10), &StubBuilder)
            .await
            .unwrap();
        assert_eq!(report.stats.batch_pauses, 0);
    }

    #[tokio::test]
    async fn test_dry_run_reaches_no_executor() {
        let runner = Arc::new(RecordingRunner::default());
        let mut config = cluster_config(30);
        config.dry_run = true;

        let report = dispatcher(runner.clone(), config)
            .dispatch(items(31), &StubBuilder)
            .await
            .unwrap();

        assert!(runner.submitted.lock().unwrap().is_empty());
        assert!(runner.local.lock().unwrap().is_empty());
        assert_eq!(report.stats.planned, 31);
        // Counter still advances by default, so pause points match a live run
        assert_eq!(report.stats.batch_pauses, 1);
        assert!(matches!(
            report.records[0].handle,
            JobHandle::Planned { .. }
        ));
    }

    #[tokio::test]
    async fn test_dry_run_counter_advance_can_be_disabled() {
        let runner = Arc::new(RecordingRunner::default());
        let mut config = cluster_config(30);
        config.dry_run = true;
        config.dry_run_counts_toward_batch = false;

        let report = dispatcher(runner, config)
            .dispatch(items(31), &StubBuilder)
            .await
            .unwrap();
        assert_eq!(report.stats.batch_pauses, 0);
    }

    #[tokio::test]
    async fn test_dry_and_live_plan_identical_command_sequences() {
        let live_runner = Arc::new(RecordingRunner::default());
        let live = dispatcher(live_runner.clone(), cluster_config(0))
            .dispatch(items(5), &StubBuilder)
            .await
            .unwrap();

        let dry_runner = Arc::new(RecordingRunner::default());
        let mut config = cluster_config(0);
        config.dry_run = true;
        let dry = dispatcher(dry_runner.clone(), config)
            .dispatch(items(5), &StubBuilder)
            .await
            .unwrap();

        let live_commands: Vec<_> = live.planned_commands().into_iter().cloned().collect();
        let dry_commands: Vec<_> = dry.planned_commands().into_iter().cloned().collect();
        assert_eq!(live_commands, dry_commands);
        assert!(dry_runner.submitted.lock().unwrap().is_empty());
        assert_eq!(live_runner.submitted.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_local_mode_executes_in_order_and_survives_failures() {
        let runner = Arc::new(RecordingRunner {
            fail_all: true,
            ..Default::default()
        });
        let config = DispatchConfigBuilder::default()
            .mode(DispatchMode::Local)
            .build()
            .unwrap();

        let report = dispatcher(runner.clone(), config)
            .dispatch(items(3), &StubBuilder)
            .await
            .unwrap();

        // Every item ran despite every one failing
        let local = runner.local.lock().unwrap();
        assert_eq!(local.len(), 3);
        assert_eq!(local[0].args, vec!["s0_SE"]);
        assert_eq!(local[2].args, vec!["s2_SE"]);
        assert_eq!(report.stats.exec_failures, 3);
        assert!(report
            .records
            .iter()
            .all(|r| r.handle == JobHandle::Executed { exit_ok: false }));
    }

    #[tokio::test]
    async fn test_failed_submission_recorded_and_loop_continues() {
        let runner = Arc::new(RecordingRunner {
            fail_all: true,
            ..Default::default()
        });
        let report = dispatcher(runner, cluster_config(0))
            .dispatch(items(4), &StubBuilder)
            .await
            .unwrap();

        assert_eq!(report.stats.submit_failures, 4);
        assert_eq!(report.records.len(), 4);
        assert!(report.records.iter().all(|r| r.handle == JobHandle::SubmitFailed));
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining_items() {
        let runner = Arc::new(RecordingRunner::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dispatcher = JobDispatcher::new(
            runner.clone(),
            cluster_config(0),
            ResourceSpec::default(),
            cancel,
        );

        let report = dispatcher.dispatch(items(3), &StubBuilder).await.unwrap();

        assert!(runner.submitted.lock().unwrap().is_empty());
        assert_eq!(report.stats.skipped, 3);
        assert!(report.records.iter().all(|r| r.handle == JobHandle::Skipped));
        assert!(report.planned_commands().is_empty());
    }

    #[tokio::test]
    async fn test_kinds_route_by_mode_not_kind() {
        // Summarize items go local when mode is Local
        let runner = Arc::new(RecordingRunner::default());
        let config = DispatchConfigBuilder::default()
            .mode(DispatchMode::Local)
            .build()
            .unwrap();
        let item = WorkItem {
            target: crate::dispatch::command::WorkTarget::Sample("heart".into()),
            event_type: Some("SE".into()),
            kind: JobKind::Summarize,
        };
        dispatcher(runner.clone(), config)
            .dispatch(vec![item], &StubBuilder)
            .await
            .unwrap();
        assert_eq!(runner.local.lock().unwrap().len(), 1);
        assert!(runner.submitted.lock().unwrap().is_empty());
    }
}
