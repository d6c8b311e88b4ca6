//! High-level runner API for the orchestrator.
//!
//! One entry point per operation, each taking an args struct, loading the
//! settings snapshot and wiring the expander, command builder, dispatcher and
//! merger together. No state survives between calls; everything a component
//! needs is passed into it.
//!
//! This is the primary API for external users and for the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::compare::expand_groups;
use crate::config::SUMMARIZE_DELAY;
use crate::dispatch::{
    CommandBuilder, DispatchConfigBuilder, DispatchManifest, DispatchMode, DispatchReport,
    JobDispatcher, JobRunner, ProcessJobRunner, ResourceSpec, ThrottleConfig, ToolCommandBuilder,
    WorkItem,
};
use crate::error::ConfigError;
use crate::layout::{self, InsertLenParams};
use crate::merge::{FsComparisonLoader, MergeConfig, merge_comparisons};
use crate::settings::Settings;
use crate::tables::TableStore;

/// Arguments for the `run` operation
#[derive(Clone)]
pub struct RunArgs {
    pub settings_path: PathBuf,
    pub logs_outdir: PathBuf,
    /// Executor selection; `run` takes this from the CLI, not the settings
    pub use_cluster: bool,
    pub throttle: ThrottleConfig,
    pub dry_run: bool,
    /// Whether a dry run advances the batch-pause counter
    pub dry_run_counts_toward_batch: bool,
    /// Allow-list of sample labels; empty means all samples
    pub samples: Vec<String>,
    /// Allow-list of event types; `None` means all configured types
    pub event_types: Option<Vec<String>>,
    pub quiet: bool,
    pub cancel: CancellationToken,

    // Test-only: inject a recording executor
    #[cfg(test)]
    pub test_runner: Option<Arc<dyn JobRunner>>,
}

/// Arguments for the `summarize` operation
#[derive(Clone)]
pub struct SummarizeArgs {
    pub settings_path: PathBuf,
    pub logs_outdir: PathBuf,
    pub dry_run: bool,
    pub quiet: bool,
    pub cancel: CancellationToken,

    #[cfg(test)]
    pub test_runner: Option<Arc<dyn JobRunner>>,
}

/// Arguments for the `compare` operation
#[derive(Clone)]
pub struct CompareArgs {
    pub settings_path: PathBuf,
    pub logs_outdir: PathBuf,
    pub throttle: ThrottleConfig,
    pub dry_run: bool,
    pub dry_run_counts_toward_batch: bool,
    pub quiet: bool,
    pub cancel: CancellationToken,

    #[cfg(test)]
    pub test_runner: Option<Arc<dyn JobRunner>>,
}

/// Arguments for the `combine-comparisons` operation
#[derive(Clone)]
pub struct CombineArgs {
    pub settings_path: PathBuf,
    pub logs_outdir: PathBuf,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Arguments for the `compute-insert-lens` operation
#[derive(Clone)]
pub struct InsertLensArgs {
    pub settings_path: PathBuf,
    pub logs_outdir: PathBuf,
    pub dry_run: bool,
    pub quiet: bool,
    pub cancel: CancellationToken,

    #[cfg(test)]
    pub test_runner: Option<Arc<dyn JobRunner>>,
}

/// Load the settings snapshot and make sure the logs directory exists
async fn prepare(settings_path: &Path, logs_outdir: &Path) -> Result<Settings> {
    let settings = Settings::load(settings_path).await?;
    settings.validate_tool_paths().await?;
    tokio::fs::create_dir_all(logs_outdir)
        .await
        .with_context(|| format!("Failed to create {}", logs_outdir.display()))?;
    Ok(settings)
}

/// One dispatch, end to end: configure, submit, write the manifest
#[allow(clippy::too_many_arguments)]
async fn dispatch_items(
    operation: &str,
    runner: Arc<dyn JobRunner>,
    settings: &Settings,
    logs_outdir: &Path,
    mode: DispatchMode,
    throttle: ThrottleConfig,
    dry_run: bool,
    dry_run_counts_toward_batch: bool,
    quiet: bool,
    cancel: CancellationToken,
    builder: &dyn CommandBuilder,
    items: Vec<WorkItem>,
) -> Result<DispatchReport> {
    if dry_run {
        info!(" -- DRY RUN -- ");
    }
    let config = DispatchConfigBuilder::default()
        .mode(mode)
        .throttle(throttle)
        .dry_run(dry_run)
        .dry_run_counts_toward_batch(dry_run_counts_toward_batch)
        .quiet(quiet)
        .build()?;
    let resources = ResourceSpec {
        ppn: settings.cluster.ppn,
    };

    let dispatcher = JobDispatcher::new(runner, config, resources, cancel);
    let report = dispatcher.dispatch(items, builder).await?;

    DispatchManifest::from_report(operation, dry_run, &report)
        .write(logs_outdir)
        .await?;
    Ok(report)
}

fn settings_mode(settings: &Settings) -> DispatchMode {
    if settings.cluster.use_cluster {
        DispatchMode::Cluster
    } else {
        DispatchMode::Local
    }
}

/// Run the analysis tool on every selected (sample, event type)
pub async fn run_samples(args: RunArgs) -> Result<DispatchReport> {
    let settings = prepare(&args.settings_path, &args.logs_outdir).await?;

    // Sample allow-list
    let selected: Vec<_> = settings
        .data
        .samples
        .iter()
        .filter(|s| {
            if !args.samples.is_empty() && !args.samples.contains(&s.label) {
                info!("Skipping sample {}", s.label);
                return false;
            }
            true
        })
        .cloned()
        .collect();

    // Event-type allow-list
    let event_types: Vec<String> = settings
        .comparisons
        .event_types
        .iter()
        .filter(|event| match &args.event_types {
            Some(allowed) if !allowed.contains(*event) => {
                info!("Skipping event type {}", event);
                false
            }
            _ => true,
        })
        .cloned()
        .collect();

    // Resolve every per-sample parameter before anything is dispatched, so a
    // configuration hole can never leave a half-submitted batch behind.
    let mut read_lens = HashMap::new();
    for sample in &selected {
        read_lens.insert(sample.label.clone(), settings.read_len_for(&sample.label)?);
    }

    let mut insert_params: HashMap<String, InsertLenParams> = HashMap::new();
    if let Some(insert_lens_dir) = &settings.data.insert_lens_dir {
        info!("Running in paired-end mode");
        info!(" - Insert length directory: {}", insert_lens_dir.display());
        for sample in &selected {
            let path = layout::insert_len_path(insert_lens_dir, &sample.path);
            let params = layout::read_insert_len_params(&path).await?;
            insert_params.insert(sample.label.clone(), params);
        }
    } else {
        info!("Running in single-end mode");
    }

    let mut items = Vec::new();
    for sample in &selected {
        for event_type in &event_types {
            items.push(WorkItem::run(&sample.label, event_type));
        }
    }
    info!(
        "Running analysis on {} samples x {} event types ({} jobs)",
        selected.len(),
        event_types.len(),
        items.len()
    );

    let mode = if args.use_cluster {
        DispatchMode::Cluster
    } else {
        DispatchMode::Local
    };
    #[cfg(test)]
    let runner: Arc<dyn JobRunner> = match args.test_runner {
        Some(runner) => runner,
        None => Arc::new(ProcessJobRunner::new(
            settings.cluster.submit_bin.clone(),
            &args.logs_outdir,
        )),
    };
    #[cfg(not(test))]
    let runner: Arc<dyn JobRunner> = Arc::new(ProcessJobRunner::new(
        settings.cluster.submit_bin.clone(),
        &args.logs_outdir,
    ));

    let builder =
        ToolCommandBuilder::new(settings.clone(), args.use_cluster, read_lens, insert_params);
    dispatch_items(
        "run",
        runner,
        &settings,
        &args.logs_outdir,
        mode,
        args.throttle,
        args.dry_run,
        args.dry_run_counts_toward_batch,
        args.quiet,
        args.cancel,
        &builder,
        items,
    )
    .await
}

/// Summarize every completed (sample, event type) run output found on disk
pub async fn summarize_samples(args: SummarizeArgs) -> Result<DispatchReport> {
    let settings = prepare(&args.settings_path, &args.logs_outdir).await?;
    info!("Summarizing analysis output...");

    let analysis_dir = &settings.output.analysis_dir;
    if !tokio::fs::try_exists(analysis_dir).await.unwrap_or(false) {
        return Err(ConfigError::missing(analysis_dir.clone()).into());
    }

    let completed = layout::list_completed_outputs(analysis_dir).await?;
    let items: Vec<WorkItem> = completed
        .iter()
        .map(|(sample, event_type)| WorkItem::summarize(sample, event_type))
        .collect();
    info!("Found {} completed outputs to summarize", items.len());

    let use_cluster = settings.cluster.use_cluster;
    #[cfg(test)]
    let runner: Arc<dyn JobRunner> = match args.test_runner {
        Some(runner) => runner,
        None => Arc::new(ProcessJobRunner::new(
            settings.cluster.submit_bin.clone(),
            &args.logs_outdir,
        )),
    };
    #[cfg(not(test))]
    let runner: Arc<dyn JobRunner> = Arc::new(ProcessJobRunner::new(
        settings.cluster.submit_bin.clone(),
        &args.logs_outdir,
    ));

    let builder =
        ToolCommandBuilder::new(settings.clone(), use_cluster, HashMap::new(), HashMap::new());
    dispatch_items(
        "summarize",
        runner,
        &settings,
        &args.logs_outdir,
        settings_mode(&settings),
        ThrottleConfig::base_only(SUMMARIZE_DELAY),
        args.dry_run,
        true,
        args.quiet,
        args.cancel,
        &builder,
        items,
    )
    .await
}

/// Compare every expanded sample pair along every configured event type
pub async fn compare_samples(args: CompareArgs) -> Result<DispatchReport> {
    let settings = prepare(&args.settings_path, &args.logs_outdir).await?;
    info!("Running comparisons...");

    let groups = settings.comparison_groups()?;
    tokio::fs::create_dir_all(&settings.output.comparisons_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create {}",
                settings.output.comparisons_dir.display()
            )
        })?;

    let mut items = Vec::new();
    for (index, pairs) in expand_groups(&groups) {
        info!(" - Group {}: {} comparisons", index, pairs.len());
        for pair in pairs {
            for event_type in &settings.comparisons.event_types {
                items.push(WorkItem::compare(pair.clone(), event_type));
            }
        }
    }

    let use_cluster = settings.cluster.use_cluster;
    #[cfg(test)]
    let runner: Arc<dyn JobRunner> = match args.test_runner {
        Some(runner) => runner,
        None => Arc::new(ProcessJobRunner::new(
            settings.cluster.submit_bin.clone(),
            &args.logs_outdir,
        )),
    };
    #[cfg(not(test))]
    let runner: Arc<dyn JobRunner> = Arc::new(ProcessJobRunner::new(
        settings.cluster.submit_bin.clone(),
        &args.logs_outdir,
    ));

    let builder =
        ToolCommandBuilder::new(settings.clone(), use_cluster, HashMap::new(), HashMap::new());
    dispatch_items(
        "compare",
        runner,
        &settings,
        &args.logs_outdir,
        settings_mode(&settings),
        args.throttle,
        args.dry_run,
        args.dry_run_counts_toward_batch,
        args.quiet,
        args.cancel,
        &builder,
        items,
    )
    .await
}

/// Combine per-pair comparison tables into one table per event type
///
/// Processes the unfiltered comparisons directory and, when present, its
/// `filtered_events` subdirectory. Returns the paths written.
pub async fn combine_comparisons(args: CombineArgs) -> Result<Vec<PathBuf>> {
    let settings = prepare(&args.settings_path, &args.logs_outdir).await?;

    let comparisons_dir = settings.output.comparisons_dir.clone();
    if !tokio::fs::try_exists(&comparisons_dir).await.unwrap_or(false) {
        return Err(ConfigError::missing(comparisons_dir.clone()).into());
    }

    // Pair expansion is recomputed here so combine never depends on state
    // left over from a compare invocation.
    let groups = settings.comparison_groups()?;
    let pairs: Vec<_> = expand_groups(&groups)
        .into_iter()
        .flat_map(|(_, pairs)| pairs)
        .collect();

    let filtered_dir = comparisons_dir.join(crate::config::FILTERED_SUBDIR);
    let store = TableStore::default();
    let merge_config = MergeConfig::default();
    let mut written = Vec::new();

    for dir in [comparisons_dir, filtered_dir] {
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            info!("Comparisons directory {} not found, skipping", dir.display());
            continue;
        }
        for event_type in &settings.comparisons.event_types {
            let event_dir = dir.join(event_type);
            if !tokio::fs::try_exists(&event_dir).await.unwrap_or(false) {
                info!(
                    "Cannot find event type {} dir under {}, skipping",
                    event_type,
                    dir.display()
                );
                continue;
            }

            let loader = FsComparisonLoader {
                comparisons_dir: dir.clone(),
                store: store.clone(),
            };
            let combined = merge_comparisons(event_type, &pairs, &loader, &merge_config).await?;

            let output_path = layout::combined_table_path(&dir, event_type);
            if args.dry_run {
                info!(
                    "Dry run: would write {} combined events to {}",
                    combined.rows.len(),
                    output_path.display()
                );
                continue;
            }
            store.save(&combined, &output_path).await?;
            written.push(output_path);
        }
    }

    Ok(written)
}

/// Compute insert-length distributions for every sample (paired-end runs)
pub async fn compute_insert_lens(args: InsertLensArgs) -> Result<DispatchReport> {
    let settings = prepare(&args.settings_path, &args.logs_outdir).await?;
    info!(
        "Computing insert lengths for {} samples",
        settings.data.samples.len()
    );

    let insert_lens_dir = settings
        .data
        .insert_lens_dir
        .clone()
        .ok_or_else(|| ConfigError::invalid("insert_lens_dir is not configured"))?;
    let const_exons = settings
        .data
        .const_exons
        .clone()
        .ok_or_else(|| ConfigError::invalid("const_exons is not configured"))?;
    if !tokio::fs::try_exists(&const_exons).await.unwrap_or(false) {
        return Err(ConfigError::missing(const_exons).into());
    }
    if !args.dry_run {
        tokio::fs::create_dir_all(&insert_lens_dir)
            .await
            .with_context(|| format!("Failed to create {}", insert_lens_dir.display()))?;
    }

    let items: Vec<WorkItem> = settings
        .data
        .samples
        .iter()
        .map(|sample| WorkItem::insert_len(&sample.label))
        .collect();

    let use_cluster = settings.cluster.use_cluster;
    #[cfg(test)]
    let runner: Arc<dyn JobRunner> = match args.test_runner {
        Some(runner) => runner,
        None => Arc::new(ProcessJobRunner::new(
            settings.cluster.submit_bin.clone(),
            &args.logs_outdir,
        )),
    };
    #[cfg(not(test))]
    let runner: Arc<dyn JobRunner> = Arc::new(ProcessJobRunner::new(
        settings.cluster.submit_bin.clone(),
        &args.logs_outdir,
    ));

    let builder =
        ToolCommandBuilder::new(settings.clone(), use_cluster, HashMap::new(), HashMap::new());
    dispatch_items(
        "compute_insert_lens",
        runner,
        &settings,
        &args.logs_outdir,
        settings_mode(&settings),
        ThrottleConfig::none(),
        args.dry_run,
        true,
        args.quiet,
        args.cancel,
        &builder,
        items,
    )
    .await
}
