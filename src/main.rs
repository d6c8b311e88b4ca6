use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use splicewrap::dispatch::ThrottleConfig;
use splicewrap::runner::{
    CombineArgs, CompareArgs, InsertLensArgs, RunArgs, SummarizeArgs, combine_comparisons,
    compare_samples, compute_insert_lens, run_samples, summarize_samples,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "splicewrap",
    about = "Run a splicing-analysis toolchain across samples and combine its output"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the analysis tool on every sample and event type
    Run {
        /// Settings filename
        settings: PathBuf,

        /// Directory where to place logs
        logs_outdir: PathBuf,

        /// Submit jobs to the cluster queue instead of running locally
        #[arg(long)]
        use_cluster: bool,

        /// Base delay between cluster submissions (in seconds)
        #[arg(long, default_value = "10")]
        base_delay: u64,

        /// Delay between batches of cluster submissions (in seconds)
        #[arg(long, default_value = "1200")]
        batch_delay: u64,

        /// Number of submissions after which the batch delay is imposed
        #[arg(long, default_value = "30")]
        delay_every_n_jobs: usize,

        /// Dry run: do not submit or execute jobs
        #[arg(long)]
        dry_run: bool,

        /// Samples to run on (all configured samples if omitted)
        #[arg(long, num_args = 1..)]
        samples: Vec<String>,

        /// Event types to run on (all configured types if omitted)
        #[arg(long, num_args = 1..)]
        event_types: Option<Vec<String>>,

        /// Quiet mode - minimal output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Summarize completed run outputs found on disk
    Summarize {
        /// Settings filename
        settings: PathBuf,

        /// Directory where to place logs
        logs_outdir: PathBuf,

        /// Dry run: do not submit or execute jobs
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Compare every configured sample pair along every event type
    Compare {
        /// Settings filename
        settings: PathBuf,

        /// Directory where to place logs
        logs_outdir: PathBuf,

        /// Base delay between cluster submissions (in seconds)
        #[arg(long, default_value = "10")]
        base_delay: u64,

        /// Delay between batches of cluster submissions (in seconds)
        #[arg(long, default_value = "1200")]
        batch_delay: u64,

        /// Number of submissions after which the batch delay is imposed
        #[arg(long, default_value = "30")]
        delay_every_n_jobs: usize,

        /// Dry run: do not submit or execute jobs
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Combine per-pair comparison tables into one table per event type
    CombineComparisons {
        /// Settings filename
        settings: PathBuf,

        /// Directory where to place logs
        logs_outdir: PathBuf,

        /// Dry run: plan the combination without writing tables
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Compute insert-length distributions for all samples
    ComputeInsertLens {
        /// Settings filename
        settings: PathBuf,

        /// Directory where to place logs
        logs_outdir: PathBuf,

        /// Dry run: do not submit or execute jobs
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output
        #[arg(short, long)]
        quiet: bool,
    },
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("splicewrap=warn")
    } else {
        EnvFilter::new("splicewrap=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Cancellation token wired to Ctrl-C; dispatch stops between items
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; finishing the current item then stopping");
            signal_cancel.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            settings,
            logs_outdir,
            use_cluster,
            base_delay,
            batch_delay,
            delay_every_n_jobs,
            dry_run,
            samples,
            event_types,
            quiet,
        } => {
            init_tracing(quiet);
            run_samples(RunArgs {
                settings_path: settings,
                logs_outdir,
                use_cluster,
                throttle: ThrottleConfig {
                    base_delay: Duration::from_secs(base_delay),
                    batch_delay: Duration::from_secs(batch_delay),
                    batch_size: delay_every_n_jobs,
                },
                dry_run,
                dry_run_counts_toward_batch: true,
                samples,
                event_types,
                quiet,
                cancel: cancel_on_ctrl_c(),
            })
            .await?;
        }
        Command::Summarize {
            settings,
            logs_outdir,
            dry_run,
            quiet,
        } => {
            init_tracing(quiet);
            summarize_samples(SummarizeArgs {
                settings_path: settings,
                logs_outdir,
                dry_run,
                quiet,
                cancel: cancel_on_ctrl_c(),
            })
            .await?;
        }
        Command::Compare {
            settings,
            logs_outdir,
            base_delay,
            batch_delay,
            delay_every_n_jobs,
            dry_run,
            quiet,
        } => {
            init_tracing(quiet);
            compare_samples(CompareArgs {
                settings_path: settings,
                logs_outdir,
                throttle: ThrottleConfig {
                    base_delay: Duration::from_secs(base_delay),
                    batch_delay: Duration::from_secs(batch_delay),
                    batch_size: delay_every_n_jobs,
                },
                dry_run,
                dry_run_counts_toward_batch: true,
                quiet,
                cancel: cancel_on_ctrl_c(),
            })
            .await?;
        }
        Command::CombineComparisons {
            settings,
            logs_outdir,
            dry_run,
            quiet,
        } => {
            init_tracing(quiet);
            combine_comparisons(CombineArgs {
                settings_path: settings,
                logs_outdir,
                dry_run,
                quiet,
            })
            .await?;
        }
        Command::ComputeInsertLens {
            settings,
            logs_outdir,
            dry_run,
            quiet,
        } => {
            init_tracing(quiet);
            compute_insert_lens(InsertLensArgs {
                settings_path: settings,
                logs_outdir,
                dry_run,
                quiet,
                cancel: cancel_on_ctrl_c(),
            })
            .await?;
        }
    }
    Ok(())
}
