//! Configuration constants for the orchestrator
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Cluster Throttling Configuration
// ============================================================================

/// Pause after every cluster submission
///
/// Gives the scheduler time to register each job before the next one arrives.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(10);

/// Larger pause after every batch of submissions
///
/// Set to 20 minutes so a long run drip-feeds the queue instead of flooding it;
/// jobs submitted in earlier batches start finishing before later batches land.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(20 * 60);

/// Number of submissions between batch pauses
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Pause between summarize submissions
///
/// Summarize jobs are cheap; a short delay is enough to keep the queue happy.
pub const SUMMARIZE_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Combined Table Output
// ============================================================================

/// Sentinel written for cells with no value in a combined table
pub const NA_VALUE: &str = "NA";

/// Decimal places for floating-point cells on persistence
pub const FLOAT_PRECISION: usize = 4;

/// Header label of the row-key column in comparison and combined tables
pub const KEY_COLUMN: &str = "event_name";

/// Columns shared by every comparison of the same event
///
/// These describe the event itself, not the comparison, so they appear once in
/// a combined table instead of being duplicated per sample pair.
pub const COMMON_COLUMNS: [&str; 7] = [
    "isoforms",
    "chrom",
    "strand",
    "mrna_starts",
    "mrna_ends",
    "gene_id",
    "gene_symbol",
];

// ============================================================================
// Output Tree Layout
// ============================================================================

/// File suffix of per-comparison result tables
pub const COMPARISON_TABLE_SUFFIX: &str = ".diff.tsv";

/// Subdirectory of the comparisons tree holding filtered comparisons
pub const FILTERED_SUBDIR: &str = "filtered_events";

/// Subdirectory where combined per-event-type tables are written
pub const COMBINED_SUBDIR: &str = "combined_comparisons";

/// Suffix of per-sample insert-length parameter files
pub const INSERT_LEN_SUFFIX: &str = ".insert_len";
