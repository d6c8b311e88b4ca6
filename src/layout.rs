//! Output tree layout and artifact discovery
//!
//! Every path the pipeline reads or writes is derived here, so the directory
//! conventions live in one place. Discovery of completed run outputs is an
//! explicit scan over the tree, decoupled from dispatch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::compare::SamplePair;
use crate::config::{COMBINED_SUBDIR, COMPARISON_TABLE_SUFFIX, INSERT_LEN_SUFFIX};
use crate::error::ConfigError;

/// Run output directory for one (sample, event type)
pub fn sample_event_dir(analysis_dir: &Path, sample: &str, event_type: &str) -> PathBuf {
    analysis_dir.join(sample).join(event_type)
}

/// Per-pair comparison table inside an event-type comparison directory
pub fn comparison_table_path(comparisons_dir: &Path, event_type: &str, pair: &SamplePair) -> PathBuf {
    comparisons_dir
        .join(event_type)
        .join(format!("{}{}", pair.label(), COMPARISON_TABLE_SUFFIX))
}

/// Combined table for one event type
pub fn combined_table_path(comparisons_dir: &Path, event_type: &str) -> PathBuf {
    comparisons_dir
        .join(COMBINED_SUBDIR)
        .join(format!("{}{}", event_type, COMPARISON_TABLE_SUFFIX))
}

/// Insert-length parameter file for one sample's alignment file
pub fn insert_len_path(insert_lens_dir: &Path, sample_path: &Path) -> PathBuf {
    let basename = sample_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    insert_lens_dir.join(format!("{}{}", basename, INSERT_LEN_SUFFIX))
}

/// Paired-end fragment parameters read from an insert-length file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertLenParams {
    pub mean: f64,
    pub sdev: f64,
}

/// Parse the header of an insert-length file
///
/// The first line has the shape `#mean=250.5,sdev=30.2` (further fields are
/// ignored). A missing file is a configuration error; so is a header without
/// both fields.
pub async fn read_insert_len_params(path: &Path) -> Result<InsertLenParams> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ConfigError::missing(path).into());
    }
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read insert-length file {}", path.display()))?;

    let header = match raw.lines().next() {
        Some(line) if line.starts_with('#') => line.trim_start_matches('#'),
        _ => bail!(
            "insert-length file {} has no #-prefixed header line",
            path.display()
        ),
    };

    let mut mean = None;
    let mut sdev = None;
    for field in header.split(',') {
        let mut parts = field.splitn(2, '=');
        let key = parts.next().unwrap_or_default().trim();
        let value = parts.next().unwrap_or_default().trim();
        match key {
            "mean" => mean = value.parse::<f64>().ok(),
            "sdev" => sdev = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    match (mean, sdev) {
        (Some(mean), Some(sdev)) => Ok(InsertLenParams { mean, sdev }),
        _ => bail!(
            "insert-length file {} header is missing mean/sdev",
            path.display()
        ),
    }
}

/// List completed run outputs as (sample, event type) pairs
///
/// Scans `<analysis_dir>/<sample>/<event type>`. Entries that are not
/// directories are warned about and skipped outright, without descending.
/// Results are sorted by name so discovery order is reproducible.
pub async fn list_completed_outputs(analysis_dir: &Path) -> Result<Vec<(String, String)>> {
    let mut found = Vec::new();

    for sample_path in sorted_entries(analysis_dir).await? {
        if !is_dir(&sample_path).await {
            warn!("Skipping non-directory: {}", sample_path.display());
            continue;
        }
        let sample = entry_name(&sample_path);
        for event_path in sorted_entries(&sample_path).await? {
            if !is_dir(&event_path).await {
                warn!("Skipping non-directory: {}", event_path.display());
                continue;
            }
            found.push((sample.clone(), entry_name(&event_path)));
        }
    }

    Ok(found)
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list directory {}", dir.display()))?;
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
