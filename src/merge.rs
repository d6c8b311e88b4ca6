//! Combining per-pair comparison tables into one table per event type
//!
//! Each sample pair contributes one result table. The merger outer-joins them
//! on the event identifier: event-describing "common" columns appear once with
//! the first non-missing value winning, every other column is suffixed with the
//! pair label, and a key absent from a source simply leaves that source's
//! columns missing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::compare::SamplePair;
use crate::config::COMMON_COLUMNS;
use crate::layout;
use crate::tables::table::{CombinedRow, CombinedTable, ResultTable};
use crate::tables::TableStore;

/// Supplies the result table for one (event type, pair), if it exists
#[async_trait]
pub trait ComparisonLoader: Send + Sync {
    async fn load(&self, event_type: &str, pair: &SamplePair) -> Result<Option<ResultTable>>;
}

/// Loader backed by an on-disk comparisons directory
pub struct FsComparisonLoader {
    pub comparisons_dir: PathBuf,
    pub store: TableStore,
}

#[async_trait]
impl ComparisonLoader for FsComparisonLoader {
    async fn load(&self, event_type: &str, pair: &SamplePair) -> Result<Option<ResultTable>> {
        let path = layout::comparison_table_path(&self.comparisons_dir, event_type, pair);
        self.store.load(&path).await
    }
}

/// Merge policy: which columns are shared, and what counts as missing
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub common_columns: Vec<String>,
    pub na_value: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            common_columns: COMMON_COLUMNS.iter().map(|c| c.to_string()).collect(),
            na_value: crate::config::NA_VALUE.to_string(),
        }
    }
}

impl MergeConfig {
    /// A cell counts as missing when empty or equal to the NA sentinel
    fn is_missing(&self, value: &str) -> bool {
        value.is_empty() || value == self.na_value
    }
}

/// Outer-join the comparison tables for one event type
///
/// Pairs whose table is absent are logged and skipped; row order follows first
/// appearance across the pairs that did load.
pub async fn merge_comparisons(
    event_type: &str,
    pairs: &[SamplePair],
    loader: &dyn ComparisonLoader,
    config: &MergeConfig,
) -> Result<CombinedTable> {
    let common: HashSet<&str> = config.common_columns.iter().map(String::as_str).collect();

    let mut combined = CombinedTable::new(event_type);
    let mut row_index: HashMap<String, usize> = HashMap::new();
    let mut loaded = 0usize;

    for pair in pairs {
        let table = match loader.load(event_type, pair).await? {
            Some(table) => table,
            None => {
                warn!(
                    "Could not find comparison {} for event type {}, skipping",
                    pair.label(),
                    event_type
                );
                continue;
            }
        };
        loaded += 1;

        // Resolve each source column to its output column up front
        let column_slots: Vec<usize> = table
            .columns
            .iter()
            .map(|name| {
                if common.contains(name.as_str()) {
                    combined.ensure_column(name)
                } else {
                    combined.ensure_column(&format!("{}_{}", name, pair.label()))
                }
            })
            .collect();
        let is_common: Vec<bool> = table
            .columns
            .iter()
            .map(|name| common.contains(name.as_str()))
            .collect();

        for row in &table.rows {
            let row_slot = match row_index.get(&row.key) {
                Some(&slot) => slot,
                None => {
                    combined.rows.push(CombinedRow {
                        key: row.key.clone(),
                        cells: vec![None; combined.columns.len()],
                    });
                    let slot = combined.rows.len() - 1;
                    row_index.insert(row.key.clone(), slot);
                    slot
                }
            };

            for (value, (&cell_slot, &shared)) in row
                .values
                .iter()
                .zip(column_slots.iter().zip(is_common.iter()))
            {
                if config.is_missing(value) {
                    continue;
                }
                let cell = &mut combined.rows[row_slot].cells[cell_slot];
                // Common columns keep the first non-missing value
                if shared && cell.is_some() {
                    continue;
                }
                *cell = Some(value.clone());
            }
        }
    }

    info!(
        "Merged {} of {} comparisons for event type {} ({} events)",
        loaded,
        pairs.len(),
        event_type,
        combined.rows.len()
    );
    Ok(combined)
}
