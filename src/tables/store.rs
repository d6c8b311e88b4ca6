//! TSV persistence for result and combined tables
//!
//! Tables travel as tab-separated text with the row key in the first column.
//! Loading reads the whole file and parses the buffer in one pass; saving
//! renders missing cells with the NA sentinel and pins floating-point cells to
//! a fixed number of decimal places. Precision is a serialization concern:
//! in-memory cell text is never touched.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{FLOAT_PRECISION, KEY_COLUMN, NA_VALUE};
use crate::tables::table::{CombinedTable, ResultTable};

/// Reads and writes keyed TSV tables
#[derive(Debug, Clone)]
pub struct TableStore {
    pub na_value: String,
    pub float_precision: usize,
}

impl Default for TableStore {
    fn default() -> Self {
        Self {
            na_value: NA_VALUE.to_string(),
            float_precision: FLOAT_PRECISION,
        }
    }
}

impl TableStore {
    pub fn new(na_value: impl Into<String>, float_precision: usize) -> Self {
        Self {
            na_value: na_value.into(),
            float_precision,
        }
    }

    /// Load a table; `None` if the file does not exist
    pub async fn load(&self, path: &Path) -> Result<Option<ResultTable>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let buffer = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read table {}", path.display()))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(buffer.as_slice());

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read table header {}", path.display()))?
            .clone();
        if headers.is_empty() {
            return Ok(Some(ResultTable::new(Vec::new())));
        }
        // First header cell is the key column, whatever it is labelled
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut table = ResultTable::new(columns);
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to parse table {}", path.display()))?;
            let mut fields = record.iter();
            let key = fields.next().unwrap_or_default().to_string();
            let mut values: Vec<String> = fields.map(str::to_string).collect();
            values.resize(table.columns.len(), String::new());
            table.push_row(key, values);
        }
        Ok(Some(table))
    }

    /// Persist a combined table, creating parent directories as needed
    pub async fn save(&self, table: &CombinedTable, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());

        let mut header = Vec::with_capacity(table.columns.len() + 1);
        header.push(KEY_COLUMN.to_string());
        header.extend(table.columns.iter().cloned());
        writer.write_record(&header)?;

        for row in &table.rows {
            let mut record = Vec::with_capacity(row.cells.len() + 1);
            record.push(row.key.clone());
            for cell in &row.cells {
                record.push(match cell {
                    Some(value) => self.format_value(value),
                    None => self.na_value.clone(),
                });
            }
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush table writer: {}", e))?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write table {}", path.display()))?;

        info!(
            "Wrote combined table for {} ({} rows) to {}",
            table.event_type,
            table.rows.len(),
            path.display()
        );
        Ok(())
    }

    /// Fixed-precision rendering for cells that hold a fractional number
    ///
    /// Integral-looking text ("1523") and non-numeric text pass through
    /// untouched; only values with an explicit fractional or exponent form are
    /// pinned to `float_precision` decimals.
    fn format_value(&self, raw: &str) -> String {
        let looks_fractional = raw.contains('.') || raw.contains('e') || raw.contains('E');
        match raw.parse::<f64>() {
            Ok(value) if looks_fractional && value.is_finite() => {
                format!("{:.*}", self.float_precision, value)
            }
            _ => raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::table::CombinedRow;
    use tempfile::TempDir;

    fn store() -> TableStore {
        TableStore::default()
    }

    #[test]
    fn test_format_value_pins_floats_to_four_decimals() {
        let store = store();
        assert_eq!(store.format_value("0.123456"), "0.1235");
        assert_eq!(store.format_value("2.5"), "2.5000");
        assert_eq!(store.format_value("1e-3"), "0.0010");
    }

    #[test]
    fn test_format_value_leaves_non_floats_alone() {
        let store = store();
        assert_eq!(store.format_value("1523"), "1523");
        assert_eq!(store.format_value("chr12"), "chr12");
        assert_eq!(store.format_value("+"), "+");
        assert_eq!(store.format_value(""), "");
    }

    #[tokio::test]
    async fn test_load_absent_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let loaded = store().load(&dir.path().join("absent.tsv")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_parses_key_and_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.tsv");
        tokio::fs::write(
            &path,
            "event_name\tbayes_factor\tchrom\nev1\t12.5\tchr1\nev2\t0.3\tchr2\n",
        )
        .await
        .unwrap();

        let table = store().load(&path).await.unwrap().unwrap();
        assert_eq!(table.columns, vec!["bayes_factor", "chrom"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].key, "ev1");
        assert_eq!(table.rows[0].values, vec!["12.5", "chr1"]);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_keys_and_precision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.tsv");

        let mut table = CombinedTable::new("SE");
        table.columns = vec!["delta_A_vs_B".to_string(), "chrom".to_string()];
        table.rows.push(CombinedRow {
            key: "ev1".to_string(),
            cells: vec![Some("0.123456".to_string()), Some("chr1".to_string())],
        });
        table.rows.push(CombinedRow {
            key: "ev2".to_string(),
            cells: vec![None, Some("chr2".to_string())],
        });

        store().save(&table, &path).await.unwrap();
        let reloaded = store().load(&path).await.unwrap().unwrap();

        assert_eq!(
            reloaded.rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            vec!["ev1", "ev2"]
        );
        assert_eq!(reloaded.columns, vec!["delta_A_vs_B", "chrom"]);
        // Float pinned to 4 decimals, missing cell rendered as NA
        assert_eq!(reloaded.rows[0].values[0], "0.1235");
        assert_eq!(reloaded.rows[1].values[0], "NA");
    }
}
