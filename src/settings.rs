//! Settings file parsing
//!
//! A run is described by one TOML file naming the external toolchain, the
//! samples, the output tree, the cluster policy and the comparison groups.
//! The file is loaded once per invocation into an immutable snapshot; nothing
//! in the pipeline mutates it afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::compare::GroupSpec;
use crate::error::ConfigError;

/// Immutable settings snapshot for one invocation
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub tool: ToolSection,
    pub data: DataSection,
    pub output: OutputSection,
    #[serde(default)]
    pub cluster: ClusterSection,
    pub comparisons: ComparisonSection,
}

/// External toolchain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    /// Directory holding the toolchain executables
    pub bin_dir: PathBuf,
    /// Settings file passed through to the external tool
    pub settings: PathBuf,
    /// Directory with one annotation subdirectory per event type
    pub events_dir: PathBuf,
    #[serde(default)]
    pub prefilter: bool,
    /// Chunk size forwarded to the tool's own cluster splitting
    #[serde(default = "default_chunk_jobs")]
    pub chunk_jobs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    /// Samples in dispatch order
    pub samples: Vec<SampleSpec>,
    pub read_len: ReadLen,
    #[serde(default = "default_overhang_len")]
    pub overhang_len: u32,
    /// Present iff the run is paired-end
    pub insert_lens_dir: Option<PathBuf>,
    /// Constitutive exon annotation, required by compute-insert-lens
    pub const_exons: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleSpec {
    pub path: PathBuf,
    pub label: String,
}

/// Read length: one global value, or one value per sample label
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReadLen {
    Global(u32),
    PerSample(HashMap<String, u32>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    /// Per-sample, per-event-type run output tree
    pub analysis_dir: PathBuf,
    pub comparisons_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub use_cluster: bool,
    pub submit_bin: String,
    pub ppn: u32,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            use_cluster: false,
            submit_bin: "qsub".to_string(),
            ppn: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonSection {
    pub event_types: Vec<String>,
    #[serde(rename = "groups")]
    raw_groups: Vec<RawGroup>,
}

/// Raw TOML shape of a comparison group: a list of labels, or a list of sides
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawGroup {
    Flat(Vec<String>),
    Cross(Vec<Vec<String>>),
}

fn default_chunk_jobs() -> u32 {
    200
}

fn default_overhang_len() -> u32 {
    1
}

impl Settings {
    /// Load and validate a settings file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;

        if settings.data.samples.is_empty() {
            return Err(ConfigError::invalid("no samples configured").into());
        }
        // Group shapes are checked up front so a malformed group can never
        // surface halfway through a dispatch.
        settings.comparison_groups()?;

        info!(
            "Loaded settings: {} samples, {} event types, {} comparison groups",
            settings.data.samples.len(),
            settings.comparisons.event_types.len(),
            settings.comparisons.raw_groups.len()
        );
        Ok(settings)
    }

    /// Check that the paths every operation depends on exist
    pub async fn validate_tool_paths(&self) -> Result<()> {
        for path in [&self.tool.events_dir, &self.tool.settings] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(ConfigError::missing(path.clone()).into());
            }
        }
        Ok(())
    }

    /// Comparison groups with their shape resolved
    pub fn comparison_groups(&self) -> Result<Vec<GroupSpec>> {
        self.comparisons
            .raw_groups
            .iter()
            .enumerate()
            .map(|(index, raw)| match raw {
                RawGroup::Flat(members) => Ok(GroupSpec::Flat(members.clone())),
                RawGroup::Cross(sides) => {
                    if sides.len() != 2 {
                        return Err(ConfigError::MalformedGroup {
                            index,
                            sides: sides.len(),
                        }
                        .into());
                    }
                    Ok(GroupSpec::Cross(sides[0].clone(), sides[1].clone()))
                }
            })
            .collect()
    }

    /// Resolve the read length for one sample
    pub fn read_len_for(&self, label: &str) -> Result<u32, ConfigError> {
        match &self.data.read_len {
            ReadLen::Global(value) => Ok(*value),
            ReadLen::PerSample(table) => {
                table
                    .get(label)
                    .copied()
                    .ok_or_else(|| ConfigError::ReadLengthNotFound {
                        sample: label.to_string(),
                    })
            }
        }
    }

    pub fn sample(&self, label: &str) -> Option<&SampleSpec> {
        self.data.samples.iter().find(|s| s.label == label)
    }

    /// Paired-end mode is selected by configuring an insert-length directory
    pub fn paired_end(&self) -> bool {
        self.data.insert_lens_dir.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASE: &str = r#"
        [tool]
        bin_dir = "/opt/splice/bin"
        settings = "/etc/splice/tool.conf"
        events_dir = "/data/events"

        [output]
        analysis_dir = "/out/analysis"
        comparisons_dir = "/out/comparisons"

        [comparisons]
        event_types = ["SE", "A3SS"]
        groups = [["A", "B"]]
    "#;

    fn parse(data_section: &str) -> Result<Settings> {
        let raw = format!("{}\n{}", BASE, data_section);
        toml::from_str::<Settings>(&raw).map_err(Into::into)
    }

    #[test]
    fn test_global_read_len_applies_to_every_sample() {
        let settings = parse(
            r#"
            [data]
            samples = [{ path = "a.bam", label = "A" }, { path = "b.bam", label = "B" }]
            read_len = 40
        "#,
        )
        .unwrap();
        assert_eq!(settings.read_len_for("A").unwrap(), 40);
        assert_eq!(settings.read_len_for("B").unwrap(), 40);
        assert_eq!(settings.read_len_for("unknown").unwrap(), 40);
    }

    #[test]
    fn test_per_sample_read_len_lookup() {
        let settings = parse(
            r#"
            [data]
            samples = [{ path = "a.bam", label = "A" }, { path = "b.bam", label = "B" }]
            read_len = { A = 40, B = 36 }
        "#,
        )
        .unwrap();
        assert_eq!(settings.read_len_for("A").unwrap(), 40);
        assert_eq!(settings.read_len_for("B").unwrap(), 36);

        let err = settings.read_len_for("C").unwrap_err();
        assert!(matches!(err, ConfigError::ReadLengthNotFound { ref sample } if sample == "C"));
    }

    #[test]
    fn test_group_shapes_resolved_at_load() {
        let raw = BASE.replace(
            r#"groups = [["A", "B"]]"#,
            r#"groups = [["A", "B", "C"], [["A"], ["X", "Y"]]]"#,
        );
        let raw = format!(
            "{}\n[data]\nsamples = [{{ path = \"a.bam\", label = \"A\" }}]\nread_len = 40\n",
            raw
        );
        let settings: Settings = toml::from_str(&raw).unwrap();
        let groups = settings.comparison_groups().unwrap();
        assert_eq!(
            groups,
            vec![
                GroupSpec::Flat(vec!["A".into(), "B".into(), "C".into()]),
                GroupSpec::Cross(vec!["A".into()], vec!["X".into(), "Y".into()]),
            ]
        );
    }

    #[test]
    fn test_cross_group_with_three_sides_is_malformed() {
        let raw = BASE.replace(
            r#"groups = [["A", "B"]]"#,
            r#"groups = [[["A"], ["B"], ["C"]]]"#,
        );
        let raw = format!(
            "{}\n[data]\nsamples = [{{ path = \"a.bam\", label = \"A\" }}]\nread_len = 40\n",
            raw
        );
        let settings: Settings = toml::from_str(&raw).unwrap();
        let err = settings.comparison_groups().unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(
            config_err,
            ConfigError::MalformedGroup { index: 0, sides: 3 }
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_empty_sample_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let raw = format!("{}\n[data]\nsamples = []\nread_len = 40\n", BASE);
        tokio::fs::write(&path, raw).await.unwrap();

        let err = Settings::load(&path).await.unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = Settings::load(dir.path().join("absent.toml")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_cluster_defaults() {
        let settings = parse(
            r#"
            [data]
            samples = [{ path = "a.bam", label = "A" }]
            read_len = 40
        "#,
        )
        .unwrap();
        assert!(!settings.cluster.use_cluster);
        assert_eq!(settings.cluster.submit_bin, "qsub");
        assert_eq!(settings.cluster.ppn, 1);
        assert!(!settings.paired_end());
        assert_eq!(settings.data.overhang_len, 1);
        assert_eq!(settings.tool.chunk_jobs, 200);
    }
}
