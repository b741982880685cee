//! Stage configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use stagerun_types::ids::EnvName;

/// Top-level stage runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub version: String,
    /// Scratch directory emptied after every invocation.
    pub workspace: PathBuf,
    /// Directory whose children are the object buckets.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Bucket that transforms write their output to.
    #[serde(default = "default_output_bucket")]
    pub output_bucket: String,
    pub manifest: ManifestConfig,
    pub environments: BTreeMap<EnvName, EnvironmentConfig>,
    /// Stage name -> transform name, for datasets without their own binding.
    #[serde(default)]
    pub default_transforms: BTreeMap<String, String>,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./buckets")
}

fn default_output_bucket() -> String {
    "stage".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

/// Per-dataset transform bindings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub team: String,
    pub dataset: String,
    /// Stage name -> transform name.
    #[serde(default)]
    pub transforms: BTreeMap<String, String>,
}

impl StageConfig {
    /// Every transform name the configuration refers to, deduplicated.
    #[must_use]
    pub fn referenced_transforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .default_transforms
            .values()
            .chain(self.datasets.iter().flat_map(|d| d.transforms.values()))
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
