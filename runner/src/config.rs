use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: Error },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Batch columns differ in length: {0}")]
    LengthMismatch(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Preflight checks failed, see the log for details")]
    Preflight,
}

/// Settings shared by every job array submitted to the cluster
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_partition")]
    pub partition: String,
    // upper bound for the array size, unbounded when unset
    #[serde(default)]
    pub max_jobs: Option<usize>,
    #[serde(default)]
    pub environment: Environment,
    // program invoked by every array task, falls back to the running executable
    #[serde(default)]
    pub driver: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            max_jobs: None,
            environment: Environment::default(),
            driver: None,
        }
    }
}

/// Environment set up in the submission script before the driver runs
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    #[serde(default)]
    pub modules: Vec<String>,
    pub conda: Option<String>,
}

impl Environment {
    /// shell lines activating the environment, modules are loaded first
    pub fn activation(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|module| format!("module load {module}"))
            .chain(self.conda.iter().map(|env| format!("conda activate {env}")))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.conda.is_none()
    }
}

fn default_partition() -> String {
    String::from("batch")
}
