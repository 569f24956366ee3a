use ibex_runner::config::{check_executable, ConfigErrors, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::error;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub foldx: FoldxConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FoldxConfig {
    // FoldX installation, every run is started from here so FoldX finds its rotabase
    pub bin: PathBuf,
    #[serde(default = "default_executable")]
    pub executable: String,
}

impl FoldxConfig {
    pub fn executable_path(&self) -> PathBuf {
        self.bin.join(&self.executable)
    }
}

impl Config {
    /// Load a configuration file, relative paths are resolved against its directory
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;

        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }

        if config.preflight_checks() {
            Err(ConfigErrors::Preflight)
        } else {
            Ok(config)
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn resolve_relative(&mut self, base: &Path) {
        if self.foldx.bin.is_relative() {
            self.foldx.bin = base.join(&self.foldx.bin);
        }
        if let Some(driver) = self.scheduler.driver.as_mut() {
            if driver.is_relative() {
                *driver = base.join(&*driver);
            }
        }
    }

    /// Log every problem with the configuration, returns true if any was found
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if !self.foldx.bin.is_dir() {
            error!(
                "foldx.bin must be the FoldX installation directory, {} is not a directory",
                self.foldx.bin.to_string_lossy()
            );
            contains_error = true;
        } else {
            let executable = self.foldx.executable_path();
            match check_executable(&executable) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "FoldX binary {} is not executable",
                        executable.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if foldx.executable ({}) is an executable: {e}",
                        executable.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        if let Some(driver) = &self.scheduler.driver {
            if !matches!(check_executable(driver), Ok(true)) {
                error!(
                    "scheduler.driver {} is not an executable file",
                    driver.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if self.scheduler.max_jobs == Some(0) {
            error!("scheduler.max_jobs cannot be 0, leave it out for an unbounded array");
            contains_error = true;
        }

        contains_error
    }
}

fn default_executable() -> String {
    String::from("foldx_20221231")
}
