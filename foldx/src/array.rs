use crate::{config::Config, mutations::MutationItem};
use ibex_runner::{
    config::ConfigErrors,
    scheduler::{ArrayConfig, DriverCommand, JobArray},
};
use std::path::{Path, PathBuf};

/// Resources of a FoldX job array, the defaults fit a single `BuildModel` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationArrayOptions {
    pub job_name: String,
    // minutes
    pub time_per_command: u64,
    pub cpus_per_task: u32,
    pub mem_gb: u32,
    // overrides scheduler.max_jobs of the configuration
    pub max_jobs: Option<usize>,
}

impl Default for MutationArrayOptions {
    fn default() -> Self {
        Self {
            job_name: String::from("FoldXIbex"),
            time_per_command: 1,
            cpus_per_task: 2,
            mem_gb: 4,
            max_jobs: None,
        }
    }
}

/// Job array running `<driver> drive <job file> <out_dir> --config <config>`
/// for every slice of `items`
pub fn mutation_array(
    items: Vec<MutationItem>,
    out_dir: impl Into<PathBuf>,
    options: MutationArrayOptions,
    config: &Config,
    config_path: &Path,
) -> Result<JobArray<MutationItem>, ConfigErrors> {
    let program = match &config.scheduler.driver {
        Some(driver) => driver.clone(),
        None => std::env::current_exe().map_err(|error| {
            ConfigErrors::Invalid(format!("Cannot locate the driver executable: {error}"))
        })?,
    };
    let config_path = config_path
        .canonicalize()
        .map_err(|source| ConfigErrors::Read {
            path: config_path.to_path_buf(),
            source,
        })?;

    let driver = DriverCommand::new(program)
        .leading(["drive"])
        .trailing([String::from("--config"), config_path.to_string_lossy().into_owned()]);

    let mut array_config = ArrayConfig::new(options.job_name, "pdbs", driver);
    array_config.time_per_command = options.time_per_command;
    array_config.cpus_per_task = options.cpus_per_task;
    array_config.mem_gb = options.mem_gb;
    array_config.scheduler = config.scheduler.clone();
    if options.max_jobs.is_some() {
        array_config.scheduler.max_jobs = options.max_jobs;
    }

    Ok(JobArray::new(items, out_dir, array_config))
}
