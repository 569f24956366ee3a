//! Job-array scheduling of a batch of independent work items.
//!
//! A [`JobArray`] packs its items into array tasks, writes one YAML artifact per
//! task and renders the sbatch script dispatching the per-task driver.

pub mod packer;
pub mod script;


use crate::config::SchedulerConfig;
use itertools::Itertools;
use packer::{pack, Packing, PackingError};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Packing(#[from] PackingError),
    #[error("Refusing to schedule an empty batch")]
    EmptyBatch,
    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to serialize the items of job {job}: {source}")]
    Serialize {
        job: usize,
        source: serde_yaml::Error,
    },
    #[error("Failed to deserialize {}: {source}", path.display())]
    Deserialize {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Cannot quote {0:?} for the submission script")]
    Quote(String),
    #[error("Failed to submit {}: {message}", path.display())]
    Submit { path: PathBuf, message: String },
}

/// One independent unit of work, identified by a key unique within its batch
pub trait WorkItem: Serialize + DeserializeOwned {
    /// name of the output artifacts of this item
    fn key(&self) -> String;
}

/// Program each array task runs as
/// `<program> <leading..> <job file> <output dir> <trailing..>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCommand {
    pub program: PathBuf,
    pub leading: Vec<String>,
    pub trailing: Vec<String>,
}

impl DriverCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading: Vec::new(),
            trailing: Vec::new(),
        }
    }

    pub fn leading<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.leading.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn trailing<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.trailing.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Resources and naming of a job array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayConfig {
    pub job_name: String,
    // artifacts are written to `<out_dir>/<prefix>/<prefix><job>.yaml`
    pub artifact_prefix: String,
    // minutes
    pub time_per_command: u64,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub mem_gb: u32,
    pub scheduler: SchedulerConfig,
    pub driver: DriverCommand,
}

impl ArrayConfig {
    pub fn new(
        job_name: impl Into<String>,
        artifact_prefix: impl Into<String>,
        driver: DriverCommand,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            artifact_prefix: artifact_prefix.into(),
            time_per_command: 15,
            ntasks: 1,
            cpus_per_task: 4,
            mem_gb: 4,
            scheduler: SchedulerConfig::default(),
            driver,
        }
    }
}

/// Derived, read-only layout of a job array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub ncommands: usize,
    pub njobs: usize,
    pub commands_per_job: usize,
    // minutes
    pub time_per_job: u64,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub mem_gb: u32,
    pub partition: String,
}

impl JobPlan {
    pub fn packing(&self) -> Packing {
        Packing {
            ncommands: self.ncommands,
            njobs: self.njobs,
            commands_per_job: self.commands_per_job,
        }
    }
}

/// Result of [`JobArray::prepare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedArray {
    pub plan: JobPlan,
    pub script: String,
    pub script_file: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct JobArray<W> {
    items: Vec<W>,
    out_dir: PathBuf,
    config: ArrayConfig,
}

impl<W: WorkItem> JobArray<W> {
    pub fn new(items: Vec<W>, out_dir: impl Into<PathBuf>, config: ArrayConfig) -> Self {
        let duplicates = items.iter().map(W::key).duplicates().collect_vec();
        if !duplicates.is_empty() {
            warn!(
                keys = ?duplicates,
                "Batch contains duplicate keys, their results will overwrite each other"
            );
        }

        Self {
            items,
            out_dir: out_dir.into(),
            config,
        }
    }

    pub fn items(&self) -> &[W] {
        &self.items
    }

    pub fn config(&self) -> &ArrayConfig {
        &self.config
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// directory receiving the stdout of every array task
    pub fn out_ibex(&self) -> PathBuf {
        self.out_dir.join("out_ibex")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.out_dir.join(&self.config.artifact_prefix)
    }

    pub fn artifact_path(&self, job: usize) -> PathBuf {
        self.artifact_dir()
            .join(format!("{}{job}.yaml", self.config.artifact_prefix))
    }

    pub fn script_file(&self) -> PathBuf {
        self.out_ibex().join("script.sh")
    }

    pub fn plan(&self) -> Result<JobPlan, SchedulerError> {
        let packing = pack(self.items.len(), self.config.scheduler.max_jobs)?;

        Ok(JobPlan {
            ncommands: packing.ncommands,
            njobs: packing.njobs,
            commands_per_job: packing.commands_per_job,
            time_per_job: self.config.time_per_command * packing.commands_per_job as u64,
            ntasks: self.config.ntasks,
            cpus_per_task: self.config.cpus_per_task,
            mem_gb: self.config.mem_gb,
            partition: self.config.scheduler.partition.clone(),
        })
    }

    /// Write one artifact per job and the submission script.
    ///
    /// Calling this again on the same batch rewrites identical files. An empty
    /// batch is rejected before anything is written.
    #[instrument(skip(self), fields(job_name = %self.config.job_name), level = "info")]
    pub fn prepare(&self) -> Result<PreparedArray, SchedulerError> {
        let plan = self.plan()?;
        if plan.njobs == 0 {
            return Err(SchedulerError::EmptyBatch);
        }

        let out_ibex = self.out_ibex();
        let artifact_dir = self.artifact_dir();
        for dir in [&out_ibex, &artifact_dir] {
            fs::create_dir_all(dir).map_err(|source| SchedulerError::Write {
                path: dir.clone(),
                source,
            })?;
        }

        // paths inside the script must not depend on where sbatch is called from
        let out_dir = absolute(&self.out_dir)?;
        let out_ibex = absolute(&out_ibex)?;
        let artifact_dir = absolute(&artifact_dir)?;

        let packing = plan.packing();
        let artifacts = packing
            .ranges()
            .enumerate()
            .map(|(job, range)| self.write_artifact(job, &self.items[range]))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            njobs = plan.njobs,
            commands_per_job = plan.commands_per_job,
            "Wrote job artifacts"
        );

        let script = script::render(&plan, &self.config, &out_ibex, &artifact_dir, &out_dir)?;
        let script_file = self.script_file();
        fs::write(&script_file, &script).map_err(|source| SchedulerError::Write {
            path: script_file.clone(),
            source,
        })?;

        info!(
            njobs = plan.njobs,
            script = ?script_file,
            "Prepared job array for {} commands",
            plan.ncommands
        );

        Ok(PreparedArray {
            plan,
            script,
            script_file,
            artifacts,
        })
    }

    fn write_artifact(&self, job: usize, items: &[W]) -> Result<PathBuf, SchedulerError> {
        let path = self.artifact_path(job);
        let content =
            serde_yaml::to_string(items).map_err(|source| SchedulerError::Serialize { job, source })?;

        fs::write(&path, content).map_err(|source| SchedulerError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    /// Prepare the array and hand the script to `sbatch` once, returning the job id
    pub fn submit(&self) -> Result<String, SchedulerError> {
        let prepared = self.prepare()?;
        submit_script(&prepared.script_file)
    }
}

/// Submit a script with `sbatch --parsable`; failures are not retried
pub fn submit_script(script_file: &Path) -> Result<String, SchedulerError> {
    let output = Command::new("sbatch")
        .arg("--parsable")
        .arg(script_file)
        .output()
        .map_err(|error| SchedulerError::Submit {
            path: script_file.to_path_buf(),
            message: error.to_string(),
        })?;

    if !output.status.success() {
        return Err(SchedulerError::Submit {
            path: script_file.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    // --parsable prints `<job id>[;<cluster>]`
    let raw = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    let job_id = raw.split(';').next().unwrap_or(&raw).to_owned();
    info!(job_id = %job_id, "Submitted {}", script_file.display());

    Ok(job_id)
}

/// Read the items of one job back from its artifact
pub fn read_artifact<W: WorkItem>(path: &Path) -> Result<Vec<W>, SchedulerError> {
    let content = fs::read_to_string(path).map_err(|source| SchedulerError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| SchedulerError::Deserialize {
        path: path.to_path_buf(),
        source,
    })
}

fn absolute(path: &Path) -> Result<PathBuf, SchedulerError> {
    fs::canonicalize(path).map_err(|source| SchedulerError::Read {
        path: path.to_path_buf(),
        source,
    })
}
