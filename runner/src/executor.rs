//! Lifecycle of a single external tool invocation.
//!
//! An [`Executor`] owns a temporary directory, asks its [`ToolAdapter`] to write
//! the tool input, runs the tool as a subprocess, checks the produced files and
//! lets the adapter turn them into a structured value. The temporary directory
//! is removed whenever [`Executor::run`] returns, unless it was explicitly kept.

pub mod scratch;
pub mod subprocess;


use scratch::ScratchGuard;
pub use subprocess::RunOutput;

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("No command to run")]
    EmptyCommand,
    #[error("Failed to launch {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with status {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("{program} was terminated by {signal}")]
    Killed {
        program: String,
        signal: String,
        stderr: String,
    },
    #[error("Run failed: {0}")]
    Failed(String),
    #[error("Failed to parse tool output: {0}")]
    Parse(#[from] ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },
}

/// Coarse failure category used when reporting a failed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Run,
    Parse,
    Resource,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Parse => write!(f, "parse"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

impl ExecutorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Parse(_) => FailureKind::Parse,
            Self::Killed { .. } => FailureKind::Resource,
            Self::EmptyCommand
            | Self::Spawn { .. }
            | Self::NonZeroExit { .. }
            | Self::Failed(_)
            | Self::Io(_) => FailureKind::Run,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Created,
    Prepared,
    Executed,
    Verified,
    Finished,
    Cleaned,
    Failed,
}

/// Directories handed to the adapter hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub temp_dir: PathBuf,
    pub out_dir: PathBuf,
}

/// Everything needed to launch the tool once
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub dirs: Directories,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

/// Tool specific hooks plugged into an [`Executor`]
pub trait ToolAdapter {
    type Output;

    /// short name of the tool, used to name the temporary directory
    fn name(&self) -> &str;

    /// full argument vector, the first element is the program
    fn arguments(&self, dirs: &Directories) -> Vec<OsString>;

    fn working_directory(&self, _dirs: &Directories) -> Option<PathBuf> {
        None
    }

    /// write the tool input, may be called more than once
    fn prepare(&self, _dirs: &Directories) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// files the tool is expected to produce
    fn output_files(&self, _dirs: &Directories) -> Vec<PathBuf> {
        Vec::new()
    }

    /// reason why a run with a zero exit status still failed
    fn is_failed(&self, dirs: &Directories) -> Option<String> {
        check_output_files(&self.output_files(dirs))
    }

    /// turn the raw tool output into a value, anything kept must be copied out
    /// of the temporary directory here
    fn finish(&self, dirs: &Directories, output: &RunOutput) -> Result<Self::Output, ExecutorError>;
}

/// Return a reason for the first declared output file that is missing or empty
pub fn check_output_files(files: &[PathBuf]) -> Option<String> {
    for file in files {
        match fs::metadata(file) {
            Err(_) => return Some(format!("{} was not created", file.display())),
            Ok(metadata) if metadata.len() == 0 => {
                return Some(format!("{} is empty", file.display()))
            }
            Ok(_) => {}
        }
    }

    None
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub temp_dir: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub keep_temp_dir: bool,
}

impl ExecutorOptions {
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    pub fn out_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(path.into());
        self
    }

    pub fn keep_temp_dir(mut self, keep: bool) -> Self {
        self.keep_temp_dir = keep;
        self
    }
}

#[derive(Debug)]
pub struct Executor<A> {
    adapter: A,
    context: ExecutionContext,
    keep_temp_dir: bool,
    state: ExecutorState,
}

impl<A: ToolAdapter> Executor<A> {
    /// Create an executor, a fresh temporary directory is created unless one is
    /// given in `options`
    pub fn new(adapter: A, options: ExecutorOptions) -> Result<Self, ExecutorError> {
        let temp_dir = match options.temp_dir {
            Some(path) => std::path::absolute(path)?,
            None => tempfile::Builder::new()
                .prefix(&format!("{}_", adapter.name().to_lowercase()))
                .tempdir()?
                .keep(),
        };
        let out_dir = match options.out_dir {
            Some(path) => std::path::absolute(path)?,
            None => temp_dir.clone(),
        };

        let dirs = Directories { temp_dir, out_dir };
        let args = adapter.arguments(&dirs);
        let cwd = adapter.working_directory(&dirs);

        debug!(tool = adapter.name(), temp_dir = ?dirs.temp_dir, "Created executor");

        Ok(Self {
            adapter,
            context: ExecutionContext { dirs, args, cwd },
            keep_temp_dir: options.keep_temp_dir,
            state: ExecutorState::Created,
        })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn args(&self) -> &[OsString] {
        &self.context.args
    }

    pub fn temp_dir(&self) -> &Path {
        &self.context.dirs.temp_dir
    }

    pub fn out_dir(&self) -> &Path {
        &self.context.dirs.out_dir
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Create the temporary and output directories and write the tool input
    pub fn prepare(&mut self) -> Result<(), ExecutorError> {
        let dirs = &self.context.dirs;
        fs::create_dir_all(&dirs.temp_dir)?;
        if dirs.out_dir != dirs.temp_dir {
            fs::create_dir_all(&dirs.out_dir)?;
        }

        self.adapter.prepare(dirs)?;
        self.state = ExecutorState::Prepared;

        Ok(())
    }

    pub fn is_failed(&self) -> Option<String> {
        self.adapter.is_failed(&self.context.dirs)
    }

    /// Run the tool end to end and return the parsed output.
    ///
    /// The temporary directory is removed on every exit path, including a
    /// panic inside an adapter hook, unless `keep_temp_dir` was set.
    #[instrument(skip(self), fields(tool = self.adapter.name()), level = "debug")]
    pub fn run(&mut self) -> Result<A::Output, ExecutorError> {
        let guard = ScratchGuard::new(self.context.dirs.temp_dir.clone(), self.keep_temp_dir);
        let result = self.run_stages();
        drop(guard);

        match result {
            Ok(output) => {
                self.state = ExecutorState::Cleaned;
                Ok(output)
            }
            Err(error) => {
                debug!(tool = self.adapter.name(), "Run failed: {error}");
                self.state = ExecutorState::Failed;
                Err(error)
            }
        }
    }

    fn run_stages(&mut self) -> Result<A::Output, ExecutorError> {
        self.prepare()?;

        let output = subprocess::run_command(&self.context.args, self.context.cwd.as_deref())?;
        self.state = ExecutorState::Executed;

        if let Some(reason) = self.is_failed() {
            return Err(ExecutorError::Failed(reason));
        }
        self.state = ExecutorState::Verified;

        let value = self.adapter.finish(&self.context.dirs, &output)?;
        self.state = ExecutorState::Finished;
        info!(
            tool = self.adapter.name(),
            runtime_ms = output.runtime as u64,
            "Finished run"
        );

        Ok(value)
    }
}

// an executor that never ran still owns its temporary directory
impl<A> Drop for Executor<A> {
    fn drop(&mut self) {
        if matches!(self.state, ExecutorState::Created | ExecutorState::Prepared) {
            scratch::remove_scratch(&self.context.dirs.temp_dir, self.keep_temp_dir);
        }
    }
}
