use super::ExecutorError;
use nix::sys::signal::Signal;
use std::{
    ffi::OsString,
    os::unix::process::ExitStatusExt,
    path::Path,
    process::{Command, Stdio},
    time::Instant,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// container for information extracted from running a tool
pub struct RunOutput {
    // wall clock time in milliseconds
    pub runtime: u128,
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Run `args[0]` with the remaining arguments and wait for it to exit.
///
/// There is no timeout, the wall time of a job is bounded by the scheduler.
pub fn run_command(args: &[OsString], cwd: Option<&Path>) -> Result<RunOutput, ExecutorError> {
    let (program, rest) = args.split_first().ok_or(ExecutorError::EmptyCommand)?;
    let program_name = program.to_string_lossy().into_owned();

    let mut command = Command::new(program);
    command.args(rest).stdin(Stdio::null());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    debug!(program = %program_name, args = ?rest, cwd = ?cwd, "Launching");
    let start = Instant::now();
    let output = command.output().map_err(|source| ExecutorError::Spawn {
        program: program_name.clone(),
        source,
    })?;
    let runtime = start.elapsed().as_millis();

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!(
        "Finished in {runtime} ms | status: {}",
        output.status.success()
    );
    trace!("Output: {stdout}");

    if let Some(signal) = output.status.signal() {
        return Err(ExecutorError::Killed {
            program: program_name,
            signal: signal_name(signal),
            stderr,
        });
    }

    match output.status.code() {
        Some(0) => Ok(RunOutput {
            runtime,
            stdout,
            stderr,
            status: 0,
        }),
        code => Err(ExecutorError::NonZeroExit {
            program: program_name,
            code: code.unwrap_or(-1),
            stderr,
        }),
    }
}

fn signal_name(signal: i32) -> String {
    Signal::try_from(signal)
        .map(|signal| signal.as_str().to_owned())
        .unwrap_or_else(|_| format!("signal {signal}"))
}
