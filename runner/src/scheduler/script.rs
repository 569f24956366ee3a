use super::{ArrayConfig, JobPlan, SchedulerError};
use std::{borrow::Cow, path::Path};

/// scheduler variable holding the index of the running array task
pub const TASK_ID: &str = "${SLURM_ARRAY_TASK_ID}";

/// Render minutes in the Slurm time format, `D-HH:MM:SS` from one day up
pub fn format_time(minutes: u64) -> String {
    let days = minutes / (24 * 60);
    let hours = minutes / 60 % 24;
    let minutes = minutes % 60;

    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:00")
    } else {
        format!("{hours:02}:{minutes:02}:00")
    }
}

fn quote(value: &str) -> Result<Cow<'_, str>, SchedulerError> {
    shlex::try_quote(value).map_err(|_| SchedulerError::Quote(value.to_owned()))
}

fn quote_path(path: &Path) -> Result<String, SchedulerError> {
    let value = path.to_string_lossy();
    quote(&value).map(Cow::into_owned)
}

// escape for use inside double quotes, `$` and friends stay literal
fn escape_double_quoted(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .fold(String::new(), |mut quoted, c| {
            if matches!(c, '"' | '$' | '`' | '\\') {
                quoted.push('\\');
            }
            quoted.push(c);
            quoted
        })
}

// sbatch strips the quotes of directive values but knows no escapes
fn directive_path(path: &Path) -> Result<String, SchedulerError> {
    let value = path.to_string_lossy();
    if value.contains(['"', '\n']) {
        return Err(SchedulerError::Quote(value.into_owned()));
    }

    Ok(format!("\"{value}\""))
}

/// Render the sbatch submission script of a prepared array.
///
/// Every array task picks its own artifact through the task id and hands it to
/// the driver together with the shared output directory.
pub fn render(
    plan: &JobPlan,
    config: &ArrayConfig,
    out_ibex: &Path,
    artifact_dir: &Path,
    out_dir: &Path,
) -> Result<String, SchedulerError> {
    if plan.njobs == 0 {
        return Err(SchedulerError::EmptyBatch);
    }

    let mut lines = vec![
        String::from("#!/bin/bash --login"),
        format!("#SBATCH --job-name={}", config.job_name),
        format!("#SBATCH --partition={}", plan.partition),
        format!("#SBATCH --output={}", directive_path(&out_ibex.join("%A_%a.out"))?),
        format!("#SBATCH --time={}", format_time(plan.time_per_job)),
        format!("#SBATCH --ntasks={}", plan.ntasks),
        format!("#SBATCH --cpus-per-task={}", plan.cpus_per_task),
        format!("#SBATCH --mem={}G", plan.mem_gb),
        format!("#SBATCH --array=0-{}", plan.njobs - 1),
        String::new(),
    ];

    let activation = config.scheduler.environment.activation();
    if !activation.is_empty() {
        lines.extend(activation);
        lines.push(String::new());
    }

    lines.push(format!(
        "job_file=\"{}{TASK_ID}.yaml\"",
        escape_double_quoted(&artifact_dir.join(&config.artifact_prefix))
    ));

    let driver = &config.driver;
    let mut invocation = vec![quote_path(&driver.program)?];
    for arg in &driver.leading {
        invocation.push(quote(arg)?.into_owned());
    }
    invocation.push(String::from("\"${job_file}\""));
    invocation.push(quote_path(out_dir)?);
    for arg in &driver.trailing {
        invocation.push(quote(arg)?.into_owned());
    }
    lines.push(invocation.join(" "));

    let script = lines.join("\n") + "\n";
    Ok(script)
}
