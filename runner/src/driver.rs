//! Per-task driver: runs the items of one job sequentially and keeps going
//! when an item fails.

use crate::{
    executor::{Executor, ExecutorError, FailureKind, ToolAdapter},
    scheduler::WorkItem,
};
use serde::Serialize;
use std::{
    any::Any,
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed {
        key: String,
        path: PathBuf,
    },
    Failed {
        key: String,
        kind: FailureKind,
        reason: String,
    },
}

impl ItemOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Completed { key, .. } | Self::Failed { key, .. } => key,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl DriverReport {
    pub fn completed(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_completed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_completed())
    }
}

/// location of the persisted result of `key`
pub fn result_path(out_dir: &Path, key: &str) -> PathBuf {
    out_dir.join(format!("{key}.yaml"))
}

/// Run every item through an executor built by `build` and persist each result
/// as `<out_dir>/<key>.yaml`.
///
/// A failing item, including a panicking adapter, is logged and recorded in the
/// report, the remaining items still run.
pub fn drive<W, A, F>(tool: &str, items: &[W], out_dir: &Path, mut build: F) -> DriverReport
where
    W: WorkItem,
    A: ToolAdapter,
    A::Output: Serialize,
    F: FnMut(&W) -> Result<Executor<A>, ExecutorError>,
{
    let mut report = DriverReport::default();

    for item in items {
        let key = item.key();
        info!("Running {tool} for {key}...");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let output = build(item)?.run()?;
            persist(out_dir, &key, &output)
        }));

        let outcome = match result {
            Ok(Ok(path)) => {
                info!(key = %key, path = ?path, "Saved result");
                ItemOutcome::Completed { key, path }
            }
            Ok(Err(error)) => {
                error!(key = %key, kind = %error.kind(), "No result calculated for {key}: {error}");
                ItemOutcome::Failed {
                    kind: error.kind(),
                    reason: error.to_string(),
                    key,
                }
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(key = %key, "No result calculated for {key}, tool panicked: {reason}");
                ItemOutcome::Failed {
                    kind: FailureKind::Run,
                    reason,
                    key,
                }
            }
        };

        report.outcomes.push(outcome);
    }

    info!(
        completed = report.completed().count(),
        failed = report.failures().count(),
        failed_keys = ?report.failures().map(ItemOutcome::key).collect::<Vec<_>>(),
        "Finished job"
    );

    report
}

fn persist<T: Serialize>(out_dir: &Path, key: &str, output: &T) -> Result<PathBuf, ExecutorError> {
    let content = serde_yaml::to_string(output)
        .map_err(|error| ExecutorError::Failed(format!("Failed to serialize result: {error}")))?;

    fs::create_dir_all(out_dir)?;
    let path = result_path(out_dir, key);
    fs::write(&path, content)?;

    Ok(path)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
