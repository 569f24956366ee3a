use ibex_runner::{
    driver::{drive, result_path, ItemOutcome},
    executor::{
        Directories, Executor, ExecutorError, ExecutorOptions, FailureKind, RunOutput,
        ToolAdapter,
    },
    scheduler::WorkItem,
};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Sample {
    name: String,
    value: u32,
}

impl WorkItem for Sample {
    fn key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Doubled {
    value: u32,
}

/// doubles the value with a shell, items named `broken` exit nonzero
struct Doubler {
    item: Sample,
}

impl ToolAdapter for Doubler {
    type Output = Doubled;

    fn name(&self) -> &str {
        "doubler"
    }

    fn arguments(&self, _dirs: &Directories) -> Vec<OsString> {
        let script = if self.item.name == "broken" {
            String::from("echo 'cannot double' >&2; exit 1")
        } else {
            format!("echo $(( {} * 2 )) > out.txt", self.item.value)
        };

        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn working_directory(&self, dirs: &Directories) -> Option<PathBuf> {
        Some(dirs.out_dir.clone())
    }

    fn output_files(&self, dirs: &Directories) -> Vec<PathBuf> {
        vec![dirs.out_dir.join("out.txt")]
    }

    fn finish(&self, dirs: &Directories, _output: &RunOutput) -> Result<Doubled, ExecutorError> {
        let content = fs::read_to_string(dirs.out_dir.join("out.txt"))?;
        let value = content.trim().parse().map_err(|_| {
            ExecutorError::Failed(format!("unexpected output {content:?}"))
        })?;

        Ok(Doubled { value })
    }
}

// log sink shared with a test subscriber
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

fn samples(names: &[&str]) -> Vec<Sample> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| Sample {
            name: name.to_string(),
            value: i as u32 + 1,
        })
        .collect()
}

#[test]
fn one_failing_item_does_not_stop_the_others() {
    let out_dir = tempfile::tempdir().unwrap();
    let items = samples(&["first", "broken", "third"]);

    let report = drive("doubler", &items, out_dir.path(), |item: &Sample| {
        Executor::new(Doubler { item: item.clone() }, ExecutorOptions::default())
    });

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.completed().count(), 2);

    let failures = report.failures().collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    match failures[0] {
        ItemOutcome::Failed { key, kind, reason } => {
            assert_eq!(key, "broken");
            assert_eq!(*kind, FailureKind::Run);
            assert!(reason.contains("cannot double"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    for (name, expected) in [("first", 2), ("third", 6)] {
        let content = fs::read_to_string(result_path(out_dir.path(), name)).unwrap();
        let doubled: Doubled = serde_yaml::from_str(&content).unwrap();
        assert_eq!(doubled, Doubled { value: expected });
    }
    assert!(!result_path(out_dir.path(), "broken").exists());
}

#[test]
fn failing_construction_and_panics_are_contained() {
    let out_dir = tempfile::tempdir().unwrap();
    let items = samples(&["unbuildable", "panicking", "fine"]);

    let report = drive("doubler", &items, out_dir.path(), |item: &Sample| {
        match item.name.as_str() {
            "unbuildable" => Err(ExecutorError::Failed(String::from("no binary"))),
            "panicking" => panic!("adapter bug"),
            _ => Executor::new(Doubler { item: item.clone() }, ExecutorOptions::default()),
        }
    });

    let keys = report
        .outcomes
        .iter()
        .map(|outcome| (outcome.key(), outcome.is_completed()))
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec![("unbuildable", false), ("panicking", false), ("fine", true)]
    );
    assert!(matches!(
        &report.outcomes[1],
        ItemOutcome::Failed { reason, .. } if reason == "adapter bug"
    ));
}

#[test]
fn each_failing_item_is_logged_once() {
    let out_dir = tempfile::tempdir().unwrap();
    let items = samples(&["first", "broken", "third"]);

    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || {
        drive("doubler", &items, out_dir.path(), |item: &Sample| {
            Executor::new(Doubler { item: item.clone() }, ExecutorOptions::default())
        })
    });
    assert_eq!(report.failures().count(), 1);

    let lines = captured.lines();
    let failures = lines
        .iter()
        .filter(|line| line.contains("ERROR") || line.contains("WARN"))
        .collect::<Vec<_>>();
    assert_eq!(failures.len(), 1, "{lines:#?}");
    assert!(failures[0].contains("No result calculated for broken"));

    let summary = lines
        .iter()
        .find(|line| line.contains("Finished job"))
        .unwrap();
    assert!(summary.contains("failed=1"));
    assert!(summary.contains(r#"failed_keys=["broken"]"#));
}
