use ibex_foldx::{
    array::{mutation_array, MutationArrayOptions},
    config::{Config, FoldxConfig},
    mutations::MutationItem,
};
use ibex_runner::{
    config::SchedulerConfig,
    scheduler::{read_artifact, SchedulerError},
};
use std::{fs, path::Path};

fn items(dir: &Path, names: &[&str]) -> Vec<MutationItem> {
    names
        .iter()
        .map(|name| {
            MutationItem::new(
                dir.join(format!("{name}.pdb")),
                vec![vec![String::from("L675W")], vec![String::from("L675P")]],
                vec![String::from("A"), String::from("B")],
            )
            .unwrap()
        })
        .collect()
}

// written configuration plus the matching in-memory one, the driver is fixed
// so the script does not point at the test binary
fn config(dir: &Path, max_jobs: Option<usize>) -> (Config, std::path::PathBuf) {
    let path = dir.join("config.yaml");
    fs::write(&path, "foldx:\n  bin: foldx\n").unwrap();

    let config = Config {
        foldx: FoldxConfig {
            bin: dir.join("foldx"),
            executable: String::from("foldx_20221231"),
        },
        scheduler: SchedulerConfig {
            max_jobs,
            driver: Some("/opt/ibex/bin/ibex-foldx".into()),
            ..SchedulerConfig::default()
        },
    };

    (config, path)
}

#[test]
fn two_structures_make_two_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();
    let (config, config_path) = config(dir.path(), None);
    let batch = items(dir.path(), &["2oun", "1bni"]);

    let array = mutation_array(
        batch.clone(),
        &out_dir,
        MutationArrayOptions::default(),
        &config,
        &config_path,
    )
    .unwrap();
    let prepared = array.prepare().unwrap();

    let out_dir = fs::canonicalize(&out_dir).unwrap();
    let config_path = fs::canonicalize(&config_path).unwrap();
    let expected = format!(
        "#!/bin/bash --login
#SBATCH --job-name=FoldXIbex
#SBATCH --partition=batch
#SBATCH --output=\"{out}/out_ibex/%A_%a.out\"
#SBATCH --time=00:01:00
#SBATCH --ntasks=1
#SBATCH --cpus-per-task=2
#SBATCH --mem=4G
#SBATCH --array=0-1

job_file=\"{out}/pdbs/pdbs${{SLURM_ARRAY_TASK_ID}}.yaml\"
/opt/ibex/bin/ibex-foldx drive \"${{job_file}}\" {out} --config {config}
",
        out = out_dir.display(),
        config = config_path.display(),
    );
    assert_eq!(prepared.script, expected);

    assert_eq!(prepared.artifacts.len(), 2);
    for (job, item) in batch.iter().enumerate() {
        let path = out_dir.join(format!("pdbs/pdbs{job}.yaml"));
        let read: Vec<MutationItem> = read_artifact(&path).unwrap();
        assert_eq!(read, vec![item.clone()]);
    }
}

#[test]
fn max_jobs_option_overrides_the_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let (config, config_path) = config(dir.path(), Some(1000));
    let batch = items(dir.path(), &["a", "b", "c", "d", "e"]);

    let options = MutationArrayOptions {
        max_jobs: Some(2),
        ..MutationArrayOptions::default()
    };
    let array = mutation_array(batch, dir.path().join("out"), options, &config, &config_path).unwrap();

    let plan = array.plan().unwrap();
    assert_eq!(plan.njobs, 2);
    assert_eq!(plan.commands_per_job, 3);
    assert_eq!(plan.time_per_job, 3);
}

#[test]
fn empty_batch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (config, config_path) = config(dir.path(), None);

    let array = mutation_array(
        Vec::new(),
        dir.path().join("out"),
        MutationArrayOptions::default(),
        &config,
        &config_path,
    )
    .unwrap();

    assert!(matches!(array.prepare(), Err(SchedulerError::EmptyBatch)));
}
