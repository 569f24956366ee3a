use super::config::Config;
use ibex_runner::config::{ConfigErrors, Environment};
use std::{fs, os::unix::fs::PermissionsExt, path::Path};

fn install(dir: &Path, mode: u32) {
    let bin = dir.join("foldx");
    fs::create_dir_all(&bin).unwrap();
    let executable = bin.join("foldx_20221231");
    fs::write(&executable, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&executable, fs::Permissions::from_mode(mode)).unwrap();
}

#[test]
pub fn parse_with_defaults() {
    let config = Config::parse("foldx:\n  bin: /opt/foldx\n").unwrap();

    assert_eq!(config.foldx.executable, "foldx_20221231");
    assert_eq!(
        config.foldx.executable_path(),
        Path::new("/opt/foldx/foldx_20221231")
    );
    assert_eq!(config.scheduler.partition, "batch");
    assert_eq!(config.scheduler.max_jobs, None);
    assert!(config.scheduler.environment.is_empty());
}

#[test]
pub fn parse_scheduler_section() {
    let config = Config::parse(
        "foldx:
  bin: /opt/foldx
  executable: foldx5
scheduler:
  partition: gpu
  max_jobs: 1000
  environment:
    modules: [gcc/12]
    conda: /home/user/envs/foldx
",
    )
    .unwrap();

    assert_eq!(config.scheduler.partition, "gpu");
    assert_eq!(config.scheduler.max_jobs, Some(1000));
    assert_eq!(
        config.scheduler.environment,
        Environment {
            modules: vec![String::from("gcc/12")],
            conda: Some(String::from("/home/user/envs/foldx")),
        }
    );
    assert_eq!(
        config.scheduler.environment.activation(),
        vec!["module load gcc/12", "conda activate /home/user/envs/foldx"]
    );
}

#[test]
pub fn unknown_fields_are_rejected() {
    let result = Config::parse("foldx:\n  bin: /opt/foldx\n  binary: foldx\n");

    assert!(matches!(result, Err(ConfigErrors::Parse(_))));
}

#[test]
pub fn load_resolves_relative_install() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path(), 0o755);
    let path = dir.path().join("config.yaml");
    fs::write(&path, "foldx:\n  bin: foldx\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.foldx.bin, dir.path().join("foldx"));
}

#[test]
pub fn load_fails_preflight_for_missing_install() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "foldx:\n  bin: missing\n").unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigErrors::Preflight)));
}

#[test]
pub fn load_fails_preflight_for_non_executable_binary() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path(), 0o644);
    let path = dir.path().join("config.yaml");
    fs::write(&path, "foldx:\n  bin: foldx\n").unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigErrors::Preflight)));
}

#[test]
pub fn load_fails_preflight_for_zero_job_cap() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path(), 0o755);
    let path = dir.path().join("config.yaml");
    fs::write(&path, "foldx:\n  bin: foldx\nscheduler:\n  max_jobs: 0\n").unwrap();

    assert!(matches!(Config::load(&path), Err(ConfigErrors::Preflight)));
}
