//! FoldX `BuildModel` as a tool adapter.

use crate::{config::FoldxConfig, mutations::MutationItem};
use ibex_runner::{
    executor::{
        Directories, Executor, ExecutorError, ExecutorOptions, ParseError, RunOutput, ToolAdapter,
    },
    scheduler::WorkItem,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
};

/// name of the mutation list handed to FoldX
pub const MUTANT_FILE: &str = "individual_list.txt";

// non-blank lines in front of the column header of a FoldX table
const PREAMBLE_LINES: usize = 7;

/// Change of every energy term between the wild type and the mutant, in kcal/mol
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnergyTerms {
    pub pdb: String,
    pub terms: Vec<EnergyTerm>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnergyTerm {
    pub name: String,
    pub value: f64,
}

impl EnergyTerms {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.terms
            .iter()
            .find(|term| term.name == name)
            .map(|term| term.value)
    }

    pub fn total_energy(&self) -> Option<f64> {
        self.get("total energy")
    }
}

#[derive(Debug, Clone)]
pub struct FoldX {
    item: MutationItem,
    bin: PathBuf,
    executable: PathBuf,
    pdb_dir: PathBuf,
}

impl FoldX {
    pub fn new(item: MutationItem, config: &FoldxConfig) -> Result<Self, ExecutorError> {
        let pdb_dir = match item.pdb.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::path::absolute(parent)?,
            _ => std::env::current_dir()?,
        };

        Ok(Self {
            bin: std::path::absolute(&config.bin)?,
            executable: std::path::absolute(config.executable_path())?,
            pdb_dir,
            item,
        })
    }

    /// Executor modelling the mutations of `item`
    pub fn executor(
        item: MutationItem,
        config: &FoldxConfig,
        options: ExecutorOptions,
    ) -> Result<Executor<Self>, ExecutorError> {
        Executor::new(Self::new(item, config)?, options)
    }

    pub fn item(&self) -> &MutationItem {
        &self.item
    }

    pub fn mutant_file(dirs: &Directories) -> PathBuf {
        dirs.out_dir.join(MUTANT_FILE)
    }

    /// table of energy differences FoldX writes for the structure
    pub fn difference_file(&self, dirs: &Directories) -> PathBuf {
        dirs.out_dir.join(format!("Dif_{}.fxout", self.item.key()))
    }
}

fn flag(name: &str, value: &OsStr) -> OsString {
    let mut flag = OsString::from(name);
    flag.push(value);
    flag
}

impl ToolAdapter for FoldX {
    type Output = EnergyTerms;

    fn name(&self) -> &str {
        "FoldX"
    }

    fn arguments(&self, dirs: &Directories) -> Vec<OsString> {
        vec![
            self.executable.clone().into_os_string(),
            OsString::from("--command=BuildModel"),
            flag("--pdb=", self.item.pdb.file_name().unwrap_or_default()),
            flag("--pdb-dir=", self.pdb_dir.as_os_str()),
            flag("--mutant-file=", Self::mutant_file(dirs).as_os_str()),
            flag("--output-dir=", dirs.out_dir.as_os_str()),
        ]
    }

    fn working_directory(&self, _dirs: &Directories) -> Option<PathBuf> {
        Some(self.bin.clone())
    }

    fn prepare(&self, dirs: &Directories) -> Result<(), ExecutorError> {
        fs::write(Self::mutant_file(dirs), self.item.individual_list())?;
        Ok(())
    }

    fn output_files(&self, dirs: &Directories) -> Vec<PathBuf> {
        vec![self.difference_file(dirs)]
    }

    fn finish(&self, dirs: &Directories, _output: &RunOutput) -> Result<EnergyTerms, ExecutorError> {
        Ok(read_difference_file(&self.difference_file(dirs))?)
    }
}

pub fn read_difference_file(path: &Path) -> Result<EnergyTerms, ParseError> {
    let content = fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_difference(&content, path)
}

/// Parse the first row of a FoldX `Dif_*.fxout` table.
///
/// The table follows a fixed preamble, its header starts with a `Pdb` column
/// naming the model, every other column is a numeric energy term.
pub fn parse_difference(content: &str, path: &Path) -> Result<EnergyTerms, ParseError> {
    let malformed = |message: String| ParseError::Malformed {
        path: path.to_path_buf(),
        message,
    };

    let mut lines = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .skip(PREAMBLE_LINES);
    let header = lines
        .next()
        .ok_or_else(|| malformed(String::from("missing column header")))?;
    let row = lines
        .next()
        .ok_or_else(|| malformed(String::from("missing energy row")))?;

    let names = cells(header);
    let values = cells(row);

    if names.first() != Some(&"Pdb") {
        return Err(malformed(format!("expected a Pdb column, found {header:?}")));
    }
    if names.len() != values.len() {
        return Err(malformed(format!(
            "{} columns in the header but {} in the row",
            names.len(),
            values.len()
        )));
    }

    let terms = names
        .iter()
        .zip(values.iter())
        .skip(1)
        .map(|(name, value)| {
            value
                .parse::<f64>()
                .map(|value| EnergyTerm {
                    name: name.to_string(),
                    value,
                })
                .map_err(|_| malformed(format!("{name}: {value:?} is not a number")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EnergyTerms {
        pdb: values[0].to_owned(),
        terms,
    })
}

fn cells(line: &str) -> Vec<&str> {
    let mut cells = line.split('\t').map(str::trim).collect_vec();
    while cells.last() == Some(&"") {
        cells.pop();
    }

    cells
}
