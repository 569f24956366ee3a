//! Structures and the point mutations to model on them.

use ibex_runner::{config::ConfigErrors, scheduler::WorkItem};
use itertools::{izip, Itertools};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// One structure with the mutations to build on each of its chains.
///
/// `mutations[i]` holds mutations like `L675W` (wild type, position, mutant)
/// applied to chain `chains[i]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MutationItem {
    pub pdb: PathBuf,
    pub mutations: Vec<Vec<String>>,
    pub chains: Vec<String>,
}

impl MutationItem {
    pub fn new(
        pdb: impl Into<PathBuf>,
        mutations: Vec<Vec<String>>,
        chains: Vec<String>,
    ) -> Result<Self, ConfigErrors> {
        let item = Self {
            pdb: pdb.into(),
            mutations,
            chains,
        };
        item.validate()?;

        Ok(item)
    }

    pub fn validate(&self) -> Result<(), ConfigErrors> {
        if self.pdb.file_stem().is_none() {
            return Err(ConfigErrors::Invalid(format!(
                "{} does not name a structure file",
                self.pdb.display()
            )));
        }

        if self.mutations.len() != self.chains.len() {
            return Err(ConfigErrors::LengthMismatch(format!(
                "{}: {} mutation groups for {} chains",
                self.key(),
                self.mutations.len(),
                self.chains.len()
            )));
        }

        if let Some(mutation) = self
            .mutations
            .iter()
            .flatten()
            .find(|mutation| mutation.len() < 3 || !mutation.is_ascii())
        {
            return Err(ConfigErrors::Invalid(format!(
                "{}: malformed mutation {mutation:?}",
                self.key()
            )));
        }

        Ok(())
    }

    /// FoldX individual list, `<wild type><chain><position><mutant>` joined by
    /// commas and closed by a semicolon
    pub fn individual_list(&self) -> String {
        let mutations = izip!(&self.chains, &self.mutations)
            .flat_map(|(chain, group)| {
                group.iter().map(move |mutation| {
                    let split = mutation.chars().next().map_or(0, char::len_utf8);
                    let (wild_type, rest) = mutation.split_at(split);

                    format!("{wild_type}{chain}{rest}")
                })
            })
            .join(",");

        format!("{mutations};")
    }
}

impl WorkItem for MutationItem {
    fn key(&self) -> String {
        self.pdb
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Zip per-structure columns into items, all columns must have the same length
pub fn from_columns(
    pdbs: Vec<PathBuf>,
    mutations: Vec<Vec<Vec<String>>>,
    chains: Vec<Vec<String>>,
) -> Result<Vec<MutationItem>, ConfigErrors> {
    if pdbs.len() != mutations.len() || pdbs.len() != chains.len() {
        return Err(ConfigErrors::LengthMismatch(format!(
            "{} structures, {} mutation lists and {} chain lists",
            pdbs.len(),
            mutations.len(),
            chains.len()
        )));
    }

    izip!(pdbs, mutations, chains)
        .map(|(pdb, mutations, chains)| MutationItem::new(pdb, mutations, chains))
        .collect()
}

/// Load a YAML list of items, relative structure paths are resolved against
/// the directory of the batch file
pub fn load_batch(path: &Path) -> Result<Vec<MutationItem>, ConfigErrors> {
    let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut items: Vec<MutationItem> = serde_yaml::from_str(&content)?;

    let base = path.parent().unwrap_or(Path::new(""));
    for item in items.iter_mut() {
        if item.pdb.is_relative() {
            item.pdb = base.join(&item.pdb);
        }
        item.validate()?;
    }

    Ok(items)
}

/// Parse a command line group `<chain>:<mutation>[,<mutation>..]`
pub fn parse_chain_group(group: &str) -> Result<(String, Vec<String>), ConfigErrors> {
    match group.split_once(':') {
        Some((chain, mutations)) if !chain.is_empty() && !mutations.is_empty() => Ok((
            chain.to_owned(),
            mutations.split(',').map(str::to_owned).collect(),
        )),
        _ => Err(ConfigErrors::Invalid(format!(
            "expected <chain>:<mutation>[,<mutation>..], found {group:?}"
        ))),
    }
}
