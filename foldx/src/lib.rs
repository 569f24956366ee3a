//! FoldX `BuildModel` runs over a Slurm job array.

pub mod adapter;
pub mod array;
pub mod config;
pub mod mutations;

#[cfg(test)]
mod config_test;
