//! Run external command-line tools over a Slurm job array.
//!
//! [`scheduler::JobArray`] spreads a batch of [`scheduler::WorkItem`]s over the
//! tasks of a job array, every task then runs [`driver::drive`] over its slice
//! with one [`executor::Executor`] per item.

pub mod config;
pub mod driver;
pub mod executor;
pub mod scheduler;
