use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackingError {
    #[error("max_jobs must be greater than zero")]
    ZeroJobCap,
}

/// How a batch of commands is spread over the tasks of a job array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packing {
    pub ncommands: usize,
    pub njobs: usize,
    pub commands_per_job: usize,
}

/// Spread `ncommands` over at most `max_jobs` array tasks.
///
/// Below the cap every command gets its own task, above it commands are packed
/// evenly and only the last task may receive fewer commands.
pub fn pack(ncommands: usize, max_jobs: Option<usize>) -> Result<Packing, PackingError> {
    let commands_per_job = match max_jobs {
        Some(0) => return Err(PackingError::ZeroJobCap),
        Some(max_jobs) if ncommands > max_jobs => ncommands.div_ceil(max_jobs),
        _ => 1,
    };

    Ok(Packing {
        ncommands,
        njobs: ncommands.div_ceil(commands_per_job),
        commands_per_job,
    })
}

impl Packing {
    /// command index range handled by `job`
    pub fn range(&self, job: usize) -> Range<usize> {
        let start = (job * self.commands_per_job).min(self.ncommands);
        let end = (start + self.commands_per_job).min(self.ncommands);

        start..end
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.njobs).map(|job| self.range(job))
    }
}
