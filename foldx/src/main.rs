use clap::{Args, Parser, Subcommand};
use ibex_foldx::{
    adapter::FoldX,
    array::{mutation_array, MutationArrayOptions},
    config::Config,
    mutations::{load_batch, parse_chain_group, MutationItem},
};
use ibex_runner::{
    driver,
    executor::ExecutorOptions,
    scheduler::{read_artifact, WorkItem},
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run FoldX BuildModel over a Slurm job array")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the per-job inputs and the submission script
    Prepare(BatchArgs),
    /// Prepare the job array and submit it with sbatch
    Submit(BatchArgs),
    /// Run every structure of one job, called by the submission script
    Drive {
        /// per-job input written by `prepare`
        job_input: PathBuf,
        /// directory receiving one result per structure
        out_dir: PathBuf,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run FoldX for a single structure and print the energy differences
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[arg(short, long)]
    config: PathBuf,
    /// YAML list of structures with their mutations and chains
    #[arg(short, long)]
    batch: PathBuf,
    #[arg(short, long)]
    out_dir: PathBuf,
    #[arg(long, default_value = "FoldXIbex")]
    job_name: String,
    /// minutes allocated to every FoldX run
    #[arg(long, default_value_t = 1)]
    time_per_command: u64,
    #[arg(long, default_value_t = 2)]
    cpus: u32,
    /// memory per job in GB
    #[arg(long, default_value_t = 4)]
    mem: u32,
    /// upper bound for the number of array tasks
    #[arg(long)]
    max_jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(short, long)]
    config: PathBuf,
    #[arg(long)]
    pdb: PathBuf,
    /// mutations of one chain as `<chain>:<mutation>[,<mutation>..]`, e.g. `A:L675W`
    #[arg(short, long = "mutations", required = true)]
    mutations: Vec<String>,
    /// keep the FoldX output here instead of the temporary directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long)]
    keep_temp_dir: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Prepare(args) => schedule(args, false),
        Commands::Submit(args) => schedule(args, true),
        Commands::Drive {
            job_input,
            out_dir,
            config,
        } => drive(job_input, out_dir, config),
        Commands::Run(args) => run(args),
    }
}

fn schedule(args: BatchArgs, submit: bool) -> ExitCode {
    let config = Config::load(&args.config).unwrap_or_log();

    let items = match load_batch(&args.batch) {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to load batch {}: {e}", args.batch.display());
            return ExitCode::FAILURE;
        }
    };

    let options = MutationArrayOptions {
        job_name: args.job_name,
        time_per_command: args.time_per_command,
        cpus_per_task: args.cpus,
        mem_gb: args.mem,
        max_jobs: args.max_jobs,
    };
    let array = match mutation_array(items, args.out_dir, options, &config, &args.config) {
        Ok(array) => array,
        Err(e) => {
            error!("Failed to set up the job array: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = if submit {
        array.submit().map(|job_id| info!("Submitted job array {job_id}"))
    } else {
        array.prepare().map(|prepared| {
            info!(
                "Wrote {} jobs, submit with `sbatch {}`",
                prepared.plan.njobs,
                prepared.script_file.display()
            )
        })
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Failed structures are logged only, the job itself always succeeds
fn drive(job_input: PathBuf, out_dir: PathBuf, config: PathBuf) -> ExitCode {
    let config = Config::load(&config).unwrap_or_log();

    let items: Vec<MutationItem> = match read_artifact(&job_input) {
        Ok(items) => items,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    driver::drive("FoldX", &items, &out_dir, |item: &MutationItem| {
        FoldX::executor(item.clone(), &config.foldx, ExecutorOptions::default())
    });

    ExitCode::SUCCESS
}

fn run(args: RunArgs) -> ExitCode {
    let config = Config::load(&args.config).unwrap_or_log();

    let groups = match args
        .mutations
        .iter()
        .map(|group| parse_chain_group(group))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(groups) => groups,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let (chains, mutations): (Vec<String>, Vec<Vec<String>>) = groups.into_iter().unzip();

    let item = match MutationItem::new(args.pdb, mutations, chains) {
        Ok(item) => item,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut options = ExecutorOptions::default().keep_temp_dir(args.keep_temp_dir);
    if let Some(out_dir) = args.out_dir {
        options = options.out_dir(out_dir);
    }

    let key = item.key();
    let result = FoldX::executor(item, &config.foldx, options).and_then(|mut executor| {
        if args.keep_temp_dir {
            info!("Keeping temporary directory {}", executor.temp_dir().display());
        }
        executor.run()
    });

    match result.map(|energies| serde_yaml::to_string(&energies)) {
        Ok(Ok(energies)) => {
            print!("{energies}");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Failed to serialize the energies of {key}: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("No energies calculated for {key}: {e}");
            ExitCode::FAILURE
        }
    }
}
