//! Command-line interface for learning-based statistical model checking.

mod model_file;

use clap::{Args, Parser, Subcommand};
use miette::{Diagnostic, NamedSource, SourceSpan};
use smdp_learn::{
    ConfigError, Coordinator, LearnConfig, LearnError, RewardAttribution, RunSummary, SmcMethod,
};
use smdp_model::models::{ExplicitMdp, MutexModel, RandomWalkModel};
use smdp_model::{BoundedReachability, Model, ModelError, Property, State};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    IoError { message: String },

    #[error("model file error: {message}")]
    #[diagnostic(code(smdp::model_file))]
    ModelFileError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid option: {0}")]
    #[diagnostic(code(smdp::config))]
    Config(#[from] ConfigError),

    #[error("model error: {0}")]
    #[diagnostic(code(smdp::model))]
    Model(#[from] ModelError),

    #[error("run failed: {0}")]
    #[diagnostic(code(smdp::learn))]
    Learn(#[from] LearnError),
}

impl CliError {
    fn from_parse_error(e: model_file::ParseError, source: Arc<String>, filename: &str) -> Self {
        CliError::ModelFileError {
            message: e.message,
            src: NamedSource::new(filename, source),
            span: (e.span.start, e.span.len()).into(),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "smdp", version)]
#[command(
    about = "Statistical model checking of MDPs with learned schedulers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// N processes competing for a critical section; checks how likely a
    /// scheduler can put several of them in it at once
    Mutex {
        /// Number of processes
        #[arg(short = 'n', long, default_value = "3")]
        processes: usize,

        /// Goal: at least this many processes critical at the same time
        #[arg(long, default_value = "2")]
        critical: usize,

        /// Step bound of the property
        #[arg(short, long, default_value = "50")]
        bound: usize,

        /// Seed for the per-process probability perturbations
        #[arg(long, default_value = "0")]
        model_seed: u64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Bounded random walks with random guarded jumps; checks whether the
    /// first variable reaches a target value
    Walk {
        /// Number of variables
        #[arg(long, default_value = "3")]
        vars: usize,

        /// Upper bound of every variable
        #[arg(long, default_value = "10")]
        max: i64,

        /// Number of random guarded jump commands
        #[arg(long, default_value = "5")]
        jumps: usize,

        /// Goal value of the first variable (default: max)
        #[arg(long)]
        target: Option<i64>,

        /// Step bound of the property
        #[arg(short, long, default_value = "100")]
        bound: usize,

        /// Seed for the jump commands
        #[arg(long, default_value = "0")]
        model_seed: u64,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Explicit MDP read from a model file; checks reaching a goal state
    Explicit {
        /// Model file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Step bound of the property
        #[arg(short, long, default_value = "100")]
        bound: usize,

        #[command(flatten)]
        run: RunArgs,
    },
}

impl Commands {
    fn run_args(&self) -> &RunArgs {
        match self {
            Commands::Mutex { run, .. }
            | Commands::Walk { run, .. }
            | Commands::Explicit { run, .. } => run,
        }
    }
}

/// Learning and checking options shared by every model.
#[derive(Args)]
struct RunArgs {
    /// Number of worker threads (0 = use all available)
    #[arg(short, long, default_value = "1")]
    threads: usize,

    /// Traces per learning block
    #[arg(long, default_value = "2000")]
    traces: usize,

    /// Number of learning blocks
    #[arg(long, default_value = "30")]
    blocks: usize,

    /// Jobs a worker claims per request
    #[arg(long, default_value = "50")]
    jobs_per_request: usize,

    /// Jobs issued per batch while checking
    #[arg(long, default_value = "100")]
    check_block: usize,

    /// Policy update: count|compcount|success|epsilon|epcount
    #[arg(long, default_value = "count")]
    update: String,

    /// Reward attribution: uniform|lastaction|decay
    #[arg(long, default_value = "uniform")]
    reward: String,

    /// History weight of policy updates
    #[arg(long, default_value = "0.5")]
    history: f64,

    /// Exploration weight of the epsilon updates
    #[arg(long, default_value = "0.1")]
    epsilon: f64,

    /// Reward along a satisfying path [lastaction] (default: 1)
    #[arg(long)]
    pathsat: Option<u64>,

    /// Reward at the end of a satisfying path [lastaction] (default: 1)
    #[arg(long)]
    lastsat: Option<u64>,

    /// Reward along a failing path [lastaction] (default: 1)
    #[arg(long)]
    pathnsat: Option<u64>,

    /// Reward at the end of a failing path [lastaction] (default: 5)
    #[arg(long)]
    lastnsat: Option<u64>,

    /// Reward at the deciding step before decay [decay] (default: 5)
    #[arg(long)]
    decay: Option<u64>,

    /// Stop learning once a Bayes factor test on the block is confident
    #[arg(long)]
    bayes_learning: bool,

    /// Bayes factor that stops learning
    #[arg(long, default_value = "30")]
    learn_t: f64,

    /// Added to theta for the learning test
    #[arg(long, default_value = "0.05")]
    iota: f64,

    /// Check with the stochastic policy instead of its most likely choices
    #[arg(long)]
    no_determinisation: bool,

    /// Estimate the probability instead of testing it against theta
    #[arg(long)]
    interval_estimation: bool,

    /// Beta prior alpha
    #[arg(long, default_value = "0.5")]
    alpha: f64,

    /// Beta prior beta
    #[arg(long, default_value = "0.5")]
    beta: f64,

    /// Probability bound of the hypothesis test
    #[arg(long, default_value = "0.5")]
    theta: f64,

    /// Bayes factor threshold of the hypothesis test
    #[arg(short = 'T', long, default_value = "1000")]
    threshold: f64,

    /// Minimum traces before the hypothesis test decides
    #[arg(long, default_value = "500")]
    min_traces: u64,

    /// Traces after which the hypothesis test must decide
    #[arg(long, default_value = "100000")]
    max_traces: u64,

    /// Half-width of the estimated interval
    #[arg(long, default_value = "0.01")]
    delta: f64,

    /// Posterior probability required inside the interval
    #[arg(long, default_value = "0.95")]
    coefficient: f64,

    /// Seed for the workers' random generators
    #[arg(long)]
    seed: Option<u64>,

    /// Print the result as one CSV line
    #[arg(long)]
    machine: bool,

    /// Print phase timings as CSV, appended to the result line with --machine
    #[arg(long)]
    profile: bool,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

impl RunArgs {
    fn to_config(&self) -> CliResult<LearnConfig> {
        let mut reward: RewardAttribution = self.reward.parse()?;
        match &mut reward {
            RewardAttribution::Uniform => {}
            RewardAttribution::LastAction {
                path_sat,
                last_sat,
                path_nsat,
                last_nsat,
            } => {
                *path_sat = self.pathsat.unwrap_or(*path_sat);
                *last_sat = self.lastsat.unwrap_or(*last_sat);
                *path_nsat = self.pathnsat.unwrap_or(*path_nsat);
                *last_nsat = self.lastnsat.unwrap_or(*last_nsat);
            }
            RewardAttribution::Decay { start } => {
                *start = self.decay.unwrap_or(*start);
            }
        }

        let config = LearnConfig {
            num_threads: self.threads,
            traces_per_block: self.traces,
            num_blocks: self.blocks,
            jobs_per_request: self.jobs_per_request,
            modelcheck_block_size: self.check_block,
            history: self.history,
            epsilon: self.epsilon,
            learn_t: self.learn_t,
            iota: self.iota,
            bayes_learning: self.bayes_learning,
            determinise: !self.no_determinisation,
            policy_update: self.update.parse()?,
            reward,
            method: if self.interval_estimation {
                SmcMethod::IntervalEstimation
            } else {
                SmcMethod::HypothesisTesting
            },
            alpha: self.alpha,
            beta: self.beta,
            theta: self.theta,
            t: self.threshold,
            min_traces: self.min_traces,
            max_traces: self.max_traces,
            delta: self.delta,
            coefficient: self.coefficient,
            seed: self.seed,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    // Install miette's fancy error handler
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    // Logs go to stderr so CSV output stays clean.
    let args = cli.command.run_args();
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else if args.machine {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Mutex {
            processes,
            critical,
            bound,
            model_seed,
            run,
        } => cmd_mutex(processes, critical, bound, model_seed, &run),
        Commands::Walk {
            vars,
            max,
            jumps,
            target,
            bound,
            model_seed,
            run,
        } => cmd_walk(vars, max, jumps, target, bound, model_seed, &run),
        Commands::Explicit { file, bound, run } => cmd_explicit(&file, bound, &run),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn cmd_mutex(
    processes: usize,
    critical: usize,
    bound: usize,
    model_seed: u64,
    run: &RunArgs,
) -> CliResult<()> {
    let config = run.to_config()?;
    let model = MutexModel::new(processes, model_seed);
    let property = BoundedReachability::new(bound, move |s| {
        MutexModel::critical_count(s) >= critical
    });
    info!(processes, critical, bound, "checking mutex model");
    execute(model, property, config, run)
}

#[allow(clippy::too_many_arguments)]
fn cmd_walk(
    vars: usize,
    max: i64,
    jumps: usize,
    target: Option<i64>,
    bound: usize,
    model_seed: u64,
    run: &RunArgs,
) -> CliResult<()> {
    let config = run.to_config()?;
    let model = RandomWalkModel::new(vars, max, jumps, model_seed)?;
    let target = target.unwrap_or(max);
    let property = BoundedReachability::new(bound, move |s| s.get(0) >= target);
    info!(vars, max, jumps, target, bound, "checking random walk model");
    execute(model, property, config, run)
}

fn cmd_explicit(file: &Path, bound: usize, run: &RunArgs) -> CliResult<()> {
    let config = run.to_config()?;
    let filename = file.display().to_string();
    let source = Arc::new(fs::read_to_string(file).map_err(|e| CliError::IoError {
        message: format!("{}: {}", filename, e),
    })?);
    let parsed = model_file::parse(&source)
        .map_err(|e| CliError::from_parse_error(e, source.clone(), &filename))?;

    let goals: Vec<State> = parsed.goals.iter().map(|&g| ExplicitMdp::state(g)).collect();
    info!(
        file = %filename,
        states = parsed.mdp.num_states(),
        goals = goals.len(),
        bound,
        "checking explicit model"
    );
    let property = BoundedReachability::new(bound, move |s| goals.contains(s));
    execute(parsed.mdp, property, config, run)
}

fn execute<M, P>(model: M, property: P, config: LearnConfig, run: &RunArgs) -> CliResult<()>
where
    M: Model + Send + Sync + 'static,
    M::Context: 'static,
    P: Property<M::State> + Send + Sync + 'static,
{
    let mut coordinator = Coordinator::new(model, property, config)?;
    let summary = coordinator.run()?;
    print_summary(&summary, run);
    Ok(())
}

fn print_summary(summary: &RunSummary, run: &RunArgs) {
    if run.machine {
        if run.profile {
            println!("{}, {}", summary.outcome.csv(), summary.profile.csv());
        } else {
            println!("{}", summary.outcome.csv());
        }
    } else {
        println!("{}", summary.outcome);
        if summary.learning.stopped_early {
            println!(
                " - Learning stopped early after {} blocks",
                summary.learning.blocks
            );
        }
        println!(" - Policy has {} states", summary.profile.policy_states);
        println!(
            " - Total run time: {:.3}s",
            summary.profile.total.as_secs_f64()
        );
        if run.verbose {
            println!("{}", summary.profile);
        }
        if run.profile {
            println!("{}", summary.profile.csv());
        }
    }
}
