//! `causal` — a thin command-line shell over the library's Query API.
//!
//! Mirrors the split the library documents in `lib.rs`: core operations
//! never touch I/O or a process-wide logger, so this binary is where model
//! loading, the `tracing` subscriber, and `std::process::exit` all live.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use causal_engine::config::DeconfoundingPolicy;
use causal_engine::error::CoreError;
use causal_engine::graph::{EdgeGraph, VarSet};
use causal_engine::model::loader::load_model_file;
use causal_engine::model::Model;
use causal_engine::query::{Assertion, AssertionSet, Query};
use causal_engine::{docalc, evaluator, Config};

#[derive(Parser)]
#[command(name = "causal", version, about = "Causal inference over discrete Bayesian networks")]
struct Cli {
    /// Path to a model file (.json, .yml, or .yaml).
    #[arg(long, global = true)]
    model: PathBuf,

    /// Seed for the `random` deconfounding-set policy.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Restrict deconfounding-set search to set-inclusion-minimal sets.
    #[arg(long, global = true)]
    minimal_sets: bool,

    /// How to choose among multiple valid deconfounding sets.
    #[arg(long, global = true, value_enum)]
    deconfounding_policy: Option<PolicyArg>,

    /// Iterative-deepening depth bound for the do-calculus search.
    #[arg(long, global = true)]
    depth_bound: Option<usize>,

    /// Ceiling on total rewrite attempts across the do-calculus search.
    #[arg(long, global = true)]
    step_budget: Option<usize>,

    /// CPT row-group normalization / deconfounding-agreement tolerance.
    #[arg(long, global = true)]
    tolerance: Option<f64>,

    /// `trace`, `debug`, `info`, `warn`, or `error`.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Ask,
    Random,
    All,
}

impl From<PolicyArg> for DeconfoundingPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Ask => DeconfoundingPolicy::Ask,
            PolicyArg::Random => DeconfoundingPolicy::Random,
            PolicyArg::All => DeconfoundingPolicy::All,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate `P(head | body)`, where `body` may mix observations and
    /// `do(...)` interventions.
    P {
        /// Assertions making up the head, e.g. `Y=y0`. Repeatable or comma-separated.
        #[arg(long, value_delimiter = ',', required = true)]
        head: Vec<String>,
        /// Assertions making up the body, e.g. `X=x0` or `do(X=x0)`.
        #[arg(long, value_delimiter = ',')]
        given: Vec<String>,
        /// When the `ask` policy is active, the deconfounding set to use,
        /// e.g. `Z` or `Z1,Z2`. Ignored otherwise.
        #[arg(long, value_delimiter = ',')]
        deconfound_with: Vec<String>,
    },
    /// List unblocked backdoor paths from `x` to `y`.
    Backdoors {
        #[arg(long)]
        x: String,
        #[arg(long)]
        y: String,
        #[arg(long, value_delimiter = ',')]
        blockers: Vec<String>,
    },
    /// List deconfounding sets for `(x, y)`.
    Deconfound {
        #[arg(long)]
        x: String,
        #[arg(long)]
        y: String,
    },
    /// Print the full joint distribution table over every non-latent variable.
    Jdt,
    /// Print the model's lexicographically smallest topological order.
    Topology,
    /// Load and validate the model, then exit.
    Validate,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(5);
        }
    };

    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read model file '{path}': {source}")]
    ModelIo { path: String, source: std::io::Error },
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    ArgShape(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::ModelIo { .. } => 4,
            CliError::ArgShape(_) => 2,
            CliError::Core(CoreError::QueryShape(_)) => 2,
            CliError::Core(CoreError::DoCalculusFailed { .. }) => 3,
            CliError::Core(CoreError::ZeroProbability(_))
            | CliError::Core(CoreError::NumericDrift { .. })
            | CliError::Core(CoreError::InconsistentDeconfounding { .. }) => 3,
            CliError::Core(CoreError::MalformedModel(_))
            | CliError::Core(CoreError::CyclicGraph(_))
            | CliError::Core(CoreError::MalformedTable { .. }) => 1,
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if !cli.model.exists() {
        return Err(CliError::ModelIo {
            path: cli.model.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }

    let mut config = Config::default();
    if let Some(seed) = cli.seed {
        config.inference.seed = seed;
    }
    config.inference.minimal_sets = cli.minimal_sets || config.inference.minimal_sets;
    if let Some(policy) = cli.deconfounding_policy {
        config.inference.deconfounding_policy = policy.into();
    }
    if let Some(depth_bound) = cli.depth_bound {
        config.inference.depth_bound = depth_bound;
    }
    if let Some(step_budget) = cli.step_budget {
        config.inference.step_budget = Some(step_budget);
    }
    if let Some(tolerance) = cli.tolerance {
        config.inference.tolerance = tolerance;
    }

    let model = load_model_file(&cli.model, config.inference.tolerance)?;

    match cli.command {
        Command::P {
            head,
            given,
            deconfound_with,
        } => run_p(&model, &config, &head, &given, &deconfound_with),
        Command::Backdoors { x, y, blockers } => run_backdoors(&model, &x, &y, &blockers),
        Command::Deconfound { x, y } => run_deconfound(&model, &config, &x, &y),
        Command::Jdt => run_jdt(&model, &config),
        Command::Topology => run_topology(&model),
        Command::Validate => {
            println!("model '{}' is valid ({} variables)", model.name.as_deref().unwrap_or("<unnamed>"), model.variables().count());
            Ok(())
        }
    }
}

fn run_p(
    model: &Model,
    config: &Config,
    head: &[String],
    given: &[String],
    deconfound_with: &[String],
) -> Result<(), CliError> {
    let head_set = parse_assertions(head)?;
    let body_set = parse_assertions(given)?;
    let query = Query::new(head_set, body_set).map_err(CliError::Core)?;

    let ask_choice: Option<VarSet> = if deconfound_with.is_empty() {
        None
    } else {
        Some(deconfound_with.iter().cloned().collect())
    };

    let p = docalc::infer_with_choice(&query, model, config, ask_choice.as_ref())?;
    println!("{p}");
    Ok(())
}

fn run_backdoors(model: &Model, x: &str, y: &str, blockers: &[String]) -> Result<(), CliError> {
    let graph = EdgeGraph::from_model(model);
    let x_set: VarSet = [x.to_string()].into_iter().collect();
    let y_set: VarSet = [y.to_string()].into_iter().collect();
    let blockers_set: VarSet = blockers.iter().cloned().collect();
    let paths = graph.backdoor_paths(&x_set, &y_set, &blockers_set);
    if paths.is_empty() {
        println!("no unblocked backdoor paths");
    } else {
        for path in paths {
            println!("{}", path.join(" -> "));
        }
    }
    Ok(())
}

fn run_deconfound(model: &Model, config: &Config, x: &str, y: &str) -> Result<(), CliError> {
    let graph = EdgeGraph::from_model(model);
    let x_set: VarSet = [x.to_string()].into_iter().collect();
    let y_set: VarSet = [y.to_string()].into_iter().collect();
    let sets = graph.deconfounding_sets(&x_set, &y_set, config.inference.minimal_sets);
    if sets.is_empty() {
        println!("no deconfounding set exists");
    } else {
        for set in sets {
            let names: Vec<&str> = set.iter().map(String::as_str).collect();
            println!("{{{}}}", names.join(", "));
        }
    }
    Ok(())
}

fn run_jdt(model: &Model, config: &Config) -> Result<(), CliError> {
    let table = evaluator::joint_distribution_table(model, config.inference.numeric_epsilon)?;
    for (assignment, probability) in table {
        let row: Vec<String> = assignment
            .iter()
            .map(|(var, outcome)| format!("{var}={outcome}"))
            .collect();
        println!("{}: {probability}", row.join(", "));
    }
    Ok(())
}

fn run_topology(model: &Model) -> Result<(), CliError> {
    println!("{}", model.topological_order().join(" -> "));
    Ok(())
}

/// Parses `VAR=outcome` and `do(VAR=outcome)` tokens into an [`AssertionSet`].
fn parse_assertions(tokens: &[String]) -> Result<AssertionSet, CliError> {
    let mut assertions = Vec::with_capacity(tokens.len());
    for token in tokens {
        assertions.push(parse_assertion(token)?);
    }
    Ok(AssertionSet::new(assertions))
}

fn parse_assertion(token: &str) -> Result<Assertion, CliError> {
    let token = token.trim();
    if let Some(inner) = token.strip_prefix("do(").and_then(|s| s.strip_suffix(')')) {
        let (var, outcome) = split_assertion(inner)?;
        Ok(Assertion::intervened(var, outcome))
    } else {
        let (var, outcome) = split_assertion(token)?;
        Ok(Assertion::observed(var, outcome))
    }
}

fn split_assertion(token: &str) -> Result<(String, String), CliError> {
    token
        .split_once('=')
        .map(|(var, outcome)| (var.trim().to_string(), outcome.trim().to_string()))
        .ok_or_else(|| CliError::ArgShape(format!("malformed assertion '{token}', expected VAR=outcome")))
}
