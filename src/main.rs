#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process;

use qn_bfgs::{
    Bfgs, BfgsError, BfgsSolution, IterationSink, ObjectiveKind, Quartic, Rosenbrock,
    SolverConfig, TableWriter, Termination,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum ObjectiveCli {
    Rosenbrock,
    Quartic,
}

impl From<ObjectiveCli> for ObjectiveKind {
    fn from(value: ObjectiveCli) -> Self {
        match value {
            ObjectiveCli::Rosenbrock => ObjectiveKind::Rosenbrock,
            ObjectiveCli::Quartic => ObjectiveKind::Quartic,
        }
    }
}

/// Minimize a reference objective with BFGS and a backtracking line search.
#[derive(Parser)]
#[command(name = "qn-bfgs", version, about)]
pub struct Cli {
    /// Solver settings (.toml). Flags below override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Objective to minimize
    #[arg(long, value_enum)]
    pub objective: Option<ObjectiveCli>,

    /// Starting point as comma-separated values, e.g. --x0=-1.2,1.0
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub x0: Vec<f64>,

    /// Maximum number of outer iterations
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Convergence tolerance shared by the gradient, step, and objective tests
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Append the iteration table to this file instead of printing it
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub dump_config: bool,
}

fn effective_config(cli: &Cli) -> Result<SolverConfig, BfgsError> {
    let mut config = match &cli.config {
        Some(path) => SolverConfig::load(path)?,
        None => SolverConfig::default(),
    };
    if let Some(objective) = cli.objective {
        let kind = ObjectiveKind::from(objective);
        if kind != config.objective && cli.x0.is_empty() {
            // The configured point belonged to the other objective.
            config.initial_point.clear();
        }
        config.objective = kind;
    }
    if !cli.x0.is_empty() {
        config.initial_point = cli.x0.clone();
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    config.validate()?;
    Ok(config)
}

fn minimize<S: IterationSink>(config: &SolverConfig, sink: S) -> Result<BfgsSolution, BfgsError> {
    match config.objective {
        ObjectiveKind::Rosenbrock => {
            Bfgs::from_config(config, Rosenbrock::default())?.run_with_sink(sink)
        }
        ObjectiveKind::Quartic => Bfgs::from_config(config, Quartic)?.run_with_sink(sink),
    }
}

fn run(cli: Cli) -> Result<BfgsSolution, BfgsError> {
    let config = effective_config(&cli)?;
    log::debug!("[BFGS] effective config: {:?}", config);
    match &cli.output {
        Some(path) => minimize(&config, TableWriter::append(path)?),
        None => minimize(&config, TableWriter::new(io::stdout())),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.dump_config {
        match effective_config(&cli).and_then(|config| config.to_toml_string()) {
            Ok(text) => {
                print!("{text}");
                process::exit(0);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }

    let solution = match run(cli) {
        Ok(solution) => solution,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    println!();
    println!("final point:    {}", solution.final_point);
    println!("final value:    {:.6e}", solution.final_value);
    println!("gradient norm:  {:.6e}", solution.final_gradient_norm);
    println!(
        "iterations:     {} ({} evaluations)",
        solution.iterations, solution.func_evals
    );

    let code = match &solution.termination {
        Termination::Converged(criterion) => {
            println!("terminated:     converged ({criterion:?})");
            0
        }
        Termination::MaxIterationsExceeded => {
            println!("terminated:     iteration budget exhausted");
            2
        }
        Termination::Failed(err) => {
            println!("terminated:     failed ({err})");
            1
        }
    };
    process::exit(code);
}
