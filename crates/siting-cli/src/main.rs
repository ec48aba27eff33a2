use clap::{Parser, Subcommand, ValueEnum};
use siting_core::{CandidateRule, RunConfig, RunOutput, ResultWriter};
use siting_solver::HighsBackend;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "siting")]
#[command(about = "Bi-objective siting of new treatment facilities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep the weight range (or solve one weight) for each budget and write the result tables
    Solve {
        #[command(flatten)]
        run: RunArgs,
        /// Budgets of new facilities, repeatable
        #[arg(short, long = "budget")]
        k: Vec<usize>,
        /// Solve this single weight instead of sweeping
        #[arg(short, long)]
        lambda: Option<f64>,
        /// Wall-clock limit per solve, in seconds
        #[arg(long)]
        time_limit: Option<u64>,
        /// Candidate weight rule of the sweep
        #[arg(long, value_enum)]
        rule: Option<Rule>,
        /// Maximum number of solves per sweep
        #[arg(long)]
        max_solves: Option<usize>,
        /// HiGHS threads
        #[arg(long)]
        threads: Option<usize>,
        /// Directory for the result tables (defaults to the data directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Load and validate the inputs of a state
    Check {
        #[command(flatten)]
        run: RunArgs,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// JSON run configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding the input tables
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
    /// State to run
    #[arg(short, long)]
    state: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Rule {
    EqualWeight,
    Midpoint,
}

impl From<Rule> for CandidateRule {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::EqualWeight => CandidateRule::EqualWeight,
            Rule::Midpoint => CandidateRule::Midpoint,
        }
    }
}

impl RunArgs {
    fn load(self) -> RunConfig {
        let mut config = match self.config {
            Some(path) => match RunConfig::from_file(&path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error reading config: {}", e);
                    std::process::exit(1);
                }
            },
            None => RunConfig::default(),
        };
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(state) = self.state {
            config.state = state;
        }
        config
    }
}

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    enable_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            run,
            k,
            lambda,
            time_limit,
            rule,
            max_solves,
            threads,
            output_dir,
        } => {
            let mut config = run.load();
            if !k.is_empty() {
                config.budgets = k;
            }
            if lambda.is_some() {
                config.lambda = lambda;
            }
            if let Some(secs) = time_limit {
                config.time_limit_secs = secs;
            }
            if let Some(rule) = rule {
                config.search.rule = rule.into();
            }
            if let Some(n) = max_solves {
                config.search.max_solves = n;
            }
            if threads.is_some() {
                config.threads = threads;
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }

            let mut backend = HighsBackend::new().with_feasibility_tolerance(config.feasibility_tolerance);
            if let Some(n) = config.threads {
                backend = backend.with_threads(n);
            }

            let output = match siting_core::run(&config, backend) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("Run failed: {}", e);
                    std::process::exit(1);
                }
            };

            print_summary(&config, &output);

            let writer = ResultWriter::new(config.output_dir());
            if let Err(e) = writer.flush(&output.results) {
                eprintln!("Error writing results: {}", e);
                std::process::exit(1);
            }
            println!();
            println!("Results written to {}", config.output_dir().display());
        }
        Commands::Check { run, format } => {
            let config = run.load();
            if let Err(e) = config.validate() {
                eprintln!("{}", e);
                std::process::exit(1);
            }

            match siting_core::load_instance(&config) {
                Ok(instance) => {
                    let summary = instance.summary();
                    if format == "json" {
                        match serde_json::to_string_pretty(&summary) {
                            Ok(json) => println!("{}", json),
                            Err(e) => {
                                eprintln!("Error encoding summary: {}", e);
                                std::process::exit(1);
                            }
                        }
                    } else {
                        println!("✓ {} is consistent", summary.state);
                        println!("  {} tracts ({} served, {} unserved)", summary.tracts, summary.served_tracts, summary.unserved_tracts);
                        println!("  {} existing facilities", summary.existing_facilities);
                        println!("  {} potential facilities", summary.potential_facilities);
                        println!(
                            "  {} / {} / {} existing, served and unserved edges",
                            summary.existing_edges, summary.served_new_edges, summary.unserved_new_edges
                        );
                        println!("  {:.2} served, {:.2} unserved clients", summary.total_served, summary.total_unserved);
                        match summary.scaling {
                            Some(s) => println!("  baseline: {:.2} unmet, {:.2} distance", s.clients, s.distance),
                            None => println!("  no baseline row, it will be derived"),
                        }
                    }
                }
                Err(e) => {
                    eprintln!("✗ {} has errors:", config.state);
                    eprintln!("  {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn print_summary(config: &RunConfig, output: &RunOutput) {
    println!("State: {}", config.state);
    println!(
        "Scaling: {:.2} unmet clients, {:.2} total distance",
        output.scaling.clients, output.scaling.distance
    );

    for frontier in &output.frontiers {
        println!();
        println!("k = {} ({} solves)", frontier.k, frontier.solves());
        println!("  {:>8} {:>14} {:>14} {:>8}", "lambda", "captured", "existing dist", "opened");
        for o in frontier.non_dominated() {
            println!(
                "  {:8.4} {:14.2} {:14.2} {:8}",
                o.lambda,
                o.unserved_demand_met,
                o.existing_sum_distance,
                o.opened.len()
            );
        }
        if frontier.dropped_intervals > 0 {
            println!("  {} intervals left unsearched", frontier.dropped_intervals);
        }
    }

    for o in &output.fixed {
        println!();
        println!("k = {}, lambda = {:.4}: {}", o.k, o.lambda, o.status);
        println!("  Captured clients:   {:.2}", o.unserved_demand_met);
        println!("  Existing distance:  {:.2}", o.existing_sum_distance);
        println!("  New distance:       {:.2}", o.new_sum_distance);
        println!("  Reassigned clients: {:.2}", o.reassigned_clients);
        println!("  Opened facilities:  {}", o.opened.len());
    }

    let degraded = output.results.degraded().count();
    if degraded > 0 {
        println!();
        println!("{} solves stopped at the time limit", degraded);
    }
}
