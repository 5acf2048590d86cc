use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use civet_engine::AnalysisSettings;

#[derive(Parser)]
#[command(name = "civet")]
#[command(about = "Asymptotic cost analysis of integer transition systems")]
#[command(version)]
struct Cli {
    /// Input problem file in the (GOAL COMPLEXITY) dialect.
    input: PathBuf,

    /// Soft time budget in seconds (0 = unlimited): stop improving and
    /// finalize with the current result.
    #[arg(long, default_value_t = 0)]
    soft_timeout: u64,

    /// Hard time budget in seconds (0 = unlimited): stop immediately.
    #[arg(long, default_value_t = 0)]
    hard_timeout: u64,

    /// Skip the rule-level simplification before the main fixpoint.
    #[arg(long)]
    no_preprocessing: bool,

    /// Keep implied cost constraints in guards.
    #[arg(long)]
    keep_cost_constraints: bool,

    /// Print the fully simplified problem in the input dialect.
    #[arg(long)]
    print_simplified: bool,

    /// Write a stepwise dot trace of the simplification to this file.
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Write the SMT-LIB dumps of the metering queries to this file.
    #[arg(long)]
    dump_smt: Option<PathBuf>,

    /// Upper bound on parallel rules kept between two locations.
    #[arg(long, default_value_t = 5)]
    max_parallel: usize,

    /// Fan-out budget for tree-shaped chaining.
    #[arg(long, default_value_t = 16)]
    max_chain_fanout: usize,

    /// Cap on instantiation candidates per temporary during metering.
    #[arg(long, default_value_t = 4)]
    instantiation_bound: usize,

    /// Output format of the final result.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Suppress the proof log, print only the result.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.input).into_diagnostic()?;
    let filename = cli.input.display().to_string();
    let program = civet_dsl::parse(&source, &filename)?;
    let mut store = civet_ir::lower(&program).into_diagnostic()?;

    let settings = AnalysisSettings {
        do_preprocessing: !cli.no_preprocessing,
        eliminate_cost_constraints: !cli.keep_cost_constraints,
        print_simplified_as_input_format: cli.print_simplified,
        dot_output: cli.dot.is_some(),
        max_parallel: cli.max_parallel,
        max_chain_fanout: cli.max_chain_fanout,
        freevar_instantiate_maxbounds: cli.instantiation_bound,
        soft_timeout_secs: cli.soft_timeout,
        hard_timeout_secs: cli.hard_timeout,
        dump_smt: cli.dump_smt.is_some(),
    };

    let outcome = civet_engine::analyze(&mut store, settings);

    if !cli.quiet {
        print!("{}", outcome.proof);
    } else if cli.print_simplified {
        if let Some(simplified) = &outcome.simplified {
            print!("{simplified}");
        }
    }

    let vars = store.vars();
    let runtime = &outcome.runtime;
    match cli.format {
        OutputFormat::Text => {
            println!("Complexity: {}", runtime.cpx);
            println!("Cost bound: {}", runtime.bound.display(vars));
            if !runtime.guard.is_empty() {
                let guard: Vec<String> = runtime
                    .guard
                    .iter()
                    .map(|rel| rel.display(vars).to_string())
                    .collect();
                println!("Guard: {}", guard.join(" && "));
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(runtime).into_diagnostic()?
            );
        }
    }

    if let Some(path) = &cli.dot {
        fs::write(path, outcome.dot.unwrap_or_default()).into_diagnostic()?;
    }
    if let Some(path) = &cli.dump_smt {
        fs::write(path, outcome.smt_dumps.join("\n")).into_diagnostic()?;
    }

    Ok(())
}
