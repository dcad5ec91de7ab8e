//! Strata CLI

mod plan;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, WrapErr};
use strata_compile::OrderingMode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plan::{Plan, Relation};

#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Compile ordered relational plans to BigQuery SQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Log compilation decisions to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON plan and print its SQL
    Compile {
        /// Plan file
        plan: PathBuf,
        /// Wrap the query so rows come back in order
        #[arg(long)]
        sorted: bool,
        /// How the row order is carried in the output
        #[arg(long, value_enum, default_value_t = Mode::Unordered)]
        mode: Mode,
    },
    /// Build a plan and list its output columns
    Check {
        /// Plan file
        plan: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Value columns only
    Unordered,
    /// Add zero-based row offsets
    Offsets,
    /// Add a lexically sortable order key
    String,
}

impl From<Mode> for OrderingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Unordered => OrderingMode::Unordered,
            Mode::Offsets => OrderingMode::OffsetColumn,
            Mode::String => OrderingMode::StringEncoded,
        }
    }
}

fn main() -> ExitCode {
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
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{:?}", report);
            ExitCode::FAILURE
        }
    }
}

/// `--verbose` forces debug output; otherwise `RUST_LOG` applies, defaulting
/// to warnings only.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> miette::Result<()> {
    match cli.command {
        Command::Compile { plan, sorted, mode } => cmd_compile(&plan, sorted, mode),
        Command::Check { plan } => cmd_check(&plan),
    }
}

fn load(path: &Path) -> miette::Result<(Plan, Relation)> {
    let text = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let plan = Plan::from_json(&text)?;
    info!(path = %path.display(), steps = plan.steps.len(), "loaded plan");
    let relation = plan.build()?;
    Ok((plan, relation))
}

fn cmd_compile(path: &Path, sorted: bool, mode: Mode) -> miette::Result<()> {
    if sorted && mode != Mode::Unordered {
        miette::bail!("--sorted orders the rows itself and cannot be combined with --mode {:?}", mode);
    }
    let (plan, relation) = load(path)?;
    let sql = relation.emit(mode.into(), sorted, &plan.rename)?;
    println!("{}", sql);
    Ok(())
}

fn cmd_check(path: &Path) -> miette::Result<()> {
    let (plan, relation) = load(path)?;
    let kind = match relation {
        Relation::Ordered(_) => "ordered",
        Relation::Unordered(_) => "unordered",
    };
    let columns: Vec<String> = relation
        .column_ids()
        .into_iter()
        .map(|id| plan.rename.get(&id).cloned().unwrap_or(id))
        .collect();
    println!("OK: {} relation, {} steps, columns: {}", kind, plan.steps.len(), columns.join(", "));
    Ok(())
}
