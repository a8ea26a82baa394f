mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{compile::CompileArgs, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "specc",
    about = "Deterministic checklist compiler: turn a product spec into an ordered, explainable build checklist",
    version,
    propagate_version = true
)]
struct Cli {
    /// Compiler config (default: nearest specc.yaml upward from the cwd)
    #[arg(long, global = true, env = "SPECC_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a YAML or JSON spec into a checklist manifest or a refusal
    Compile(CompileArgs),

    /// Show the conversion state and blocking reasons of a compiled output
    State {
        /// Output directory of a previous `specc compile`
        #[arg(long, default_value = "specc-out")]
        out: PathBuf,
    },

    /// Compare two manifests item by item
    Drift {
        prior: PathBuf,
        current: PathBuf,
    },

    /// List checklist items in execution order
    Items {
        #[arg(long, default_value = "specc-out")]
        out: PathBuf,

        /// Only items with this status (pending, blocked, in_cycle)
        #[arg(long)]
        status: Option<String>,

        /// Only items with this severity (critical, high, medium, low)
        #[arg(long)]
        severity: Option<String>,
    },

    /// Inspect and validate the compiler config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Compile(args) => cmd::compile::run(&config_path, args, cli.json),
        Commands::State { out } => cmd::state::run(&out, cli.json),
        Commands::Drift { prior, current } => cmd::drift::run(&prior, &current, cli.json),
        Commands::Items {
            out,
            status,
            severity,
        } => cmd::items::run(&out, status.as_deref(), severity.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
