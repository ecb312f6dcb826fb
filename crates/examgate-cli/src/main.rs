//! examgate CLI: replay access-control scenarios against the engine.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "examgate",
    version,
    about = "Assessment access-control and attempt-lifecycle engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay scenarios against an in-memory engine
    Run {
        /// Path to a .toml scenario or a directory of them
        #[arg(long)]
        scenario: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Directory for JSON reports
        #[arg(long, default_value = "./examgate-results")]
        output: PathBuf,
    },

    /// Validate scenario TOML files
    Validate {
        /// Path to a scenario file or directory
        #[arg(long)]
        scenario: PathBuf,
    },

    /// Create starter config and example scenario
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examgate=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenario,
            config,
            format,
            output,
        } => commands::run::execute(scenario, config, format, output).await,
        Commands::Validate { scenario } => commands::validate::execute(scenario),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
