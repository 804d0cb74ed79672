//! Gantry CLI - declarative resources for console and gateway APIs

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod display;
mod error;
mod exit_codes;

use commands::apply::ApplyArgs;
use commands::batch::BatchArgs;
use commands::delete::DeleteArgs;
use commands::get::GetArgs;
use commands::kinds::KindsArgs;
use commands::run::RunArgs;
use commands::state::StateCommand;
use config::{ConnectionArgs, GantryConfig};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(version)]
#[command(about = "Declarative resources for console and gateway APIs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update resources, then delete managed resources no longer in the manifests
    Apply(ApplyArgs),

    /// Delete the resources described by manifests
    Delete(DeleteArgs),

    /// Submit manifests as one server-side batch job
    BatchApply(BatchArgs),

    /// List or show remote resources
    Get(GetArgs),

    /// Execute a backend action
    Run(RunArgs),

    /// List known kinds and runs
    Kinds(KindsArgs),

    /// Inspect or edit the managed resource record
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run(cli: Cli) -> error::Result<()> {
    let config = GantryConfig::resolve(&cli.connection)?;

    match &cli.command {
        Commands::Apply(args) => commands::apply::run(&config, args).await,
        Commands::Delete(args) => commands::delete::run(&config, args).await,
        Commands::BatchApply(args) => commands::batch::run(&config, args).await,
        Commands::Get(args) => commands::get::run(&config, args).await,
        Commands::Run(args) => commands::run::run(&config, args).await,
        Commands::Kinds(args) => commands::kinds::run(&config, args).await,
        Commands::State { command } => commands::state::run(&config, command).await,
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            code
        }
    };
    std::process::exit(code);
}
