#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

mod command;

use clap::{Parser, Subcommand};
use colloquy_config::Config;
use command::{
    CommandStrategy, InfoStrategy, InitStrategy, SimulateInput, SimulateStrategy,
    VersionStrategy,
};
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Long-running conversation manager", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a session through a scripted conversation lifecycle
    Simulate {
        /// Expire conversations with scheduled tasks
        #[arg(short, long)]
        asynchronous: bool,

        /// Conversation timeout in milliseconds
        #[arg(short, long, default_value_t = 500)]
        timeout_ms: u64,

        /// Number of times the conversation is resumed
        #[arg(short, long, default_value_t = 3)]
        requests: u32,
    },
    /// Show configuration
    Info,
    /// Initialize configuration
    Init,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load();
    let config = loaded.as_ref().map_or_else(|_| Config::default(), Clone::clone);

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Simulate {
            asynchronous,
            timeout_ms,
            requests,
        } => {
            if let Err(e) = &loaded {
                warn!("Using default configuration: {e}");
            }
            let input = SimulateInput {
                config: config.conversation,
                asynchronous,
                timeout_ms,
                requests,
            };
            SimulateStrategy.execute(input).await?;
        }
        Commands::Info => {
            InfoStrategy.execute(loaded?).await?;
        }
        Commands::Init => {
            InitStrategy.execute(()).await?;
        }
        Commands::Version => {
            VersionStrategy.execute(()).await?;
        }
    }

    Ok(())
}
