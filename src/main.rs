use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txorder::config::resolve_config_path;

#[derive(Parser)]
#[command(name = "txorder")]
#[command(about = "Sequence reordering and block cutting", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Order JSON-lines envelopes into batches
    Run {
        /// Read envelopes from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Print block fill metrics to stderr on exit
        #[arg(long)]
        metrics: bool,
    },
    /// Release JSON-lines envelopes one at a time in sequence order
    Dispatch {
        /// Read envelopes from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries batch output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txorder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run { input, metrics }) => {
            txorder::cli::run::run(config_path, input, metrics).await?;
        }
        Some(Commands::Dispatch { input }) => {
            txorder::cli::dispatch::run(config_path, input).await?;
        }
        None => {
            txorder::cli::run::run(config_path, None, false).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                txorder::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                txorder::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
