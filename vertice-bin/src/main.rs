use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use vertice_config::ConfigLoader;

/// Vertice agent gateway — provider routing, resilience, caching, and
/// Open Responses streaming for multi-agent coding assistants.
#[derive(Parser)]
#[command(name = "vertice", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to vertice.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent gateway's HTTP server
    Serve,
    /// Show the effective configuration
    Config {
        /// Output as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(level_override: Option<&str>, quiet: bool, format: &str) {
    use tracing_subscriber::EnvFilter;

    let directive = if quiet {
        "error"
    } else {
        level_override.unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> anyhow::Result<()> {
    color_eyre::install().ok();
    let cli = Cli::parse();

    let loader = ConfigLoader::load(cli.config.as_deref())?;
    let config = loader.get();

    init_tracing(cli.log_level.as_deref(), cli.quiet, &config.logging.format);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Serve => {
                if let Err(e) = vertice_server::start_server(config).await {
                    error!(error = %e, "gateway exited with an error");
                    std::process::exit(1);
                }
            }
            Commands::Config { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    println!("{}", toml::to_string_pretty(&config)?);
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
