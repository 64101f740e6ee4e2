//! depscore - MCP server that scores dependencies through the Socket API.

mod credential;
mod health;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use depscore_core::{Config, ScoreProvider};
use depscore_mcp::{HttpSettings, HttpState, McpServer};
use depscore_socket::SocketClient;

#[derive(Parser)]
#[command(name = "depscore")]
#[command(author, version, about = "depscore - dependency scoring MCP server", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serve over HTTP instead of stdio
    #[arg(long)]
    http: bool,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server (default)
    Serve,

    /// Inspect or edit the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Probe a running HTTP server
    Health {
        /// Port the server listens on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print one value, e.g. `http.port`
    Get { key: String },

    /// Set one value, e.g. `http.port 8080`
    Set { key: String, value: String },

    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    match cli.command {
        Some(Commands::Config { command }) => {
            init_console_logging(cli.verbose);
            run_config(command, &config_path)
        }
        Some(Commands::Health { port }) => {
            init_console_logging(cli.verbose);
            let mut config = Config::load_from(&config_path)?;
            config.apply_env()?;
            health::check(port.unwrap_or(config.http.port)).await
        }
        Some(Commands::Serve) | None => {
            let mut config = Config::load_from(&config_path)?;
            config.apply_env()?;
            if cli.http {
                config.http.enabled = true;
            }
            if let Some(port) = cli.port {
                config.http.port = port;
            }

            let _guards = logging::init(cli.verbose, &config.logging.log_dir())?;
            serve(config).await
        }
    }
}

fn init_console_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(logging::env_filter(verbose))
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let http_mode = config.http.enabled;

    let api_key = credential::resolve(http_mode)?;
    let client = SocketClient::with_url(
        config.api.url.clone(),
        api_key,
        Duration::from_secs(config.api.timeout_secs),
    )?;
    tracing::debug!(url = %client.url(), "Scoring client ready");
    let provider: Arc<dyn ScoreProvider> = Arc::new(client);

    if http_mode {
        let port = config.http.port;
        tracing::info!("Starting HTTP server on port {}", port);

        let state = HttpState::new(provider, HttpSettings::try_from(&config.http)?);
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        depscore_mcp::http::serve(port, state, shutdown)
            .await
            .with_context(|| format!("HTTP server on port {} failed", port))
    } else {
        tracing::info!("Starting in stdio mode");
        McpServer::new(provider)
            .run()
            .await
            .context("stdio transport failed")
    }
}

fn run_config(command: ConfigCommands, path: &Path) -> anyhow::Result<()> {
    let mut config = Config::load_from(path)?;

    match command {
        ConfigCommands::Show => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("# {}", path.display());
            print!("{}", rendered);
        }
        ConfigCommands::Get { key } => match config.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(not set)"),
        },
        ConfigCommands::Set { key, value } => {
            config.set(&key, &value)?;
            config.save_to(path)?;
            println!("{} = {}", key, value);
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }

    Ok(())
}
