//! Toolshed Unified Launcher
//!
//! - `toolshed serve`: run the MCP server over stdio (the long-lived
//!   process a host launches)
//! - `toolshed init`: generate a commented example config file
//! - `toolshed validate`: exercise the configuration and exit 0/1

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use toolshed_mcp::McpServer;
use tracing::{error, info};

mod config;
mod init;
mod validate;

#[derive(Parser, Debug)]
#[command(name = "toolshed", about = "Toolshed MCP server and utilities")]
struct Cli {
    /// Enable verbose logging (mirrors the file log filter to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP server (stdio transport)
    ///
    /// Runs a JSON-RPC 2.0 server over stdin/stdout for AI tool
    /// integration. Example Claude Desktop entry:
    ///   { "mcpServers": { "toolshed": { "command": "toolshed",
    ///     "args": ["serve"] } } }
    Serve {
        /// Config file path (default: ~/.toolshed/config.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Resource roots, overriding the config file.
        /// Specify multiple times for multiple roots.
        #[arg(long = "allow-path", short = 'p')]
        allow_paths: Vec<PathBuf>,
    },

    /// Generate a commented example config file
    Init {
        /// Where to write it (default: ~/.toolshed/config.toml)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Exercise the configured paths and settings, exit 0/1
    Validate {
        /// Config file path (default: ~/.toolshed/config.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = toolshed_logging::init_logging(toolshed_logging::LogConfig {
        app_name: "toolshed",
        verbose: cli.verbose,
    }) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve {
            config,
            allow_paths,
        } => run_serve(config, allow_paths),
        Commands::Init { output } => init::run(output),
        Commands::Validate { config } => {
            return match validate::run(config.as_deref()) {
                Ok(0) => ExitCode::SUCCESS,
                Ok(_) => ExitCode::FAILURE,
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    ExitCode::FAILURE
                }
            };
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_serve(config_path: Option<PathBuf>, allow_paths: Vec<PathBuf>) -> Result<()> {
    let file_config = config::FileConfig::load(config_path.as_deref())?;

    // The session credential is read exactly once, here.
    let credential = std::env::var(config::CREDENTIAL_ENV_VAR).ok();

    let server_config = file_config.into_server_config(allow_paths, credential)?;

    info!("Starting MCP server (stdio)");

    let mut server = McpServer::new(server_config)?;

    // Interrupt aborts the reader loop and signals in-flight tool calls.
    let token = server.cancellation_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        error!("Failed to install interrupt handler: {}", e);
    }

    server.run()
}
