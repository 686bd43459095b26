use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use calc_mcp::Config;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Arithmetic tools over JSON-RPC 2.0 on stdio", long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: ./calc-mcp.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve requests on stdin/stdout (default)
    Serve,

    /// List the available tools
    Tools {
        /// Output the tools/list payload as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Execute a single tool locally
    #[command(allow_negative_numbers = true)]
    Call {
        /// Tool name (add, subtract, multiply, divide)
        tool: String,

        /// First operand
        a: f64,

        /// Second operand
        b: f64,
    },
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid logging.level: {:?}", level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // stdout is for JSON-RPC
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;
    init_logging(&config.logging.level)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve::execute(&config)?,
        Commands::Tools { json } => commands::tools::execute(json)?,
        Commands::Call { tool, a, b } => commands::call::execute(&tool, a, b)?,
    }

    Ok(())
}
