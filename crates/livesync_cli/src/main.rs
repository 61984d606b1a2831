//! LiveSync CLI
//!
//! Command-line client for poking at a LiveSync server.
//!
//! # Commands
//!
//! - `get` - Read the value at a path
//! - `call` - Call a server method
//! - `watch` - Observe a path and print every signal

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use commands::Session;

/// LiveSync command-line client.
#[derive(Parser)]
#[command(name = "livesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server URL
    #[arg(global = true, short, long, default_value = "ws://127.0.0.1:8080/")]
    url: String,

    /// Session id sent on connect (random if absent)
    #[arg(global = true, short, long)]
    session: Option<String>,

    /// Request and connect timeout in milliseconds
    #[arg(global = true, short, long, default_value = "10000")]
    timeout_ms: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the value at a path
    Get {
        /// Path to read (JSON for structured paths)
        path: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Call a server method
    Call {
        /// Method name
        method: String,

        /// Arguments as JSON
        #[arg(default_value = "[]")]
        args: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Observe a path and print every signal
    Watch {
        /// Path to observe (JSON for structured paths)
        path: String,

        /// Follow the path as a keyed list instead of a single value
        #[arg(short, long)]
        list: bool,

        /// Stop after this many signals
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let session = Session {
        url: cli.url,
        session_id: cli.session,
        timeout: Duration::from_millis(cli.timeout_ms),
    };

    match cli.command {
        Commands::Get { path, format } => {
            commands::get::run(&session, &path, &format)?;
        }
        Commands::Call {
            method,
            args,
            format,
        } => {
            commands::call::run(&session, &method, &args, &format)?;
        }
        Commands::Watch { path, list, count } => {
            commands::watch::run(&session, &path, list, count)?;
        }
        Commands::Version => {
            println!("LiveSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
