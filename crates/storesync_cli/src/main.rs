//! storesync CLI
//!
//! Command-line tools for storesync configuration.
//!
//! # Commands
//!
//! - `validate` - Check a configuration file and summarize its servers
//! - `mapping` - Show the effective field mapping of one entity kind
//! - `order-statuses` - List the order status table

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// storesync configuration tools.
#[derive(Parser)]
#[command(name = "storesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration file and summarize its servers
    Validate {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the effective field mapping of one entity kind
    Mapping {
        /// Server name
        server: String,

        /// Entity kind (Item, StockLevel, Price, TaxRule, ShippingMethod)
        kind: String,

        /// Show the remote to local direction
        #[arg(short, long)]
        inbound: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the order status table
    OrderStatuses {
        /// Use this server's status map instead of the built-in table
        #[arg(short, long)]
        server: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Validate { format } => {
            let path = cli.config.ok_or("Configuration path required for validate")?;
            commands::validate::run(&path, &format)?;
        }
        Commands::Mapping {
            server,
            kind,
            inbound,
            format,
        } => {
            let path = cli.config.ok_or("Configuration path required for mapping")?;
            commands::mapping::run(&path, &server, &kind, inbound, &format)?;
        }
        Commands::OrderStatuses { server, format } => {
            commands::order_statuses::run(cli.config.as_deref(), server.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("storesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("storesync core v{}", storesync_core::VERSION);
        }
    }

    Ok(())
}
