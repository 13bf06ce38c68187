//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for cmdrelay.

use clap::{Parser, Subcommand};

/// cmdrelay - background shell command runner
///
/// Runs each command on a background worker, captures its output and exit
/// status, and reports every result tagged with its correlation value.
#[derive(Parser, Debug)]
#[command(name = "cmdrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run commands concurrently and print each result as it arrives
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "CMDRELAY_CONFIG")]
        config: Option<String>,

        /// Print results as JSON lines
        #[arg(long)]
        json: bool,

        /// Correlation value of the first command; later ones count up
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        correlation_start: i32,

        /// Override the configured scheduler (thread, tokio)
        #[arg(long)]
        scheduler: Option<String>,

        /// Override the configured shell program
        #[arg(long)]
        shell: Option<String>,

        /// Command lines to execute
        #[arg(required = true, num_args = 1..)]
        commands: Vec<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
