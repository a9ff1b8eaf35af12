//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Data directory for the peer history and saved name
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a host and a joiner over the in-process radio and exchange a message
    Demo {
        /// Display name of the hosting device
        #[arg(long, default_value = "X")]
        host_name: String,
        /// Display name of the joining device
        #[arg(long, default_value = "Y")]
        joiner_name: String,
        /// Message the host sends once connected
        #[arg(short, long, default_value = "hi")]
        message: String,
    },
    /// List previously connected peers
    Peers {
        /// Clear stale online flags before listing
        #[arg(long)]
        reset_online: bool,
    },
    /// Show or change the saved display name
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Print the saved name, if any
    Show,
    /// Save a display name for future sessions
    Set { name: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print an example configuration file
    Example,
}
