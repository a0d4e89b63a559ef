pub mod ops;

use clap::{Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "hotstore.toml";

#[derive(Parser)]
#[command(name = "hotstore")]
#[command(about = "Hot Store storefront: accounts, billing and store provisioning", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a fresh 12-word recovery phrase
    Mnemonic,
    /// Write the default configuration file
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
}
