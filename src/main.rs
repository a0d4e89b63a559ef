use clap::Parser;
use tracing_subscriber::EnvFilter;

use hotstore::cli::{ops, Cli, Commands};
use hotstore::config::HotstoreConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            let config = HotstoreConfig::load_or_default(&config).apply_env();
            init_tracing(&config.server.log_level);
            ops::handle_serve_command(config, port).await?;
        }
        Commands::Mnemonic => ops::handle_mnemonic_command()?,
        Commands::InitConfig { config } => ops::handle_init_config_command(&config)?,
    }
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
