use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nestegg::api::{Cli, Command, EngineConfig, run_household_file, run_http_server};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Serve { port, config } => {
            let config = EngineConfig::load(config.as_deref())?;
            run_http_server(port, config)
                .await
                .with_context(|| format!("HTTP server on port {port} failed"))?;
        }
        Command::Run {
            input,
            pretty,
            config,
        } => {
            let config = EngineConfig::load(config.as_deref())?;
            let output = run_household_file(&input, pretty, &config)?;
            println!("{output}");
        }
    }
    Ok(())
}
