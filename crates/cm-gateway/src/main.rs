//! cm-gateway: Chat Memory Gateway Main Binary
//!
//! Usage:
//!   cm-gateway history [--session ID] [--json]
//!   cm-gateway add --user TEXT [--ai TEXT] [--session ID]
//!   cm-gateway clear [--session ID]
//!   cm-gateway --help

mod cli;

use cli::RunMode;
use cm_core::{Config, ConnectionRegistry, ConversationBuffer, driver_for, redact_endpoint};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse_args(&args)? {
        RunMode::Help => {
            cli::print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("cm-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Command(command) => command,
    };

    // Initialize logging (stderr, so command output stays clean)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    let endpoint = config.memory.endpoint().unwrap_or_default();
    let driver = driver_for(endpoint);
    tracing::info!(
        driver = driver.name(),
        endpoint = %redact_endpoint(endpoint),
        database = %config.memory.database,
        collection = %config.memory.collection,
        "Starting cm-gateway"
    );

    let registry = ConnectionRegistry::from_config(driver, &config);
    let buffer = ConversationBuffer::connect(&registry, &config.memory)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open chat memory: {}", e))?;

    let result = cli::run_command(&buffer, command).await;
    registry.close().await;

    print!("{}", result?);
    Ok(())
}
