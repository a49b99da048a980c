//! Chat Server - Entry Point
//!
//! Reads the configuration and runs the accept loop.

use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Bind address from the first argument, CHAT_ADDR, or the default
    let config = ServerConfig::from_env();
    info!(
        "Starting with outbound queue {} and max frame {} bytes",
        config.outbound_capacity, config.max_frame_length
    );

    let server = ChatServer::bind(config).await?;
    server.run().await;

    Ok(())
}
